//! Framed codec for the peer link.
//!
//! 4-byte length prefix + serde_json body. Works over any AsyncRead/AsyncWrite
//! (stdio, pipes, in-memory duplex).

use std::io;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Frames never need to be larger than a command plus JSON/base64 overhead.
pub const MAX_FRAME_LEN: usize = 16 * 1024;

pub struct JsonCodec<T> {
    inner: LengthDelimitedCodec,
    _phantom: PhantomData<T>,
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .max_frame_length(MAX_FRAME_LEN)
                .new_codec(),
            _phantom: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Decoder for JsonCodec<T> {
    type Item = T;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(bytes) => {
                let item = serde_json::from_slice(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

impl<T: Serialize> Encoder<T> for JsonCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json =
            serde_json::to_vec(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tracing::trace!(frame_bytes = json.len(), "Encoding frame");
        self.inner.encode(Bytes::from(json), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{PeerRequest, PeerResponse};
    use crate::command::CommandOutcome;

    #[test]
    fn write_request_survives_framing() {
        let mut codec = JsonCodec::<PeerRequest>::new();
        let mut buf = BytesMut::new();

        let req = PeerRequest::Write {
            value: vec![0xc3, 0x28, b'!'],
        };
        codec.encode(req.clone(), &mut buf).unwrap();
        assert_eq!(&buf[..4], &((buf.len() - 4) as u32).to_be_bytes());

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, req);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut codec = JsonCodec::<PeerResponse>::new();
        let mut full = BytesMut::new();
        codec
            .encode(
                PeerResponse::WriteResult {
                    outcome: CommandOutcome::Empty,
                    detail: None,
                },
                &mut full,
            )
            .unwrap();

        let mut partial = full.split_to(full.len() - 3);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(full);
        assert!(matches!(
            codec.decode(&mut partial).unwrap(),
            Some(PeerResponse::WriteResult {
                outcome: CommandOutcome::Empty,
                ..
            })
        ));
    }

    #[test]
    fn garbage_body_is_invalid_data() {
        let mut codec = JsonCodec::<PeerRequest>::new();
        let mut buf = BytesMut::new();
        LengthDelimitedCodec::builder()
            .length_field_length(4)
            .new_codec()
            .encode(Bytes::from_static(b"{\"type\":\"explode\"}"), &mut buf)
            .unwrap();

        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut codec = JsonCodec::<PeerRequest>::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&((MAX_FRAME_LEN + 1) as u32).to_be_bytes());
        buf.extend_from_slice(&[b' '; 8]);

        assert!(codec.decode(&mut buf).is_err());
    }
}
