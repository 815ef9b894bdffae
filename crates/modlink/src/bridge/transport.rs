//! Peer link transport.
//!
//! [`PeerTransport`] is the module-side seam the serve loop talks to.
//! [`FramedTransport`] implements it over any byte stream pair; the same type
//! with the message directions swapped ([`PeerLink`]) is the central side.

use std::marker::PhantomData;

use futures::{SinkExt, StreamExt};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::JsonCodec;
use super::protocol::{PeerRequest, PeerResponse};
use crate::error::TransportError;

#[async_trait::async_trait]
pub trait PeerTransport: Send {
    /// Next request, or `None` once the peer side is closed.
    async fn recv(&mut self) -> Result<Option<PeerRequest>, TransportError>;

    async fn send(&mut self, response: PeerResponse) -> Result<(), TransportError>;
}

/// JSON-framed messages over a reader/writer pair.
pub struct FramedTransport<R, W, In = PeerRequest, Out = PeerResponse> {
    reader: FramedRead<R, JsonCodec<In>>,
    writer: FramedWrite<W, JsonCodec<Out>>,
    _direction: PhantomData<fn(Out) -> In>,
}

/// Central-side view of the link: sends requests, receives responses.
pub type PeerLink<R, W> = FramedTransport<R, W, PeerResponse, PeerRequest>;

impl<R, W, In, Out> FramedTransport<R, W, In, Out>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    In: DeserializeOwned + Send,
    Out: Serialize + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(reader, JsonCodec::new()),
            writer: FramedWrite::new(writer, JsonCodec::new()),
            _direction: PhantomData,
        }
    }

    pub async fn next_message(&mut self) -> Result<Option<In>, TransportError> {
        Ok(self.reader.next().await.transpose()?)
    }

    pub async fn send_message(&mut self, message: Out) -> Result<(), TransportError> {
        self.writer.send(message).await?;
        Ok(())
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader.into_inner(), self.writer.into_inner())
    }
}

#[async_trait::async_trait]
impl<R, W> PeerTransport for FramedTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<PeerRequest>, TransportError> {
        self.next_message().await
    }

    async fn send(&mut self, response: PeerResponse) -> Result<(), TransportError> {
        self.send_message(response).await
    }
}
