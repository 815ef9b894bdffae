//! Peer link: a byte-stream stand-in for the BLE stack.
//!
//! # Architecture
//!
//! - **protocol**: Message types (PeerRequest/PeerResponse)
//! - **codec**: JSON framing codec for AsyncRead/AsyncWrite
//! - **transport**: PeerTransport seam + framed implementation

pub mod codec;
pub mod protocol;
pub mod transport;
