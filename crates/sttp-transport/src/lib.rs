//! Transport-layer plumbing for the STTP command and data channels: the
//! buffered framing wrapper (C2) and thin tokio-backed TCP/UDP helpers.

pub mod framed;
pub mod tcp;
pub mod udp;

pub use framed::FramedStream;
