use std::io;

/// Stable error taxonomy for the STTP wire protocol core.
///
/// Each variant corresponds to one of the error categories in the protocol
/// error-handling design: protocol violations close the connection and
/// trigger reconnect, transport errors are surfaced as connection-terminated
/// events, and the rest are returned synchronously from the call that
/// detected them.
#[derive(Debug, thiserror::Error)]
pub enum SttpError {
    /// Malformed frame, unknown response code, or length overflow.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Transport EOF, reset, or timeout.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Operational-modes negotiation named an implementation-specific
    /// extension this build does not understand.
    #[error("UNSUPPORTED EXTENSION: id {0:#04x}")]
    UnsupportedExtension(u8),

    /// Bad configuration supplied by the caller (empty hostname, bad port).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Publisher rejected a SUBSCRIBE with a FAILED response.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// A codec could not decode a value from the bytes available.
    #[error("decode error: {0}")]
    Decode(String),

    /// Not enough bytes remained in a buffer to satisfy a read.
    #[error("insufficient buffer: needed {needed} bytes, had {available}")]
    InsufficientBuffer { needed: usize, available: usize },
}

pub type Result<T> = std::result::Result<T, SttpError>;
