//! Wire protocol core for the Streaming Telemetry Transport Protocol: framing
//! constants, the signal-index cache, the compact measurement codec, and the
//! TSSC stream codec.
//!
//! This crate has no networking of its own — it is pure encode/decode and
//! state-tracking logic, consumed by `sttp-transport` and `sttp-subscriber`.

pub mod cache;
pub mod error;
pub mod measurement_codec;
pub mod model;
pub mod protocol;
pub mod subscription;
pub mod time;
pub mod tssc;
pub mod wire;

pub use error::{Result, SttpError};
pub use model::{Measurement, StateFlags};
