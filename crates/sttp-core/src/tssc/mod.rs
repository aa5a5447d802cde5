//! Time-Series Special Compression: an adaptive, per-point, XOR-and-delta
//! bit-stream codec for `(pointId, timestamp, stateFlags, value)` tuples.

mod bits;
mod codes;
mod decoder;
mod encoder;
mod point;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use point::PointMetadata;

/// A single decoded or to-be-encoded TSSC tuple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsscPoint {
    pub point_id: i32,
    pub timestamp: i64,
    pub state_flags: u32,
    pub value: f32,
}
