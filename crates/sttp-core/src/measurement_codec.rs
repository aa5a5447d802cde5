//! Compact measurement wire format: a 9-byte fixed prefix (flags, runtime
//! index, float32 value) followed by 0, 2, 4, or 8 bytes of timestamp
//! depending on whether time is included at all, and whether it fits inside
//! the active base-time offset.

use crate::cache::SignalIndexCache;
use crate::error::{Result, SttpError};
use crate::model::{Measurement, StateFlags};
use crate::time::{self, Ticks};
use crate::wire;

pub const FIXED_LENGTH: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct CompactStateFlags(u8);

impl CompactStateFlags {
    const DATA_RANGE: u8 = 0x01;
    const DATA_QUALITY: u8 = 0x02;
    const TIME_QUALITY: u8 = 0x04;
    const SYSTEM_ISSUE: u8 = 0x08;
    const CALCULATED_VALUE: u8 = 0x10;
    const DISCARDED_VALUE: u8 = 0x20;
    const BASE_TIME_OFFSET: u8 = 0x40;
    const TIME_INDEX: u8 = 0x80;

    fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

const DATA_RANGE_MASK: u32 = 0x0000_00FC;
const DATA_QUALITY_MASK: u32 = 0x0000_EF03;
const TIME_QUALITY_MASK: u32 = 0x00BF_0000;
const SYSTEM_ISSUE_MASK: u32 = 0xE000_0000;
const CALCULATED_VALUE_MASK: u32 = 0x0000_1000;
const DISCARDED_VALUE_MASK: u32 = 0x0040_0000;

fn map_to_full_flags(compact: CompactStateFlags) -> StateFlags {
    let mut bits = 0u32;
    if compact.contains(CompactStateFlags::DATA_RANGE) {
        bits |= DATA_RANGE_MASK;
    }
    if compact.contains(CompactStateFlags::DATA_QUALITY) {
        bits |= DATA_QUALITY_MASK;
    }
    if compact.contains(CompactStateFlags::TIME_QUALITY) {
        bits |= TIME_QUALITY_MASK;
    }
    if compact.contains(CompactStateFlags::SYSTEM_ISSUE) {
        bits |= SYSTEM_ISSUE_MASK;
    }
    if compact.contains(CompactStateFlags::CALCULATED_VALUE) {
        bits |= CALCULATED_VALUE_MASK;
    }
    if compact.contains(CompactStateFlags::DISCARDED_VALUE) {
        bits |= DISCARDED_VALUE_MASK;
    }
    StateFlags(bits)
}

fn map_to_compact_flags(full: StateFlags) -> CompactStateFlags {
    let mut bits = 0u8;
    if full.0 & DATA_RANGE_MASK != 0 {
        bits |= CompactStateFlags::DATA_RANGE;
    }
    if full.0 & DATA_QUALITY_MASK != 0 {
        bits |= CompactStateFlags::DATA_QUALITY;
    }
    if full.0 & TIME_QUALITY_MASK != 0 {
        bits |= CompactStateFlags::TIME_QUALITY;
    }
    if full.0 & SYSTEM_ISSUE_MASK != 0 {
        bits |= CompactStateFlags::SYSTEM_ISSUE;
    }
    if full.0 & CALCULATED_VALUE_MASK != 0 {
        bits |= CompactStateFlags::CALCULATED_VALUE;
    }
    if full.0 & DISCARDED_VALUE_MASK != 0 {
        bits |= CompactStateFlags::DISCARDED_VALUE;
    }
    CompactStateFlags(bits)
}

/// Encoding-time context shared across all measurements in one data packet:
/// whether timestamps are included at all, their resolution, and the two
/// base-time-offset generation slots (even/odd).
#[derive(Debug, Clone, Copy)]
pub struct CompactEncodingContext {
    pub include_time: bool,
    pub use_millisecond_resolution: bool,
    pub base_time_offsets: [i64; 2],
}

impl Default for CompactEncodingContext {
    fn default() -> Self {
        CompactEncodingContext {
            include_time: true,
            use_millisecond_resolution: false,
            base_time_offsets: [0, 0],
        }
    }
}

/// Encodes one measurement into `out`, given the runtime index assigned to
/// it by the active `SignalIndexCache` and the base-time generation slot
/// (0 or 1) currently active for this session.
pub fn encode(
    out: &mut Vec<u8>,
    measurement: &Measurement,
    runtime_id: i32,
    time_index: usize,
    ctx: &CompactEncodingContext,
) {
    let base_time_offset = ctx.base_time_offsets[time_index];

    let mut using_base_time_offset = false;
    if ctx.include_time && base_time_offset > 0 {
        let timestamp_value = time::timestamp_value(measurement.timestamp) as i64;
        let difference = timestamp_value - base_time_offset;
        if difference > 0 {
            using_base_time_offset = if ctx.use_millisecond_resolution {
                (difference / time::PER_MILLISECOND as i64) < u16::MAX as i64
            } else {
                difference < u32::MAX as i64
            };
        }
    }

    let mut compact = map_to_compact_flags(measurement.flags);
    if time_index != 0 {
        compact.0 |= CompactStateFlags::TIME_INDEX;
    }
    if using_base_time_offset {
        compact.0 |= CompactStateFlags::BASE_TIME_OFFSET;
    }

    out.push(compact.0);
    wire::write_u32_be(out, runtime_id as u32);
    wire::write_f32_be(out, measurement.value as f32);

    if !ctx.include_time {
        return;
    }

    if using_base_time_offset {
        let timestamp_value = time::timestamp_value(measurement.timestamp) as i64;
        let offset = (timestamp_value - base_time_offset) as u64;
        if ctx.use_millisecond_resolution {
            wire::write_u16_be(out, (offset / time::PER_MILLISECOND) as u16);
        } else {
            wire::write_u32_be(out, offset as u32);
        }
    } else {
        wire::write_u64_be(out, measurement.timestamp);
    }
}

/// Decodes one measurement, returning the number of bytes consumed alongside
/// it regardless of whether the runtime index resolved to a known signal.
///
/// A runtime index absent from `cache` yields `Ok((None, consumed))` rather
/// than an error: the record's shape is still fully known from its own
/// flags byte, so the caller can skip just this measurement and keep
/// decoding the rest of the packet. Only a buffer too short to hold a
/// structurally complete record is an error, since then no resync point
/// can be determined.
pub fn decode(
    buffer: &[u8],
    cache: &SignalIndexCache,
    ctx: &CompactEncodingContext,
) -> Result<(Option<Measurement>, usize)> {
    if buffer.len() < FIXED_LENGTH {
        return Err(SttpError::InsufficientBuffer {
            needed: FIXED_LENGTH,
            available: buffer.len(),
        });
    }

    let compact = CompactStateFlags(buffer[0]);
    let flags = map_to_full_flags(compact);
    let time_index = usize::from(compact.contains(CompactStateFlags::TIME_INDEX));
    let using_base_time_offset = compact.contains(CompactStateFlags::BASE_TIME_OFFSET);

    let mut index = 1;
    let runtime_id = wire::read_u32_be(&buffer[index..])? as i32;
    index += 4;

    let value = wire::read_f32_be(&buffer[index..])? as f64;
    index += 4;

    let time_len = if !ctx.include_time {
        0
    } else if using_base_time_offset {
        if ctx.use_millisecond_resolution { 2 } else { 4 }
    } else {
        8
    };

    if buffer.len() < index + time_len {
        return Err(SttpError::InsufficientBuffer {
            needed: index + time_len,
            available: buffer.len(),
        });
    }

    let mut timestamp: Ticks = 0;

    if ctx.include_time {
        if using_base_time_offset {
            let base_time_offset = ctx.base_time_offsets[time_index];
            if ctx.use_millisecond_resolution {
                let offset = wire::read_u16_be(&buffer[index..])?;
                if base_time_offset > 0 {
                    timestamp =
                        base_time_offset as u64 + offset as u64 * time::PER_MILLISECOND;
                }
            } else {
                let offset = wire::read_u32_be(&buffer[index..])?;
                if base_time_offset > 0 {
                    timestamp = base_time_offset as u64 + offset as u64;
                }
            }
        } else {
            timestamp = wire::read_u64_be(&buffer[index..])?;
        }
        index += time_len;
    }

    let measurement = cache.signal_id(runtime_id).map(|signal_id| Measurement {
        signal_id,
        value,
        timestamp,
        flags,
    });

    Ok((measurement, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn cache_with_one(signal_index: i32, signal_id: Uuid) -> SignalIndexCache {
        let mut body = Vec::new();
        body.extend_from_slice(Uuid::nil().as_bytes());
        wire::write_u32_be(&mut body, 1);
        wire::write_u32_be(&mut body, signal_index as u32);
        body.extend_from_slice(signal_id.as_bytes());
        wire::write_u32_be(&mut body, 5);
        body.extend_from_slice(b"PMU:1");
        wire::write_u64_be(&mut body, 1);

        let mut buf = Vec::new();
        wire::write_u32_be(&mut buf, body.len() as u32);
        buf.extend_from_slice(&body);

        SignalIndexCache::decode(&buf).unwrap().1
    }

    #[test]
    fn roundtrip_full_fidelity_timestamp() {
        let signal_id = Uuid::new_v4();
        let cache = cache_with_one(3, signal_id);
        let ctx = CompactEncodingContext::default();

        let measurement = Measurement::new(signal_id, 60.0, 638_000_000_000_000_000)
            .with_flags(StateFlags::NORMAL);

        let mut out = Vec::new();
        encode(&mut out, &measurement, 3, 0, &ctx);
        assert_eq!(out.len(), FIXED_LENGTH + 8);

        let (decoded, consumed) = decode(&out, &cache, &ctx).unwrap();
        let decoded = decoded.unwrap();
        assert_eq!(consumed, out.len());
        assert_eq!(decoded.signal_id, signal_id);
        assert_eq!(decoded.value, 60.0);
        assert_eq!(decoded.timestamp, measurement.timestamp);
    }

    #[test]
    fn roundtrip_using_base_time_offset_tick_resolution() {
        let signal_id = Uuid::new_v4();
        let cache = cache_with_one(1, signal_id);
        let base = 638_000_000_000_000_000i64;
        let ctx = CompactEncodingContext {
            include_time: true,
            use_millisecond_resolution: false,
            base_time_offsets: [base, base],
        };

        let measurement = Measurement::new(signal_id, 1.0, base as u64 + 12_345);

        let mut out = Vec::new();
        encode(&mut out, &measurement, 1, 0, &ctx);
        assert_eq!(out.len(), FIXED_LENGTH + 4);

        let (decoded, _) = decode(&out, &cache, &ctx).unwrap();
        assert_eq!(decoded.unwrap().timestamp, measurement.timestamp);
    }

    #[test]
    fn selecting_the_second_base_time_slot_sets_the_time_index_bit() {
        let signal_id = Uuid::new_v4();
        let cache = cache_with_one(1, signal_id);
        let base = 638_000_000_000_000_000i64;
        let ctx = CompactEncodingContext {
            include_time: true,
            use_millisecond_resolution: false,
            base_time_offsets: [base, base + 1],
        };

        let measurement = Measurement::new(signal_id, 1.0, base as u64 + 1 + 500);

        let mut out = Vec::new();
        encode(&mut out, &measurement, 1, 1, &ctx);
        assert_eq!(out[0] & 0x80, 0x80, "TIME_INDEX bit must be set for slot 1");

        let (decoded, _) = decode(&out, &cache, &ctx).unwrap();
        assert_eq!(decoded.unwrap().timestamp, measurement.timestamp);
    }

    #[test]
    fn no_time_included_yields_fixed_length_only() {
        let signal_id = Uuid::new_v4();
        let cache = cache_with_one(2, signal_id);
        let ctx = CompactEncodingContext {
            include_time: false,
            ..Default::default()
        };

        let measurement = Measurement::new(signal_id, 1.0, 0);
        let mut out = Vec::new();
        encode(&mut out, &measurement, 2, 0, &ctx);
        assert_eq!(out.len(), FIXED_LENGTH);

        let (decoded, consumed) = decode(&out, &cache, &ctx).unwrap();
        assert_eq!(consumed, FIXED_LENGTH);
        assert_eq!(decoded.unwrap().timestamp, 0);
    }

    #[test]
    fn unknown_runtime_index_is_skipped_but_still_consumed() {
        let cache = SignalIndexCache::new();
        let ctx = CompactEncodingContext::default();
        let measurement = Measurement::new(Uuid::new_v4(), 1.0, 0);
        let mut out = Vec::new();
        encode(&mut out, &measurement, 99, 0, &ctx);

        let (decoded, consumed) = decode(&out, &cache, &ctx).unwrap();
        assert!(decoded.is_none());
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn truncated_buffer_is_an_insufficient_buffer_error() {
        let cache = SignalIndexCache::new();
        let ctx = CompactEncodingContext::default();
        let measurement = Measurement::new(Uuid::new_v4(), 1.0, 638_000_000_000_000_000);
        let mut out = Vec::new();
        encode(&mut out, &measurement, 99, 0, &ctx);
        out.truncate(out.len() - 1);

        let err = decode(&out, &cache, &ctx).unwrap_err();
        assert!(matches!(err, SttpError::InsufficientBuffer { .. }));
    }

    proptest::proptest! {
        #[test]
        fn full_timestamp_roundtrip_holds_for_any_value_and_tick(
            value in proptest::num::f32::ANY,
            timestamp in 0u64..i64::MAX as u64,
        ) {
            let signal_id = Uuid::new_v4();
            let cache = cache_with_one(4, signal_id);
            let ctx = CompactEncodingContext::default();
            let measurement = Measurement::new(signal_id, value as f64, timestamp);

            let mut out = Vec::new();
            encode(&mut out, &measurement, 4, 0, &ctx);
            let (decoded, consumed) = decode(&out, &cache, &ctx).unwrap();
            let decoded = decoded.unwrap();

            proptest::prop_assert_eq!(consumed, out.len());
            proptest::prop_assert_eq!(decoded.timestamp, timestamp);
            if !value.is_nan() {
                proptest::prop_assert_eq!(decoded.value as f32, value);
            }
        }

        #[test]
        fn base_time_offset_roundtrip_holds_within_u32_range(
            value in proptest::num::f32::ANY,
            offset in 0u32..u32::MAX,
        ) {
            let signal_id = Uuid::new_v4();
            let cache = cache_with_one(5, signal_id);
            let base = 638_000_000_000_000_000i64;
            let ctx = CompactEncodingContext {
                include_time: true,
                use_millisecond_resolution: false,
                base_time_offsets: [base, base],
            };
            let measurement = Measurement::new(signal_id, value as f64, base as u64 + offset as u64);

            let mut out = Vec::new();
            encode(&mut out, &measurement, 5, 0, &ctx);
            let (decoded, _) = decode(&out, &cache, &ctx).unwrap();

            proptest::prop_assert_eq!(decoded.unwrap().timestamp, measurement.timestamp);
        }
    }
}
