//! Data-packet encoding for the publication tick (C10): turns a batch of
//! polled measurements into a `DATAPACKET` payload, TSSC if the client
//! negotiated compression, compact otherwise. The tick loop itself lives in
//! `listener`, interleaved with command reads on the same per-client task
//! since both sides share one `FramedStream`.
//!
//! Every measurement is addressed on the wire by the runtime index the
//! active `SignalIndexCache` assigned it, looked up by signal ID, never by
//! its position within the polled batch: `MeasurementSource::poll` may
//! legitimately omit or reorder signals from one tick to the next.

use std::time::Duration;

use sttp_core::cache::SignalIndexCache;
use sttp_core::measurement_codec::{self, CompactEncodingContext};
use sttp_core::protocol::DataPacketFlags;
use sttp_core::tssc::Encoder as TsscEncoder;

pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs_f64(1.0);

pub fn encode_compact_packet(
    measurements: &[sttp_core::Measurement],
    cache: &SignalIndexCache,
    cache_slot: usize,
    time_index: usize,
    base_time_offsets: [i64; 2],
) -> Vec<u8> {
    let mut flags = DataPacketFlags::COMPACT;
    if cache_slot == 1 {
        flags = flags | DataPacketFlags::CACHE_INDEX;
    }

    let addressed: Vec<(i32, &sttp_core::Measurement)> = measurements
        .iter()
        .filter_map(|measurement| Some((cache.signal_index(measurement.signal_id)?, measurement)))
        .collect();

    let mut payload = Vec::new();
    payload.push(flags.0);
    sttp_core::wire::write_u32_be(&mut payload, addressed.len() as u32);

    let ctx = CompactEncodingContext {
        base_time_offsets,
        ..CompactEncodingContext::default()
    };
    for (runtime_index, measurement) in addressed {
        measurement_codec::encode(&mut payload, measurement, runtime_index, time_index, &ctx);
    }
    payload
}

pub fn encode_tssc_packet(
    measurements: &[sttp_core::Measurement],
    cache: &SignalIndexCache,
    cache_slot: usize,
    sequence_number: &mut u16,
) -> Vec<u8> {
    let mut flags = DataPacketFlags::COMPACT | DataPacketFlags::COMPRESSED;
    if cache_slot == 1 {
        flags = flags | DataPacketFlags::CACHE_INDEX;
    }

    let mut encoder = TsscEncoder::new();
    for measurement in measurements {
        let Some(point_id) = cache.signal_index(measurement.signal_id) else {
            continue;
        };
        let _ = encoder.encode(&sttp_core::tssc::TsscPoint {
            point_id,
            timestamp: measurement.timestamp as i64,
            state_flags: measurement.flags.0,
            value: measurement.value as f32,
        });
    }
    let encoded = encoder.finish();

    let mut payload = Vec::with_capacity(5 + encoded.len());
    payload.push(flags.0);
    sttp_core::wire::write_u16_be(&mut payload, 1);
    sttp_core::wire::write_u16_be(&mut payload, *sequence_number);
    payload.extend_from_slice(&encoded);

    *sequence_number = sequence_number.wrapping_add(1);
    payload
}
