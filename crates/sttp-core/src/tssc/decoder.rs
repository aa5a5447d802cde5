//! TSSC decoder: replays a bit/byte stream into a sequence of
//! `(pointId, timestamp, stateFlags, value)` tuples.

use super::bits::BitReader;
use super::codes;
use super::point::PointMetadata;
use super::TsscPoint;
use crate::error::{Result, SttpError};

pub struct Decoder {
    data: Vec<u8>,
    reader: BitReader,
    last_position: usize,

    prev_timestamp1: i64,
    prev_timestamp2: i64,
    prev_time_delta1: i64,
    prev_time_delta2: i64,
    prev_time_delta3: i64,
    prev_time_delta4: i64,

    last_point: PointMetadata,
    points: Vec<Option<PointMetadata>>,

    pub sequence_number: u16,
}

impl Decoder {
    pub fn new(max_signal_index: usize) -> Self {
        Decoder {
            data: Vec::new(),
            reader: BitReader::default(),
            last_position: 0,
            prev_timestamp1: 0,
            prev_timestamp2: 0,
            prev_time_delta1: i64::MAX,
            prev_time_delta2: i64::MAX,
            prev_time_delta3: i64::MAX,
            prev_time_delta4: i64::MAX,
            last_point: PointMetadata::new(),
            points: vec![None; max_signal_index],
            sequence_number: 0,
        }
    }

    /// Clears all per-point state. Called on the first packet after a
    /// subscribe/resubscribe reset barrier.
    pub fn reset(&mut self) {
        self.last_point = PointMetadata::new();
        self.points.iter_mut().for_each(|p| *p = None);
        self.prev_timestamp1 = 0;
        self.prev_timestamp2 = 0;
        self.prev_time_delta1 = i64::MAX;
        self.prev_time_delta2 = i64::MAX;
        self.prev_time_delta3 = i64::MAX;
        self.prev_time_delta4 = i64::MAX;
    }

    pub fn set_buffer(&mut self, data: Vec<u8>) {
        self.last_position = data.len();
        self.data = data;
        self.reader.reset();
    }

    pub fn try_get_measurement(&mut self) -> Result<Option<TsscPoint>> {
        if self.reader.position == self.last_position || self.reader.bitstream_is_empty() {
            self.reader.clear_bitstream();
            return Ok(None);
        }

        let mut code = self.last_point.read_code(&mut self.reader, &self.data)?;

        if code == codes::END_OF_STREAM {
            self.reader.clear_bitstream();
            return Ok(None);
        }

        if code > codes::POINT_ID_XOR32 {
            return Err(SttpError::Decode(format!(
                "invalid code {code} received while expecting a point-ID code"
            )));
        }

        self.decode_point_id(code)?;
        code = self.last_point.read_code(&mut self.reader, &self.data)?;

        if code < codes::TIME_DELTA1_FORWARD {
            return Err(SttpError::Decode(format!(
                "expecting code >= {} at position {} with last position {}",
                codes::TIME_DELTA1_FORWARD,
                self.reader.position,
                self.last_position
            )));
        }

        let point_id = self.last_point.prev_next_point_id1;
        let point_index = point_id as usize;
        if point_index >= self.points.len() {
            self.points.resize(point_index + 1, None);
        }
        let mut next_point = self.points[point_index].take().unwrap_or_default();
        next_point.prev_next_point_id1 = point_id + 1;

        let timestamp;
        if code <= codes::TIME_XOR_7BIT {
            timestamp = self.decode_timestamp(code)?;
            code = self.last_point.read_code(&mut self.reader, &self.data)?;

            if code < codes::STATE_FLAGS2 {
                return Err(SttpError::Decode(format!(
                    "expecting code >= {} at position {} with last position {}",
                    codes::STATE_FLAGS2,
                    self.reader.position,
                    self.last_position
                )));
            }
        } else {
            timestamp = self.prev_timestamp1;
        }

        let state_flags;
        if code <= codes::STATE_FLAGS_7BIT32 {
            state_flags = self.decode_state_flags(code, &mut next_point)?;
            code = self.last_point.read_code(&mut self.reader, &self.data)?;

            if code < codes::VALUE1 {
                return Err(SttpError::Decode(format!(
                    "expecting code >= {} at position {} with last position {}",
                    codes::VALUE1,
                    self.reader.position,
                    self.last_position
                )));
            }
        } else {
            state_flags = self.last_point.prev_state_flags1;
        }

        let value_raw = self.decode_value(code, &mut next_point)?;
        let value = f32::from_bits(value_raw);

        self.points[point_index] = Some(next_point.clone());
        self.last_point = next_point;

        Ok(Some(TsscPoint {
            point_id,
            timestamp,
            state_flags,
            value,
        }))
    }

    fn decode_point_id(&mut self, code: i32) -> Result<()> {
        let data = &self.data;
        let prev = self.last_point.prev_next_point_id1;
        self.last_point.prev_next_point_id1 = match code {
            codes::POINT_ID_XOR4 => self.reader.read_bits4(data)? ^ prev,
            codes::POINT_ID_XOR8 => self.reader.read_byte(data)? as i32 ^ prev,
            codes::POINT_ID_XOR12 => {
                let low = self.reader.read_bits4(data)?;
                let high = self.reader.read_byte(data)? as i32;
                (low ^ (high << 4)) ^ prev
            }
            codes::POINT_ID_XOR16 => {
                let b0 = self.reader.read_byte(data)? as i32;
                let b1 = self.reader.read_byte(data)? as i32;
                (b0 ^ (b1 << 8)) ^ prev
            }
            codes::POINT_ID_XOR20 => {
                let low = self.reader.read_bits4(data)?;
                let b0 = self.reader.read_byte(data)? as i32;
                let b1 = self.reader.read_byte(data)? as i32;
                (low ^ (b0 << 4) ^ (b1 << 12)) ^ prev
            }
            codes::POINT_ID_XOR24 => {
                let b0 = self.reader.read_byte(data)? as i32;
                let b1 = self.reader.read_byte(data)? as i32;
                let b2 = self.reader.read_byte(data)? as i32;
                (b0 ^ (b1 << 8) ^ (b2 << 16)) ^ prev
            }
            codes::POINT_ID_XOR32 => {
                let b0 = self.reader.read_byte(data)? as i32;
                let b1 = self.reader.read_byte(data)? as i32;
                let b2 = self.reader.read_byte(data)? as i32;
                let b3 = self.reader.read_byte(data)? as i32;
                (b0 ^ (b1 << 8) ^ (b2 << 16) ^ (b3 << 24)) ^ prev
            }
            _ => {
                return Err(SttpError::Decode(format!(
                    "invalid point-ID code {code} at position {}",
                    self.reader.position
                )))
            }
        };
        Ok(())
    }

    fn decode_timestamp(&mut self, code: i32) -> Result<i64> {
        let timestamp = match code {
            codes::TIME_DELTA1_FORWARD => self.prev_timestamp1 + self.prev_time_delta1,
            codes::TIME_DELTA2_FORWARD => self.prev_timestamp1 + self.prev_time_delta2,
            codes::TIME_DELTA3_FORWARD => self.prev_timestamp1 + self.prev_time_delta3,
            codes::TIME_DELTA4_FORWARD => self.prev_timestamp1 + self.prev_time_delta4,
            codes::TIME_DELTA1_REVERSE => self.prev_timestamp1 - self.prev_time_delta1,
            codes::TIME_DELTA2_REVERSE => self.prev_timestamp1 - self.prev_time_delta2,
            codes::TIME_DELTA3_REVERSE => self.prev_timestamp1 - self.prev_time_delta3,
            codes::TIME_DELTA4_REVERSE => self.prev_timestamp1 - self.prev_time_delta4,
            codes::TIMESTAMP2 => self.prev_timestamp2,
            _ => {
                let value = self.reader.read_7bit_u64(&self.data)?;
                self.prev_timestamp1 ^ value as i64
            }
        };

        let min_delta = (self.prev_timestamp1 - timestamp).abs();
        if min_delta < self.prev_time_delta4
            && min_delta != self.prev_time_delta1
            && min_delta != self.prev_time_delta2
            && min_delta != self.prev_time_delta3
        {
            if min_delta < self.prev_time_delta1 {
                self.prev_time_delta4 = self.prev_time_delta3;
                self.prev_time_delta3 = self.prev_time_delta2;
                self.prev_time_delta2 = self.prev_time_delta1;
                self.prev_time_delta1 = min_delta;
            } else if min_delta < self.prev_time_delta2 {
                self.prev_time_delta4 = self.prev_time_delta3;
                self.prev_time_delta3 = self.prev_time_delta2;
                self.prev_time_delta2 = min_delta;
            } else if min_delta < self.prev_time_delta3 {
                self.prev_time_delta4 = self.prev_time_delta3;
                self.prev_time_delta3 = min_delta;
            } else {
                self.prev_time_delta4 = min_delta;
            }
        }

        self.prev_timestamp2 = self.prev_timestamp1;
        self.prev_timestamp1 = timestamp;

        Ok(timestamp)
    }

    fn decode_state_flags(&mut self, code: i32, next_point: &mut PointMetadata) -> Result<u32> {
        let state_flags = if code == codes::STATE_FLAGS2 {
            next_point.prev_state_flags2
        } else {
            self.reader.read_7bit_u32(&self.data)?
        };

        next_point.prev_state_flags2 = next_point.prev_state_flags1;
        next_point.prev_state_flags1 = state_flags;

        Ok(state_flags)
    }

    fn decode_value(&mut self, code: i32, next_point: &mut PointMetadata) -> Result<u32> {
        let data = &self.data;
        let value_raw = match code {
            codes::VALUE1 => next_point.prev_value1,
            codes::VALUE2 => {
                let v = next_point.prev_value2;
                next_point.prev_value2 = next_point.prev_value1;
                next_point.prev_value1 = v;
                v
            }
            codes::VALUE3 => {
                let v = next_point.prev_value3;
                next_point.prev_value3 = next_point.prev_value2;
                next_point.prev_value2 = next_point.prev_value1;
                next_point.prev_value1 = v;
                v
            }
            codes::VALUE_ZERO => {
                next_point.prev_value3 = next_point.prev_value2;
                next_point.prev_value2 = next_point.prev_value1;
                next_point.prev_value1 = 0;
                0
            }
            _ => {
                let v = match code {
                    codes::VALUE_XOR4 => self.reader.read_bits4(data)? as u32 ^ next_point.prev_value1,
                    codes::VALUE_XOR8 => self.reader.read_byte(data)? as u32 ^ next_point.prev_value1,
                    codes::VALUE_XOR12 => {
                        let low = self.reader.read_bits4(data)? as u32;
                        let high = self.reader.read_byte(data)? as u32;
                        (low ^ (high << 4)) ^ next_point.prev_value1
                    }
                    codes::VALUE_XOR16 => {
                        let b0 = self.reader.read_byte(data)? as u32;
                        let b1 = self.reader.read_byte(data)? as u32;
                        (b0 ^ (b1 << 8)) ^ next_point.prev_value1
                    }
                    codes::VALUE_XOR20 => {
                        let low = self.reader.read_bits4(data)? as u32;
                        let b0 = self.reader.read_byte(data)? as u32;
                        let b1 = self.reader.read_byte(data)? as u32;
                        (low ^ (b0 << 4) ^ (b1 << 12)) ^ next_point.prev_value1
                    }
                    codes::VALUE_XOR24 => {
                        let b0 = self.reader.read_byte(data)? as u32;
                        let b1 = self.reader.read_byte(data)? as u32;
                        let b2 = self.reader.read_byte(data)? as u32;
                        (b0 ^ (b1 << 8) ^ (b2 << 16)) ^ next_point.prev_value1
                    }
                    codes::VALUE_XOR28 => {
                        let low = self.reader.read_bits4(data)? as u32;
                        let b0 = self.reader.read_byte(data)? as u32;
                        let b1 = self.reader.read_byte(data)? as u32;
                        let b2 = self.reader.read_byte(data)? as u32;
                        (low ^ (b0 << 4) ^ (b1 << 12) ^ (b2 << 20)) ^ next_point.prev_value1
                    }
                    codes::VALUE_XOR32 => {
                        let b0 = self.reader.read_byte(data)? as u32;
                        let b1 = self.reader.read_byte(data)? as u32;
                        let b2 = self.reader.read_byte(data)? as u32;
                        let b3 = self.reader.read_byte(data)? as u32;
                        (b0 ^ (b1 << 8) ^ (b2 << 16) ^ (b3 << 24)) ^ next_point.prev_value1
                    }
                    _ => {
                        return Err(SttpError::Decode(format!(
                            "invalid value code {code} at position {}",
                            self.reader.position
                        )))
                    }
                };
                next_point.prev_value3 = next_point.prev_value2;
                next_point.prev_value2 = next_point.prev_value1;
                next_point.prev_value1 = v;
                v
            }
        };
        Ok(value_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::super::encoder::Encoder;
    use super::*;

    #[test]
    fn decodes_stream_produced_by_encoder() {
        let mut encoder = Encoder::new();
        let points = [
            TsscPoint { point_id: 1, timestamp: 638_000_000_000_000_000, state_flags: 0, value: 60.0 },
            TsscPoint { point_id: 1, timestamp: 638_000_000_000_300_000, state_flags: 0, value: 60.01 },
            TsscPoint { point_id: 2, timestamp: 638_000_000_000_300_000, state_flags: 0, value: 59.98 },
            TsscPoint { point_id: 1, timestamp: 638_000_000_000_600_000, state_flags: 0, value: 60.0 },
        ];
        for p in &points {
            encoder.encode(p).unwrap();
        }
        let buf = encoder.finish();

        let mut decoder = Decoder::new(8);
        decoder.set_buffer(buf);

        let mut decoded = Vec::new();
        while let Some(point) = decoder.try_get_measurement().unwrap() {
            decoded.push(point);
        }

        assert_eq!(decoded, points);
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_point_sequences_roundtrip(
            deltas in proptest::collection::vec(0i64..5_000_000, 1..40),
            point_ids in proptest::collection::vec(0i32..4, 1..40),
            values in proptest::collection::vec(proptest::num::f32::ANY, 1..40),
            flags in proptest::collection::vec(0u32..8, 1..40),
        ) {
            let len = deltas.len().min(point_ids.len()).min(values.len()).min(flags.len());
            let mut timestamp = 638_000_000_000_000_000i64;
            let mut points = Vec::with_capacity(len);
            for i in 0..len {
                timestamp += deltas[i];
                points.push(TsscPoint {
                    point_id: point_ids[i],
                    timestamp,
                    state_flags: flags[i],
                    value: values[i],
                });
            }

            let mut encoder = Encoder::new();
            for p in &points {
                encoder.encode(p).unwrap();
            }
            let buf = encoder.finish();

            let mut decoder = Decoder::new(8);
            decoder.set_buffer(buf);

            let mut decoded = Vec::new();
            while let Some(point) = decoder.try_get_measurement().unwrap() {
                decoded.push(point);
            }

            proptest::prop_assert_eq!(decoded.len(), points.len());
            for (expected, actual) in points.iter().zip(decoded.iter()) {
                proptest::prop_assert_eq!(expected.point_id, actual.point_id);
                proptest::prop_assert_eq!(expected.timestamp, actual.timestamp);
                proptest::prop_assert_eq!(expected.state_flags, actual.state_flags);
                if expected.value.is_nan() {
                    proptest::prop_assert!(actual.value.is_nan());
                } else {
                    proptest::prop_assert_eq!(expected.value, actual.value);
                }
            }
        }
    }
}
