//! TSSC encoder: the inverse of `Decoder`, producing a bit/byte stream a
//! `Decoder` with matching per-point state will replay back losslessly.
//!
//! The reference implementation this workspace is grounded on only ships a
//! decoder (its subscriber never publishes TSSC-compressed data); this
//! encoder is built by mirroring each of `Decoder`'s code/value choices in
//! reverse, reusing `PointMetadata`'s shared adaptive mode logic so the two
//! sides stay bit-compatible.

use super::bits::BitWriter;
use super::codes;
use super::point::PointMetadata;
use super::TsscPoint;
use crate::error::Result;

pub struct Encoder {
    out: Vec<u8>,
    writer: BitWriter,

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

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Encoder {
            out: Vec::new(),
            writer: BitWriter::default(),
            prev_timestamp1: 0,
            prev_timestamp2: 0,
            prev_time_delta1: i64::MAX,
            prev_time_delta2: i64::MAX,
            prev_time_delta3: i64::MAX,
            prev_time_delta4: i64::MAX,
            last_point: PointMetadata::new(),
            points: Vec::new(),
            sequence_number: 0,
        }
    }

    pub fn reset(&mut self) {
        self.last_point = PointMetadata::new();
        self.points.clear();
        self.prev_timestamp1 = 0;
        self.prev_timestamp2 = 0;
        self.prev_time_delta1 = i64::MAX;
        self.prev_time_delta2 = i64::MAX;
        self.prev_time_delta3 = i64::MAX;
        self.prev_time_delta4 = i64::MAX;
    }

    pub fn encode(&mut self, point: &TsscPoint) -> Result<()> {
        let point_index = point.point_id as usize;
        if point_index >= self.points.len() {
            self.points.resize(point_index + 1, None);
        }
        let mut next_point = self.points[point_index].take().unwrap_or_default();

        let point_id_code = self.encode_point_id(point.point_id, &mut next_point);
        self.last_point.write_code(point_id_code, &mut self.writer, &mut self.out)?;
        next_point.prev_next_point_id1 = point.point_id + 1;

        let time_code = self.encode_timestamp(point.timestamp);
        self.last_point.write_code(time_code, &mut self.writer, &mut self.out)?;

        let flags_code = self.encode_state_flags(point.state_flags, &mut next_point);
        self.last_point.write_code(flags_code, &mut self.writer, &mut self.out)?;

        let value_code = self.encode_value(point.value.to_bits(), &mut next_point);
        self.last_point.write_code(value_code, &mut self.writer, &mut self.out)?;

        self.points[point_index] = Some(next_point.clone());
        self.last_point = next_point;

        Ok(())
    }

    /// Flushes the bit cache and appends the end-of-stream marker, returning
    /// the completed packet payload.
    pub fn finish(mut self) -> Vec<u8> {
        let _ = self
            .last_point
            .write_code(codes::END_OF_STREAM, &mut self.writer, &mut self.out);
        self.writer.flush(&mut self.out);
        self.out
    }

    fn encode_point_id(&mut self, point_id: i32, _next_point: &mut PointMetadata) -> i32 {
        let prev = self.last_point.prev_next_point_id1;
        let xor = point_id ^ prev;
        let bits_needed = 32 - xor.leading_zeros();

        let code = if bits_needed <= 4 {
            codes::POINT_ID_XOR4
        } else if bits_needed <= 8 {
            codes::POINT_ID_XOR8
        } else if bits_needed <= 12 {
            codes::POINT_ID_XOR12
        } else if bits_needed <= 16 {
            codes::POINT_ID_XOR16
        } else if bits_needed <= 20 {
            codes::POINT_ID_XOR20
        } else if bits_needed <= 24 {
            codes::POINT_ID_XOR24
        } else {
            codes::POINT_ID_XOR32
        };

        self.write_point_id_payload(code, xor);
        code
    }

    fn write_point_id_payload(&mut self, code: i32, xor: i32) {
        match code {
            codes::POINT_ID_XOR4 => self.writer.write_bits(xor, 4, &mut self.out),
            codes::POINT_ID_XOR8 => self.writer.write_byte(xor as u8, &mut self.out),
            codes::POINT_ID_XOR12 => {
                self.writer.write_bits(xor & 0xF, 4, &mut self.out);
                self.writer.write_byte((xor >> 4) as u8, &mut self.out);
            }
            codes::POINT_ID_XOR16 => {
                self.writer.write_byte(xor as u8, &mut self.out);
                self.writer.write_byte((xor >> 8) as u8, &mut self.out);
            }
            codes::POINT_ID_XOR20 => {
                self.writer.write_bits(xor & 0xF, 4, &mut self.out);
                self.writer.write_byte((xor >> 4) as u8, &mut self.out);
                self.writer.write_byte((xor >> 12) as u8, &mut self.out);
            }
            codes::POINT_ID_XOR24 => {
                self.writer.write_byte(xor as u8, &mut self.out);
                self.writer.write_byte((xor >> 8) as u8, &mut self.out);
                self.writer.write_byte((xor >> 16) as u8, &mut self.out);
            }
            codes::POINT_ID_XOR32 => {
                self.writer.write_byte(xor as u8, &mut self.out);
                self.writer.write_byte((xor >> 8) as u8, &mut self.out);
                self.writer.write_byte((xor >> 16) as u8, &mut self.out);
                self.writer.write_byte((xor >> 24) as u8, &mut self.out);
            }
            _ => unreachable!(),
        }
    }

    fn encode_timestamp(&mut self, timestamp: i64) -> i32 {
        let code = if timestamp == self.prev_timestamp2 {
            codes::TIMESTAMP2
        } else {
            let diff = timestamp - self.prev_timestamp1;
            let abs_diff = diff.abs();
            if abs_diff == self.prev_time_delta1 {
                if diff >= 0 { codes::TIME_DELTA1_FORWARD } else { codes::TIME_DELTA1_REVERSE }
            } else if abs_diff == self.prev_time_delta2 {
                if diff >= 0 { codes::TIME_DELTA2_FORWARD } else { codes::TIME_DELTA2_REVERSE }
            } else if abs_diff == self.prev_time_delta3 {
                if diff >= 0 { codes::TIME_DELTA3_FORWARD } else { codes::TIME_DELTA3_REVERSE }
            } else if abs_diff == self.prev_time_delta4 {
                if diff >= 0 { codes::TIME_DELTA4_FORWARD } else { codes::TIME_DELTA4_REVERSE }
            } else {
                codes::TIME_XOR_7BIT
            }
        };

        if code == codes::TIME_XOR_7BIT {
            let xor = (self.prev_timestamp1 ^ timestamp) as u64;
            self.writer.write_7bit_u64(xor, &mut self.out);
        }

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

        code
    }

    fn encode_state_flags(&mut self, flags: u32, next_point: &mut PointMetadata) -> i32 {
        let code = if flags == next_point.prev_state_flags2 {
            codes::STATE_FLAGS2
        } else {
            self.writer.write_7bit_u32(flags, &mut self.out);
            codes::STATE_FLAGS_7BIT32
        };

        next_point.prev_state_flags2 = next_point.prev_state_flags1;
        next_point.prev_state_flags1 = flags;

        code
    }

    fn encode_value(&mut self, value_raw: u32, next_point: &mut PointMetadata) -> i32 {
        if value_raw == next_point.prev_value1 {
            return codes::VALUE1;
        }
        if value_raw == next_point.prev_value2 {
            next_point.prev_value2 = next_point.prev_value1;
            next_point.prev_value1 = value_raw;
            return codes::VALUE2;
        }
        if value_raw == next_point.prev_value3 {
            next_point.prev_value3 = next_point.prev_value2;
            next_point.prev_value2 = next_point.prev_value1;
            next_point.prev_value1 = value_raw;
            return codes::VALUE3;
        }
        if value_raw == 0 {
            next_point.prev_value3 = next_point.prev_value2;
            next_point.prev_value2 = next_point.prev_value1;
            next_point.prev_value1 = 0;
            return codes::VALUE_ZERO;
        }

        let xor = value_raw ^ next_point.prev_value1;
        let bits_needed = 32 - xor.leading_zeros();

        let code = if bits_needed <= 4 {
            codes::VALUE_XOR4
        } else if bits_needed <= 8 {
            codes::VALUE_XOR8
        } else if bits_needed <= 12 {
            codes::VALUE_XOR12
        } else if bits_needed <= 16 {
            codes::VALUE_XOR16
        } else if bits_needed <= 20 {
            codes::VALUE_XOR20
        } else if bits_needed <= 24 {
            codes::VALUE_XOR24
        } else if bits_needed <= 28 {
            codes::VALUE_XOR28
        } else {
            codes::VALUE_XOR32
        };

        self.write_value_payload(code, xor);

        next_point.prev_value3 = next_point.prev_value2;
        next_point.prev_value2 = next_point.prev_value1;
        next_point.prev_value1 = value_raw;

        code
    }

    fn write_value_payload(&mut self, code: i32, xor: u32) {
        match code {
            codes::VALUE_XOR4 => self.writer.write_bits(xor as i32, 4, &mut self.out),
            codes::VALUE_XOR8 => self.writer.write_byte(xor as u8, &mut self.out),
            codes::VALUE_XOR12 => {
                self.writer.write_bits((xor & 0xF) as i32, 4, &mut self.out);
                self.writer.write_byte((xor >> 4) as u8, &mut self.out);
            }
            codes::VALUE_XOR16 => {
                self.writer.write_byte(xor as u8, &mut self.out);
                self.writer.write_byte((xor >> 8) as u8, &mut self.out);
            }
            codes::VALUE_XOR20 => {
                self.writer.write_bits((xor & 0xF) as i32, 4, &mut self.out);
                self.writer.write_byte((xor >> 4) as u8, &mut self.out);
                self.writer.write_byte((xor >> 12) as u8, &mut self.out);
            }
            codes::VALUE_XOR24 => {
                self.writer.write_byte(xor as u8, &mut self.out);
                self.writer.write_byte((xor >> 8) as u8, &mut self.out);
                self.writer.write_byte((xor >> 16) as u8, &mut self.out);
            }
            codes::VALUE_XOR28 => {
                self.writer.write_bits((xor & 0xF) as i32, 4, &mut self.out);
                self.writer.write_byte((xor >> 4) as u8, &mut self.out);
                self.writer.write_byte((xor >> 12) as u8, &mut self.out);
                self.writer.write_byte((xor >> 20) as u8, &mut self.out);
            }
            codes::VALUE_XOR32 => {
                self.writer.write_byte(xor as u8, &mut self.out);
                self.writer.write_byte((xor >> 8) as u8, &mut self.out);
                self.writer.write_byte((xor >> 16) as u8, &mut self.out);
                self.writer.write_byte((xor >> 24) as u8, &mut self.out);
            }
            _ => unreachable!(),
        }
    }
}
