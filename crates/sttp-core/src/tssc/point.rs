//! Per-point TSSC state: prior point-ID/state-flags/value rotation registers,
//! plus the adaptive prefix-mode selection shared by the encoder and decoder.

use super::bits::{BitReader, BitWriter};
use super::codes;
use crate::error::{Result, SttpError};

#[derive(Debug, Clone)]
pub struct PointMetadata {
    pub prev_next_point_id1: i32,
    pub prev_state_flags1: u32,
    pub prev_state_flags2: u32,
    pub prev_value1: u32,
    pub prev_value2: u32,
    pub prev_value3: u32,

    command_stats: [u32; 32],
    commands_since_last_change: i32,

    mode: u8,
    mode21: i32,
    mode31: i32,
    mode301: i32,
    mode41: i32,
    mode401: i32,
    mode4001: i32,
    startup_mode: i32,
}

impl Default for PointMetadata {
    fn default() -> Self {
        PointMetadata {
            prev_next_point_id1: 0,
            prev_state_flags1: 0,
            prev_state_flags2: 0,
            prev_value1: 0,
            prev_value2: 0,
            prev_value3: 0,
            command_stats: [0; 32],
            commands_since_last_change: 0,
            mode: 4,
            mode21: 0,
            mode31: 0,
            mode301: 0,
            mode41: codes::VALUE1,
            mode401: codes::VALUE2,
            mode4001: codes::VALUE3,
            startup_mode: 0,
        }
    }
}

impl PointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_code(&mut self, code: i32, writer: &mut BitWriter, out: &mut Vec<u8>) -> Result<()> {
        match self.mode {
            1 => writer.write_bits(code, 5, out),
            2 => {
                if code == self.mode21 {
                    writer.write_bits(1, 1, out);
                } else {
                    writer.write_bits(code, 6, out);
                }
            }
            3 => {
                if code == self.mode31 {
                    writer.write_bits(1, 1, out);
                } else if code == self.mode301 {
                    writer.write_bits(1, 2, out);
                } else {
                    writer.write_bits(code, 7, out);
                }
            }
            4 => {
                if code == self.mode41 {
                    writer.write_bits(1, 1, out);
                } else if code == self.mode401 {
                    writer.write_bits(1, 2, out);
                } else if code == self.mode4001 {
                    writer.write_bits(1, 3, out);
                } else {
                    writer.write_bits(code, 8, out);
                }
            }
            _ => return Err(SttpError::Protocol("TSSC coding error".into())),
        }
        self.update_code_statistics(code)
    }

    pub fn read_code(&mut self, reader: &mut BitReader, data: &[u8]) -> Result<i32> {
        let code = match self.mode {
            1 => reader.read_bits5(data)?,
            2 => {
                if reader.read_bit(data)? == 1 {
                    self.mode21
                } else {
                    reader.read_bits5(data)?
                }
            }
            3 => {
                if reader.read_bit(data)? == 1 {
                    self.mode31
                } else if reader.read_bit(data)? == 1 {
                    self.mode301
                } else {
                    reader.read_bits5(data)?
                }
            }
            4 => {
                if reader.read_bit(data)? == 1 {
                    self.mode41
                } else if reader.read_bit(data)? == 1 {
                    self.mode401
                } else if reader.read_bit(data)? == 1 {
                    self.mode4001
                } else {
                    reader.read_bits5(data)?
                }
            }
            _ => return Err(SttpError::Protocol("unsupported TSSC compression mode".into())),
        };

        self.update_code_statistics(code)?;
        Ok(code)
    }

    fn update_code_statistics(&mut self, code: i32) -> Result<()> {
        self.commands_since_last_change += 1;
        self.command_stats[code as usize] += 1;

        if self.startup_mode == 0 && self.commands_since_last_change > 5 {
            self.startup_mode += 1;
            return self.adapt_commands();
        }
        if self.startup_mode == 1 && self.commands_since_last_change > 20 {
            self.startup_mode += 1;
            return self.adapt_commands();
        }
        if self.startup_mode == 2 && self.commands_since_last_change > 100 {
            return self.adapt_commands();
        }
        Ok(())
    }

    fn adapt_commands(&mut self) -> Result<()> {
        let (mut code1, mut count1) = (0i32, 0i32);
        let (mut code2, mut count2) = (1i32, 0i32);
        let (mut code3, mut count3) = (2i32, 0i32);
        let mut total = 0i32;

        for (i, stat) in self.command_stats.iter_mut().enumerate() {
            let count = *stat as i32;
            *stat = 0;
            total += count;

            if count > count3 {
                if count > count1 {
                    code3 = code2;
                    count3 = count2;
                    code2 = code1;
                    count2 = count1;
                    code1 = i as i32;
                    count1 = count;
                } else if count > count2 {
                    code3 = code2;
                    count3 = count2;
                    code2 = i as i32;
                    count2 = count;
                } else {
                    code3 = i as i32;
                    count3 = count;
                }
            }
        }

        let mode1_size = total * 5;
        let mode2_size = count1 + (total - count1) * 6;
        let mode3_size = count1 + count2 * 2 + (total - count1 - count2) * 7;
        let mode4_size = count1 + count2 * 2 + count3 * 3 + (total - count1 - count2 - count3) * 8;

        let min_size = mode1_size.min(mode2_size).min(mode3_size).min(mode4_size);

        if min_size == mode1_size {
            self.mode = 1;
        } else if min_size == mode2_size {
            self.mode = 2;
            self.mode21 = code1;
        } else if min_size == mode3_size {
            self.mode = 3;
            self.mode31 = code1;
            self.mode301 = code2;
        } else {
            self.mode = 4;
            self.mode41 = code1;
            self.mode401 = code2;
            self.mode4001 = code3;
        }

        self.commands_since_last_change = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_code_roundtrips_across_adaptation_boundary() {
        let mut writer_point = PointMetadata::new();
        let mut reader_point = PointMetadata::new();
        let mut bitwriter = BitWriter::default();
        let mut bitreader = BitReader::default();
        let mut out = Vec::new();

        let codes_to_send = [
            codes::VALUE1,
            codes::VALUE1,
            codes::VALUE1,
            codes::VALUE1,
            codes::VALUE1,
            codes::VALUE1,
            codes::VALUE_ZERO,
            codes::VALUE2,
        ];

        for &code in &codes_to_send {
            writer_point.write_code(code, &mut bitwriter, &mut out).unwrap();
        }
        bitwriter.flush(&mut out);

        for &expected in &codes_to_send {
            let got = reader_point.read_code(&mut bitreader, &out).unwrap();
            assert_eq!(got, expected);
        }
    }
}
