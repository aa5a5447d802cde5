//! Maps 32-bit per-session runtime signal indexes to 128-bit globally unique
//! signal IDs, with a reverse lookup and the human-readable source/numeric-ID
//! pair the original measurement key carried.
//!
//! A publisher sends a fresh cache on `UPDATESIGNALINDEXCACHE`; the session
//! layer holds two generations (even/odd) and swaps between them as
//! `CACHEINDEX` toggles on incoming data packets, so a cache here is treated
//! as an immutable snapshot once decoded.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{Result, SttpError};
use crate::wire;

#[derive(Debug, Clone)]
struct SignalRecord {
    signal_id: Uuid,
    source: String,
    numeric_id: u64,
}

/// A decoded snapshot of one publisher-assigned signal index cache.
#[derive(Debug, Clone, Default)]
pub struct SignalIndexCache {
    reference: HashMap<i32, u32>,
    records: Vec<SignalRecord>,
    signal_id_index: HashMap<Uuid, i32>,
    binary_length: u32,
}

impl SignalIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record, updating the forward and reverse index maps and the
    /// running binary-length estimate.
    pub fn add(&mut self, signal_index: i32, signal_id: Uuid, source: String, numeric_id: u64) {
        self.add_record(signal_index, signal_id, source, numeric_id);
    }

    fn add_record(&mut self, signal_index: i32, signal_id: Uuid, source: String, numeric_id: u64) {
        let index = self.records.len() as u32;
        self.reference.insert(signal_index, index);
        self.binary_length += 32 + source.len() as u32;
        self.signal_id_index.insert(signal_id, signal_index);
        self.records.push(SignalRecord {
            signal_id,
            source,
            numeric_id,
        });
    }

    pub fn contains(&self, signal_index: i32) -> bool {
        self.reference.contains_key(&signal_index)
    }

    pub fn signal_id(&self, signal_index: i32) -> Option<Uuid> {
        self.reference
            .get(&signal_index)
            .map(|&i| self.records[i as usize].signal_id)
    }

    pub fn source(&self, signal_index: i32) -> Option<&str> {
        self.reference
            .get(&signal_index)
            .map(|&i| self.records[i as usize].source.as_str())
    }

    pub fn numeric_id(&self, signal_index: i32) -> Option<u64> {
        self.reference
            .get(&signal_index)
            .map(|&i| self.records[i as usize].numeric_id)
    }

    /// Returns `(signal_id, source, numeric_id)` for a runtime index.
    pub fn record(&self, signal_index: i32) -> Option<(Uuid, &str, u64)> {
        self.reference.get(&signal_index).map(|&i| {
            let record = &self.records[i as usize];
            (record.signal_id, record.source.as_str(), record.numeric_id)
        })
    }

    /// Reverse lookup: the runtime index assigned to a signal ID, if present.
    pub fn signal_index(&self, signal_id: Uuid) -> Option<i32> {
        self.signal_id_index.get(&signal_id).copied()
    }

    pub fn signal_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.records.iter().map(|r| r.signal_id)
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Rough byte-size estimate of the wire encoding, tracked incrementally
    /// as records are added rather than recomputed on demand.
    pub fn binary_length(&self) -> u32 {
        self.binary_length
    }

    /// Parses a `SignalIndexCache` from an `UPDATESIGNALINDEXCACHE` payload,
    /// returning the subscriber ID that prefixes the buffer.
    pub fn decode(buffer: &[u8]) -> Result<(Uuid, SignalIndexCache)> {
        if buffer.len() < 4 {
            return Err(SttpError::Decode(
                "signal index cache buffer shorter than length prefix".into(),
            ));
        }

        let binary_length = wire::read_u32_be(buffer)? as usize;
        let mut offset = 4;

        if buffer.len() < binary_length {
            return Err(SttpError::Decode(
                "signal index cache buffer shorter than declared length".into(),
            ));
        }

        if buffer.len() < offset + 16 {
            return Err(SttpError::Decode("truncated subscriber id".into()));
        }
        let subscriber_id = Uuid::from_slice(&buffer[offset..offset + 16])
            .map_err(|e| SttpError::Decode(format!("invalid subscriber id: {e}")))?;
        offset += 16;

        let reference_count = wire::read_u32_be(&buffer[offset..])?;
        offset += 4;

        let mut cache = SignalIndexCache::new();

        for _ in 0..reference_count {
            let signal_index = wire::read_u32_be(&buffer[offset..])? as i32;
            offset += 4;

            if buffer.len() < offset + 16 {
                return Err(SttpError::Decode("truncated signal id".into()));
            }
            let signal_id = Uuid::from_slice(&buffer[offset..offset + 16])
                .map_err(|e| SttpError::Decode(format!("invalid signal id: {e}")))?;
            offset += 16;

            let source_size = wire::read_u32_be(&buffer[offset..])? as usize;
            offset += 4;

            if buffer.len() < offset + source_size {
                return Err(SttpError::Decode("truncated source string".into()));
            }
            let source = std::str::from_utf8(&buffer[offset..offset + source_size])
                .map_err(|e| SttpError::Decode(format!("invalid utf-8 source: {e}")))?
                .to_string();
            offset += source_size;

            let numeric_id = wire::read_u64_be(&buffer[offset..])?;
            offset += 8;

            cache.add_record(signal_index, signal_id, source, numeric_id);
        }

        Ok((subscriber_id, cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_buffer(subscriber_id: Uuid, entries: &[(i32, Uuid, &str, u64)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(subscriber_id.as_bytes());
        wire::write_u32_be(&mut body, entries.len() as u32);
        for (signal_index, signal_id, source, numeric_id) in entries {
            wire::write_u32_be(&mut body, *signal_index as u32);
            body.extend_from_slice(signal_id.as_bytes());
            wire::write_u32_be(&mut body, source.len() as u32);
            body.extend_from_slice(source.as_bytes());
            wire::write_u64_be(&mut body, *numeric_id);
        }

        let mut out = Vec::new();
        wire::write_u32_be(&mut out, body.len() as u32);
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn decodes_records_and_supports_forward_and_reverse_lookup() {
        let subscriber_id = Uuid::new_v4();
        let signal_id = Uuid::new_v4();
        let buf = sample_buffer(subscriber_id, &[(7, signal_id, "PPA:1", 42)]);

        let (decoded_subscriber, cache) = SignalIndexCache::decode(&buf).unwrap();
        assert_eq!(decoded_subscriber, subscriber_id);
        assert!(cache.contains(7));
        assert_eq!(cache.signal_id(7), Some(signal_id));
        assert_eq!(cache.source(7), Some("PPA:1"));
        assert_eq!(cache.numeric_id(7), Some(42));
        assert_eq!(cache.signal_index(signal_id), Some(7));
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn missing_index_returns_none() {
        let cache = SignalIndexCache::new();
        assert!(!cache.contains(3));
        assert_eq!(cache.signal_id(3), None);
        assert_eq!(cache.record(3), None);
    }

    #[test]
    fn truncated_buffer_is_a_decode_error() {
        let err = SignalIndexCache::decode(&[0, 0, 0, 10]).unwrap_err();
        assert!(matches!(err, SttpError::Decode(_)));
    }
}
