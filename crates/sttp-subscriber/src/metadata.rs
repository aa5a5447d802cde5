//! Per-signal record registry (C9): tracks the source/numeric-ID pair each
//! signal-index-cache entry carried and the linear adjustment a consumer may
//! apply to raw measurement values.

use std::collections::HashMap;

use sttp_core::Measurement;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalAdjustment {
    pub adder: f64,
    pub multiplier: f64,
}

impl SignalAdjustment {
    pub fn identity() -> Self {
        SignalAdjustment {
            adder: 0.0,
            multiplier: 1.0,
        }
    }
}

impl Default for SignalAdjustment {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug, Clone)]
pub struct SignalRegistryEntry {
    pub source: String,
    pub numeric_id: u64,
    pub adjustment: SignalAdjustment,
}

#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entries: HashMap<Uuid, SignalRegistryEntry>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called as each signal-index-cache record is seen; leaves an existing
    /// entry's adjustment untouched so `set_adjustment` calls survive a
    /// cache-generation rotation.
    pub fn observe(&mut self, signal_id: Uuid, source: &str, numeric_id: u64) {
        self.entries
            .entry(signal_id)
            .and_modify(|entry| {
                entry.source = source.to_string();
                entry.numeric_id = numeric_id;
            })
            .or_insert_with(|| SignalRegistryEntry {
                source: source.to_string(),
                numeric_id,
                adjustment: SignalAdjustment::identity(),
            });
    }

    pub fn lookup(&self, signal_id: Uuid) -> Option<&SignalRegistryEntry> {
        self.entries.get(&signal_id)
    }

    pub fn set_adjustment(&mut self, signal_id: Uuid, adjustment: SignalAdjustment) {
        if let Some(entry) = self.entries.get_mut(&signal_id) {
            entry.adjustment = adjustment;
        }
    }

    pub fn adjusted_value(&self, measurement: &Measurement) -> f64 {
        match self.entries.get(&measurement.signal_id) {
            Some(entry) => measurement.value * entry.adjustment.multiplier + entry.adjustment.adder,
            None => measurement.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_signal_adjusts_as_identity() {
        let registry = MetadataRegistry::new();
        let measurement = Measurement::new(Uuid::new_v4(), 60.0, 0);
        assert_eq!(registry.adjusted_value(&measurement), 60.0);
    }

    #[test]
    fn adjustment_applies_linear_correction() {
        let mut registry = MetadataRegistry::new();
        let signal_id = Uuid::new_v4();
        registry.observe(signal_id, "PMU:1", 7);
        registry.set_adjustment(
            signal_id,
            SignalAdjustment {
                adder: 1.0,
                multiplier: 2.0,
            },
        );

        let measurement = Measurement::new(signal_id, 10.0, 0);
        assert_eq!(registry.adjusted_value(&measurement), 21.0);
    }

    #[test]
    fn re_observing_a_signal_keeps_its_adjustment() {
        let mut registry = MetadataRegistry::new();
        let signal_id = Uuid::new_v4();
        registry.observe(signal_id, "PMU:1", 7);
        registry.set_adjustment(
            signal_id,
            SignalAdjustment {
                adder: 0.0,
                multiplier: 2.0,
            },
        );
        registry.observe(signal_id, "PMU:1", 7);

        assert_eq!(registry.lookup(signal_id).unwrap().adjustment.multiplier, 2.0);
    }
}
