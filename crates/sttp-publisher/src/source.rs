//! The boundary between this crate and whatever owns the actual
//! measurement feed (spec.md §4.10: "measurements presented to the
//! publisher are filtered through the metadata dataset using the
//! subscriber's filter expression before the first cache is built").

use async_trait::async_trait;
use sttp_core::Measurement;
use uuid::Uuid;

/// One signal-index-cache record as the source's metadata dataset knows it.
#[derive(Debug, Clone)]
pub struct SignalDescriptor {
    pub signal_id: Uuid,
    pub source: String,
    pub numeric_id: u64,
}

/// Supplied by the embedding application; a `sttp-publisher::Listener`
/// never generates measurements itself.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Evaluates a subscriber's filter expression against the dataset and
    /// returns the signals it selects, in a stable order (this order
    /// becomes the signal-index cache's runtime indices).
    async fn resolve_filter(&self, filter_expression: &str) -> Vec<SignalDescriptor>;

    /// Returns the current values for exactly the given signal IDs, called
    /// once per publication tick. Signals with no current value are simply
    /// omitted from the result.
    async fn poll(&self, signal_ids: &[Uuid]) -> Vec<Measurement>;
}

/// A fixed, never-changing set of measurements. Useful for tests and for
/// embedding applications that only have a handful of static signals.
pub struct StaticSource {
    descriptors: Vec<SignalDescriptor>,
    values: parking_lot::RwLock<std::collections::HashMap<Uuid, Measurement>>,
}

impl StaticSource {
    pub fn new(descriptors: Vec<SignalDescriptor>) -> Self {
        StaticSource {
            descriptors,
            values: parking_lot::RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub fn set_value(&self, measurement: Measurement) {
        self.values.write().insert(measurement.signal_id, measurement);
    }
}

#[async_trait]
impl MeasurementSource for StaticSource {
    async fn resolve_filter(&self, _filter_expression: &str) -> Vec<SignalDescriptor> {
        self.descriptors.clone()
    }

    async fn poll(&self, signal_ids: &[Uuid]) -> Vec<Measurement> {
        let values = self.values.read();
        signal_ids.iter().filter_map(|id| values.get(id).copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_only_returns_requested_signals_with_a_value() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let source = StaticSource::new(vec![
            SignalDescriptor {
                signal_id: a,
                source: "PMU:1".into(),
                numeric_id: 1,
            },
            SignalDescriptor {
                signal_id: b,
                source: "PMU:2".into(),
                numeric_id: 2,
            },
        ]);
        source.set_value(Measurement::new(a, 60.0, 0));

        let values = source.poll(&[a, b]).await;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].signal_id, a);
    }
}
