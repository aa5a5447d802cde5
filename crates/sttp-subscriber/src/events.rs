//! Consumer-facing event sink, replacing the reference implementation's
//! settable callback attributes with an object-safe trait that can be
//! rebound while data is flowing (spec.md §4.7/§9, SPEC_FULL.md §4.7–4.9).

use async_trait::async_trait;
use sttp_core::Measurement;

#[async_trait]
pub trait SubscriberEventSink: Send + Sync {
    async fn on_connected(&self) {}
    async fn on_connection_terminated(&self) {}
    async fn on_subscribed(&self) {}
    async fn on_subscription_updated(&self, signal_count: usize) {
        let _ = signal_count;
    }
    async fn on_new_measurements(&self, measurements: &[Measurement]) {
        let _ = measurements;
    }
    async fn on_processing_complete(&self) {}
    async fn on_metadata(&self, payload: &[u8]) {
        let _ = payload;
    }
    async fn on_notification(&self, message: &str) {
        let _ = message;
    }
    async fn on_status_message(&self, message: &str) {
        let _ = message;
    }
    async fn on_error(&self, message: &str) {
        let _ = message;
    }
}

/// A sink that discards every event; the default until a consumer registers
/// its own.
pub struct NoopEventSink;

#[async_trait]
impl SubscriberEventSink for NoopEventSink {}
