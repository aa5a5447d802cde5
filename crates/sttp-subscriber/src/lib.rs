//! STTP subscriber: connects to a publisher, negotiates operational modes,
//! maintains the signal-index cache and base-time generations, decodes
//! incoming data packets, and hands measurements to a consumer either via
//! callback (`SubscriberEventSink`) or pull (`MeasurementReader`).

pub mod config;
pub mod connector;
pub mod events;
pub mod metadata;
pub mod reader;
pub mod session;
pub mod subscriber;

pub use config::Config;
pub use connector::Connector;
pub use events::{NoopEventSink, SubscriberEventSink};
pub use metadata::{MetadataRegistry, SignalAdjustment, SignalRegistryEntry};
pub use reader::MeasurementReader;
pub use session::{SessionCore, SessionState};
pub use subscriber::DataSubscriber;
