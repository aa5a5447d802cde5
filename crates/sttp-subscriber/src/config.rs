//! Connector-level defaults, ported from the reference implementation's
//! `Defaults` constants (spec.md §6).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// `-1` retries forever.
    pub max_retries: i32,
    pub retry_interval: Duration,
    pub max_retry_interval: Duration,
    pub auto_reconnect: bool,
    pub auto_request_metadata: bool,
    pub auto_subscribe: bool,
    pub compress_payload_data: bool,
    pub compress_metadata: bool,
    pub compress_signal_index_cache: bool,
    pub socket_timeout: Duration,
    pub version: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_retries: -1,
            retry_interval: Duration::from_secs_f64(1.0),
            max_retry_interval: Duration::from_secs_f64(30.0),
            auto_reconnect: true,
            auto_request_metadata: true,
            auto_subscribe: true,
            compress_payload_data: true,
            compress_metadata: true,
            compress_signal_index_cache: true,
            socket_timeout: Duration::from_secs_f64(2.0),
            version: 2,
        }
    }
}
