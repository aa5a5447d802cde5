//! Subscription request value object and the connection-string encoding a
//! `SUBSCRIBE` command carries on the wire.

/// Parameters of a subscription request, independent of how it reaches the
/// publisher (connect-time or a later re-subscribe).
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionInfo {
    /// Signal IDs, tag names, measurement keys, or a `FILTER` expression.
    pub filter_expression: String,
    pub throttled: bool,
    pub publish_interval: f64,
    pub udp_data_channel: bool,
    pub data_channel_local_port: u16,
    pub data_channel_interface: String,
    pub include_time: bool,
    /// Gate `lag_time`/`lead_time` reasonability checks on the publisher.
    pub enable_time_reasonability_check: bool,
    pub lag_time: f64,
    pub lead_time: f64,
    pub use_local_clock_as_real_time: bool,
    pub use_millisecond_resolution: bool,
    pub request_nan_value_filter: bool,
    pub start_time: String,
    pub stop_time: String,
    pub constraint_parameters: String,
    pub processing_interval: i32,
    pub extra_connection_string_parameters: String,
}

impl Default for SubscriptionInfo {
    fn default() -> Self {
        SubscriptionInfo {
            filter_expression: String::new(),
            throttled: false,
            publish_interval: 1.0,
            udp_data_channel: false,
            data_channel_local_port: 0,
            data_channel_interface: String::new(),
            include_time: true,
            enable_time_reasonability_check: false,
            lag_time: 10.0,
            lead_time: 5.0,
            use_local_clock_as_real_time: false,
            use_millisecond_resolution: false,
            request_nan_value_filter: false,
            start_time: String::new(),
            stop_time: String::new(),
            constraint_parameters: String::new(),
            processing_interval: -1,
            extra_connection_string_parameters: String::new(),
        }
    }
}

/// Identifies the client library to the publisher's `assemblyInfo` clause.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInfo<'a> {
    pub source: &'a str,
    pub version: &'a str,
    pub updated_on: &'a str,
}

impl SubscriptionInfo {
    /// Whether a start/stop time pair makes this a historical playback
    /// subscription rather than a real-time one.
    pub fn is_historical(&self) -> bool {
        !self.start_time.is_empty() && !self.stop_time.is_empty()
    }

    /// Builds the semicolon-delimited `key=value;...` connection string sent
    /// as a `SUBSCRIBE` command's payload. Key order and casing match the
    /// wire format exactly; `assembly` identifies the subscribing client.
    pub fn to_connection_string(&self, assembly: AssemblyInfo<'_>) -> String {
        let mut connection_string = format!("throttled={}", self.throttled);
        connection_string.push_str(&format!(";publishInterval={:.6}", self.publish_interval));
        connection_string.push_str(&format!(";includeTime={}", self.include_time));
        connection_string.push_str(&format!(";processingInterval={}", self.processing_interval));
        connection_string.push_str(&format!(
            ";useMillisecondResolution={}",
            self.use_millisecond_resolution
        ));
        connection_string.push_str(&format!(
            ";requestNaNValueFilter={}",
            self.request_nan_value_filter
        ));
        connection_string.push_str(&format!(
            ";assemblyInfo={{source={};version={};updatedOn={}}}",
            assembly.source, assembly.version, assembly.updated_on
        ));

        if !self.filter_expression.is_empty() {
            connection_string.push_str(&format!(";filterExpression={{{}}}", self.filter_expression));
        }

        if self.udp_data_channel {
            connection_string.push_str(&format!(
                ";dataChannel={{localport={}}}",
                self.data_channel_local_port
            ));
        }

        if !self.start_time.is_empty() {
            connection_string.push_str(&format!(";startTimeConstraint={}", self.start_time));
        }
        if !self.stop_time.is_empty() {
            connection_string.push_str(&format!(";stopTimeConstraint={}", self.stop_time));
        }
        if !self.constraint_parameters.is_empty() {
            connection_string.push_str(&format!(
                ";timeConstraintParameters={}",
                self.constraint_parameters
            ));
        }
        if !self.extra_connection_string_parameters.is_empty() {
            connection_string.push(';');
            connection_string.push_str(&self.extra_connection_string_parameters);
        }

        connection_string
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSEMBLY: AssemblyInfo = AssemblyInfo {
        source: "sttp-rs",
        version: "0.1.0",
        updated_on: "2026-07-28",
    };

    #[test]
    fn default_connection_string_carries_filter_and_core_flags() {
        let mut info = SubscriptionInfo::default();
        info.filter_expression = "FILTER ActiveMeasurements WHERE SignalType='FREQ'".to_string();

        let connection_string = info.to_connection_string(ASSEMBLY);
        assert!(connection_string.starts_with("throttled=false"));
        assert!(connection_string.contains("filterExpression={FILTER"));
        assert!(connection_string.contains("assemblyInfo={source=sttp-rs;version=0.1.0;updatedOn=2026-07-28}"));
        assert!(!connection_string.contains("dataChannel="));
    }

    #[test]
    fn udp_data_channel_adds_localport_clause() {
        let mut info = SubscriptionInfo::default();
        info.udp_data_channel = true;
        info.data_channel_local_port = 9200;

        let connection_string = info.to_connection_string(ASSEMBLY);
        assert!(connection_string.contains("dataChannel={localport=9200}"));
    }

    #[test]
    fn start_and_stop_time_mark_a_historical_subscription() {
        let mut info = SubscriptionInfo::default();
        assert!(!info.is_historical());

        info.start_time = "2024-01-01T00:00:00Z".to_string();
        info.stop_time = "2024-01-02T00:00:00Z".to_string();
        assert!(info.is_historical());

        let connection_string = info.to_connection_string(ASSEMBLY);
        assert!(connection_string.contains("startTimeConstraint=2024-01-01T00:00:00Z"));
        assert!(connection_string.contains("stopTimeConstraint=2024-01-02T00:00:00Z"));
    }
}
