//! Error types for ELMetrics
//!
//! This module defines all error types used throughout the library.
//! Only [`ConfigError`] is fatal: decode and transport errors are
//! recovered inside the poll cycle and never reach the scrape caller.

use thiserror::Error;

/// Result type alias for ELMetrics operations
pub type Result<T> = std::result::Result<T, ElMetricsError>;

/// Main error type for ELMetrics operations
#[derive(Error, Debug)]
pub enum ElMetricsError {
    /// Property decoding error
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Rule table / gauge table inconsistency
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Metric sink error
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors while decoding a property buffer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer length does not match the declared scalar width
    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Array buffer too short to carry the (min, max) index header
    #[error("Array header truncated: got {0} bytes")]
    MissingArrayHeader(usize),

    /// Array header with max index below min index
    #[error("Invalid array range: min {min}, max {max}")]
    InvalidArrayRange { min: u8, max: u8 },

    /// Array payload not evenly divisible into elements
    #[error("Array payload of {len} bytes is not a multiple of element width {width}")]
    RaggedArray { len: usize, width: usize },
}

/// Errors reported by the device transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Request timed out
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Device did not answer or is unknown to the transport
    #[error("Device unreachable: {0}")]
    Unreachable(String),

    /// Device answered but does not provide the property
    #[error("Property 0x{epc:02X} not available on {address}")]
    PropertyUnavailable { address: String, epc: u8 },

    /// Transport was closed
    #[error("Transport closed")]
    Closed,
}

/// Startup-time consistency errors between rule and gauge tables
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A rule emits a metric with no registered gauge
    #[error("Metric '{metric}' used by class {class} has no registered gauge")]
    MissingGauge { metric: String, class: String },

    /// A registered gauge is never produced by any rule
    #[error("Gauge '{0}' is not produced by any class rule")]
    UnusedGauge(String),

    /// Gauge name registered twice
    #[error("Gauge '{0}' registered twice")]
    DuplicateGauge(String),

    /// Rule and gauge disagree on the label shape
    #[error("Metric '{metric}' label shape mismatch: rule uses {rule}, gauge declares {gauge}")]
    LabelShape {
        metric: String,
        rule: &'static str,
        gauge: &'static str,
    },

    /// Two rules in one class write the same gauge identity
    #[error("Class {class} has two rules writing '{metric}' with identical labels")]
    DuplicateRule { class: String, metric: String },

    /// A rule combines an array encoding with a non-circuit label or the reverse
    #[error("Metric '{metric}' in class {class}: {reason}")]
    InvalidRule {
        class: String,
        metric: String,
        reason: &'static str,
    },

    /// Class registered twice in a registry builder
    #[error("Class {0} registered twice")]
    DuplicateClass(String),
}

/// Errors while applying samples to the metrics registry
#[derive(Error, Debug)]
pub enum SinkError {
    /// Sample names a metric with no gauge
    #[error("No gauge registered for metric '{0}'")]
    UnknownMetric(String),

    /// Sample labels do not match the gauge's label set
    #[error("Sample for '{metric}' does not match gauge labels ({expected})")]
    LabelMismatch {
        metric: String,
        expected: &'static str,
    },

    /// Prometheus registry or encoder failure
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Exposition was not valid UTF-8
    #[error("Exposition encoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ElMetricsError::Decode(DecodeError::LengthMismatch {
            expected: 4,
            actual: 2,
        });
        let msg = format!("{}", err);
        assert!(msg.contains("Length mismatch"));
        assert!(msg.contains("expected 4"));
    }

    #[test]
    fn test_error_conversion() {
        let config_err = ConfigError::UnusedGauge("total_power_watts".to_string());
        let err: ElMetricsError = config_err.into();
        assert!(matches!(err, ElMetricsError::Config(_)));
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::PropertyUnavailable {
            address: "192.168.1.20".to_string(),
            epc: 0xC6,
        };
        assert_eq!(
            err.to_string(),
            "Property 0xC6 not available on 192.168.1.20"
        );
    }
}
