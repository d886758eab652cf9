//! Error types for exposure notification.
//!
//! This module provides the error hierarchy using `thiserror`. Validation
//! errors are raised before any cryptographic operation runs.

use thiserror::Error;

/// Result type alias using `ExposureError`.
pub type Result<T> = std::result::Result<T, ExposureError>;

/// Main error type for all exposure notification operations.
#[derive(Debug, Error)]
pub enum ExposureError {
    // ═══════════════════════════════════════════════════════════════════════════
    // KEY SCHEDULE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Root secret or sub-key has the wrong size.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    // ═══════════════════════════════════════════════════════════════════════════
    // TIME BUCKET ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Bucket lies outside the validity window of its root secret.
    #[error(
        "Bucket {bucket} out of range: window starts at {day_start} and spans {rolling_period} buckets"
    )]
    BucketOutOfRange {
        bucket: u32,
        day_start: u32,
        rolling_period: u32,
    },

    /// Rolling period outside `[1, 144]`.
    #[error("Invalid rolling period {value}: must be between 1 and {max}")]
    InvalidRollingPeriod { value: u32, max: u32 },

    /// Timestamp before the protocol epoch or beyond the bucket range.
    #[error("Timestamp {0} cannot be mapped to a bucket")]
    TimestampOutOfRange(i64),

    // ═══════════════════════════════════════════════════════════════════════════
    // STORE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The observation store failed. Propagated, never recovered locally.
    #[error("Observation store unavailable: {0}")]
    StoreUnavailable(String),

    /// Observation failed validation.
    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    /// Store file format version mismatch.
    #[error("Format version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    // ═══════════════════════════════════════════════════════════════════════════
    // WIRE FORMAT ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Advertisement payload has the wrong size.
    #[error("Invalid advertisement: expected {expected} bytes, got {actual}")]
    InvalidAdvertisement { expected: usize, actual: usize },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid hex encoding.
    #[error("Invalid hex encoding: {0}")]
    HexError(#[from] hex::FromHexError),

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════════════════
    // RUNTIME ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A spawned background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// The rotation scheduler is no longer running.
    #[error("Rotation scheduler stopped")]
    SchedulerStopped,
}

impl ExposureError {
    /// Returns true if this error was raised by input validation.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            ExposureError::InvalidKeyLength { .. }
                | ExposureError::BucketOutOfRange { .. }
                | ExposureError::InvalidRollingPeriod { .. }
                | ExposureError::TimestampOutOfRange(_)
                | ExposureError::InvalidObservation(_)
                | ExposureError::InvalidAdvertisement { .. }
                | ExposureError::HexError(_)
        )
    }

    /// Returns true if this error came from the observation store.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            ExposureError::StoreUnavailable(_)
                | ExposureError::VersionMismatch { .. }
                | ExposureError::IoError(_)
        )
    }
}
