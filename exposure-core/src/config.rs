//! Protocol configuration.
//!
//! The epoch, bucket width, rolling period and retention horizon are one
//! immutable value handed to every component at construction. The defaults
//! are the canonical protocol values; changing any of them on one device
//! breaks matching against every other device without raising an error.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_RETENTION_DAYS, MAX_ROLLING_PERIOD, SECONDS_PER_INTERVAL};
use crate::error::{ExposureError, Result};
use crate::types::RollingPeriod;

/// Shared protocol parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Unix timestamp of bucket 0
    pub epoch_unix: u64,
    /// Bucket width in seconds
    pub interval_seconds: u64,
    /// Buckets each locally generated root secret is valid for
    pub rolling_period: u32,
    /// Days secrets and observations are kept
    pub retention_days: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            epoch_unix: 0,
            interval_seconds: SECONDS_PER_INTERVAL,
            rolling_period: MAX_ROLLING_PERIOD,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl ProtocolConfig {
    /// Creates the canonical configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from the environment, falling back to defaults.
    ///
    /// Recognized variables: `EXPOSURE_EPOCH_UNIX`, `EXPOSURE_INTERVAL_SECONDS`,
    /// `EXPOSURE_ROLLING_PERIOD`, `EXPOSURE_RETENTION_DAYS`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            epoch_unix: env_or("EXPOSURE_EPOCH_UNIX", defaults.epoch_unix)?,
            interval_seconds: env_or("EXPOSURE_INTERVAL_SECONDS", defaults.interval_seconds)?,
            rolling_period: env_or("EXPOSURE_ROLLING_PERIOD", defaults.rolling_period)?,
            retention_days: env_or("EXPOSURE_RETENTION_DAYS", defaults.retention_days)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the epoch.
    pub fn epoch_unix(mut self, epoch: u64) -> Self {
        self.epoch_unix = epoch;
        self
    }

    /// Sets the bucket width.
    pub fn interval_seconds(mut self, seconds: u64) -> Self {
        self.interval_seconds = seconds;
        self
    }

    /// Sets the rolling period of locally generated secrets.
    pub fn rolling_period(mut self, period: u32) -> Self {
        self.rolling_period = period;
        self
    }

    /// Sets the retention horizon.
    pub fn retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Checks that every parameter is usable.
    pub fn validate(&self) -> Result<()> {
        if self.interval_seconds == 0 {
            return Err(ExposureError::ConfigError(
                "interval_seconds must be positive".into(),
            ));
        }
        if self.retention_days == 0 {
            return Err(ExposureError::ConfigError(
                "retention_days must be positive".into(),
            ));
        }
        RollingPeriod::new(self.rolling_period)?;
        Ok(())
    }

    /// The validated rolling period.
    pub fn rolling_period_value(&self) -> Result<RollingPeriod> {
        RollingPeriod::new(self.rolling_period)
    }
}

/// Reads and parses an environment variable, `None` if unset.
pub fn env_opt<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ExposureError::ConfigError(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Reads and parses an environment variable, `default` if unset.
pub fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(env_opt(name)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_canonical() {
        let config = ProtocolConfig::default();
        assert_eq!(config.epoch_unix, 0);
        assert_eq!(config.interval_seconds, 600);
        assert_eq!(config.rolling_period, 144);
        assert_eq!(config.retention_days, 14);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ProtocolConfig::new().rolling_period(72).retention_days(7);
        assert_eq!(config.rolling_period_value().unwrap().get(), 72);
        assert_eq!(config.retention_days, 7);
    }

    #[test]
    fn test_validate_rejects() {
        assert!(ProtocolConfig::new().interval_seconds(0).validate().is_err());
        assert!(ProtocolConfig::new().retention_days(0).validate().is_err());
        assert!(matches!(
            ProtocolConfig::new().rolling_period(145).validate(),
            Err(ExposureError::InvalidRollingPeriod { .. })
        ));
    }

    #[test]
    fn test_env_or_parses_and_falls_back() {
        assert_eq!(env_or("EXPOSURE_TEST_UNSET_VARIABLE", 7u32).unwrap(), 7);
        assert_eq!(env_opt::<u64>("EXPOSURE_TEST_UNSET_VARIABLE").unwrap(), None);
    }
}
