//! Mapping between wall-clock time and bucket indices.
//!
//! A bucket is a fixed-width window of time counted from the protocol epoch.
//! Two instants share a bucket exactly when they fall into the same window.
//!
//! # Window alignment
//!
//! Validity windows ([`IntervalClock::window_containing`]) start at multiples
//! of the rolling period counted from bucket 0, i.e. from the epoch. Calendar
//! days ([`IntervalClock::day_start_bucket`]) start at 00:00 UTC. The two agree
//! only when the epoch falls on a UTC midnight and one rolling period spans
//! exactly one day, as with the default configuration.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::config::ProtocolConfig;
use crate::constants::SECONDS_PER_DAY;
use crate::error::{ExposureError, Result};
use crate::types::{BucketIndex, RollingPeriod, ValidityWindow};

/// Converts timestamps into bucket indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntervalClock {
    epoch_unix: u64,
    interval_seconds: u64,
    rolling_period: RollingPeriod,
    retention_days: u32,
}

impl Default for IntervalClock {
    fn default() -> Self {
        Self {
            epoch_unix: 0,
            interval_seconds: crate::constants::SECONDS_PER_INTERVAL,
            rolling_period: RollingPeriod::FULL_DAY,
            retention_days: crate::constants::DEFAULT_RETENTION_DAYS,
        }
    }
}

impl IntervalClock {
    /// Creates a clock from a validated configuration.
    pub fn new(config: &ProtocolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            epoch_unix: config.epoch_unix,
            interval_seconds: config.interval_seconds,
            rolling_period: config.rolling_period_value()?,
            retention_days: config.retention_days,
        })
    }

    /// Width of one bucket in seconds.
    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds
    }

    /// Rolling period of locally generated secrets.
    pub fn rolling_period(&self) -> RollingPeriod {
        self.rolling_period
    }

    /// Bucket containing the given instant.
    pub fn bucket_of(&self, instant: DateTime<Utc>) -> Result<BucketIndex> {
        let seconds = instant.timestamp();
        let seconds =
            u64::try_from(seconds).map_err(|_| ExposureError::TimestampOutOfRange(seconds))?;
        self.bucket_of_unix(seconds)
    }

    /// Bucket containing the given unix timestamp.
    ///
    /// # Errors
    /// `TimestampOutOfRange` if the timestamp precedes the epoch or the
    /// bucket number does not fit in 32 bits.
    pub fn bucket_of_unix(&self, seconds: u64) -> Result<BucketIndex> {
        let out_of_range = || ExposureError::TimestampOutOfRange(clamp_i64(seconds));
        let elapsed = seconds.checked_sub(self.epoch_unix).ok_or_else(out_of_range)?;
        let bucket = u32::try_from(elapsed / self.interval_seconds).map_err(|_| out_of_range())?;
        Ok(BucketIndex::new(bucket))
    }

    /// Bucket of the current wall-clock time.
    pub fn now_bucket(&self) -> Result<BucketIndex> {
        self.bucket_of(Utc::now())
    }

    /// Bucket containing 00:00 UTC of `date`.
    ///
    /// This is a calendar lookup. Key windows are aligned by
    /// [`rolling_start`](Self::rolling_start) instead; see the module docs.
    pub fn day_start_bucket(&self, date: NaiveDate) -> Result<BucketIndex> {
        self.bucket_of(date.and_time(NaiveTime::MIN).and_utc())
    }

    /// Floors `bucket` to a multiple of the rolling period.
    ///
    /// Counted from the epoch, not from UTC midnight.
    pub fn rolling_start(&self, bucket: BucketIndex) -> BucketIndex {
        let period = self.rolling_period.get();
        BucketIndex::new(bucket.value() / period * period)
    }

    /// Validity window a secret created during `bucket` is bound to.
    pub fn window_containing(&self, bucket: BucketIndex) -> Result<ValidityWindow> {
        ValidityWindow::new(self.rolling_start(bucket), self.rolling_period)
    }

    /// Unix timestamp at which `bucket` begins.
    pub fn bucket_start_unix(&self, bucket: BucketIndex) -> u64 {
        self.epoch_unix
            .saturating_add(u64::from(bucket.value()).saturating_mul(self.interval_seconds))
    }

    /// First bucket boundary strictly after `seconds`.
    pub fn next_boundary_unix(&self, seconds: u64) -> u64 {
        if seconds < self.epoch_unix {
            return self.epoch_unix;
        }
        let elapsed = seconds - self.epoch_unix;
        let next = (elapsed / self.interval_seconds).saturating_add(1);
        self.epoch_unix
            .saturating_add(next.saturating_mul(self.interval_seconds))
    }

    /// Oldest timestamp still inside the retention horizon.
    pub fn retention_cutoff_unix(&self, now: u64) -> u64 {
        now.saturating_sub(u64::from(self.retention_days) * SECONDS_PER_DAY)
    }

    /// Number of buckets covered by the retention horizon.
    pub fn retention_buckets(&self) -> u32 {
        let buckets = u64::from(self.retention_days) * SECONDS_PER_DAY / self.interval_seconds;
        u32::try_from(buckets).unwrap_or(u32::MAX)
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
