//! Time bucket types.
//!
//! - [`BucketIndex`]: 10-minute window counter since the protocol epoch
//! - [`RollingPeriod`]: number of buckets a root secret is valid for
//! - [`ValidityWindow`]: the bucket range one root secret may be applied to

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_ROLLING_PERIOD, MIN_ROLLING_PERIOD};
use crate::error::{ExposureError, Result};

/// Discrete 10-minute time window counter (ENIntervalNumber).
///
/// Encoded on the wire as a little-endian `u32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketIndex(u32);

impl BucketIndex {
    /// Creates a bucket index.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw counter.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Little-endian wire encoding.
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Returns the bucket `offset` windows later, or `None` on overflow.
    pub fn checked_add(self, offset: u32) -> Option<Self> {
        self.0.checked_add(offset).map(Self)
    }
}

impl std::fmt::Display for BucketIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BucketIndex {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Count of consecutive buckets one root secret is valid for, in `[1, 144]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RollingPeriod(u32);

impl RollingPeriod {
    /// A full day: 144 buckets.
    pub const FULL_DAY: RollingPeriod = RollingPeriod(MAX_ROLLING_PERIOD);

    /// Creates a rolling period.
    ///
    /// # Errors
    /// Returns `InvalidRollingPeriod` outside `[1, 144]`.
    pub fn new(value: u32) -> Result<Self> {
        if !(MIN_ROLLING_PERIOD..=MAX_ROLLING_PERIOD).contains(&value) {
            return Err(ExposureError::InvalidRollingPeriod {
                value,
                max: MAX_ROLLING_PERIOD,
            });
        }
        Ok(Self(value))
    }

    /// Returns the number of buckets.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Default for RollingPeriod {
    fn default() -> Self {
        Self::FULL_DAY
    }
}

impl TryFrom<u32> for RollingPeriod {
    type Error = ExposureError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RollingPeriod> for u32 {
    fn from(period: RollingPeriod) -> Self {
        period.0
    }
}

/// Bucket range `[day_start, day_start + rolling_period)` a root secret covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidityWindow {
    day_start: BucketIndex,
    rolling_period: RollingPeriod,
}

impl ValidityWindow {
    /// Creates a validity window.
    ///
    /// # Errors
    /// Returns `BucketOutOfRange` if the window would run past `u32::MAX`.
    pub fn new(day_start: BucketIndex, rolling_period: RollingPeriod) -> Result<Self> {
        if day_start.checked_add(rolling_period.get()).is_none() {
            return Err(ExposureError::BucketOutOfRange {
                bucket: day_start.value(),
                day_start: day_start.value(),
                rolling_period: rolling_period.get(),
            });
        }
        Ok(Self {
            day_start,
            rolling_period,
        })
    }

    /// A full 144-bucket day starting at `day_start`.
    pub fn full_day(day_start: BucketIndex) -> Result<Self> {
        Self::new(day_start, RollingPeriod::FULL_DAY)
    }

    /// First bucket of the window.
    pub fn day_start(&self) -> BucketIndex {
        self.day_start
    }

    /// Number of buckets in the window.
    pub fn rolling_period(&self) -> RollingPeriod {
        self.rolling_period
    }

    /// One past the last valid bucket.
    pub fn end(&self) -> BucketIndex {
        // Cannot overflow: checked in `new`.
        BucketIndex(self.day_start.0 + self.rolling_period.0)
    }

    /// Returns true if `bucket` lies inside the window.
    pub fn contains(&self, bucket: BucketIndex) -> bool {
        bucket >= self.day_start && bucket < self.end()
    }

    /// Offset of `bucket` from the window start.
    ///
    /// # Errors
    /// Returns `BucketOutOfRange` if the bucket is outside the window.
    pub fn offset_of(&self, bucket: BucketIndex) -> Result<u32> {
        if !self.contains(bucket) {
            return Err(self.out_of_range(bucket.value()));
        }
        Ok(bucket.0 - self.day_start.0)
    }

    /// Bucket at `offset` from the window start.
    ///
    /// # Errors
    /// Returns `BucketOutOfRange` if `offset >= rolling_period`.
    pub fn bucket_at(&self, offset: u32) -> Result<BucketIndex> {
        if offset >= self.rolling_period.0 {
            return Err(self.out_of_range(self.day_start.0.saturating_add(offset)));
        }
        Ok(BucketIndex(self.day_start.0 + offset))
    }

    /// Iterates the window's buckets in increasing order.
    pub fn buckets(&self) -> impl Iterator<Item = BucketIndex> + Clone {
        (self.day_start.0..self.end().0).map(BucketIndex)
    }

    fn out_of_range(&self, bucket: u32) -> ExposureError {
        ExposureError::BucketOutOfRange {
            bucket,
            day_start: self.day_start.0,
            rolling_period: self.rolling_period.0,
        }
    }
}
