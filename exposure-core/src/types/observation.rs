//! Observation types for the receiving side.
//!
//! An observation is a locally recorded sighting of a broadcast identifier
//! together with its protected metadata.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_CLOCK_SKEW_SECS;
use crate::error::{ExposureError, Result};
use crate::types::{Identifier, ProtectedMetadata};

/// A sighting of an identifier, recorded on radio reception.
///
/// Immutable once stored; purged once older than the retention horizon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// The identifier that was received
    pub identifier: Identifier,
    /// Encrypted metadata received alongside it
    pub protected_metadata: ProtectedMetadata,
    /// Unix timestamp (seconds) of reception
    pub received_at: u64,
    /// Optional received signal strength in dBm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i8>,
}

impl Observation {
    /// Creates an observation without a signal reading.
    pub fn new(identifier: Identifier, protected_metadata: ProtectedMetadata, received_at: u64) -> Self {
        Self {
            identifier,
            protected_metadata,
            received_at,
            rssi: None,
        }
    }

    /// Attaches a signal strength reading.
    pub fn with_rssi(mut self, rssi: i8) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Validates the observation against the current time.
    pub fn validate(&self) -> Result<()> {
        self.validate_at(current_timestamp())
    }

    /// Validates the observation against `now` (Unix seconds).
    pub fn validate_at(&self, now: u64) -> Result<()> {
        if self.received_at > now.saturating_add(MAX_CLOCK_SKEW_SECS) {
            return Err(ExposureError::InvalidObservation(
                "reception time is too far in the future".into(),
            ));
        }
        Ok(())
    }
}

/// Statistics about observations held in a store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationStats {
    /// Observations currently held
    pub total_count: u64,
    /// Observations that carried a signal reading
    pub with_rssi_count: u64,
    /// Earliest reception time seen
    pub earliest_received_at: Option<u64>,
    /// Latest reception time seen
    pub latest_received_at: Option<u64>,
    /// Observations removed by retention purges
    pub purged_count: u64,
}

impl ObservationStats {
    /// Creates empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates stats with a new observation.
    pub fn add(&mut self, observation: &Observation) {
        self.total_count += 1;
        if observation.rssi.is_some() {
            self.with_rssi_count += 1;
        }

        let ts = observation.received_at;
        self.earliest_received_at = Some(self.earliest_received_at.map_or(ts, |t| t.min(ts)));
        self.latest_received_at = Some(self.latest_received_at.map_or(ts, |t| t.max(ts)));
    }

    /// Records observations removed by a purge.
    ///
    /// `earliest_remaining` is the earliest reception time among the
    /// observations the purge kept, `None` if it kept nothing.
    pub fn record_purge(&mut self, removed: &[Observation], earliest_remaining: Option<u64>) {
        let removed_count = removed.len() as u64;
        self.total_count = self.total_count.saturating_sub(removed_count);
        self.with_rssi_count = self
            .with_rssi_count
            .saturating_sub(removed.iter().filter(|o| o.rssi.is_some()).count() as u64);
        self.purged_count += removed_count;

        self.earliest_received_at = earliest_remaining;
        if self.total_count == 0 {
            self.earliest_received_at = None;
            self.latest_received_at = None;
        }
    }
}

/// Returns current Unix timestamp in seconds.
pub(crate) fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::IDENTIFIER_SIZE;

    fn make_observation(received_at: u64) -> Observation {
        Observation::new(
            Identifier::from_array([0x42; IDENTIFIER_SIZE]),
            ProtectedMetadata::from_array([1, 2, 3, 4]),
            received_at,
        )
    }

    #[test]
    fn test_future_observation_rejected() {
        let now = 1_600_000_000;
        assert!(make_observation(now).validate_at(now).is_ok());
        assert!(make_observation(now + MAX_CLOCK_SKEW_SECS).validate_at(now).is_ok());
        assert!(matches!(
            make_observation(now + MAX_CLOCK_SKEW_SECS + 1).validate_at(now),
            Err(ExposureError::InvalidObservation(_))
        ));
    }

    #[test]
    fn test_observation_serde_roundtrip() {
        let with_rssi = make_observation(1_589_000_000).with_rssi(-67);
        let json = serde_json::to_string(&with_rssi).unwrap();
        assert_eq!(serde_json::from_str::<Observation>(&json).unwrap(), with_rssi);

        let without = make_observation(1_589_000_000);
        let json = serde_json::to_string(&without).unwrap();
        assert!(!json.contains("rssi"));
        assert_eq!(serde_json::from_str::<Observation>(&json).unwrap(), without);
    }

    #[test]
    fn test_stats_add_and_purge() {
        let mut stats = ObservationStats::new();
        let old = make_observation(100).with_rssi(-80);
        let new = make_observation(300);
        stats.add(&old);
        stats.add(&new);

        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.with_rssi_count, 1);
        assert_eq!(stats.earliest_received_at, Some(100));
        assert_eq!(stats.latest_received_at, Some(300));

        stats.record_purge(&[old], Some(300));
        assert_eq!(stats.total_count, 1);
        assert_eq!(stats.with_rssi_count, 0);
        assert_eq!(stats.purged_count, 1);
        assert_eq!(stats.earliest_received_at, Some(300));
        assert_eq!(stats.latest_received_at, Some(300));

        stats.record_purge(&[new], None);
        assert_eq!(stats.earliest_received_at, None);
        assert_eq!(stats.latest_received_at, None);
    }
}
