//! In-memory observation store.
//!
//! Fast, thread-safe storage suitable for development, testing,
//! and single-process deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, instrument};

use exposure_core::error::Result;
use exposure_core::traits::ObservationStore;
use exposure_core::types::{Identifier, Observation, ObservationStats};

/// In-memory observation store.
///
/// Uses concurrent data structures for thread-safe access without
/// requiring external synchronization.
///
/// # Indexing
///
/// Observations are grouped by identifier. Each group is kept sorted by
/// reception time, so a query is one map lookup plus a clone.
///
/// # Thread Safety
///
/// All operations are thread-safe. Updates to one identifier are atomic
/// with respect to each other; a query never sees a half-written group.
#[derive(Debug)]
pub struct MemoryObservationStore {
    /// Identifier → observations, oldest first
    observations: DashMap<Identifier, Vec<Observation>>,
    /// Store statistics
    stats: RwLock<ObservationStats>,
}

impl MemoryObservationStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            observations: DashMap::new(),
            stats: RwLock::new(ObservationStats::new()),
        }
    }

    /// Creates a store with preallocated capacity.
    ///
    /// Use this when you know the expected number of distinct identifiers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            observations: DashMap::with_capacity(capacity),
            stats: RwLock::new(ObservationStats::new()),
        }
    }

    /// Returns the current statistics.
    pub fn stats(&self) -> ObservationStats {
        self.stats.read().clone()
    }

    /// Clears all observations.
    pub fn clear(&self) {
        let mut stats = self.stats.write();
        self.observations.clear();
        *stats = ObservationStats::new();
    }

    /// Returns the number of stored observations.
    pub fn len(&self) -> usize {
        self.observations.iter().map(|entry| entry.value().len()).sum()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Returns the number of distinct identifiers.
    pub fn identifier_count(&self) -> usize {
        self.observations.len()
    }

    /// Returns all observations (for export/backup), oldest first.
    pub fn all_observations(&self) -> Vec<Observation> {
        let mut all: Vec<Observation> = self
            .observations
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|o| o.received_at);
        all
    }

    /// Imports observations from a list.
    ///
    /// Useful for restoring from backup. Observations are not checked
    /// against the current time, only inserted.
    pub fn import(&self, observations: Vec<Observation>) -> Result<usize> {
        let mut imported = 0;
        for observation in observations {
            self.insert(observation);
            imported += 1;
        }
        Ok(imported)
    }

    fn insert(&self, observation: Observation) {
        // Held across the map update so a purge never sees stats ahead of the map
        let mut stats = self.stats.write();
        stats.add(&observation);

        let mut group = self.observations.entry(observation.identifier).or_default();
        let at = group.partition_point(|o| o.received_at <= observation.received_at);
        group.insert(at, observation);
    }
}

impl Default for MemoryObservationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObservationStore for MemoryObservationStore {
    /// Records a new observation.
    ///
    /// The observation is validated against the current time, then appended
    /// to its identifier's group.
    #[instrument(skip(self, observation), fields(received_at = observation.received_at))]
    async fn put(&self, observation: Observation) -> Result<()> {
        observation.validate()?;
        debug!(identifier = ?observation.identifier, "Recording observation");
        self.insert(observation);
        Ok(())
    }

    /// Retrieves observations by identifier.
    ///
    /// O(1) for the group lookup, then a clone of the (typically tiny) group.
    #[instrument(skip(self, identifier))]
    async fn query(&self, identifier: &Identifier) -> Result<Vec<Observation>> {
        let found = self
            .observations
            .get(identifier)
            .map(|group| group.value().clone())
            .unwrap_or_default();

        if !found.is_empty() {
            debug!(identifier = ?identifier, count = found.len(), "Identifier observed");
        }
        Ok(found)
    }

    /// Removes observations received before `horizon_unix`.
    #[instrument(skip(self))]
    async fn purge_older_than(&self, horizon_unix: u64) -> Result<usize> {
        let mut removed = Vec::new();
        let mut earliest_remaining: Option<u64> = None;
        let mut stats = self.stats.write();

        self.observations.retain(|_, group| {
            let keep_from = group.partition_point(|o| o.received_at < horizon_unix);
            removed.extend(group.drain(..keep_from));
            if let Some(first) = group.first() {
                earliest_remaining =
                    Some(earliest_remaining.map_or(first.received_at, |t| t.min(first.received_at)));
            }
            !group.is_empty()
        });

        stats.record_purge(&removed, earliest_remaining);
        drop(stats);

        debug!(horizon_unix, purged = removed.len(), "Purged observations");
        Ok(removed.len())
    }

    /// Returns the total observation count.
    async fn count(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::constants::MAX_CLOCK_SKEW_SECS;
    use exposure_core::types::ProtectedMetadata;
    use exposure_core::ExposureError;

    const NOW: u64 = 1_589_121_000;

    fn make_test_observation(tag: u8, received_at: u64) -> Observation {
        Observation::new(
            Identifier::from_array([tag; 16]),
            ProtectedMetadata::from_array([tag, 0, 0, 0]),
            received_at,
        )
    }

    #[tokio::test]
    async fn test_put_and_query() {
        let store = MemoryObservationStore::new();
        let obs = make_test_observation(0x42, NOW);

        store.put(obs.clone()).await.unwrap();

        let found = store.query(&obs.identifier).await.unwrap();
        assert_eq!(found, vec![obs]);
    }

    #[tokio::test]
    async fn test_query_unknown_identifier() {
        let store = MemoryObservationStore::new();
        store.put(make_test_observation(0x01, NOW)).await.unwrap();

        let found = store.query(&Identifier::from_array([0xff; 16])).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_query_returns_all_sorted_by_time() {
        let store = MemoryObservationStore::new();
        store.put(make_test_observation(0x42, NOW + 20)).await.unwrap();
        store.put(make_test_observation(0x42, NOW)).await.unwrap();
        store.put(make_test_observation(0x42, NOW + 10)).await.unwrap();

        let found = store.query(&Identifier::from_array([0x42; 16])).await.unwrap();
        let times: Vec<u64> = found.iter().map(|o| o.received_at).collect();
        assert_eq!(times, vec![NOW, NOW + 10, NOW + 20]);
    }

    #[tokio::test]
    async fn test_future_observation_rejected() {
        let store = MemoryObservationStore::new();
        let far_future = u64::MAX - MAX_CLOCK_SKEW_SECS;

        let result = store.put(make_test_observation(0x01, far_future)).await;
        assert!(matches!(result, Err(ExposureError::InvalidObservation(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let store = MemoryObservationStore::new();
        store.put(make_test_observation(0x01, 100)).await.unwrap();
        store.put(make_test_observation(0x01, 200)).await.unwrap();
        store.put(make_test_observation(0x02, 150)).await.unwrap();
        store.put(make_test_observation(0x03, 300)).await.unwrap();

        let purged = store.purge_older_than(200).await.unwrap();
        assert_eq!(purged, 2);
        assert_eq!(store.count().await.unwrap(), 2);

        // Observation exactly at the horizon survives
        let kept = store.query(&Identifier::from_array([0x01; 16])).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].received_at, 200);

        // Emptied groups are dropped
        assert!(store.query(&Identifier::from_array([0x02; 16])).await.unwrap().is_empty());
        assert_eq!(store.identifier_count(), 2);

        let stats = store.stats();
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.purged_count, 2);
    }

    #[tokio::test]
    async fn test_purge_everything_resets_time_bounds() {
        let store = MemoryObservationStore::new();
        store.put(make_test_observation(0x01, 100)).await.unwrap();

        assert_eq!(store.purge_older_than(NOW).await.unwrap(), 1);
        let stats = store.stats();
        assert_eq!(stats.total_count, 0);
        assert!(stats.earliest_received_at.is_none());
    }

    #[tokio::test]
    async fn test_purge_recomputes_earliest_from_survivors() {
        let store = MemoryObservationStore::new();
        store.put(make_test_observation(0x01, 100)).await.unwrap();
        store.put(make_test_observation(0x01, 450)).await.unwrap();
        store.put(make_test_observation(0x02, 300)).await.unwrap();
        store.put(make_test_observation(0x03, 700)).await.unwrap();

        assert_eq!(store.purge_older_than(200).await.unwrap(), 1);
        let stats = store.stats();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.earliest_received_at, Some(300));
        assert_eq!(stats.latest_received_at, Some(700));

        assert_eq!(store.purge_older_than(400).await.unwrap(), 1);
        assert_eq!(store.stats().earliest_received_at, Some(450));
    }

    #[tokio::test]
    async fn test_stats() {
        let store = MemoryObservationStore::new();
        store.put(make_test_observation(0x01, 100)).await.unwrap();
        store.put(make_test_observation(0x01, 50).with_rssi(-60)).await.unwrap();
        store.put(make_test_observation(0x02, 300)).await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.with_rssi_count, 1);
        assert_eq!(stats.earliest_received_at, Some(50));
        assert_eq!(stats.latest_received_at, Some(300));
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryObservationStore::new();
        store.put(make_test_observation(0x01, NOW)).await.unwrap();
        store.put(make_test_observation(0x02, NOW)).await.unwrap();
        assert_eq!(store.len(), 2);

        store.clear();

        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.stats().total_count, 0);
    }

    #[tokio::test]
    async fn test_import_export() {
        let store1 = MemoryObservationStore::new();
        store1.put(make_test_observation(0x01, NOW + 1)).await.unwrap();
        store1.put(make_test_observation(0x02, NOW)).await.unwrap();

        // Export
        let observations = store1.all_observations();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].received_at, NOW);

        // Import into new store
        let store2 = MemoryObservationStore::new();
        let imported = store2.import(observations).unwrap();
        assert_eq!(imported, 2);
        assert_eq!(store2.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_put() {
        use std::sync::Arc;
        use tokio::task::JoinSet;

        let store = Arc::new(MemoryObservationStore::new());
        let mut tasks = JoinSet::new();

        // 100 writers, 4 per identifier
        for i in 0..100u64 {
            let store = store.clone();
            tasks.spawn(async move {
                let obs = make_test_observation((i % 25) as u8, NOW + i);
                store.put(obs).await.unwrap()
            });
        }

        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }

        assert_eq!(store.len(), 100);
        assert_eq!(store.identifier_count(), 25);
        for tag in 0..25u8 {
            let group = store.query(&Identifier::from_array([tag; 16])).await.unwrap();
            assert_eq!(group.len(), 4);
            assert!(group.windows(2).all(|w| w[0].received_at <= w[1].received_at));
        }
    }
}
