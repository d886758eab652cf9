//! Common traits for exposure notification.
//!
//! The observation store is the only stateful seam of the protocol. The
//! matcher is written against this interface so that storage can be swapped
//! without touching it.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Identifier, Observation};

// ═══════════════════════════════════════════════════════════════════════════════
// OBSERVATION STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Interface for recording and looking up observed identifiers.
///
/// Implementations might use:
/// - In-memory storage (for testing/development)
/// - A local file (for a single device)
/// - An embedded database
///
/// Any backend failure is reported as `StoreUnavailable`.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Records an observation.
    async fn put(&self, observation: Observation) -> Result<()>;

    /// Returns every observation recorded under `identifier`, oldest first.
    ///
    /// Identifiers are not guaranteed unique, so several observations may
    /// share one.
    async fn query(&self, identifier: &Identifier) -> Result<Vec<Observation>>;

    /// Removes observations received strictly before `horizon_unix`.
    ///
    /// Returns the number of observations removed.
    async fn purge_older_than(&self, horizon_unix: u64) -> Result<usize>;

    /// Returns the total number of stored observations.
    async fn count(&self) -> Result<u64>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROGRESS REPORTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Progress update during matching.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchProgress {
    /// Total disclosed secrets to check
    pub total_secrets: u64,
    /// Secrets fully checked so far
    pub secrets_done: u64,
    /// Buckets checked so far
    pub buckets_scanned: u64,
    /// Matches found so far
    pub matches: u64,
}

/// Callback for match progress updates.
pub type ProgressCallback = Box<dyn Fn(MatchProgress) + Send + Sync>;
