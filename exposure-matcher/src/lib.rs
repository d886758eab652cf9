//! # Exposure Matcher
//!
//! Checks disclosed root secrets against locally stored observations.
//!
//! ## Features
//!
//! - **Lazy Matching**: One secret becomes a `Stream` of matches in bucket order
//! - **Batch Matching**: Many disclosures checked in parallel tokio tasks
//! - **Match Budget**: Stop after N matches, or after the first one
//! - **Progress Reporting**: Callbacks after each disclosure completes
//!
//! ## Example
//!
//! ```rust,ignore
//! use exposure_matcher::{Matcher, MatcherConfig};
//! use exposure_store::MemoryObservationStore;
//!
//! let store = Arc::new(MemoryObservationStore::new());
//! let matcher = Matcher::new(store, MatcherConfig::default());
//!
//! // Check one day's disclosures
//! let report = matcher.match_all(disclosures).await?;
//!
//! for hit in report.results {
//!     println!("Exposed at bucket {} ({} dBm)", hit.bucket, hit.metadata.tx_power());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

use std::future::Future;
use std::pin::{pin, Pin};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};

use exposure_core::config::{env_opt, env_or};
use exposure_core::error::{ExposureError, Result};
use exposure_core::traits::{MatchProgress, ObservationStore, ProgressCallback};
use exposure_core::types::{
    BucketIndex, DailySecret, DiagnosisSecret, MatchResult, Observation,
};
use exposure_core::IntervalClock;
use exposure_crypto::{derive_sub_keys, identifiers_for_window, reveal_metadata};

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Matcher configuration.
#[derive(Clone, Debug)]
pub struct MatcherConfig {
    /// Disclosed secrets checked concurrently by `match_all`
    pub max_concurrent_secrets: usize,
    /// Stop after this many matches (None = unlimited)
    pub match_budget: Option<usize>,
    /// Whether to stop on the first match
    pub stop_on_first: bool,
    /// Only count observations received within this many seconds of the
    /// matched bucket (None = any reception time)
    pub reception_tolerance_secs: Option<u64>,
    /// Clock used to place buckets in time
    pub clock: IntervalClock,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_secrets: 8,
            match_budget: None,
            stop_on_first: false,
            reception_tolerance_secs: None,
            clock: IntervalClock::default(),
        }
    }
}

impl MatcherConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from the environment.
    ///
    /// Recognized variables: `EXPOSURE_MATCH_CONCURRENCY`,
    /// `EXPOSURE_MATCH_BUDGET`, `EXPOSURE_RECEPTION_TOLERANCE_SECS`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            max_concurrent_secrets: env_or(
                "EXPOSURE_MATCH_CONCURRENCY",
                defaults.max_concurrent_secrets,
            )?,
            match_budget: env_opt("EXPOSURE_MATCH_BUDGET")?,
            reception_tolerance_secs: env_opt("EXPOSURE_RECEPTION_TOLERANCE_SECS")?,
            ..defaults
        };
        if config.max_concurrent_secrets == 0 {
            return Err(ExposureError::ConfigError(
                "EXPOSURE_MATCH_CONCURRENCY must be positive".into(),
            ));
        }
        Ok(config)
    }

    /// Sets how many secrets are checked in parallel.
    pub fn max_concurrent_secrets(mut self, n: usize) -> Self {
        self.max_concurrent_secrets = n.max(1);
        self
    }

    /// Stops after `n` matches.
    pub fn match_budget(mut self, n: usize) -> Self {
        self.match_budget = Some(n);
        self
    }

    /// Enables stopping on the first match.
    pub fn stop_on_first(mut self) -> Self {
        self.stop_on_first = true;
        self
    }

    /// Requires observations to fall near their bucket's time span.
    pub fn reception_tolerance(mut self, seconds: u64) -> Self {
        self.reception_tolerance_secs = Some(seconds);
        self
    }

    /// Sets the clock.
    pub fn clock(mut self, clock: IntervalClock) -> Self {
        self.clock = clock;
        self
    }

    fn effective_budget(&self) -> Option<usize> {
        match (self.match_budget, self.stop_on_first) {
            (Some(n), true) => Some(n.min(1)),
            (None, true) => Some(1),
            (budget, false) => budget,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATISTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Matching statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    /// Disclosed secrets checked
    pub secrets_scanned: u64,
    /// Buckets whose identifier was looked up
    pub buckets_scanned: u64,
    /// Matches produced
    pub matches: u64,
    /// Lookups that found at least one observation
    pub store_hits: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl MatchStats {
    /// Returns the lookup rate (buckets per second).
    pub fn rate(&self) -> f64 {
        if self.duration_ms == 0 {
            0.0
        } else {
            (self.buckets_scanned as f64 / self.duration_ms as f64) * 1000.0
        }
    }
}

/// Result of checking a batch of disclosures.
#[derive(Clone, Debug, Default)]
pub struct MatchReport {
    /// Matches in disclosure input order, then bucket order
    pub results: Vec<MatchResult>,
    /// Statistics for this batch
    pub stats: MatchStats,
}

impl MatchReport {
    /// Returns true if any disclosure matched.
    pub fn exposed(&self) -> bool {
        !self.results.is_empty()
    }
}

#[derive(Debug, Default)]
struct ScanCounters {
    secrets: AtomicU64,
    buckets: AtomicU64,
    store_hits: AtomicU64,
    matches: AtomicU64,
    duration_ms: AtomicU64,
}

impl ScanCounters {
    fn snapshot(&self) -> MatchStats {
        MatchStats {
            secrets_scanned: self.secrets.load(Ordering::Relaxed),
            buckets_scanned: self.buckets.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            store_hits: self.store_hits.load(Ordering::Relaxed),
            duration_ms: self.duration_ms.load(Ordering::Relaxed),
        }
    }

    fn absorb(&self, stats: &MatchStats) {
        self.secrets.fetch_add(stats.secrets_scanned, Ordering::Relaxed);
        self.buckets.fetch_add(stats.buckets_scanned, Ordering::Relaxed);
        self.matches.fetch_add(stats.matches, Ordering::Relaxed);
        self.store_hits.fetch_add(stats.store_hits, Ordering::Relaxed);
        self.duration_ms.fetch_add(stats.duration_ms, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [
            &self.secrets,
            &self.buckets,
            &self.store_hits,
            &self.matches,
            &self.duration_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Shared cap on the number of matches a batch may produce.
#[derive(Debug)]
struct MatchBudget {
    remaining: Option<AtomicUsize>,
}

impl MatchBudget {
    fn new(limit: Option<usize>) -> Self {
        Self {
            remaining: limit.map(AtomicUsize::new),
        }
    }

    fn exhausted(&self) -> bool {
        self.remaining
            .as_ref()
            .is_some_and(|r| r.load(Ordering::SeqCst) == 0)
    }

    fn claim(&self) -> bool {
        match &self.remaining {
            None => true,
            Some(r) => r
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok(),
        }
    }
}

/// Filters observations by reception time relative to their bucket.
#[derive(Clone, Copy, Debug)]
struct ReceptionFilter {
    clock: IntervalClock,
    tolerance_secs: Option<u64>,
}

impl ReceptionFilter {
    fn accepts(&self, bucket: BucketIndex, observation: &Observation) -> bool {
        let Some(tolerance) = self.tolerance_secs else {
            return true;
        };
        let start = self.clock.bucket_start_unix(bucket);
        let end = start.saturating_add(self.clock.interval_seconds());
        observation.received_at.saturating_add(tolerance) >= start
            && observation.received_at < end.saturating_add(tolerance)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MATCHER
// ═══════════════════════════════════════════════════════════════════════════════

/// Matches disclosed secrets against an observation store.
pub struct Matcher {
    store: Arc<dyn ObservationStore>,
    config: MatcherConfig,
    totals: Arc<ScanCounters>,
}

impl Matcher {
    /// Creates a matcher over `store`.
    pub fn new(store: Arc<dyn ObservationStore>, config: MatcherConfig) -> Self {
        Self {
            store,
            config,
            totals: Arc::new(ScanCounters::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Returns statistics accumulated over the matcher's lifetime.
    pub fn stats(&self) -> MatchStats {
        self.totals.snapshot()
    }

    /// Resets the lifetime statistics.
    pub fn reset_stats(&self) {
        self.totals.reset();
    }

    /// Lazily matches one secret against the store.
    ///
    /// Sub-keys are derived once, on the first poll. Buckets are visited in
    /// increasing order and every stored observation of a bucket's identifier
    /// yields one result. Nothing runs and nothing is counted until the
    /// stream is polled; calling this again recomputes from scratch. The
    /// stream ends after the first store error.
    ///
    /// The match budget and `stop_on_first` only apply to [`match_all`].
    ///
    /// [`match_all`]: Matcher::match_all
    pub fn match_secret(
        &self,
        secret: &DailySecret,
    ) -> impl Stream<Item = Result<MatchResult>> + Send + 'static {
        secret_stream(
            self.store.clone(),
            secret,
            self.reception_filter(),
            self.totals.clone(),
            None,
        )
    }

    /// Validates a disclosure, then matches it like [`match_secret`].
    ///
    /// # Errors
    /// `InvalidRollingPeriod`, `HexError` or `InvalidKeyLength` before any
    /// key is derived.
    ///
    /// [`match_secret`]: Matcher::match_secret
    pub fn match_disclosure(
        &self,
        disclosure: &DiagnosisSecret,
    ) -> Result<impl Stream<Item = Result<MatchResult>> + Send + 'static> {
        let secret = disclosure.validate()?;
        Ok(self.match_secret(&secret))
    }

    /// Returns true as soon as one observation matches the disclosure.
    #[instrument(skip(self, disclosure), fields(day_start = disclosure.day_start))]
    pub async fn was_exposed(&self, disclosure: &DiagnosisSecret) -> Result<bool> {
        let mut matches = pin!(self.match_disclosure(disclosure)?);
        match matches.next().await {
            Some(Ok(_)) => Ok(true),
            Some(Err(e)) => Err(e),
            None => Ok(false),
        }
    }

    /// Matches a batch of disclosures.
    ///
    /// Every disclosure is validated before any scanning starts, so one
    /// malformed entry rejects the whole batch. A store error fails the
    /// batch and aborts the scans still in flight.
    #[instrument(skip(self, disclosures), fields(count = disclosures.len()))]
    pub async fn match_all(&self, disclosures: Vec<DiagnosisSecret>) -> Result<MatchReport> {
        self.run_batch(disclosures, None).await
    }

    /// Matches a batch of disclosures with progress reporting.
    ///
    /// The callback runs once per disclosure, in input order.
    #[instrument(skip(self, disclosures, progress_callback), fields(count = disclosures.len()))]
    pub async fn match_all_with_progress(
        &self,
        disclosures: Vec<DiagnosisSecret>,
        progress_callback: ProgressCallback,
    ) -> Result<MatchReport> {
        self.run_batch(disclosures, Some(progress_callback)).await
    }

    async fn run_batch(
        &self,
        disclosures: Vec<DiagnosisSecret>,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<MatchReport> {
        let start = Instant::now();

        let secrets = disclosures
            .iter()
            .map(DiagnosisSecret::validate)
            .collect::<Result<Vec<_>>>()?;

        let total_secrets = secrets.len() as u64;
        info!(
            secrets = total_secrets,
            concurrency = self.config.max_concurrent_secrets,
            "Starting match"
        );

        let counters = Arc::new(ScanCounters::default());
        let budget = Arc::new(MatchBudget::new(self.config.effective_budget()));
        let filter = self.reception_filter();

        let mut tasks = stream::iter(secrets)
            .map(|secret| {
                let matches = secret_stream(
                    self.store.clone(),
                    &secret,
                    filter,
                    counters.clone(),
                    Some(budget.clone()),
                );
                AbortOnDrop(tokio::spawn(collect_within_budget(matches, budget.clone())))
            })
            .buffered(self.config.max_concurrent_secrets.max(1));

        let mut results = Vec::new();
        let mut progress = MatchProgress {
            total_secrets,
            ..MatchProgress::default()
        };

        while let Some(joined) = tasks.next().await {
            let found = joined.map_err(|e| ExposureError::TaskFailed(e.to_string()))??;
            debug!(matches = found.len(), "Secret checked");
            results.extend(found);

            if let Some(callback) = &progress_callback {
                progress.secrets_done += 1;
                progress.buckets_scanned = counters.buckets.load(Ordering::Relaxed);
                progress.matches = results.len() as u64;
                callback(progress.clone());
            }
        }

        let mut stats = counters.snapshot();
        stats.matches = results.len() as u64;
        stats.duration_ms = start.elapsed().as_millis() as u64;
        self.totals.absorb(&stats);

        if budget.exhausted() {
            warn!(matches = stats.matches, "Match budget exhausted, scan stopped early");
        }

        info!(
            matches = stats.matches,
            buckets = stats.buckets_scanned,
            duration_ms = stats.duration_ms,
            rate = format!("{:.2}/s", stats.rate()),
            "Match complete"
        );

        Ok(MatchReport { results, stats })
    }

    fn reception_filter(&self) -> ReceptionFilter {
        ReceptionFilter {
            clock: self.config.clock,
            tolerance_secs: self.config.reception_tolerance_secs,
        }
    }
}

/// Aborts the spawned scan if its result is no longer wanted.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = std::result::Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn collect_within_budget(
    matches: impl Stream<Item = Result<MatchResult>>,
    budget: Arc<MatchBudget>,
) -> Result<Vec<MatchResult>> {
    let mut matches = pin!(matches);
    let mut found = Vec::new();
    while let Some(result) = matches.next().await {
        let result = result?;
        if !budget.claim() {
            break;
        }
        found.push(result);
    }
    Ok(found)
}

fn secret_stream(
    store: Arc<dyn ObservationStore>,
    secret: &DailySecret,
    filter: ReceptionFilter,
    counters: Arc<ScanCounters>,
    budget: Option<Arc<MatchBudget>>,
) -> impl Stream<Item = Result<MatchResult>> + Send + 'static {
    let secret = secret.clone();
    stream::once(async move { scan_window(store, &secret, filter, counters, budget) }).flatten()
}

fn scan_window(
    store: Arc<dyn ObservationStore>,
    secret: &DailySecret,
    filter: ReceptionFilter,
    counters: Arc<ScanCounters>,
    budget: Option<Arc<MatchBudget>>,
) -> impl Stream<Item = Result<MatchResult>> + Send + 'static {
    let keys = derive_sub_keys(secret.root_secret());
    let identifiers = identifiers_for_window(&keys, secret.window());
    let root_secret = secret.root_secret().clone();
    let day_start = secret.window().day_start();

    counters.secrets.fetch_add(1, Ordering::Relaxed);
    let lookups = counters.clone();

    stream::iter(identifiers)
        .take_while(move |_| future::ready(!budget.as_ref().is_some_and(|b| b.exhausted())))
        .then(move |(bucket, identifier)| {
            let store = store.clone();
            let lookups = lookups.clone();
            async move {
                lookups.buckets.fetch_add(1, Ordering::Relaxed);
                let found = store.query(&identifier).await;
                if matches!(&found, Ok(observations) if !observations.is_empty()) {
                    lookups.store_hits.fetch_add(1, Ordering::Relaxed);
                }
                (bucket, identifier, found)
            }
        })
        .flat_map(move |(bucket, identifier, found)| {
            let items: Vec<Result<MatchResult>> = match found {
                Err(e) => vec![Err(e)],
                Ok(observations) => observations
                    .into_iter()
                    .filter(|observation| filter.accepts(bucket, observation))
                    .map(|observation| {
                        Ok(MatchResult {
                            root_secret: root_secret.clone(),
                            identifier,
                            bucket,
                            offset: bucket.value() - day_start.value(),
                            metadata: reveal_metadata(
                                &keys,
                                &identifier,
                                &observation.protected_metadata,
                            ),
                            observation,
                        })
                    })
                    .collect(),
            };
            counters
                .matches
                .fetch_add(items.iter().filter(|i| i.is_ok()).count() as u64, Ordering::Relaxed);
            stream::iter(items)
        })
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        })
}
