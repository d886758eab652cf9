//! Background task that rotates the broadcast payload at bucket boundaries.
//!
//! Each rotation looks up (or creates) the root secret for the current
//! bucket, builds the advertisement and publishes it on a `watch` channel.
//! The task then sleeps until the next boundary or until shutdown is
//! requested, whichever comes first.
//!
//! The wall clock is re-read on every wake-up through a [`TimeSource`], and
//! no single sleep exceeds [`MAX_SLEEP`]. A clock that jumps (suspend, NTP
//! step) is therefore caught up within one short sleep instead of leaving
//! every later bucket behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use exposure_core::config::env_opt;
use exposure_core::error::{ExposureError, Result};
use exposure_core::types::{BucketIndex, Metadata};
use exposure_core::IntervalClock;
use exposure_crypto::derive_sub_keys;

use crate::advertisement::Advertisement;
use crate::keyring::KeyRing;

/// Version byte carried in broadcast metadata.
pub const DEFAULT_METADATA_VERSION: u8 = 0x40;

/// Longest the task sleeps before re-reading the wall clock.
pub const MAX_SLEEP: Duration = Duration::from_secs(60);

// ═══════════════════════════════════════════════════════════════════════════════
// TIME SOURCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Wall-clock reading used to place the scheduler in time.
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> Result<u64>;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_millis(&self) -> Result<u64> {
        let now = Utc::now().timestamp_millis();
        u64::try_from(now).map_err(|_| ExposureError::TimestampOutOfRange(now / 1000))
    }
}

/// A fixed start time advanced by tokio's clock.
///
/// Follows paused test time; on a real runtime it does not see suspend or
/// clock steps.
#[derive(Clone, Copy, Debug)]
pub struct PinnedClock {
    start_millis: u64,
    anchor: Instant,
}

impl PinnedClock {
    /// Starts at `unix_seconds` now.
    pub fn starting_at(unix_seconds: u64) -> Self {
        Self {
            start_millis: unix_seconds.saturating_mul(1000),
            anchor: Instant::now(),
        }
    }
}

impl TimeSource for PinnedClock {
    fn now_millis(&self) -> Result<u64> {
        let elapsed = u64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(self.start_millis.saturating_add(elapsed))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Scheduler settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Plaintext metadata protected into every advertisement.
    pub metadata: Metadata,
    /// Start time in Unix seconds, advanced by tokio's clock. The system wall
    /// clock is used if unset.
    pub start_unix: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            metadata: Metadata::new(DEFAULT_METADATA_VERSION, 0),
            start_unix: None,
        }
    }
}

impl SchedulerConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `EXPOSURE_TX_POWER` (dBm) from the environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(tx_power) = env_opt::<i8>("EXPOSURE_TX_POWER")? {
            config.metadata = Metadata::new(DEFAULT_METADATA_VERSION, tx_power);
        }
        Ok(config)
    }

    /// Sets the metadata.
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Pins the start time (see [`PinnedClock`]).
    pub fn start_unix(mut self, seconds: u64) -> Self {
        self.start_unix = Some(seconds);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULER
// ═══════════════════════════════════════════════════════════════════════════════

/// One published payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rotation {
    /// Bucket the advertisement belongs to.
    pub bucket: BucketIndex,
    /// Payload to broadcast until the next rotation.
    pub advertisement: Advertisement,
}

/// Spawns the rotation task.
pub struct RotationScheduler {
    keyring: Arc<KeyRing>,
    config: SchedulerConfig,
    time: Option<Arc<dyn TimeSource>>,
}

impl RotationScheduler {
    /// Creates a scheduler drawing secrets from `keyring`.
    pub fn new(keyring: Arc<KeyRing>, config: SchedulerConfig) -> Self {
        Self {
            keyring,
            config,
            time: None,
        }
    }

    /// Reads time from `time` instead of the configured source.
    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    /// Starts the task on the current tokio runtime.
    ///
    /// # Panics
    /// Outside a tokio runtime.
    #[instrument(skip(self), fields(start_unix = ?self.config.start_unix))]
    pub fn start(self) -> Result<SchedulerHandle> {
        let time = match (self.time, self.config.start_unix) {
            (Some(time), _) => time,
            (None, Some(seconds)) => Arc::new(PinnedClock::starting_at(seconds)),
            (None, None) => Arc::new(SystemClock),
        };

        let (updates_tx, updates_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = RotationTask {
            keyring: self.keyring,
            metadata: self.config.metadata,
            time,
        };

        info!("Starting rotation scheduler");
        let task = tokio::spawn(task.run(updates_tx, shutdown_rx));

        Ok(SchedulerHandle {
            updates: updates_rx,
            shutdown: shutdown_tx,
            task,
        })
    }
}

struct RotationTask {
    keyring: Arc<KeyRing>,
    metadata: Metadata,
    time: Arc<dyn TimeSource>,
}

impl RotationTask {
    fn clock(&self) -> &IntervalClock {
        self.keyring.clock()
    }

    fn rotate(&self, bucket: BucketIndex) -> Result<Rotation> {
        let secret = self.keyring.current_secret(bucket)?;
        let keys = derive_sub_keys(secret.root_secret());
        let advertisement = Advertisement::build(&keys, secret.window(), bucket, &self.metadata)?;
        Ok(Rotation {
            bucket,
            advertisement,
        })
    }

    /// Publishes if the wall clock entered a new bucket, then returns how
    /// long to sleep.
    fn tick(
        &self,
        published: &mut Option<BucketIndex>,
        updates: &watch::Sender<Option<Rotation>>,
    ) -> Result<Duration> {
        let now_millis = self.time.now_millis()?;
        let now_unix = now_millis / 1000;
        let bucket = self.clock().bucket_of_unix(now_unix)?;

        if *published != Some(bucket) {
            let rotation = self.rotate(bucket)?;
            debug!(
                bucket = %rotation.bucket,
                identifier = %rotation.advertisement.identifier,
                "Rotated advertisement"
            );
            updates.send_replace(Some(rotation));
            *published = Some(bucket);
        }

        let next_millis = self.clock().next_boundary_unix(now_unix).saturating_mul(1000);
        let until_boundary = Duration::from_millis(next_millis.saturating_sub(now_millis));
        Ok(until_boundary.min(MAX_SLEEP))
    }

    async fn run(
        self,
        updates: watch::Sender<Option<Rotation>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut published = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = match self.tick(&mut published, &updates) {
                Ok(wait) => wait,
                Err(e) => {
                    warn!(error = %e, "Rotation failed, stopping scheduler");
                    return Err(e);
                }
            };

            tokio::select! {
                _ = sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Rotation scheduler stopped");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle to a running scheduler.
///
/// Dropping the handle also stops the task.
pub struct SchedulerHandle {
    updates: watch::Receiver<Option<Rotation>>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl SchedulerHandle {
    /// Returns a receiver for published rotations.
    pub fn subscribe(&self) -> watch::Receiver<Option<Rotation>> {
        self.updates.clone()
    }

    /// Returns the latest rotation, if any was published yet.
    pub fn current(&self) -> Option<Rotation> {
        *self.updates.borrow()
    }

    /// Waits for the next rotation not yet seen through this handle.
    ///
    /// # Errors
    /// `SchedulerStopped` once the task has exited.
    pub async fn wait_for_rotation(&mut self) -> Result<Rotation> {
        self.updates
            .changed()
            .await
            .map_err(|_| ExposureError::SchedulerStopped)?;
        let rotation = *self.updates.borrow_and_update();
        rotation.ok_or(ExposureError::SchedulerStopped)
    }

    /// Returns true while the task is alive.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Requests shutdown and waits for the task to exit.
    ///
    /// Returns the error that stopped the task early, if any.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.send_replace(true);
        self.task
            .await
            .map_err(|e| ExposureError::TaskFailed(e.to_string()))?
    }
}
