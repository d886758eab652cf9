//! File-based observation store with persistence.
//!
//! Keeps observations in memory and writes them to a single file with
//! automatic saves. Suitable for a single device that must survive restarts.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use exposure_core::error::{ExposureError, Result};
use exposure_core::traits::ObservationStore;
use exposure_core::types::{Identifier, Observation, ObservationStats};

use crate::MemoryObservationStore;

/// File-based observation store.
///
/// Uses a memory store internally with periodic persistence to disk.
///
/// # File Format
///
/// ```text
/// magic (4 bytes): "EXPO"
/// version (1 byte): 1
/// count (8 bytes, LE): number of observations
/// observations (variable): JSON array
/// ```
///
/// # Concurrency
///
/// Saves are serialized. Each save snapshots the change counter before it
/// snapshots the observations, so a write racing a save leaves the store
/// dirty and is picked up by the next save or `flush`.
pub struct FileObservationStore {
    /// Path to the storage file
    path: PathBuf,
    /// In-memory storage
    memory: MemoryObservationStore,
    /// Bumped after every change to `memory`
    generation: AtomicU64,
    /// Generation covered by the last successful save
    saved_generation: AtomicU64,
    /// Auto-save threshold (save after N writes)
    auto_save_threshold: u64,
    /// Writes since last save
    writes_since_save: AtomicU64,
    /// Held for the whole of a file write
    save_lock: Mutex<()>,
    /// Suffix for temporary files
    temp_seq: AtomicU64,
}

/// File format magic bytes
const MAGIC: &[u8; 4] = b"EXPO";
/// Current file format version
const VERSION: u8 = 1;
/// magic + version + count
const HEADER_LEN: usize = 13;

impl FileObservationStore {
    /// Opens the store at `path`.
    ///
    /// If the file exists it is loaded. Otherwise the store starts empty and
    /// the file is created on first save.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            memory: MemoryObservationStore::new(),
            generation: AtomicU64::new(0),
            saved_generation: AtomicU64::new(0),
            auto_save_threshold: 100,
            writes_since_save: AtomicU64::new(0),
            save_lock: Mutex::new(()),
            temp_seq: AtomicU64::new(0),
        };

        if fs::try_exists(&store.path).await? {
            store.load().await?;
        }

        Ok(store)
    }

    /// Opens the store with a custom auto-save threshold.
    pub async fn with_auto_save(path: impl AsRef<Path>, threshold: u64) -> Result<Self> {
        let mut store = Self::new(path).await?;
        store.auto_save_threshold = threshold;
        Ok(store)
    }

    #[instrument(skip(self))]
    async fn load(&self) -> Result<()> {
        let mut file = fs::File::open(&self.path).await.map_err(|e| {
            ExposureError::StoreUnavailable(format!("failed to open store file: {e}"))
        })?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await?;

        let observations = decode(&contents)?;
        info!(count = observations.len(), "Loading observations from file");

        self.memory.import(observations)?;
        self.saved_generation
            .store(self.generation.load(Ordering::SeqCst), Ordering::SeqCst);
        debug!("Store loaded successfully");

        Ok(())
    }

    /// Writes every observation to the file.
    ///
    /// The file is replaced atomically: contents go to a temporary file
    /// first, which is then renamed over the old one.
    #[instrument(skip(self))]
    pub async fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        self.write_snapshot().await
    }

    /// Checks if there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.generation.load(Ordering::SeqCst) != self.saved_generation.load(Ordering::SeqCst)
    }

    /// Forces a save if dirty.
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        if self.is_dirty() {
            self.write_snapshot().await?;
        }
        Ok(())
    }

    /// Caller holds `save_lock`.
    async fn write_snapshot(&self) -> Result<()> {
        // Read before the observations: later changes keep the store dirty
        let generation = self.generation.load(Ordering::SeqCst);
        self.writes_since_save.store(0, Ordering::SeqCst);

        let observations = self.memory.all_observations();
        info!(count = observations.len(), path = ?self.path, "Saving store to file");

        let contents = encode(&observations)?;

        let temp_path = self.temp_path();
        let written: Result<()> = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&contents).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &self.path).await?;
            Ok(())
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                debug!(error = %cleanup, "No temporary file to remove");
            }
            return Err(e);
        }

        self.saved_generation.fetch_max(generation, Ordering::SeqCst);
        debug!("Store saved successfully");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.{seq}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }

    fn mark_changed(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the underlying memory store for direct access.
    pub fn memory(&self) -> &MemoryObservationStore {
        &self.memory
    }

    /// Returns statistics.
    pub fn stats(&self) -> ObservationStats {
        self.memory.stats()
    }

    /// Returns the number of observations.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// A failed save is logged and retried by later writes; the write
    /// itself already succeeded in memory.
    async fn maybe_auto_save(&self) {
        let writes = self.writes_since_save.fetch_add(1, Ordering::SeqCst);
        if writes >= self.auto_save_threshold {
            if let Err(e) = self.flush().await {
                warn!(error = %e, path = ?self.path, "Auto-save failed, changes kept in memory");
            }
        }
    }
}

impl Drop for FileObservationStore {
    fn drop(&mut self) {
        // Drop cannot await a save.
        if self.is_dirty() {
            warn!("FileObservationStore dropped with unsaved changes");
        }
    }
}

fn encode(observations: &[Observation]) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(observations)?;

    let mut contents = Vec::with_capacity(HEADER_LEN + body.len());
    contents.extend_from_slice(MAGIC);
    contents.push(VERSION);
    contents.extend_from_slice(&(observations.len() as u64).to_le_bytes());
    contents.extend_from_slice(&body);
    Ok(contents)
}

fn decode(contents: &[u8]) -> Result<Vec<Observation>> {
    if contents.len() < HEADER_LEN {
        return Err(ExposureError::StoreUnavailable("store file too short".into()));
    }

    if &contents[0..4] != MAGIC {
        return Err(ExposureError::StoreUnavailable("invalid magic bytes".into()));
    }

    let version = contents[4];
    if version != VERSION {
        return Err(ExposureError::VersionMismatch {
            expected: VERSION,
            actual: version,
        });
    }

    let mut count = [0u8; 8];
    count.copy_from_slice(&contents[5..HEADER_LEN]);
    let count = u64::from_le_bytes(count);

    let body = &contents[HEADER_LEN..];
    let observations: Vec<Observation> = if body.is_empty() {
        Vec::new()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| ExposureError::StoreUnavailable(format!("corrupt store body: {e}")))?
    };

    if observations.len() as u64 != count {
        return Err(ExposureError::StoreUnavailable(format!(
            "header promises {count} observations, body holds {}",
            observations.len()
        )));
    }

    Ok(observations)
}

#[async_trait]
impl ObservationStore for FileObservationStore {
    async fn put(&self, observation: Observation) -> Result<()> {
        self.memory.put(observation).await?;
        self.mark_changed();
        self.maybe_auto_save().await;
        Ok(())
    }

    async fn query(&self, identifier: &Identifier) -> Result<Vec<Observation>> {
        self.memory.query(identifier).await
    }

    async fn purge_older_than(&self, horizon_unix: u64) -> Result<usize> {
        let purged = self.memory.purge_older_than(horizon_unix).await?;
        if purged > 0 {
            self.mark_changed();
        }
        Ok(purged)
    }

    async fn count(&self) -> Result<u64> {
        self.memory.count().await
    }
}
