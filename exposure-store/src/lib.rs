//! # Exposure Store
//!
//! Observation storage for the receiving side of exposure notification.
//!
//! This crate provides two backends for [`ObservationStore`]:
//!
//! - **Memory**: Fast in-memory storage for development and testing
//! - **File**: Persistent file-based storage for a single device
//!
//! ## Example
//!
//! ```rust,ignore
//! use exposure_store::{MemoryObservationStore, ObservationStore};
//!
//! let store = MemoryObservationStore::new();
//!
//! // Record a sighting
//! store.put(observation).await?;
//!
//! // Look it up by identifier
//! let seen = store.query(&identifier).await?;
//!
//! // Drop anything older than the retention horizon
//! store.purge_older_than(cutoff).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod file;
mod memory;

pub use file::FileObservationStore;
pub use memory::MemoryObservationStore;

// Re-export the trait from core
pub use exposure_core::traits::ObservationStore;
