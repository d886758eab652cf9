//! # Exposure Notification Broadcast Side
//!
//! Everything a device needs to emit rolling identifiers.
//!
//! This crate provides:
//!
//! - **Key Ring**: One root secret per rolling period, retained for the
//!   retention horizon and exportable as diagnosis disclosures
//! - **Advertisement**: The 20-byte identifier plus protected metadata payload
//! - **Rotation Scheduler**: A tokio task publishing a fresh advertisement at
//!   every bucket boundary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use exposure_broadcast::{KeyRing, RotationScheduler, SchedulerConfig};
//! use exposure_core::IntervalClock;
//!
//! # async fn run() -> exposure_core::Result<()> {
//! let ring = Arc::new(KeyRing::new(IntervalClock::default()));
//! let mut handle = RotationScheduler::new(ring.clone(), SchedulerConfig::from_env()?).start()?;
//!
//! let rotation = handle.wait_for_rotation().await?;
//! let payload = rotation.advertisement.to_bytes();
//! // ... hand payload to the radio
//!
//! // Later, after a positive diagnosis
//! let disclosures = ring.export_diagnosis(rotation.bucket)?;
//! handle.shutdown().await?;
//! # let _ = (payload, disclosures);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod advertisement;
pub mod keyring;
pub mod scheduler;

pub use advertisement::Advertisement;
pub use keyring::KeyRing;
pub use scheduler::{
    PinnedClock, Rotation, RotationScheduler, SchedulerConfig, SchedulerHandle, SystemClock,
    TimeSource,
};
