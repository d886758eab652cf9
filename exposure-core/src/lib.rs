//! # Exposure Core
//!
//! Core types, errors, clock and traits for the exposure notification protocol.
//!
//! This crate provides the foundational building blocks used by all other
//! exposure crates:
//!
//! - **Types**: Root secrets, sub-keys, buckets, identifiers, observations
//! - **Errors**: One error enum with validation/store classification
//! - **Constants**: Protocol sizes and derivation labels
//! - **Clock**: Mapping from wall-clock time to bucket indices
//! - **Config**: Shared protocol parameters
//! - **Traits**: The observation store interface
//!
//! ## Example
//!
//! ```rust
//! use exposure_core::{DiagnosisSecret, IntervalClock};
//!
//! let clock = IntervalClock::default();
//! assert_eq!(clock.bucket_of_unix(1_589_121_000).unwrap().value(), 2_648_535);
//!
//! let disclosure = DiagnosisSecret::new("9749a68e0faefda5ff56041123050c63", 2_648_448, 144);
//! let secret = disclosure.validate().unwrap();
//! assert_eq!(secret.window().rolling_period().get(), 144);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use clock::IntervalClock;
pub use config::ProtocolConfig;
pub use constants::*;
pub use error::{ExposureError, Result};
pub use traits::*;
pub use types::*;
