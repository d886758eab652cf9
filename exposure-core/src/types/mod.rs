//! Domain types for exposure notification.
//!
//! This module provides all the core data structures used throughout the protocol:
//!
//! - [`RootSecret`], [`SubKeys`]: Daily secret and its purpose-bound sub-keys
//! - [`BucketIndex`], [`RollingPeriod`], [`ValidityWindow`]: Time buckets
//! - [`Identifier`], [`Metadata`], [`ProtectedMetadata`]: Broadcast payload
//! - [`Observation`]: A locally recorded sighting
//! - [`DailySecret`], [`DiagnosisSecret`]: Bound and disclosed secrets
//! - [`MatchResult`]: Output of the matcher

mod bucket;
mod identifier;
mod keys;
mod matching;
mod observation;
mod secret;

pub use bucket::*;
pub use identifier::*;
pub use keys::*;
pub use matching::*;
pub use observation::*;
pub use secret::*;
