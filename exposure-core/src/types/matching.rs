//! Match results produced by the matcher.

use crate::types::{BucketIndex, Identifier, Metadata, Observation, RootSecret};

/// One stored observation explained by a disclosed root secret.
///
/// Produced only by the matcher and never persisted. `metadata` comes from an
/// unauthenticated decryption: it is only meaningful because `identifier` was
/// found in the store for exactly `bucket`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchResult {
    /// The disclosed secret that produced the identifier
    pub root_secret: RootSecret,
    /// The identifier that was found in the store
    pub identifier: Identifier,
    /// Bucket the identifier was generated for
    pub bucket: BucketIndex,
    /// Offset of `bucket` inside the secret's validity window
    pub offset: u32,
    /// Decrypted associated metadata
    pub metadata: Metadata,
    /// The stored observation that matched
    pub observation: Observation,
}
