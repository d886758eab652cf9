//! The 20-byte payload broadcast during one bucket.

use exposure_core::constants::{ADVERTISEMENT_SIZE, IDENTIFIER_SIZE};
use exposure_core::error::{ExposureError, Result};
use exposure_core::types::{
    BucketIndex, Identifier, Metadata, Observation, ProtectedMetadata, SubKeys, ValidityWindow,
};
use exposure_crypto::{generate_identifier, protect_metadata};

/// Identifier followed by its protected metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Advertisement {
    /// Rolling identifier for the bucket.
    pub identifier: Identifier,
    /// Metadata encrypted under the identifier.
    pub protected_metadata: ProtectedMetadata,
}

impl Advertisement {
    /// Builds the advertisement for `bucket`.
    ///
    /// # Errors
    /// `BucketOutOfRange` if `bucket` lies outside `window`.
    pub fn build(
        keys: &SubKeys,
        window: &ValidityWindow,
        bucket: BucketIndex,
        metadata: &Metadata,
    ) -> Result<Self> {
        let identifier = generate_identifier(keys, window, bucket)?;
        let protected_metadata = protect_metadata(keys, &identifier, metadata);
        Ok(Self {
            identifier,
            protected_metadata,
        })
    }

    /// Wire encoding: identifier then protected metadata.
    pub fn to_bytes(&self) -> [u8; ADVERTISEMENT_SIZE] {
        let mut out = [0u8; ADVERTISEMENT_SIZE];
        out[..IDENTIFIER_SIZE].copy_from_slice(self.identifier.as_bytes());
        out[IDENTIFIER_SIZE..].copy_from_slice(self.protected_metadata.as_bytes());
        out
    }

    /// Parses a received payload.
    ///
    /// # Errors
    /// `InvalidAdvertisement` unless exactly 20 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ADVERTISEMENT_SIZE {
            return Err(ExposureError::InvalidAdvertisement {
                expected: ADVERTISEMENT_SIZE,
                actual: bytes.len(),
            });
        }
        let (identifier, metadata) = bytes.split_at(IDENTIFIER_SIZE);
        Ok(Self {
            identifier: Identifier::from_bytes(identifier)?,
            protected_metadata: ProtectedMetadata::from_bytes(metadata)?,
        })
    }

    /// Records this advertisement as heard at `received_at` (Unix seconds).
    pub fn observe(&self, received_at: u64) -> Observation {
        Observation::new(self.identifier, self.protected_metadata, received_at)
    }
}
