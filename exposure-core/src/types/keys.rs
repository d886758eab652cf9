//! Key types for exposure notification.
//!
//! This module defines the key structures used in the protocol:
//!
//! - [`RootSecret`]: Daily random secret (16 bytes, zeroized on drop)
//! - [`IdentifierKey`]: Sub-key that only the identifier generator reads
//! - [`MetadataKey`]: Sub-key that only the metadata protector reads
//! - [`SubKeys`]: The pair derived from one root secret
//!
//! The two sub-keys are distinct types so that handing the metadata key to
//! the identifier generator (or the reverse) does not compile.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{ROOT_SECRET_SIZE, SUB_KEY_SIZE};
use crate::error::{ExposureError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// ROOT SECRET
// ═══════════════════════════════════════════════════════════════════════════════

/// Daily root secret (Temporary Exposure Key).
///
/// Chosen uniformly at random once per day. Stays on the device until the
/// owner discloses it as a diagnosis secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootSecret {
    bytes: [u8; ROOT_SECRET_SIZE],
}

impl RootSecret {
    /// Creates a root secret from raw bytes.
    ///
    /// # Errors
    /// Returns `InvalidKeyLength` unless exactly 16 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; ROOT_SECRET_SIZE] =
            bytes.try_into().map_err(|_| ExposureError::InvalidKeyLength {
                expected: ROOT_SECRET_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes })
    }

    /// Creates a root secret from a fixed-size array.
    pub fn from_array(bytes: [u8; ROOT_SECRET_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the raw bytes.
    ///
    /// # Security
    /// Handle the returned bytes carefully - do not log them.
    pub fn as_bytes(&self) -> &[u8; ROOT_SECRET_SIZE] {
        &self.bytes
    }

    /// Returns the hex-encoded secret, the form used in diagnosis disclosures.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Creates a root secret from a hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

impl PartialEq for RootSecret {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for RootSecret {}

impl std::fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RootSecret([REDACTED])")
    }
}

impl Serialize for RootSecret {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RootSecret {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SUB-KEYS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rolling Proximity Identifier Key: AES-128 key for identifier generation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct IdentifierKey {
    bytes: [u8; SUB_KEY_SIZE],
}

impl IdentifierKey {
    /// Wraps derived key material.
    pub fn from_array(bytes: [u8; SUB_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SUB_KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for IdentifierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentifierKey([REDACTED])")
    }
}

/// Associated Encrypted Metadata Key: AES-128 key for metadata protection.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MetadataKey {
    bytes: [u8; SUB_KEY_SIZE],
}

impl MetadataKey {
    /// Wraps derived key material.
    pub fn from_array(bytes: [u8; SUB_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SUB_KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for MetadataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MetadataKey([REDACTED])")
    }
}

/// The purpose-bound pair derived from exactly one root secret.
///
/// Never persisted; recompute it from the root secret when needed.
#[derive(Clone, Debug)]
pub struct SubKeys {
    identifier_key: IdentifierKey,
    metadata_key: MetadataKey,
}

impl SubKeys {
    /// Creates a sub-key pair.
    pub fn new(identifier_key: IdentifierKey, metadata_key: MetadataKey) -> Self {
        Self {
            identifier_key,
            metadata_key,
        }
    }

    /// Key for identifier generation.
    pub fn identifier_key(&self) -> &IdentifierKey {
        &self.identifier_key
    }

    /// Key for metadata protection.
    pub fn metadata_key(&self) -> &MetadataKey {
        &self.metadata_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_secret_from_bytes() {
        let bytes = [42u8; ROOT_SECRET_SIZE];
        let secret = RootSecret::from_bytes(&bytes).unwrap();
        assert_eq!(secret.as_bytes(), &bytes);
    }

    #[test]
    fn test_root_secret_wrong_size() {
        let result = RootSecret::from_bytes(&[0u8; 15]);
        assert!(matches!(
            result,
            Err(ExposureError::InvalidKeyLength {
                expected: 16,
                actual: 15
            })
        ));

        let result = RootSecret::from_bytes(&[0u8; 32]);
        assert!(matches!(result, Err(ExposureError::InvalidKeyLength { actual: 32, .. })));
    }

    #[test]
    fn test_root_secret_hex_roundtrip() {
        let secret = RootSecret::from_hex("9749a68e0faefda5ff56041123050c63").unwrap();
        assert_eq!(secret.to_hex(), "9749a68e0faefda5ff56041123050c63");
    }

    #[test]
    fn test_root_secret_debug_redacted() {
        let secret = RootSecret::from_array([0xAB; ROOT_SECRET_SIZE]);
        let debug = format!("{:?}", secret);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("ab"));
    }

    #[test]
    fn test_root_secret_serde() {
        let secret = RootSecret::from_array([0x12; ROOT_SECRET_SIZE]);
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, format!("\"{}\"", "12".repeat(ROOT_SECRET_SIZE)));
        let back: RootSecret = serde_json::from_str(&json).unwrap();
        assert_eq!(secret, back);
    }

    #[test]
    fn test_sub_key_debug_redacted() {
        let keys = SubKeys::new(
            IdentifierKey::from_array([1; SUB_KEY_SIZE]),
            MetadataKey::from_array([2; SUB_KEY_SIZE]),
        );
        let debug = format!("{:?}", keys);
        assert!(debug.contains("IdentifierKey([REDACTED])"));
        assert!(debug.contains("MetadataKey([REDACTED])"));
    }
}
