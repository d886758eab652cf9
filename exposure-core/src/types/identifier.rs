//! Broadcast payload types.
//!
//! - [`Identifier`]: 16-byte Rolling Proximity Identifier
//! - [`Metadata`]: 4-byte plaintext associated metadata
//! - [`ProtectedMetadata`]: 4-byte encrypted metadata bound to one identifier

use serde::{Deserialize, Serialize};

use crate::constants::{IDENTIFIER_SIZE, METADATA_SIZE};
use crate::error::{ExposureError, Result};

macro_rules! hex_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIER
// ═══════════════════════════════════════════════════════════════════════════════

/// Rolling Proximity Identifier broadcast during one bucket.
///
/// A deterministic function of (identifier key, bucket); unlinkable across
/// buckets without the key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    bytes: [u8; IDENTIFIER_SIZE],
}

impl Identifier {
    /// Creates an identifier from raw bytes.
    ///
    /// # Errors
    /// Returns `InvalidKeyLength` unless exactly 16 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; IDENTIFIER_SIZE] =
            bytes.try_into().map_err(|_| ExposureError::InvalidKeyLength {
                expected: IDENTIFIER_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes })
    }

    /// Creates an identifier from a fixed-size array.
    pub const fn from_array(bytes: [u8; IDENTIFIER_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; IDENTIFIER_SIZE] {
        &self.bytes
    }

    /// Returns the hex-encoded identifier.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Creates an identifier from a hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 4 bytes are enough to tell identifiers apart in logs
        write!(f, "Identifier({}..)", hex::encode(&self.bytes[..4]))
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

hex_serde!(Identifier);

// ═══════════════════════════════════════════════════════════════════════════════
// METADATA
// ═══════════════════════════════════════════════════════════════════════════════

/// Plaintext associated metadata.
///
/// Byte 0 carries the protocol version, byte 1 the transmit power level in
/// dBm; bytes 2 and 3 are reserved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Metadata {
    bytes: [u8; METADATA_SIZE],
}

impl Metadata {
    /// Builds metadata from a version byte and transmit power.
    pub fn new(version: u8, tx_power: i8) -> Self {
        Self {
            bytes: [version, tx_power.to_le_bytes()[0], 0, 0],
        }
    }

    /// Creates metadata from a fixed-size array.
    pub const fn from_array(bytes: [u8; METADATA_SIZE]) -> Self {
        Self { bytes }
    }

    /// Creates metadata from raw bytes.
    ///
    /// # Errors
    /// Returns `InvalidKeyLength` unless exactly 4 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; METADATA_SIZE] =
            bytes.try_into().map_err(|_| ExposureError::InvalidKeyLength {
                expected: METADATA_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes })
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; METADATA_SIZE] {
        &self.bytes
    }

    /// Protocol version byte.
    pub fn version(&self) -> u8 {
        self.bytes[0]
    }

    /// Transmit power level in dBm.
    pub fn tx_power(&self) -> i8 {
        i8::from_le_bytes([self.bytes[1]])
    }

    /// Returns the hex-encoded metadata.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Creates metadata from a hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

hex_serde!(Metadata);

/// Associated Encrypted Metadata.
///
/// Carries no integrity tag: decrypting with the wrong key or identifier
/// yields garbage rather than an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProtectedMetadata {
    bytes: [u8; METADATA_SIZE],
}

impl ProtectedMetadata {
    /// Creates protected metadata from a fixed-size array.
    pub const fn from_array(bytes: [u8; METADATA_SIZE]) -> Self {
        Self { bytes }
    }

    /// Creates protected metadata from raw bytes.
    ///
    /// # Errors
    /// Returns `InvalidKeyLength` unless exactly 4 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; METADATA_SIZE] =
            bytes.try_into().map_err(|_| ExposureError::InvalidKeyLength {
                expected: METADATA_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes })
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; METADATA_SIZE] {
        &self.bytes
    }

    /// Returns the hex-encoded ciphertext.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Creates protected metadata from a hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

hex_serde!(ProtectedMetadata);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_hex_roundtrip() {
        let id = Identifier::from_hex("2cfab68c3ff177c321d5b82d68fedf32").unwrap();
        assert_eq!(id.to_hex(), "2cfab68c3ff177c321d5b82d68fedf32");
        assert_eq!(id.to_string(), id.to_hex());
    }

    #[test]
    fn test_identifier_wrong_size() {
        assert!(matches!(
            Identifier::from_bytes(&[0u8; 20]),
            Err(ExposureError::InvalidKeyLength {
                expected: 16,
                actual: 20
            })
        ));
        assert!(Identifier::from_hex("zz").is_err());
    }

    #[test]
    fn test_identifier_debug_is_short() {
        let id = Identifier::from_array([0xAB; IDENTIFIER_SIZE]);
        assert_eq!(format!("{:?}", id), "Identifier(abababab..)");
    }

    #[test]
    fn test_identifier_serde() {
        let id = Identifier::from_array([7; IDENTIFIER_SIZE]);
        let json = serde_json::to_string(&id).unwrap();
        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_metadata_fields() {
        let metadata = Metadata::new(0x40, -8);
        assert_eq!(metadata.version(), 0x40);
        assert_eq!(metadata.tx_power(), -8);
        assert_eq!(metadata.as_bytes(), &[0x40, 0xF8, 0x00, 0x00]);
    }

    #[test]
    fn test_protected_metadata_wrong_size() {
        assert!(ProtectedMetadata::from_bytes(&[1, 2, 3]).is_err());
        assert!(ProtectedMetadata::from_hex("1d20f31e").is_ok());
    }
}
