//! Key schedule: root secret to purpose-bound sub-keys.
//!
//! ## Derivation Flow
//!
//! ```text
//! root_secret
//!       ↓
//! HKDF-SHA256(salt = ∅, ikm = root_secret, info = "EN-RPIK") → identifier key (16 bytes)
//! HKDF-SHA256(salt = ∅, ikm = root_secret, info = "EN-AEMK") → metadata key   (16 bytes)
//! ```
//!
//! Distinct info labels keep the two keys independent even though they come
//! from the same root.

use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use exposure_core::constants::{
    IDENTIFIER_KEY_INFO, METADATA_KEY_INFO, ROOT_SECRET_SIZE, SUB_KEY_SIZE,
};
use exposure_core::error::Result;
use exposure_core::types::{IdentifierKey, MetadataKey, RootSecret, SubKeys};

use crate::primitives::{derive_key, secure_random_bytes};

/// Derives the identifier and metadata keys from a root secret.
pub fn derive_sub_keys(root: &RootSecret) -> SubKeys {
    let mut id_bytes: [u8; SUB_KEY_SIZE] = derive_key(None, root.as_bytes(), IDENTIFIER_KEY_INFO);
    let mut md_bytes: [u8; SUB_KEY_SIZE] = derive_key(None, root.as_bytes(), METADATA_KEY_INFO);

    let keys = SubKeys::new(
        IdentifierKey::from_array(id_bytes),
        MetadataKey::from_array(md_bytes),
    );

    id_bytes.zeroize();
    md_bytes.zeroize();
    keys
}

/// Derives sub-keys from raw root secret bytes.
///
/// # Errors
/// `InvalidKeyLength` unless exactly 16 bytes are given.
pub fn derive_sub_keys_from_slice(bytes: &[u8]) -> Result<SubKeys> {
    let root = RootSecret::from_bytes(bytes)?;
    Ok(derive_sub_keys(&root))
}

/// Generates a fresh root secret from the operating system CSPRNG.
pub fn generate_root_secret() -> RootSecret {
    let mut bytes: [u8; ROOT_SECRET_SIZE] = secure_random_bytes();
    let secret = RootSecret::from_array(bytes);
    bytes.zeroize();
    secret
}

/// Generates a root secret from a caller-supplied CSPRNG.
pub fn generate_root_secret_with<R: RngCore + CryptoRng>(rng: &mut R) -> RootSecret {
    let mut bytes = [0u8; ROOT_SECRET_SIZE];
    rng.fill_bytes(&mut bytes);
    let secret = RootSecret::from_array(bytes);
    bytes.zeroize();
    secret
}
