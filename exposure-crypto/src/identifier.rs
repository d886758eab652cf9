//! Rolling identifier generation.
//!
//! Each bucket of a validity window gets its own identifier:
//!
//! ```text
//! padded = "EN-RPI" || 0x000000000000 || bucket (u32 LE)
//! identifier = AES-128(identifier_key, padded)
//! ```
//!
//! The padded block is injective in the bucket and AES is a permutation, so
//! no two buckets of one secret share an identifier.

use exposure_core::constants::{
    IDENTIFIER_BUCKET_OFFSET, IDENTIFIER_PAD_PREFIX, IDENTIFIER_PAD_ZEROS, IDENTIFIER_SIZE,
};
use exposure_core::error::Result;
use exposure_core::types::{BucketIndex, Identifier, IdentifierKey, SubKeys, ValidityWindow};

use crate::primitives::BlockEncryptor;

/// Builds the plaintext block encrypted for `bucket`.
pub fn encode_bucket_block(bucket: BucketIndex) -> [u8; IDENTIFIER_SIZE] {
    let mut block = [0u8; IDENTIFIER_SIZE];
    let zeros_at = IDENTIFIER_PAD_PREFIX.len();
    block[..zeros_at].copy_from_slice(IDENTIFIER_PAD_PREFIX);
    block[zeros_at..IDENTIFIER_BUCKET_OFFSET].copy_from_slice(&IDENTIFIER_PAD_ZEROS);
    block[IDENTIFIER_BUCKET_OFFSET..].copy_from_slice(&bucket.to_le_bytes());
    block
}

/// Generates the identifier broadcast during `bucket`.
///
/// Only the identifier key is read.
///
/// # Errors
/// `BucketOutOfRange` if `bucket` is outside `window`. Checked before any
/// cipher call.
pub fn generate_identifier(
    keys: &SubKeys,
    window: &ValidityWindow,
    bucket: BucketIndex,
) -> Result<Identifier> {
    window.offset_of(bucket)?;
    Ok(encrypt_bucket(
        &BlockEncryptor::new(keys.identifier_key().as_bytes()),
        bucket,
    ))
}

/// Lazily generates every identifier of `window` in increasing bucket order.
///
/// The key schedule is expanded once for the whole window.
pub fn identifiers_for_window(keys: &SubKeys, window: &ValidityWindow) -> WindowIdentifiers {
    WindowIdentifiers::new(keys.identifier_key(), *window)
}

fn encrypt_bucket(cipher: &BlockEncryptor, bucket: BucketIndex) -> Identifier {
    Identifier::from_array(cipher.encrypt(&encode_bucket_block(bucket)))
}

/// Iterator over `(bucket, identifier)` pairs of one validity window.
#[derive(Clone, Debug)]
pub struct WindowIdentifiers {
    cipher: BlockEncryptor,
    window: ValidityWindow,
    next_offset: u32,
}

impl WindowIdentifiers {
    fn new(key: &IdentifierKey, window: ValidityWindow) -> Self {
        Self {
            cipher: BlockEncryptor::new(key.as_bytes()),
            window,
            next_offset: 0,
        }
    }

    /// The window being iterated.
    pub fn window(&self) -> &ValidityWindow {
        &self.window
    }

    fn remaining(&self) -> usize {
        (self.window.rolling_period().get() - self.next_offset) as usize
    }
}

impl Iterator for WindowIdentifiers {
    type Item = (BucketIndex, Identifier);

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = self.window.bucket_at(self.next_offset).ok()?;
        self.next_offset += 1;
        Some((bucket, encrypt_bucket(&self.cipher, bucket)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WindowIdentifiers {}

impl std::iter::FusedIterator for WindowIdentifiers {}
