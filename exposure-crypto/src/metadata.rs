//! Associated metadata protection.
//!
//! ```text
//! protected = AES-128-CTR(metadata_key, counter = identifier, metadata)
//! ```
//!
//! Using the identifier as the initial counter binds the ciphertext to one
//! bucket. There is no authentication tag: [`reveal_metadata`] returns bytes
//! for any input, and they only mean something after the identifier has been
//! confirmed for that exact bucket.

use exposure_core::types::{Identifier, Metadata, ProtectedMetadata, SubKeys};

use crate::primitives::ctr_apply_keystream;

/// Encrypts metadata for broadcast alongside `identifier`.
///
/// Only the metadata key is read.
pub fn protect_metadata(
    keys: &SubKeys,
    identifier: &Identifier,
    plaintext: &Metadata,
) -> ProtectedMetadata {
    let mut bytes = *plaintext.as_bytes();
    ctr_apply_keystream(keys.metadata_key().as_bytes(), identifier.as_bytes(), &mut bytes);
    ProtectedMetadata::from_array(bytes)
}

/// Decrypts metadata received alongside `identifier`.
///
/// Never fails. The result is unauthenticated.
pub fn reveal_metadata(
    keys: &SubKeys,
    identifier: &Identifier,
    ciphertext: &ProtectedMetadata,
) -> Metadata {
    let mut bytes = *ciphertext.as_bytes();
    ctr_apply_keystream(keys.metadata_key().as_bytes(), identifier.as_bytes(), &mut bytes);
    Metadata::from_array(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::types::{BucketIndex, RootSecret, ValidityWindow};
    use proptest::prelude::*;
    use test_case::test_case;

    use crate::identifier::{generate_identifier, identifiers_for_window};
    use crate::schedule::derive_sub_keys;

    const ROOT_HEX: &str = "9749a68e0faefda5ff56041123050c63";

    fn reference_keys() -> SubKeys {
        derive_sub_keys(&RootSecret::from_hex(ROOT_HEX).unwrap())
    }

    #[test_case(2_648_535, "1d20f31e" ; "first reference bucket")]
    #[test_case(2_648_536, "6621c561" ; "second reference bucket")]
    fn test_known_answer_metadata(bucket: u32, expected: &str) {
        let keys = reference_keys();
        let window = ValidityWindow::full_day(BucketIndex::new(2_648_448)).unwrap();
        let identifier = generate_identifier(&keys, &window, BucketIndex::new(bucket)).unwrap();

        let plaintext = Metadata::from_hex("40080000").unwrap();
        let protected = protect_metadata(&keys, &identifier, &plaintext);
        assert_eq!(protected.to_hex(), expected);
        assert_eq!(reveal_metadata(&keys, &identifier, &protected), plaintext);
    }

    #[test]
    fn test_same_plaintext_differs_across_identifiers() {
        let keys = reference_keys();
        let plaintext = Metadata::new(0x40, -8);
        let a = protect_metadata(&keys, &Identifier::from_array([1u8; 16]), &plaintext);
        let b = protect_metadata(&keys, &Identifier::from_array([2u8; 16]), &plaintext);
        assert_ne!(a, b);
    }

    #[test]
    fn test_cross_bucket_reveal_is_garbage() {
        let keys = reference_keys();
        let window = ValidityWindow::full_day(BucketIndex::new(2_648_448)).unwrap();
        let identifiers: Vec<Identifier> = identifiers_for_window(&keys, &window)
            .map(|(_, identifier)| identifier)
            .collect();
        let plaintexts = [
            Metadata::new(0x40, 8),
            Metadata::new(0x40, -20),
            Metadata::from_array([0; 4]),
            Metadata::from_array([0xff; 4]),
        ];

        let mut samples = 0usize;
        let mut confused = 0usize;
        for (b2, protected_under) in identifiers.iter().enumerate() {
            for step in [1, 7, 71, 143] {
                let revealed_under = &identifiers[(b2 + step) % identifiers.len()];
                for plaintext in &plaintexts {
                    let protected = protect_metadata(&keys, protected_under, plaintext);
                    if reveal_metadata(&keys, revealed_under, &protected) == *plaintext {
                        confused += 1;
                    }
                    samples += 1;
                }
            }
        }

        // 2304 samples against a 2^-32 chance each
        assert_eq!(samples, 144 * 4 * 4);
        assert!(confused <= 1, "{confused} of {samples} revealed the plaintext");
    }

    proptest! {
        #[test]
        fn prop_reveal_inverts_protect(
            root in any::<[u8; 16]>(),
            identifier in any::<[u8; 16]>(),
            metadata in any::<[u8; 4]>(),
        ) {
            let keys = derive_sub_keys(&RootSecret::from_array(root));
            let identifier = Identifier::from_array(identifier);
            let plaintext = Metadata::from_array(metadata);

            let protected = protect_metadata(&keys, &identifier, &plaintext);
            prop_assert_eq!(reveal_metadata(&keys, &identifier, &protected), plaintext);
        }
    }
}
