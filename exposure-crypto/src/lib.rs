//! # Exposure Cryptography
//!
//! Cryptographic core of the exposure notification protocol.
//!
//! This crate provides:
//!
//! - **Primitives**: AES-128 block encryption, AES-128-CTR, HKDF-SHA256, OS randomness
//! - **Schedule**: Root secret to identifier key and metadata key
//! - **Identifier**: Per-bucket rolling identifiers
//! - **Metadata**: Identifier-bound encryption of broadcast metadata
//!
//! ## Security Properties
//!
//! - Root secrets and sub-keys are zeroized on drop
//! - Identifier and metadata keys are separate types, each read by one module only
//! - Bucket range is validated before any cipher call
//! - Metadata is NOT authenticated
//!
//! ## Example
//!
//! ```rust
//! use exposure_core::{BucketIndex, Metadata, ValidityWindow};
//! use exposure_crypto::{
//!     derive_sub_keys, generate_identifier, generate_root_secret, protect_metadata,
//!     reveal_metadata,
//! };
//!
//! let root = generate_root_secret();
//! let keys = derive_sub_keys(&root);
//! let window = ValidityWindow::full_day(BucketIndex::new(2_648_448)).unwrap();
//!
//! let bucket = BucketIndex::new(2_648_535);
//! let identifier = generate_identifier(&keys, &window, bucket).unwrap();
//!
//! let metadata = Metadata::new(0x40, 8);
//! let protected = protect_metadata(&keys, &identifier, &metadata);
//! assert_eq!(reveal_metadata(&keys, &identifier, &protected), metadata);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod identifier;
pub mod metadata;
pub mod primitives;
pub mod schedule;

// Re-export main functions at crate root
pub use identifier::{
    encode_bucket_block, generate_identifier, identifiers_for_window, WindowIdentifiers,
};
pub use metadata::{protect_metadata, reveal_metadata};
pub use primitives::{block_encrypt, ctr_apply_keystream, derive_key, secure_random_bytes};
pub use schedule::{
    derive_sub_keys, derive_sub_keys_from_slice, generate_root_secret, generate_root_secret_with,
};
