//! Primitive adapter.
//!
//! Everything above this module sees fixed-size byte arrays only. The
//! concrete algorithms are:
//!
//! - AES-128 single-block encryption
//! - HKDF-SHA256 extract-and-expand
//! - AES-128-CTR with a 128-bit big-endian counter
//! - Operating system randomness

use aes_gcm::aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes_gcm::aes::Aes128;
use ctr::cipher::{InnerIvInit, KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

/// AES block and key size in bytes.
pub const BLOCK_SIZE: usize = 16;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK CIPHER
// ═══════════════════════════════════════════════════════════════════════════════

/// AES-128 key schedule ready to encrypt single blocks.
///
/// Expanding the key once and reusing it is cheaper than calling
/// [`block_encrypt`] in a loop.
#[derive(Clone)]
pub struct BlockEncryptor {
    cipher: Aes128,
}

impl BlockEncryptor {
    /// Expands `key`.
    pub fn new(key: &[u8; BLOCK_SIZE]) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(key)),
        }
    }

    /// Encrypts one block.
    pub fn encrypt(&self, block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let mut buf = GenericArray::clone_from_slice(block);
        self.cipher.encrypt_block(&mut buf);

        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// XORs `data` in place with the CTR keystream starting at `counter`.
    ///
    /// The counter is a 128-bit big-endian integer incremented once per
    /// block, wrapping at 2^128.
    pub fn apply_keystream(&self, counter: &[u8; BLOCK_SIZE], data: &mut [u8]) {
        let mut cipher = Aes128Ctr::from_core(ctr::CtrCore::inner_iv_init(
            self.cipher.clone(),
            counter.into(),
        ));
        cipher.apply_keystream(data);
    }
}

impl std::fmt::Debug for BlockEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockEncryptor([REDACTED])")
    }
}

/// Encrypts a single block under `key` with AES-128.
pub fn block_encrypt(key: &[u8; BLOCK_SIZE], block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    BlockEncryptor::new(key).encrypt(block)
}

/// AES-128-CTR: XORs `data` in place with the keystream for `(key, counter)`.
///
/// Encryption and decryption are the same operation.
pub fn ctr_apply_keystream(key: &[u8; BLOCK_SIZE], counter: &[u8; BLOCK_SIZE], data: &mut [u8]) {
    let mut cipher = Aes128Ctr::new(key.into(), counter.into());
    cipher.apply_keystream(data);
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEY DERIVATION
// ═══════════════════════════════════════════════════════════════════════════════

/// HKDF-SHA256 producing `N` bytes.
///
/// A `None` salt is the RFC 5869 default: a string of zero bytes, which is
/// equivalent to an empty salt.
///
/// # Panics
/// If `N` exceeds 8160 bytes (255 SHA-256 blocks).
pub fn derive_key<const N: usize>(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> [u8; N] {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);

    let mut okm = [0u8; N];
    let Ok(()) = hkdf.expand(info, &mut okm) else {
        unreachable!("HKDF-SHA256 output length {} exceeds 255 blocks", N);
    };
    okm
}

// ═══════════════════════════════════════════════════════════════════════════════
// RANDOMNESS
// ═══════════════════════════════════════════════════════════════════════════════

/// Returns `N` bytes from the operating system CSPRNG.
pub fn secure_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhex<const N: usize>(s: &str) -> [u8; N] {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_aes128_fips197_vector() {
        let key: [u8; 16] = unhex("000102030405060708090a0b0c0d0e0f");
        let block: [u8; 16] = unhex("00112233445566778899aabbccddeeff");
        let expected: [u8; 16] = unhex("69c4e0d86a7b0430d8cdb78070b4c55a");
        assert_eq!(block_encrypt(&key, &block), expected);
    }

    #[test]
    fn test_hkdf_rfc5869_case3() {
        // RFC 5869 test case 3: empty salt, empty info
        let ikm = [0x0bu8; 22];
        let okm: [u8; 42] = derive_key(None, &ikm, b"");
        assert_eq!(
            hex::encode(okm),
            "8da4e775a563c18f715f802a063c5a31b8a11f5c5ee1879ec3454e5f3c738d2d9d201395faa4b61a96c8"
        );

        let okm_empty_salt: [u8; 42] = derive_key(Some(b"".as_slice()), &ikm, b"");
        assert_eq!(okm, okm_empty_salt);
    }

    #[test]
    fn test_ctr_first_block_is_encrypted_counter() {
        let key = [7u8; 16];
        let counter = [9u8; 16];
        let mut data = [0u8; 16];
        ctr_apply_keystream(&key, &counter, &mut data);
        assert_eq!(data, block_encrypt(&key, &counter));
    }

    #[test]
    fn test_ctr_counter_increments_big_endian() {
        let key = [1u8; 16];
        let mut counter = [0u8; 16];
        counter[15] = 0xff;

        let mut data = [0u8; 32];
        ctr_apply_keystream(&key, &counter, &mut data);

        let mut next = [0u8; 16];
        next[14] = 0x01;
        assert_eq!(data[16..], block_encrypt(&key, &next));
    }

    #[test]
    fn test_ctr_counter_wraps() {
        let key = [2u8; 16];
        let mut data = [0u8; 32];
        ctr_apply_keystream(&key, &[0xff; 16], &mut data);
        assert_eq!(data[16..], block_encrypt(&key, &[0u8; 16]));
    }

    #[test]
    fn test_ctr_is_involution() {
        let key = [3u8; 16];
        let counter = [4u8; 16];
        let original = *b"associated metadata, longer than one block";
        let mut data = original;
        ctr_apply_keystream(&key, &counter, &mut data);
        assert_ne!(data, original);
        ctr_apply_keystream(&key, &counter, &mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_ctr_matches_manual_counter_blocks() {
        let key = [5u8; 16];
        let mut counter = [0u8; 16];
        counter[8..].copy_from_slice(&[0xff; 8]);

        let mut data = [0u8; 40];
        ctr_apply_keystream(&key, &counter, &mut data);

        // Carry crosses the 64-bit halves of the counter
        let start = u128::from_be_bytes(counter);
        for (i, chunk) in data.chunks(16).enumerate() {
            let block = block_encrypt(&key, &(start + i as u128).to_be_bytes());
            assert_eq!(chunk, &block[..chunk.len()]);
        }

        let mut reused = [0u8; 40];
        BlockEncryptor::new(&key).apply_keystream(&counter, &mut reused);
        assert_eq!(reused, data);
    }

    #[test]
    fn test_random_bytes_differ() {
        let a: [u8; 16] = secure_random_bytes();
        let b: [u8; 16] = secure_random_bytes();
        assert_ne!(a, b);
    }

    #[test]
    fn test_encryptor_debug_redacted() {
        let debug = format!("{:?}", BlockEncryptor::new(&[0u8; 16]));
        assert!(debug.contains("REDACTED"));
    }
}
