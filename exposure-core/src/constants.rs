//! Protocol constants for exposure notification.
//!
//! Sizes, labels and time constants follow the Exposure Notification
//! cryptography (v1.2) byte for byte. Every interoperating
//! device must agree on these values; a mismatch does not raise an error,
//! it silently produces identifiers that never match.

// ═══════════════════════════════════════════════════════════════════════════════
// KEY AND IDENTIFIER SIZES
// ═══════════════════════════════════════════════════════════════════════════════

/// Size of a daily root secret (Temporary Exposure Key) in bytes.
pub const ROOT_SECRET_SIZE: usize = 16;

/// Size of each derived sub-key in bytes (AES-128 key).
pub const SUB_KEY_SIZE: usize = 16;

/// Size of a rolling identifier in bytes (one AES block).
pub const IDENTIFIER_SIZE: usize = 16;

/// Size of the plaintext and protected metadata in bytes.
pub const METADATA_SIZE: usize = 4;

/// Size of a broadcast advertisement payload: identifier || protected metadata.
pub const ADVERTISEMENT_SIZE: usize = IDENTIFIER_SIZE + METADATA_SIZE;

// ═══════════════════════════════════════════════════════════════════════════════
// TIME BUCKETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Width of one time bucket (interval) in seconds.
pub const SECONDS_PER_INTERVAL: u64 = 600;

/// Number of buckets a root secret stays valid for: one day of 10-minute windows.
pub const MAX_ROLLING_PERIOD: u32 = 144;

/// Minimum rolling period accepted from a disclosure.
pub const MIN_ROLLING_PERIOD: u32 = 1;

/// Default number of days a root secret or observation is retained.
pub const DEFAULT_RETENTION_DAYS: u32 = 14;

/// Seconds in one calendar day.
pub const SECONDS_PER_DAY: u64 = 86_400;

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN SEPARATION LABELS
// ═══════════════════════════════════════════════════════════════════════════════
// HKDF info strings. The identifier key and the metadata key must never share
// a label.

/// HKDF info label for the Rolling Proximity Identifier Key.
pub const IDENTIFIER_KEY_INFO: &[u8] = b"EN-RPIK";

/// HKDF info label for the Associated Encrypted Metadata Key.
pub const METADATA_KEY_INFO: &[u8] = b"EN-AEMK";

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIER BLOCK LAYOUT
// ═══════════════════════════════════════════════════════════════════════════════
// padded_data = "EN-RPI" (6) || 0x00 * 6 || bucket as u32 little-endian (4)

/// Prefix of the padded block encrypted into an identifier.
pub const IDENTIFIER_PAD_PREFIX: &[u8; 6] = b"EN-RPI";

/// Zero padding between the prefix and the bucket index.
pub const IDENTIFIER_PAD_ZEROS: [u8; 6] = [0u8; 6];

/// Byte offset of the little-endian bucket index inside the padded block.
pub const IDENTIFIER_BUCKET_OFFSET: usize = 12;

// ═══════════════════════════════════════════════════════════════════════════════
// OBSERVATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// How far in the future an observation timestamp may be before it is rejected.
pub const MAX_CLOCK_SKEW_SECS: u64 = 3600;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_block_layout_fills_one_aes_block() {
        assert_eq!(
            IDENTIFIER_PAD_PREFIX.len() + IDENTIFIER_PAD_ZEROS.len() + 4,
            IDENTIFIER_SIZE
        );
        assert_eq!(IDENTIFIER_BUCKET_OFFSET, IDENTIFIER_SIZE - 4);
    }

    #[test]
    fn test_rolling_period_covers_one_day() {
        assert_eq!(u64::from(MAX_ROLLING_PERIOD) * SECONDS_PER_INTERVAL, SECONDS_PER_DAY);
    }

    #[test]
    fn test_domain_labels_unique() {
        assert_ne!(IDENTIFIER_KEY_INFO, METADATA_KEY_INFO);
    }

    #[test]
    fn test_advertisement_size() {
        assert_eq!(ADVERTISEMENT_SIZE, 20);
    }
}
