//! Daily root secrets held by the broadcasting device.
//!
//! The key ring creates one root secret per rolling period on first use,
//! keeps it for the retention horizon, and exports the retained secrets as
//! diagnosis disclosures when the owner chooses to share them.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use parking_lot::RwLock;
use rand::{CryptoRng, RngCore};
use tracing::{debug, info, instrument};

use exposure_core::error::Result;
use exposure_core::types::{
    BucketIndex, DailySecret, DiagnosisSecret, RollingPeriod, RootSecret,
};
use exposure_core::IntervalClock;
use exposure_crypto::{generate_root_secret, generate_root_secret_with};

/// Root secrets keyed by the first bucket of their validity window.
///
/// All methods take `&self`; the ring can be shared behind an `Arc`.
#[derive(Debug)]
pub struct KeyRing {
    clock: IntervalClock,
    secrets: RwLock<BTreeMap<BucketIndex, DailySecret>>,
}

impl KeyRing {
    /// Creates an empty key ring.
    pub fn new(clock: IntervalClock) -> Self {
        Self {
            clock,
            secrets: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the clock the ring aligns windows with.
    pub fn clock(&self) -> &IntervalClock {
        &self.clock
    }

    /// Returns the secret valid during `bucket`, creating it if needed.
    ///
    /// Creating a secret also drops secrets past the retention horizon.
    pub fn current_secret(&self, bucket: BucketIndex) -> Result<DailySecret> {
        self.current_or_insert(bucket, generate_root_secret)
    }

    /// Like [`current_secret`](Self::current_secret) with a caller-supplied CSPRNG.
    pub fn current_secret_with<R: RngCore + CryptoRng>(
        &self,
        bucket: BucketIndex,
        rng: &mut R,
    ) -> Result<DailySecret> {
        self.current_or_insert(bucket, || generate_root_secret_with(rng))
    }

    fn current_or_insert(
        &self,
        bucket: BucketIndex,
        generate: impl FnOnce() -> RootSecret,
    ) -> Result<DailySecret> {
        let window = self.clock.window_containing(bucket)?;

        if let Some(secret) = self.secrets.read().get(&window.day_start()) {
            return Ok(secret.clone());
        }

        let secret = match self.secrets.write().entry(window.day_start()) {
            Entry::Occupied(existing) => return Ok(existing.get().clone()),
            Entry::Vacant(slot) => slot.insert(DailySecret::new(generate(), window)).clone(),
        };

        info!(day_start = %window.day_start(), "Created daily root secret");
        self.prune(bucket);
        Ok(secret)
    }

    /// Adds a secret, e.g. when restoring from backup.
    ///
    /// Replaces any secret with the same window start.
    pub fn insert(&self, secret: DailySecret) {
        self.secrets
            .write()
            .insert(secret.window().day_start(), secret);
    }

    /// Drops secrets whose window started more than the retention horizon
    /// before `now`. Returns how many were dropped.
    #[instrument(skip(self))]
    pub fn prune(&self, now: BucketIndex) -> usize {
        let horizon = now.value().saturating_sub(self.clock.retention_buckets());
        let mut secrets = self.secrets.write();
        let before = secrets.len();
        secrets.retain(|day_start, _| day_start.value() >= horizon);
        let dropped = before - secrets.len();
        if dropped > 0 {
            debug!(dropped, "Pruned expired root secrets");
        }
        dropped
    }

    /// Returns the retained secrets, oldest first.
    pub fn secrets(&self) -> Vec<DailySecret> {
        self.secrets.read().values().cloned().collect()
    }

    /// Returns the number of retained secrets.
    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    /// Returns true if no secret is retained.
    pub fn is_empty(&self) -> bool {
        self.secrets.read().is_empty()
    }

    /// Exports retained secrets for disclosure, oldest first.
    ///
    /// Secrets whose window has not started yet are skipped. The secret in
    /// use at `now` is cut short so that it only covers buckets already
    /// broadcast: its rolling period becomes `now - day_start + 1`.
    pub fn export_diagnosis(&self, now: BucketIndex) -> Result<Vec<DiagnosisSecret>> {
        let secrets = self.secrets.read();
        let mut exported = Vec::with_capacity(secrets.len());

        for secret in secrets.values() {
            let window = secret.window();
            if window.day_start() > now {
                continue;
            }
            if window.contains(now) {
                let elapsed = RollingPeriod::new(window.offset_of(now)? + 1)?;
                exported.push(secret.truncated(elapsed)?.to_diagnosis());
            } else {
                exported.push(secret.to_diagnosis());
            }
        }

        Ok(exported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::types::ValidityWindow;
    use exposure_core::ProtocolConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    const DAY_START: u32 = 2_648_448;

    fn ring() -> KeyRing {
        KeyRing::new(IntervalClock::default())
    }

    #[test]
    fn test_same_day_same_secret() {
        let ring = ring();
        let morning = ring.current_secret(BucketIndex::new(DAY_START + 1)).unwrap();
        let evening = ring.current_secret(BucketIndex::new(DAY_START + 143)).unwrap();
        assert_eq!(morning, evening);
        assert_eq!(morning.window().day_start(), BucketIndex::new(DAY_START));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_new_day_new_secret() {
        let ring = ring();
        let today = ring.current_secret(BucketIndex::new(DAY_START + 143)).unwrap();
        let tomorrow = ring.current_secret(BucketIndex::new(DAY_START + 144)).unwrap();
        assert_ne!(today.root_secret(), tomorrow.root_secret());
        assert_eq!(tomorrow.window().day_start(), BucketIndex::new(DAY_START + 144));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_seeded_generation() {
        let mut rng_a = ChaCha20Rng::seed_from_u64(1);
        let mut rng_b = ChaCha20Rng::seed_from_u64(1);
        let a = ring()
            .current_secret_with(BucketIndex::new(DAY_START), &mut rng_a)
            .unwrap();
        let b = ring()
            .current_secret_with(BucketIndex::new(DAY_START), &mut rng_b)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_retention() {
        let ring = ring();
        for day in 0..20u32 {
            ring.current_secret(BucketIndex::new(DAY_START + day * 144)).unwrap();
        }

        // Today plus the 14 days before it
        assert_eq!(ring.len(), 15);
        let oldest = ring.secrets()[0].window().day_start();
        assert_eq!(oldest, BucketIndex::new(DAY_START + 5 * 144));
    }

    #[test]
    fn test_shorter_retention() {
        let clock = IntervalClock::new(&ProtocolConfig::new().retention_days(2)).unwrap();
        let ring = KeyRing::new(clock);
        for day in 0..5u32 {
            ring.current_secret(BucketIndex::new(DAY_START + day * 144)).unwrap();
        }
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_export_truncates_current_day() {
        let ring = ring();
        ring.current_secret(BucketIndex::new(DAY_START)).unwrap();
        ring.current_secret(BucketIndex::new(DAY_START + 144)).unwrap();

        let now = BucketIndex::new(DAY_START + 144 + 87);
        let exported = ring.export_diagnosis(now).unwrap();

        assert_eq!(exported.len(), 2);
        assert_eq!(exported[0].day_start, DAY_START);
        assert_eq!(exported[0].rolling_period, 144);
        assert_eq!(exported[1].day_start, DAY_START + 144);
        assert_eq!(exported[1].rolling_period, 88);

        // Exports validate back into usable secrets
        for disclosure in &exported {
            assert!(disclosure.validate().is_ok());
        }
    }

    #[test]
    fn test_export_skips_future_windows() {
        let ring = ring();
        let root = RootSecret::from_array([9u8; 16]);
        let future = ValidityWindow::full_day(BucketIndex::new(DAY_START + 144)).unwrap();
        ring.insert(DailySecret::new(root, future));

        assert!(ring.export_diagnosis(BucketIndex::new(DAY_START)).unwrap().is_empty());
    }

    #[test]
    fn test_insert_is_used_by_current_secret() {
        let ring = ring();
        let root = RootSecret::from_array([7u8; 16]);
        let window = ValidityWindow::full_day(BucketIndex::new(DAY_START)).unwrap();
        ring.insert(DailySecret::new(root.clone(), window));

        let current = ring.current_secret(BucketIndex::new(DAY_START + 50)).unwrap();
        assert_eq!(current.root_secret(), &root);
    }
}
