//! Daily secrets and their disclosure format.
//!
//! A [`DailySecret`] binds a root secret to the bucket range it may be used
//! for. A [`DiagnosisSecret`] is the untrusted ingestion form of a disclosed
//! secret; it must be validated into a `DailySecret` before any key is derived
//! from it.

use serde::{Deserialize, Serialize};

use crate::error::{ExposureError, Result};
use crate::types::{BucketIndex, RollingPeriod, RootSecret, ValidityWindow};

/// A root secret together with its validity window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DailySecret {
    root_secret: RootSecret,
    window: ValidityWindow,
}

impl DailySecret {
    /// Binds a root secret to a validity window.
    pub fn new(root_secret: RootSecret, window: ValidityWindow) -> Self {
        Self { root_secret, window }
    }

    /// The root secret.
    pub fn root_secret(&self) -> &RootSecret {
        &self.root_secret
    }

    /// The buckets this secret may be applied to.
    pub fn window(&self) -> &ValidityWindow {
        &self.window
    }

    /// Returns a copy valid only for the first `rolling_period` buckets.
    ///
    /// Used when a secret is disclosed before its day ends.
    pub fn truncated(&self, rolling_period: RollingPeriod) -> Result<Self> {
        let period = rolling_period.min(self.window.rolling_period());
        Ok(Self {
            root_secret: self.root_secret.clone(),
            window: ValidityWindow::new(self.window.day_start(), period)?,
        })
    }

    /// Converts into the disclosure format.
    pub fn to_diagnosis(&self) -> DiagnosisSecret {
        DiagnosisSecret {
            root_secret: self.root_secret.to_hex(),
            day_start: self.window.day_start().value(),
            rolling_period: self.window.rolling_period().get(),
        }
    }
}

/// A disclosed root secret as it arrives from a distribution server.
///
/// All three fields are required. Nothing here is trusted until
/// [`DiagnosisSecret::validate`] succeeds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisSecret {
    /// Hex-encoded 16-byte root secret
    pub root_secret: String,
    /// First bucket the secret was valid for
    pub day_start: u32,
    /// Number of buckets the secret was valid for
    pub rolling_period: u32,
}

impl DiagnosisSecret {
    /// Creates a disclosure record.
    pub fn new(root_secret: impl Into<String>, day_start: u32, rolling_period: u32) -> Self {
        Self {
            root_secret: root_secret.into(),
            day_start,
            rolling_period,
        }
    }

    /// Validates the record and returns the bound secret.
    ///
    /// # Errors
    /// - `InvalidRollingPeriod` if the period is outside `[1, 144]`
    /// - `HexError` / `InvalidKeyLength` if the secret is malformed
    /// - `BucketOutOfRange` if the window overflows
    pub fn validate(&self) -> Result<DailySecret> {
        let rolling_period = RollingPeriod::new(self.rolling_period)?;
        let root_secret = RootSecret::from_hex(&self.root_secret)?;
        let window = ValidityWindow::new(BucketIndex::new(self.day_start), rolling_period)?;
        Ok(DailySecret::new(root_secret, window))
    }
}

impl TryFrom<DiagnosisSecret> for DailySecret {
    type Error = ExposureError;

    fn try_from(disclosure: DiagnosisSecret) -> Result<Self> {
        disclosure.validate()
    }
}

impl TryFrom<&DiagnosisSecret> for DailySecret {
    type Error = ExposureError;

    fn try_from(disclosure: &DiagnosisSecret) -> Result<Self> {
        disclosure.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_HEX: &str = "9749a68e0faefda5ff56041123050c63";

    #[test]
    fn test_valid_disclosure() {
        let disclosure = DiagnosisSecret::new(SECRET_HEX, 2_648_448, 144);
        let secret = disclosure.validate().unwrap();
        assert_eq!(secret.window().day_start(), BucketIndex::new(2_648_448));
        assert_eq!(secret.window().rolling_period().get(), 144);
        assert_eq!(secret.to_diagnosis(), disclosure);
    }

    #[test]
    fn test_disclosure_rejects_bad_rolling_period() {
        for period in [0, 145, 1000] {
            let result = DiagnosisSecret::new(SECRET_HEX, 2_648_448, period).validate();
            assert!(matches!(result, Err(ExposureError::InvalidRollingPeriod { .. })));
        }
    }

    #[test]
    fn test_disclosure_rejects_bad_secret() {
        let short = DiagnosisSecret::new("9749a68e", 0, 144).validate();
        assert!(matches!(short, Err(ExposureError::InvalidKeyLength { .. })));

        let not_hex = DiagnosisSecret::new("not hex at all", 0, 144).validate();
        assert!(matches!(not_hex, Err(ExposureError::HexError(_))));
    }

    #[test]
    fn test_disclosure_json_requires_all_fields() {
        let json = format!(r#"{{"root_secret":"{SECRET_HEX}","day_start":2648448}}"#);
        assert!(serde_json::from_str::<DiagnosisSecret>(&json).is_err());

        let json = format!(r#"{{"root_secret":"{SECRET_HEX}","day_start":2648448,"rolling_period":72}}"#);
        let disclosure: DiagnosisSecret = serde_json::from_str(&json).unwrap();
        assert_eq!(disclosure.rolling_period, 72);
    }

    #[test]
    fn test_truncated_never_extends() {
        let secret = DiagnosisSecret::new(SECRET_HEX, 100, 50).validate().unwrap();
        let shorter = secret.truncated(RollingPeriod::new(10).unwrap()).unwrap();
        assert_eq!(shorter.window().rolling_period().get(), 10);

        let same = secret.truncated(RollingPeriod::FULL_DAY).unwrap();
        assert_eq!(same.window().rolling_period().get(), 50);
    }
}
