use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Default slack allowed between a stakeholder fraction sum and 1.0.
pub const DEFAULT_FRACTION_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// `|sum - 1.0|` must not exceed this. `0.0` demands exact equality.
    pub fraction_tolerance: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fraction_tolerance: DEFAULT_FRACTION_TOLERANCE,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let t = self.fraction_tolerance;
        if !t.is_finite() || !(0.0..1.0).contains(&t) {
            return Err(LedgerError::Validation(format!(
                "fraction_tolerance must be in [0, 1), got {t}"
            )));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self, LedgerError> {
        let config: LedgerConfig = serde_json::from_str(text)
            .map_err(|e| LedgerError::Validation(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let text = fs::read_to_string(path).map_err(|e| {
            LedgerError::Validation(format!("config {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn accepts_fraction_sum(&self, sum: f64) -> bool {
        (sum - 1.0).abs() <= self.fraction_tolerance
    }
}
