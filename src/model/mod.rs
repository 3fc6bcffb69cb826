use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

pub type WalletName = String;
pub type AssetName = String;

/// Balance-holding record, stored under its `name`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub name: WalletName,
    pub owner: String,
    pub balance: f64,
    #[serde(rename = "password")]
    pub credential_digest: String,
}

/// One share of an asset's sale proceeds. Embedded by value in [`Asset`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Stakeholder {
    pub fraction: f64,
    #[serde(rename = "walletAddress")]
    pub wallet: WalletName,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub name: AssetName,
    #[serde(rename = "password")]
    pub credential_digest: String,
    #[serde(rename = "Owner")]
    pub owner: String,
    #[serde(rename = "OwnerInfo")]
    pub owner_info: String,
    #[serde(rename = "stakeholder")]
    pub stakeholders: Vec<Stakeholder>,
}

impl Asset {
    pub fn fraction_sum(&self) -> f64 {
        self.stakeholders.iter().map(|s| s.fraction).sum()
    }
}

/// Types persisted in the flat key space.
pub trait Record: Serialize + DeserializeOwned {
    /// Label used in user-facing messages.
    const KIND: &'static str;

    fn key(&self) -> &str;

    fn encode(&self) -> LedgerResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| LedgerError::CorruptRecord {
            key: self.key().to_string(),
            source,
        })
    }

    fn decode(key: &str, bytes: &[u8]) -> LedgerResult<Self> {
        serde_json::from_slice(bytes).map_err(|source| LedgerError::CorruptRecord {
            key: key.to_string(),
            source,
        })
    }
}

impl Record for Wallet {
    const KIND: &'static str = "wallet";

    fn key(&self) -> &str {
        &self.name
    }
}

impl Record for Asset {
    const KIND: &'static str = "asset";

    fn key(&self) -> &str {
        &self.name
    }
}

/// Parses a caller-supplied stakeholder list.
///
/// Only the shape and per-entry ranges are checked here; the fraction sum is
/// checked by the registry against its configured tolerance.
pub fn parse_stakeholders(payload: &str) -> LedgerResult<Vec<Stakeholder>> {
    let stakeholders: Vec<Stakeholder> = serde_json::from_str(payload)
        .map_err(|e| LedgerError::Validation(format!("malformed stakeholder list: {e}")))?;
    for (idx, s) in stakeholders.iter().enumerate() {
        if !s.fraction.is_finite() || s.fraction <= 0.0 || s.fraction > 1.0 {
            return Err(LedgerError::Validation(format!(
                "stakeholder {idx} fraction {} is outside (0, 1]",
                s.fraction
            )));
        }
        if s.wallet.is_empty() {
            return Err(LedgerError::Validation(format!(
                "stakeholder {idx} has an empty wallet address"
            )));
        }
    }
    Ok(stakeholders)
}
