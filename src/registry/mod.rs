//! Asset and wallet issuance plus authenticated lookups.

use tracing::{debug, info};

use crate::config::LedgerConfig;
use crate::credential::{authenticate, digest};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::ChaincodeStub;
use crate::model::{parse_stakeholders, Asset, Record, Wallet};

/// Checks arity, then that every argument is non-empty.
pub(crate) fn require_args(args: &[String], expected: usize) -> LedgerResult<()> {
    if args.len() != expected {
        return Err(LedgerError::Arity {
            expected,
            actual: args.len(),
        });
    }
    if let Some(idx) = args.iter().position(|a| a.is_empty()) {
        return Err(LedgerError::EmptyArgument { position: idx + 1 });
    }
    Ok(())
}

pub(crate) fn read_record<R: Record>(
    stub: &mut dyn ChaincodeStub,
    key: &str,
) -> LedgerResult<Option<(R, Vec<u8>)>> {
    match stub.get_state(key)? {
        Some(bytes) => Ok(Some((R::decode(key, &bytes)?, bytes))),
        None => Ok(None),
    }
}

pub(crate) fn load_record<R: Record>(stub: &mut dyn ChaincodeStub, key: &str) -> LedgerResult<R> {
    read_record::<R>(stub, key)?
        .map(|(record, _)| record)
        .ok_or_else(|| LedgerError::NotFound {
            kind: R::KIND,
            name: key.to_string(),
        })
}

pub(crate) fn write_record<R: Record>(stub: &mut dyn ChaincodeStub, record: &R) -> LedgerResult<()> {
    let bytes = record.encode()?;
    stub.put_state(record.key(), bytes)?;
    Ok(())
}

// Assets and wallets share one key space, so any existing record is a clash.
fn ensure_vacant(stub: &mut dyn ChaincodeStub, kind: &'static str, name: &str) -> LedgerResult<()> {
    if stub.get_state(name)?.is_some() {
        return Err(LedgerError::DuplicateKey {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn parse_amount(raw: &str, what: &str) -> LedgerResult<f64> {
    let value: f64 = raw
        .parse()
        .map_err(|_| LedgerError::Validation(format!("{what} must be a numeric string, got {raw:?}")))?;
    if !value.is_finite() {
        return Err(LedgerError::Validation(format!("{what} must be finite, got {raw:?}")));
    }
    Ok(value)
}

pub(crate) fn parse_price(raw: &str) -> LedgerResult<f64> {
    parse_amount(raw, "price")
}

/// `createAsset(name, secret, ownerName, ownerInfo, stakeholdersJSON)`
pub fn create_asset(
    stub: &mut dyn ChaincodeStub,
    config: &LedgerConfig,
    args: &[String],
) -> LedgerResult<()> {
    require_args(args, 5)?;
    let name = &args[0];
    ensure_vacant(stub, Asset::KIND, name)?;

    let stakeholders = parse_stakeholders(&args[4])?;
    let asset = Asset {
        name: name.clone(),
        credential_digest: digest(&args[1]),
        owner: args[2].clone(),
        owner_info: args[3].clone(),
        stakeholders,
    };
    let sum = asset.fraction_sum();
    debug!(asset = %name, sum, "stakeholder fraction sum");
    if !config.accepts_fraction_sum(sum) {
        return Err(LedgerError::Validation(format!(
            "sum of fractional distribution among stakeholders should be 1, got {sum}"
        )));
    }

    write_record(stub, &asset)?;
    info!(asset = %name, stakeholders = asset.stakeholders.len(), "asset created");
    Ok(())
}

/// `getAsset(name, secret)`: the stored record bytes, unchanged.
pub fn get_asset(stub: &mut dyn ChaincodeStub, args: &[String]) -> LedgerResult<Vec<u8>> {
    require_args(args, 2)?;
    get_authenticated::<Asset>(stub, &args[0], &args[1], |a| a.credential_digest.as_str())
}

/// `createWallet(name, secret, ownerName, balance)`
pub fn create_wallet(stub: &mut dyn ChaincodeStub, args: &[String]) -> LedgerResult<()> {
    require_args(args, 4)?;
    let name = &args[0];
    ensure_vacant(stub, Wallet::KIND, name)?;
    let balance = parse_amount(&args[3], "balance")?;
    if balance < 0.0 {
        return Err(LedgerError::Validation(format!(
            "opening balance must not be negative, got {balance}"
        )));
    }
    let wallet = Wallet {
        name: name.clone(),
        owner: args[2].clone(),
        balance,
        credential_digest: digest(&args[1]),
    };
    write_record(stub, &wallet)?;
    info!(wallet = %name, balance, "wallet created");
    Ok(())
}

/// `getWallet(name, secret)`: the stored record bytes, unchanged.
pub fn get_wallet(stub: &mut dyn ChaincodeStub, args: &[String]) -> LedgerResult<Vec<u8>> {
    require_args(args, 2)?;
    get_authenticated::<Wallet>(stub, &args[0], &args[1], |w| w.credential_digest.as_str())
}

fn get_authenticated<R: Record>(
    stub: &mut dyn ChaincodeStub,
    name: &str,
    secret: &str,
    stored_digest: impl Fn(&R) -> &str,
) -> LedgerResult<Vec<u8>> {
    let (record, bytes) = read_record::<R>(stub, name)?.ok_or_else(|| LedgerError::NotFound {
        kind: R::KIND,
        name: name.to_string(),
    })?;
    if !authenticate(stored_digest(&record), secret) {
        return Err(LedgerError::Authentication(format!("{} {name}", R::KIND)));
    }
    Ok(bytes)
}
