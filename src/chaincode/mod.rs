use std::path::Path;
use std::str::FromStr;

use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::engine::buy_asset;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{ChaincodeStub, MemoryLedger, StateLock};
use crate::registry::{create_asset, create_wallet, get_asset, get_wallet};

/// Named operations reachable through [`Chaincode::invoke`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    CreateAsset,
    GetAsset,
    BuyAsset,
    CreateWallet,
    GetWallet,
}

impl Function {
    pub fn name(self) -> &'static str {
        match self {
            Function::CreateAsset => "createAsset",
            Function::GetAsset => "getAsset",
            Function::BuyAsset => "buyAsset",
            Function::CreateWallet => "createWallet",
            Function::GetWallet => "getWallet",
        }
    }
}

impl FromStr for Function {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createAsset" => Ok(Function::CreateAsset),
            "getAsset" => Ok(Function::GetAsset),
            "buyAsset" => Ok(Function::BuyAsset),
            "createWallet" => Ok(Function::CreateWallet),
            "getWallet" => Ok(Function::GetWallet),
            other => Err(LedgerError::UnknownFunction(other.to_string())),
        }
    }
}

/// Entry point tying the operations to a ledger: one invocation, one commit.
pub struct Chaincode {
    ledger: MemoryLedger,
    config: LedgerConfig,
}

impl Chaincode {
    pub fn new(ledger: MemoryLedger, config: LedgerConfig) -> Self {
        Self { ledger, config }
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    pub fn into_ledger(self) -> MemoryLedger {
        self.ledger
    }

    /// Instantiate/upgrade hook. Nothing to seed or migrate.
    pub fn init(&self) -> LedgerResult<()> {
        info!("chaincode initialised");
        Ok(())
    }

    /// Runs `function` against a fresh context and commits its writes only if
    /// it succeeds. A commit conflict is reported like any other failure.
    pub fn invoke(&self, function: &str, args: &[String]) -> LedgerResult<Option<Vec<u8>>> {
        info!(function, "invoke is running");
        let result = Function::from_str(function).and_then(|f| {
            let mut tx = self.ledger.begin();
            let payload = self.dispatch(&mut tx, f, args)?;
            self.ledger.commit(tx)?;
            Ok(payload)
        });
        if let Err(err) = &result {
            warn!(function, kind = ?err.kind(), "invoke rejected: {err}");
        }
        result
    }

    fn dispatch(
        &self,
        stub: &mut dyn ChaincodeStub,
        function: Function,
        args: &[String],
    ) -> LedgerResult<Option<Vec<u8>>> {
        match function {
            Function::CreateAsset => create_asset(stub, &self.config, args).map(|_| None),
            Function::GetAsset => get_asset(stub, args).map(Some),
            Function::BuyAsset => buy_asset(stub, args).map(|_| None),
            Function::CreateWallet => create_wallet(stub, args).map(|_| None),
            Function::GetWallet => get_wallet(stub, args).map(Some),
        }
    }
}

/// Locks the snapshot file at `path`, loads it, runs `op` and saves the result.
///
/// The file is only rewritten when `op` succeeds; a save that finds the file
/// moved on since load fails with a store conflict.
pub fn with_state_file<T>(
    path: &Path,
    config: LedgerConfig,
    op: impl FnOnce(&Chaincode) -> LedgerResult<T>,
) -> LedgerResult<T> {
    let _lock = StateLock::acquire(path)?;
    let chaincode = Chaincode::new(MemoryLedger::load(path)?, config);
    let out = op(&chaincode)?;
    chaincode.ledger().save(path)?;
    Ok(out)
}
