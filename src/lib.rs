//! Shared ledger of assets and wallets with a proportional purchase engine.
//!
//! * [`credential`] — unsalted SHA-256 credential digests and verification.
//! * [`model`] — wallet, asset and stakeholder records and their JSON wire form.
//! * [`ledger`] — the store seam ([`ledger::ChaincodeStub`]) and an in-memory
//!   versioned store that commits each invocation atomically or not at all.
//! * [`registry`] — asset and wallet creation plus authenticated lookups.
//! * [`engine`] — `buyAsset`: debit the buyer, credit every stakeholder.
//! * [`chaincode`] — named-function dispatch, one commit per invocation.

pub mod chaincode;
pub mod config;
pub mod credential;
pub mod engine;
pub mod ledger;
pub mod log;
pub mod model;
pub mod registry;

mod error;

pub use chaincode::{Chaincode, Function};
pub use config::LedgerConfig;
pub use error::{ErrorKind, LedgerError, LedgerResult, StoreError};
pub use ledger::{ChaincodeStub, MemoryLedger, TxContext};
