use thiserror::Error;

/// Failure raised by the ledger state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not serve a read or accept a write.
    #[error("store backend failure: {0}")]
    Backend(String),

    /// A key read during the invocation was committed by someone else first.
    #[error("read conflict on key {key}: read version {read}, committed version {committed}")]
    Conflict {
        key: String,
        read: u64,
        committed: u64,
    },

    /// Snapshot file could not be read or written.
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot contents are malformed or do not match their state root.
    #[error("snapshot rejected: {0}")]
    Snapshot(String),
}

/// Coarse classification of a [`LedgerError`], stable for callers to match on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Arity,
    EmptyArgument,
    Validation,
    DuplicateKey,
    NotFound,
    Authentication,
    InsufficientFunds,
    Store,
    CorruptRecord,
    UnknownFunction,
}

/// Canonical error type returned by every ledger operation.
///
/// All variants are terminal for the invocation that produced them.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("incorrect number of arguments: expecting {expected}, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("{} argument must be a non-empty string", ordinal(.position))]
    EmptyArgument { position: usize },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} {name} already exists")]
    DuplicateKey { kind: &'static str, name: String },

    #[error("{kind} {name} does not exist")]
    NotFound { kind: &'static str, name: String },

    #[error("credential rejected for {0}")]
    Authentication(String),

    #[error("insufficient balance in wallet {wallet}: have {available}, price {price}")]
    InsufficientFunds {
        wallet: String,
        available: f64,
        price: f64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("record under key {key} is corrupt: {source}")]
    CorruptRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Received unknown function invocation: {0}")]
    UnknownFunction(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Arity { .. } => ErrorKind::Arity,
            LedgerError::EmptyArgument { .. } => ErrorKind::EmptyArgument,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Authentication(_) => ErrorKind::Authentication,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::Store(_) => ErrorKind::Store,
            LedgerError::CorruptRecord { .. } => ErrorKind::CorruptRecord,
            LedgerError::UnknownFunction(_) => ErrorKind::UnknownFunction,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// 1-based position rendered the way argument errors are reported to callers.
fn ordinal(position: &usize) -> String {
    let position = *position;
    let suffix = match (position % 10, position % 100) {
        (1, n) if n != 11 => "st",
        (2, n) if n != 12 => "nd",
        (3, n) if n != 13 => "rd",
        _ => "th",
    };
    format!("{position}{suffix}")
}
