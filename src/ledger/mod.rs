mod lock;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::StoreError;

pub use lock::StateLock;

pub type Key = String;
/// Commit height at which a key was last written; 0 means never written.
pub type Version = u64;

/// Key-value view handed to an invocation.
///
/// Everything the registry and the purchase engine do goes through this trait,
/// so any store that provides per-invocation isolation and an all-or-nothing
/// commit can sit underneath.
pub trait ChaincodeStub {
    /// Returns `Ok(None)` for an absent key; `Err` only for store failures.
    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stages a write that becomes visible only if the invocation commits.
    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub version: Version,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub height: u64,
    pub entries: BTreeMap<Key, Entry>,
    pub state_root: String,
}

#[derive(Default)]
struct LedgerState {
    height: u64,
    entries: BTreeMap<Key, Entry>,
    /// Height of the snapshot file this state was loaded from or last saved to.
    base_height: u64,
}

#[derive(Deserialize)]
struct SnapshotHeight {
    height: u64,
}

/// In-memory versioned store with optimistic read-set validation at commit.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("ledger state lock poisoned".into()))
    }

    /// Opens a fresh invocation against the current committed state.
    pub fn begin(&self) -> TxContext<'_> {
        TxContext {
            ledger: self,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Applies `tx`'s writes iff nothing it read has changed since.
    pub fn commit(&self, tx: TxContext<'_>) -> Result<u64, StoreError> {
        if !std::ptr::eq(tx.ledger, self) {
            return Err(StoreError::Backend(
                "context was opened on a different ledger".into(),
            ));
        }
        let mut state = self.lock()?;
        for (key, read) in &tx.reads {
            let committed = state.entries.get(key).map_or(0, |e| e.version);
            if committed != *read {
                return Err(StoreError::Conflict {
                    key: key.clone(),
                    read: *read,
                    committed,
                });
            }
        }
        if tx.writes.is_empty() {
            return Ok(state.height);
        }
        state.height += 1;
        let height = state.height;
        for (key, value) in tx.writes {
            state.entries.insert(
                key,
                Entry {
                    version: height,
                    value,
                },
            );
        }
        debug!(height, "committed write set");
        Ok(height)
    }

    /// Committed value of `key`, outside any invocation.
    pub fn committed(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.entries.get(key).map(|e| e.value.clone()))
    }

    pub fn height(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.height)
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot, StoreError> {
        let state = self.lock()?;
        Ok(LedgerSnapshot {
            height: state.height,
            entries: state.entries.clone(),
            state_root: hex::encode(compute_state_root(&state.entries)),
        })
    }

    pub fn restore(snapshot: LedgerSnapshot) -> Result<Self, StoreError> {
        let root = hex::encode(compute_state_root(&snapshot.entries));
        if root != snapshot.state_root {
            return Err(StoreError::Snapshot(format!(
                "state root mismatch: recorded {}, computed {root}",
                snapshot.state_root
            )));
        }
        if let Some((key, _)) = snapshot
            .entries
            .iter()
            .find(|(_, e)| e.version == 0 || e.version > snapshot.height)
        {
            return Err(StoreError::Snapshot(format!(
                "entry {key} has a version outside 1..={}",
                snapshot.height
            )));
        }
        Ok(Self {
            state: Mutex::new(LedgerState {
                height: snapshot.height,
                entries: snapshot.entries,
                base_height: snapshot.height,
            }),
        })
    }

    /// Loads a snapshot file; a missing file yields an empty ledger.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = fs::read(path)?;
        let snapshot: LedgerSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))?;
        Self::restore(snapshot)
    }

    /// Writes the snapshot over `path` iff the file still holds the height this
    /// ledger was loaded from. The file is replaced atomically.
    ///
    /// Callers sharing one file across processes should hold a [`StateLock`]
    /// from load to save; the height check alone turns a lost race into
    /// [`StoreError::Conflict`] instead of a silent overwrite.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let on_disk = file_height(path)?;
        if on_disk != state.base_height {
            return Err(StoreError::Conflict {
                key: path.display().to_string(),
                read: state.base_height,
                committed: on_disk,
            });
        }
        if state.height == on_disk && path.exists() {
            return Ok(());
        }

        let snapshot = LedgerSnapshot {
            height: state.height,
            entries: state.entries.clone(),
            state_root: hex::encode(compute_state_root(&state.entries)),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StoreError::Snapshot(e.to_string()))?;
        let dir = parent_dir(path);
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

        state.base_height = state.height;
        debug!(height = state.height, path = %path.display(), "snapshot saved");
        Ok(())
    }
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

// Height recorded in the snapshot file; 0 when there is no file yet.
fn file_height(path: &Path) -> Result<u64, StoreError> {
    if !path.exists() {
        return Ok(0);
    }
    let bytes = fs::read(path)?;
    let recorded: SnapshotHeight = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))?;
    Ok(recorded.height)
}

/// One invocation's view of a [`MemoryLedger`]: committed reads, buffered writes.
pub struct TxContext<'a> {
    ledger: &'a MemoryLedger,
    reads: BTreeMap<Key, Version>,
    writes: BTreeMap<Key, Vec<u8>>,
}

impl TxContext<'_> {
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }
}

impl ChaincodeStub for TxContext<'_> {
    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let ledger = self.ledger;
        let state = ledger.lock()?;
        let entry = state.entries.get(key);
        let version = entry.map_or(0, |e| e.version);
        self.reads.entry(key.to_string()).or_insert(version);
        debug!(key, version, "read");
        Ok(entry.map(|e| e.value.clone()))
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::Backend("empty key".into()));
        }
        self.writes.insert(key.to_string(), value);
        Ok(())
    }
}

fn compute_state_root(entries: &BTreeMap<Key, Entry>) -> [u8; 32] {
    let leaves: Vec<[u8; 32]> = entries
        .iter()
        .map(|(key, entry)| -> [u8; 32] {
            let mut hasher = Sha256::new();
            hasher.update(b"entry");
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update(entry.version.to_le_bytes());
            hasher.update(&entry.value);
            hasher.finalize().into()
        })
        .collect();
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"stake-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
