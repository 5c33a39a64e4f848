//! Persistent Store - durable entity records with an audit trail
//!
//! Backed by sled with two trees:
//!
//! ```text
//! storage: "{kind}:{id}"      -> [version][msgpack record]
//! audit:   seq (u64, BE)      -> [version][msgpack AuditEntry]
//! ```
//!
//! Every mutation goes through [`Store::apply`], which writes the records and
//! their audit entries in one multi-tree transaction.

pub mod records;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use std::path::Path;
use tracing::{debug, info};

use crate::error::StoreError;

pub use records::{
    AppData, Balance, Canister, Entity, EntityKind, SyncStatus, TxKind, VaultTransaction,
};

/// Version tag prefixed to every stored value.
const RECORD_VERSION: u8 = 1;

/// Kind of change recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOp {
    Put,
    Delete,
}

/// One entry of the append-only audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    /// RFC3339 wall-clock time of the mutation
    pub timestamp: String,
    pub kind: String,
    pub id: String,
    pub op: AuditOp,
    /// Encoded record for puts
    pub record: Option<Vec<u8>>,
}

/// A pending write, applied atomically with its siblings by [`Store::apply`].
#[derive(Debug, Clone)]
pub enum Mutation {
    Put {
        kind: EntityKind,
        id: String,
        value: Vec<u8>,
    },
    Delete {
        kind: EntityKind,
        id: String,
    },
}

impl Mutation {
    pub fn put<T: Entity>(record: &T) -> Result<Self, StoreError> {
        Ok(Self::Put {
            kind: T::KIND,
            id: record.entity_id(),
            value: encode(record)?,
        })
    }

    pub fn delete<T: Entity>(id: &str) -> Self {
        Self::Delete {
            kind: T::KIND,
            id: id.to_string(),
        }
    }

    fn key(&self) -> String {
        match self {
            Self::Put { kind, id, .. } | Self::Delete { kind, id } => storage_key(*kind, id),
        }
    }
}

/// Durable record store
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    storage: sled::Tree,
    audit: sled::Tree,
}

impl Store {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = sled::Config::new().path(path).open()?;
        let storage = db.open_tree("storage")?;
        let audit = db.open_tree("audit")?;

        info!(
            path = %path.display(),
            records = storage.len(),
            audit_entries = audit.len(),
            "Store opened"
        );

        Ok(Self { db, storage, audit })
    }

    /// Open a throwaway in-memory store.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        let storage = db.open_tree("storage")?;
        let audit = db.open_tree("audit")?;
        Ok(Self { db, storage, audit })
    }

    pub fn get<T: Entity>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let key = storage_key(T::KIND, id);
        match self.storage.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains<T: Entity>(&self, id: &str) -> Result<bool, StoreError> {
        let key = storage_key(T::KIND, id);
        Ok(self.storage.contains_key(key.as_bytes())?)
    }

    /// Create or overwrite a record.
    pub fn put<T: Entity>(&self, record: &T) -> Result<(), StoreError> {
        self.apply(vec![Mutation::put(record)?])?;
        Ok(())
    }

    /// Delete a record, returning whether it existed.
    pub fn delete<T: Entity>(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.apply(vec![Mutation::delete::<T>(id)])? == 1)
    }

    /// Lazily iterate every record of one kind. Order is key order, which
    /// callers must not rely on.
    pub fn iter<T: Entity>(&self) -> impl Iterator<Item = Result<T, StoreError>> {
        let prefix = format!("{}:", T::KIND);
        self.storage.scan_prefix(prefix.as_bytes()).map(|item| {
            let (key, value) = item?;
            decode(&String::from_utf8_lossy(&key), &value)
        })
    }

    /// Collect every record of one kind.
    pub fn all<T: Entity>(&self) -> Result<Vec<T>, StoreError> {
        self.iter::<T>().collect()
    }

    /// Apply mutations atomically, returning how many records changed.
    /// Deletes of absent records are no-ops and leave no audit entry.
    pub fn apply(&self, mutations: Vec<Mutation>) -> Result<usize, StoreError> {
        if mutations.is_empty() {
            return Ok(0);
        }

        // Audit ids are reserved up front so transaction retries reuse them.
        let mut seqs = Vec::with_capacity(mutations.len());
        for _ in &mutations {
            seqs.push(self.db.generate_id()?);
        }
        let timestamp = chrono::Utc::now().to_rfc3339();

        let result = (&self.storage, &self.audit).transaction(|(storage, audit)| {
            let mut changed = 0usize;
            for (mutation, seq) in mutations.iter().zip(&seqs) {
                let key = mutation.key();
                let entry = match mutation {
                    Mutation::Put { kind, id, value } => {
                        storage.insert(key.as_bytes(), value.as_slice())?;
                        AuditEntry {
                            seq: *seq,
                            timestamp: timestamp.clone(),
                            kind: kind.to_string(),
                            id: id.clone(),
                            op: AuditOp::Put,
                            record: Some(value.clone()),
                        }
                    }
                    Mutation::Delete { kind, id } => {
                        if storage.remove(key.as_bytes())?.is_none() {
                            continue;
                        }
                        AuditEntry {
                            seq: *seq,
                            timestamp: timestamp.clone(),
                            kind: kind.to_string(),
                            id: id.clone(),
                            op: AuditOp::Delete,
                            record: None,
                        }
                    }
                };
                let encoded = encode(&entry).map_err(ConflictableTransactionError::Abort)?;
                audit.insert(&seq.to_be_bytes()[..], encoded)?;
                changed += 1;
            }
            Ok(changed)
        });

        match result {
            Ok(changed) => {
                debug!(mutations = mutations.len(), changed, "Store mutations applied");
                Ok(changed)
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StoreError::Database(e)),
        }
    }

    /// Newest audit entries first.
    pub fn audit_tail(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let mut entries = Vec::new();
        for item in self.audit.iter().rev().take(limit) {
            let (key, value) = item?;
            let key = format!("audit:{}", seq_from_key(&key)?);
            entries.push(decode(&key, &value)?);
        }
        Ok(entries)
    }

    pub fn audit_len(&self) -> usize {
        self.audit.len()
    }

    /// Flush changes to disk
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

fn storage_key(kind: EntityKind, id: &str) -> String {
    format!("{}:{}", kind, id)
}

fn seq_from_key(key: &[u8]) -> Result<u64, StoreError> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("audit key of {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let body =
        rmp_serde::to_vec_named(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let mut bytes = Vec::with_capacity(body.len() + 1);
    bytes.push(RECORD_VERSION);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StoreError> {
    match bytes.split_first() {
        Some((&RECORD_VERSION, body)) => {
            rmp_serde::from_slice(body).map_err(|e| StoreError::Serialization(e.to_string()))
        }
        Some((&found, _)) => Err(StoreError::Version {
            key: key.to_string(),
            found,
        }),
        None => Err(StoreError::Corrupt(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn balance(principal: &str, amount: i128) -> Balance {
        Balance {
            principal_id: principal.to_string(),
            amount,
        }
    }

    #[test]
    fn test_put_get_delete() {
        let store = Store::temporary().unwrap();

        store.put(&balance("alice", -500)).unwrap();
        let loaded: Balance = store.get("alice").unwrap().unwrap();
        assert_eq!(loaded.amount, -500);
        assert!(store.contains::<Balance>("alice").unwrap());

        assert!(store.delete::<Balance>("alice").unwrap());
        assert!(store.get::<Balance>("alice").unwrap().is_none());
        assert!(!store.delete::<Balance>("alice").unwrap());
    }

    #[test]
    fn test_kinds_are_isolated() {
        let store = Store::temporary().unwrap();
        store.put(&balance("100", 1)).unwrap();
        store
            .put(&VaultTransaction {
                id: 100,
                principal_from: "a".into(),
                principal_to: "b".into(),
                amount: 1,
                timestamp: 0,
                kind: TxKind::Transfer,
            })
            .unwrap();

        assert_eq!(store.all::<Balance>().unwrap().len(), 1);
        assert_eq!(store.all::<VaultTransaction>().unwrap().len(), 1);
        assert!(store.all::<Canister>().unwrap().is_empty());
    }

    #[test]
    fn test_audit_trail_records_puts_and_deletes() {
        let store = Store::temporary().unwrap();
        store.put(&balance("alice", 1)).unwrap();
        store.put(&balance("alice", 2)).unwrap();
        store.delete::<Balance>("alice").unwrap();
        store.delete::<Balance>("nobody").unwrap();

        assert_eq!(store.audit_len(), 3);
        let tail = store.audit_tail(10).unwrap();
        assert_eq!(tail[0].op, AuditOp::Delete);
        assert_eq!(tail[1].op, AuditOp::Put);
        assert_eq!(tail[2].kind, "balance");
        assert!(tail[0].seq > tail[1].seq);
        assert!(tail[1].record.is_some());
    }

    #[test]
    fn test_apply_is_all_or_nothing_per_batch() {
        let store = Store::temporary().unwrap();
        let changed = store
            .apply(vec![
                Mutation::put(&balance("alice", -5)).unwrap(),
                Mutation::put(&balance("vault", 5)).unwrap(),
                Mutation::delete::<Balance>("ghost"),
            ])
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(store.all::<Balance>().unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_version_tag_is_rejected() {
        let err = decode::<Balance>("balance:x", &[9, 1, 2]).unwrap_err();
        assert!(matches!(err, StoreError::Version { found: 9, .. }));
        assert!(matches!(
            decode::<Balance>("balance:x", &[]).unwrap_err(),
            StoreError::Corrupt(_)
        ));
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.sled");
        {
            let store = Store::open(&path).unwrap();
            store.put(&balance("alice", i128::MIN + 1)).unwrap();
            store.flush().await.unwrap();
        }
        let store = Store::open(&path).unwrap();
        let loaded: Balance = store.get("alice").unwrap().unwrap();
        assert_eq!(loaded.amount, i128::MIN + 1);
        assert_eq!(store.audit_len(), 1);
    }
}
