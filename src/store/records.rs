//! Persisted entity records
//!
//! Each record type knows its [`EntityKind`] and its identity inside that kind.
//! The store keys every record as `{kind}:{id}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of the AppData singleton.
pub const APP_DATA_ID: &str = "main";

/// Canister role bound to the ICRC ledger.
pub const LEDGER_CANISTER: &str = "ckBTC ledger";

/// Canister role bound to the ICRC indexer.
pub const INDEXER_CANISTER: &str = "ckBTC indexer";

/// Roles accepted by `set_canister` and the init bindings.
pub const KNOWN_CANISTERS: [&str; 2] = [LEDGER_CANISTER, INDEXER_CANISTER];

pub const DEFAULT_MAX_RESULTS: u64 = 100;
pub const DEFAULT_MAX_ITERATION_COUNT: u64 = 10;

/// Entity kinds held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    AppData,
    Canister,
    Balance,
    VaultTransaction,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppData => "app_data",
            Self::Canister => "canister",
            Self::Balance => "balance",
            Self::VaultTransaction => "vault_transaction",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that can be persisted in the store.
pub trait Entity: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    /// Identity of this record within its kind.
    fn entity_id(&self) -> String;
}

/// Derived sync label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Synced,
    Syncing,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced => f.write_str("Synced"),
            Self::Syncing => f.write_str("Syncing"),
        }
    }
}

/// Vault configuration and scan cursor (singleton).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppData {
    pub admin_principal: String,
    pub max_results: u64,
    pub max_iteration_count: u64,
    /// Lowest remote tx-id the scanned window starts at
    pub scan_start_tx_id: u64,
    /// Next remote tx-id to fetch (the cursor)
    pub scan_end_tx_id: u64,
    /// Oldest tx-id the remote log still retains, as last observed
    pub scan_oldest_tx_id: u64,
    pub test_mode_enabled: bool,
    pub test_mode_tx_id: u64,
    /// Set while `update_transaction_history` runs
    #[serde(default)]
    pub sync_in_progress: bool,
}

impl AppData {
    pub fn new(admin_principal: String) -> Self {
        Self {
            admin_principal,
            max_results: DEFAULT_MAX_RESULTS,
            max_iteration_count: DEFAULT_MAX_ITERATION_COUNT,
            scan_start_tx_id: 0,
            scan_end_tx_id: 0,
            scan_oldest_tx_id: 0,
            test_mode_enabled: false,
            test_mode_tx_id: 0,
            sync_in_progress: false,
        }
    }

    /// `Synced` only when the window start, the cursor and the remote
    /// archival frontier all coincide.
    pub fn sync_status(&self) -> SyncStatus {
        if self.scan_start_tx_id == self.scan_end_tx_id
            && self.scan_end_tx_id == self.scan_oldest_tx_id
        {
            SyncStatus::Synced
        } else {
            SyncStatus::Syncing
        }
    }

    /// Whether the cursor has never been positioned on the remote log.
    pub fn scan_uninitialized(&self) -> bool {
        self.scan_start_tx_id == 0 && self.scan_end_tx_id == 0
    }
}

impl Entity for AppData {
    const KIND: EntityKind = EntityKind::AppData;

    fn entity_id(&self) -> String {
        APP_DATA_ID.to_string()
    }
}

/// Remote principal bound to a logical canister role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canister {
    pub name: String,
    pub principal: String,
}

impl Entity for Canister {
    const KIND: EntityKind = EntityKind::Canister;

    fn entity_id(&self) -> String {
        self.name.clone()
    }
}

/// Running balance of a principal. Negative for counterparties that have
/// net-sent to the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub principal_id: String,
    pub amount: i128,
}

impl Balance {
    pub fn zero(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            amount: 0,
        }
    }
}

impl Entity for Balance {
    const KIND: EntityKind = EntityKind::Balance;

    fn entity_id(&self) -> String {
        self.principal_id.clone()
    }
}

/// Kind of a projected transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Mint,
    Burn,
    Transfer,
    MockTransfer,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mint => "mint",
            Self::Burn => "burn",
            Self::Transfer => "transfer",
            Self::MockTransfer => "mock_transfer",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mint" => Ok(Self::Mint),
            "burn" => Ok(Self::Burn),
            "transfer" => Ok(Self::Transfer),
            "mock_transfer" => Ok(Self::MockTransfer),
            other => Err(format!("unknown transaction kind '{}'", other)),
        }
    }
}

/// A remote ledger entry that involved the vault. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTransaction {
    pub id: u64,
    pub principal_from: String,
    pub principal_to: String,
    pub amount: u128,
    /// Nanoseconds since the epoch, as reported by the ledger
    pub timestamp: u64,
    pub kind: TxKind,
}

impl VaultTransaction {
    pub fn involves(&self, principal: &str) -> bool {
        self.principal_from == principal || self.principal_to == principal
    }
}

impl Entity for VaultTransaction {
    const KIND: EntityKind = EntityKind::VaultTransaction;

    fn entity_id(&self) -> String {
        self.id.to_string()
    }
}
