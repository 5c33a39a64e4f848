//! ICRC Vault - custodial vault over an ICRC-1 ledger
//!
//! The vault owns one ledger account and keeps a local, queryable record of
//! every transfer that touched it by tailing the ledger's append-only log.
//!
//! ## Architecture
//!
//! ```text
//! ICRC ledger ──▶ ledger (adapter) ──▶ sync (cursor, projection) ──▶ store
//!                                                                    │
//!                      api (axum) ──▶ vault (commands, test mode) ◀──┘
//! ```
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/icrc-vault/
//! ├── vault.sled/            # storage + audit trees
//! └── config.toml            # Configuration
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod principal;
pub mod store;
pub mod sync;
pub mod vault;

pub use config::{CanisterBinding, Config, InitArgs};
pub use error::{LedgerError, Result, StoreError, VaultError};
pub use ledger::{HttpLedgerClient, LedgerClient, MockLedger};
pub use store::Store;
pub use sync::{spawn_sync_task, SyncEngine, SyncReport};
pub use vault::{Response, ResponseData, Vault, VaultSettings};
