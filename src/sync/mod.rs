//! Transaction synchronization
//!
//! Handles:
//! - Cursor-driven tailing of the remote ledger log
//! - Projection of vault-relevant entries into transactions and balances
//! - Archival gap recovery
//! - The periodic sync tick

pub mod engine;
pub mod projection;
pub mod task;

pub use engine::{SyncEngine, SyncReport};
pub use projection::{ExtractError, Projection};
pub use task::spawn_sync_task;
