//! Response envelope returned by every vault operation

use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::store::{AppData, Balance, Canister, SyncStatus, VaultTransaction};

/// Uniform reply: `success`, a human-readable `message`, and typed `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub message: String,
    pub data: ResponseData,
}

impl Response {
    pub fn ok(message: impl Into<String>, data: ResponseData) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn from_error(err: &VaultError) -> Self {
        let text = err.to_string();
        Self {
            success: false,
            message: text.clone(),
            data: ResponseData::Error { text },
        }
    }
}

/// AppData as reported by `status`, with the derived sync label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDataView {
    #[serde(flatten)]
    pub app: AppData,
    pub sync_status: SyncStatus,
}

impl From<AppData> for AppDataView {
    fn from(app: AppData) -> Self {
        let sync_status = app.sync_status();
        Self { app, sync_status }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseData {
    Balance(Balance),
    Transactions(Vec<VaultTransaction>),
    Stats {
        app_data: AppDataView,
        balances: Vec<Balance>,
        vault_transactions: Vec<VaultTransaction>,
        canisters: Vec<Canister>,
    },
    TransactionId {
        tx_id: u64,
    },
    TransactionSummary {
        new_txs_count: u64,
        sync_status: SyncStatus,
        scan_end_tx_id: u64,
    },
    TestMode {
        test_mode_enabled: bool,
        tx_id: u64,
    },
    Message {
        text: String,
    },
    Error {
        text: String,
    },
}
