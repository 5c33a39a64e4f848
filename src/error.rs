//! Error types for icrc-vault

use axum::http::StatusCode;
use thiserror::Error;

use crate::ledger::TransferError;

/// Persistent store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported record version {found} for {key}")]
    Version { key: String, found: u8 },

    #[error("Corrupt record at {0}")]
    Corrupt(String),
}

/// Remote ledger failures as seen by the adapter.
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    /// Transport failure or timeout; the call may be retried.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// The ledger answered with an ICRC error variant.
    #[error("Ledger rejected transfer: {0}")]
    Rejected(TransferError),

    /// The ledger answered with something we cannot decode.
    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),
}

/// Caller-facing error kinds. The display text starts with the kind name and
/// is what callers see as `Error{text}` in the response envelope.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),

    #[error("RemoteUnavailable: {0}")]
    RemoteUnavailable(String),

    #[error("RemoteRejected: {0}")]
    RemoteRejected(String),

    #[error("SyncBusy: a transaction history update is already running")]
    SyncBusy,

    #[error("TestModeOnly: {0} requires the vault to run in test mode")]
    TestModeOnly(String),

    #[error("Storage: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal: {0}")]
    Internal(String),
}

impl VaultError {
    /// Stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "Unauthorized",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::RemoteUnavailable(_) => "RemoteUnavailable",
            Self::RemoteRejected(_) => "RemoteRejected",
            Self::SyncBusy => "SyncBusy",
            Self::TestModeOnly(_) => "TestModeOnly",
            Self::Storage(_) => "Storage",
            Self::Internal(_) => "Internal",
        }
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::RemoteUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::RemoteRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::SyncBusy => StatusCode::CONFLICT,
            Self::TestModeOnly(_) => StatusCode::PRECONDITION_FAILED,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LedgerError> for VaultError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable(msg) => Self::RemoteUnavailable(msg),
            LedgerError::Rejected(e) => Self::RemoteRejected(e.to_string()),
            LedgerError::InvalidResponse(msg) => {
                Self::RemoteUnavailable(format!("invalid response: {}", msg))
            }
        }
    }
}

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;
