//! Remote Ledger Adapter - typed access to an ICRC-1 ledger
//!
//! The adapter owns the wire schema. Callers only see the typed records below:
//!
//! - `get_transactions(start, length)` - a window of the append-only log
//! - `icrc1_transfer(args)` - outbound transfer from the vault account
//! - `icrc1_balance_of(account)` - remote balance of an account
//!
//! Two implementations exist: [`HttpLedgerClient`] talks JSON to a ledger
//! gateway, [`MockLedger`] keeps an in-memory log for tests and local runs.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::error::LedgerError;

pub use http::HttpLedgerClient;
pub use mock::MockLedger;

/// Typed client for the three ledger calls the vault relies on.
///
/// `ledger` is the principal of the ledger canister to call; the vault reads
/// it from its current canister binding so it can be rebound at runtime.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_transactions(
        &self,
        ledger: &str,
        start: u64,
        length: u64,
    ) -> Result<GetTransactionsResponse, LedgerError>;

    /// Returns the block index of the new transfer.
    async fn icrc1_transfer(&self, ledger: &str, args: TransferArgs) -> Result<u64, LedgerError>;

    async fn icrc1_balance_of(&self, ledger: &str, account: &Account) -> Result<u128, LedgerError>;
}

/// ICRC account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subaccount: Option<Vec<u8>>,
}

impl Account {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            subaccount: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: Account,
    pub to: Account,
    #[serde(with = "nat")]
    pub amount: u128,
    #[serde(default, with = "nat::option", skip_serializing_if = "Option::is_none")]
    pub fee: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spender: Option<Account>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mint {
    pub to: Account,
    #[serde(with = "nat")]
    pub amount: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Burn {
    pub from: Account,
    #[serde(with = "nat")]
    pub amount: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spender: Option<Account>,
}

/// ICRC-2 approval. Moves no funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approve {
    pub from: Account,
    pub spender: Account,
    #[serde(with = "nat")]
    pub amount: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

/// One entry of the remote log.
///
/// `kind` names which of the optional payloads is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub kind: String,
    /// Nanoseconds since the epoch
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<Transfer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint: Option<Mint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burn: Option<Burn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve: Option<Approve>,
}

impl LedgerTransaction {
    pub fn transfer(from: &str, to: &str, amount: u128, timestamp: u64) -> Self {
        Self {
            kind: "transfer".to_string(),
            timestamp,
            transfer: Some(Transfer {
                from: Account::new(from),
                to: Account::new(to),
                amount,
                fee: None,
                memo: None,
                created_at_time: None,
                spender: None,
            }),
            mint: None,
            burn: None,
            approve: None,
        }
    }

    pub fn mint(to: &str, amount: u128, timestamp: u64) -> Self {
        Self {
            kind: "mint".to_string(),
            timestamp,
            transfer: None,
            mint: Some(Mint {
                to: Account::new(to),
                amount,
                memo: None,
                created_at_time: None,
            }),
            burn: None,
            approve: None,
        }
    }

    pub fn burn(from: &str, amount: u128, timestamp: u64) -> Self {
        Self {
            kind: "burn".to_string(),
            timestamp,
            transfer: None,
            mint: None,
            burn: Some(Burn {
                from: Account::new(from),
                amount,
                memo: None,
                created_at_time: None,
                spender: None,
            }),
            approve: None,
        }
    }
}

/// One slot of a `get_transactions` reply.
///
/// Entries are decoded one by one, so an entry the schema does not accept
/// keeps its position in the window instead of failing the whole reply.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEntry {
    Decoded(LedgerTransaction),
    /// The raw JSON and the decode error
    Malformed { raw: Value, error: String },
}

impl LedgerEntry {
    pub fn from_value(raw: Value) -> Self {
        match serde_json::from_value::<LedgerTransaction>(raw.clone()) {
            Ok(tx) => Self::Decoded(tx),
            Err(e) => Self::Malformed {
                raw,
                error: e.to_string(),
            },
        }
    }

    pub fn transaction(&self) -> Option<&LedgerTransaction> {
        match self {
            Self::Decoded(tx) => Some(tx),
            Self::Malformed { .. } => None,
        }
    }
}

impl From<LedgerTransaction> for LedgerEntry {
    fn from(tx: LedgerTransaction) -> Self {
        Self::Decoded(tx)
    }
}

impl Serialize for LedgerEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Decoded(tx) => tx.serialize(serializer),
            Self::Malformed { raw, .. } => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for LedgerEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(Value::deserialize(deserializer)?))
    }
}

/// A range of the log that the ledger has moved to an archive canister.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedRange {
    pub start: u64,
    pub length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
}

/// Reply to `get_transactions(start, length)`.
///
/// `transactions` covers `[max(start, first_index), min(start + length, log_length))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetTransactionsResponse {
    /// Oldest tx-id the ledger still serves itself
    pub first_index: u64,
    /// One past the newest tx-id
    pub log_length: u64,
    #[serde(default)]
    pub transactions: Vec<LedgerEntry>,
    #[serde(default)]
    pub archived_transactions: Vec<ArchivedRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_subaccount: Option<Vec<u8>>,
    pub to: Account,
    #[serde(with = "nat")]
    pub amount: u128,
    #[serde(default, with = "nat::option", skip_serializing_if = "Option::is_none")]
    pub fee: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_time: Option<u64>,
}

/// ICRC-1 transfer error variants, rendered verbatim to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TransferError {
    #[error("BadFee {{ expected_fee: {expected_fee} }}")]
    BadFee {
        #[serde(with = "nat")]
        expected_fee: u128,
    },

    #[error("BadBurn {{ min_burn_amount: {min_burn_amount} }}")]
    BadBurn {
        #[serde(with = "nat")]
        min_burn_amount: u128,
    },

    #[error("InsufficientFunds {{ balance: {balance} }}")]
    InsufficientFunds {
        #[serde(with = "nat")]
        balance: u128,
    },

    #[error("TooOld")]
    TooOld,

    #[error("CreatedInFuture {{ ledger_time: {ledger_time} }}")]
    CreatedInFuture { ledger_time: u64 },

    #[error("Duplicate {{ duplicate_of: {duplicate_of} }}")]
    Duplicate { duplicate_of: u64 },

    #[error("TemporarilyUnavailable")]
    TemporarilyUnavailable,

    #[error("GenericError {{ error_code: {error_code}, message: {message} }}")]
    GenericError { error_code: u64, message: String },
}

/// `icrc1_transfer` reply as sent by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferResult {
    Ok(u64),
    Err(TransferError),
}

/// Serde helpers for ICRC `Nat` values, which gateways send either as JSON
/// numbers of any size or as decimal strings. Always serialised as strings.
pub mod nat {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    /// Numbers keep their source text (`arbitrary_precision`), so values
    /// above `u64::MAX` parse exactly; fractions and negatives are rejected.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let text = match Value::deserialize(deserializer)? {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.replace('_', ""),
            other => {
                return Err(D::Error::custom(format!(
                    "expected a non-negative integer or decimal string, found {}",
                    other
                )))
            }
        };
        text.parse()
            .map_err(|_| D::Error::custom(format!("invalid nat '{}'", text)))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<u128>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u128>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapped(#[serde(with = "super")] u128);

            Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(v)| v))
        }
    }
}
