//! Projection of ledger entries into vault records
//!
//! A projected entry becomes one `VaultTransaction` plus the two `Balance`
//! rows it moves, written together by a single [`Store::apply`].

use thiserror::Error;

use crate::error::StoreError;
use crate::ledger::{LedgerEntry, LedgerTransaction};
use crate::principal::MINTING_ACCOUNT;
use crate::store::{Balance, Mutation, Store, TxKind, VaultTransaction};

/// Why a ledger entry could not be turned into a transaction record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("entry of kind '{0}' carries no '{0}' payload")]
    MissingPayload(String),

    #[error("entry of kind '{0}' moves no funds")]
    NoFundsMoved(String),

    #[error("unknown entry kind '{0}'")]
    UnknownKind(String),

    #[error("entry does not decode: {0}")]
    Malformed(String),
}

/// Outcome of planning a projection.
#[derive(Debug)]
pub enum Projection {
    /// Mutations to apply: the transaction and its balance rows.
    Record(Vec<Mutation>),
    /// The transaction id is already recorded; balances must not move again.
    Duplicate,
    /// The amount does not fit the signed balance range.
    Overflow,
}

/// Extract from a reply slot; entries that failed to decode are reported as
/// [`ExtractError::Malformed`].
pub fn extract_entry(id: u64, entry: &LedgerEntry) -> Result<VaultTransaction, ExtractError> {
    match entry {
        LedgerEntry::Decoded(tx) => extract(id, tx),
        LedgerEntry::Malformed { error, .. } => Err(ExtractError::Malformed(error.clone())),
    }
}

/// Read the transfer contract (from, to, amount, timestamp, kind) out of a
/// ledger entry. Mints and burns use the minting account as counterparty.
pub fn extract(id: u64, tx: &LedgerTransaction) -> Result<VaultTransaction, ExtractError> {
    let missing = || ExtractError::MissingPayload(tx.kind.clone());

    let (from, to, amount, kind) = match tx.kind.as_str() {
        "transfer" => {
            let t = tx.transfer.as_ref().ok_or_else(missing)?;
            (t.from.owner.clone(), t.to.owner.clone(), t.amount, TxKind::Transfer)
        }
        "mint" => {
            let m = tx.mint.as_ref().ok_or_else(missing)?;
            (MINTING_ACCOUNT.to_string(), m.to.owner.clone(), m.amount, TxKind::Mint)
        }
        "burn" => {
            let b = tx.burn.as_ref().ok_or_else(missing)?;
            (b.from.owner.clone(), MINTING_ACCOUNT.to_string(), b.amount, TxKind::Burn)
        }
        "approve" => return Err(ExtractError::NoFundsMoved(tx.kind.clone())),
        other => return Err(ExtractError::UnknownKind(other.to_string())),
    };

    Ok(VaultTransaction {
        id,
        principal_from: from,
        principal_to: to,
        amount,
        timestamp: tx.timestamp,
        kind,
    })
}

/// Plan the writes for `tx`. Presence of the transaction id decides whether
/// balances move, which keeps re-scans idempotent.
pub fn plan(store: &Store, tx: &VaultTransaction) -> Result<Projection, StoreError> {
    let id = tx.id.to_string();
    if store.contains::<VaultTransaction>(&id)? {
        return Ok(Projection::Duplicate);
    }

    let delta = match i128::try_from(tx.amount) {
        Ok(delta) => delta,
        Err(_) => return Ok(Projection::Overflow),
    };

    let mut mutations = vec![Mutation::put(tx)?];

    let mut from = load_balance(store, &tx.principal_from)?;
    if tx.principal_from == tx.principal_to {
        // Self-transfer: the row exists afterwards but does not move.
        mutations.push(Mutation::put(&from)?);
        return Ok(Projection::Record(mutations));
    }

    let mut to = load_balance(store, &tx.principal_to)?;
    match (from.amount.checked_sub(delta), to.amount.checked_add(delta)) {
        (Some(f), Some(t)) => {
            from.amount = f;
            to.amount = t;
        }
        _ => return Ok(Projection::Overflow),
    }

    mutations.push(Mutation::put(&from)?);
    mutations.push(Mutation::put(&to)?);
    Ok(Projection::Record(mutations))
}

fn load_balance(store: &Store, principal: &str) -> Result<Balance, StoreError> {
    Ok(store
        .get::<Balance>(principal)?
        .unwrap_or_else(|| Balance::zero(principal)))
}
