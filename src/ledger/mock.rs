//! In-memory ICRC ledger
//!
//! Keeps a growing log with an archival frontier, answers the three adapter
//! calls the way a real ledger does, and lets tests inject failures.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use super::{
    Account, ArchivedRange, GetTransactionsResponse, LedgerClient, LedgerEntry,
    LedgerTransaction, TransferArgs, TransferError,
};
use crate::error::LedgerError;

#[derive(Debug, Default)]
struct MockState {
    /// Entries still served locally, keyed by tx-id
    entries: BTreeMap<u64, LedgerEntry>,
    first_index: u64,
    log_length: u64,
    balances: HashMap<String, u128>,
    /// Scripted outcomes for upcoming calls; `None` lets a call through
    failures: VecDeque<Option<LedgerError>>,
    requests: Vec<(u64, u64)>,
    clock: u64,
}

impl MockState {
    fn append(&mut self, entry: LedgerEntry) -> u64 {
        if let Some(tx) = entry.transaction() {
            self.apply_balances(tx);
        }

        let id = self.log_length;
        self.entries.insert(id, entry);
        self.log_length += 1;
        id
    }

    fn apply_balances(&mut self, tx: &LedgerTransaction) {
        if let Some(t) = &tx.transfer {
            let from = self.balances.entry(t.from.owner.clone()).or_default();
            *from = from.saturating_sub(t.amount);
            *self.balances.entry(t.to.owner.clone()).or_default() += t.amount;
        }
        if let Some(m) = &tx.mint {
            *self.balances.entry(m.to.owner.clone()).or_default() += m.amount;
        }
        if let Some(b) = &tx.burn {
            let from = self.balances.entry(b.from.owner.clone()).or_default();
            *from = from.saturating_sub(b.amount);
        }
    }

    fn next_timestamp(&mut self) -> u64 {
        self.clock += 1;
        1_700_000_000_000_000_000 + self.clock
    }

    fn take_failure(&mut self) -> Result<(), LedgerError> {
        match self.failures.pop_front() {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

/// In-memory ledger. `owner` is the account `icrc1_transfer` debits.
pub struct MockLedger {
    owner: String,
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned mock means a test already panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an arbitrary entry, returning its tx-id.
    pub fn push(&self, tx: LedgerTransaction) -> u64 {
        self.state().append(tx.into())
    }

    /// Append raw JSON as it would come off the wire, decoded or not.
    pub fn push_raw(&self, raw: Value) -> u64 {
        self.state().append(LedgerEntry::from_value(raw))
    }

    pub fn push_transfer(&self, from: &str, to: &str, amount: u128) -> u64 {
        let mut state = self.state();
        let ts = state.next_timestamp();
        state.append(LedgerTransaction::transfer(from, to, amount, ts).into())
    }

    pub fn push_mint(&self, to: &str, amount: u128) -> u64 {
        let mut state = self.state();
        let ts = state.next_timestamp();
        state.append(LedgerTransaction::mint(to, amount, ts).into())
    }

    pub fn push_burn(&self, from: &str, amount: u128) -> u64 {
        let mut state = self.state();
        let ts = state.next_timestamp();
        state.append(LedgerTransaction::burn(from, amount, ts).into())
    }

    /// Grow the log to `log_length` with transfers between two outsiders.
    pub fn fill_to(&self, log_length: u64) {
        while self.log_length() < log_length {
            self.push_transfer("xxxxx", "yyyyy", 1);
        }
    }

    /// Move everything below `first_index` to the archive.
    pub fn archive_before(&self, first_index: u64) {
        let mut state = self.state();
        let first_index = first_index.min(state.log_length);
        state.entries = state.entries.split_off(&first_index);
        state.first_index = state.first_index.max(first_index);
    }

    /// Fail the next call with `err`. Several calls queue up in order.
    pub fn fail_next(&self, err: LedgerError) {
        self.state().failures.push_back(Some(err));
    }

    /// Let the next scripted call succeed, so a following `fail_next`
    /// hits a later call.
    pub fn pass_next(&self) {
        self.state().failures.push_back(None);
    }

    pub fn credit(&self, owner: &str, amount: u128) {
        *self.state().balances.entry(owner.to_string()).or_default() += amount;
    }

    pub fn log_length(&self) -> u64 {
        self.state().log_length
    }

    pub fn first_index(&self) -> u64 {
        self.state().first_index
    }

    /// `(start, length)` of every `get_transactions` call received so far.
    pub fn requests(&self) -> Vec<(u64, u64)> {
        self.state().requests.clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_transactions(
        &self,
        _ledger: &str,
        start: u64,
        length: u64,
    ) -> Result<GetTransactionsResponse, LedgerError> {
        let mut state = self.state();
        state.requests.push((start, length));
        state.take_failure()?;

        let end = start.saturating_add(length).min(state.log_length);
        let local_start = start.max(state.first_index);
        let transactions = if local_start < end {
            state
                .entries
                .range(local_start..end)
                .map(|(_, tx)| tx.clone())
                .collect()
        } else {
            Vec::new()
        };

        let archived_end = end.min(state.first_index);
        let archived_transactions = if start < archived_end {
            vec![ArchivedRange {
                start,
                length: archived_end - start,
                callback: None,
            }]
        } else {
            Vec::new()
        };

        Ok(GetTransactionsResponse {
            first_index: state.first_index,
            log_length: state.log_length,
            transactions,
            archived_transactions,
        })
    }

    async fn icrc1_transfer(&self, _ledger: &str, args: TransferArgs) -> Result<u64, LedgerError> {
        let mut state = self.state();
        state.take_failure()?;

        let balance = state.balances.get(&self.owner).copied().unwrap_or(0);
        if balance < args.amount {
            return Err(LedgerError::Rejected(TransferError::InsufficientFunds {
                balance,
            }));
        }

        let ts = args
            .created_at_time
            .unwrap_or_else(|| state.next_timestamp());
        Ok(state.append(
            LedgerTransaction::transfer(&self.owner, &args.to.owner, args.amount, ts).into(),
        ))
    }

    async fn icrc1_balance_of(&self, _ledger: &str, account: &Account) -> Result<u128, LedgerError> {
        let mut state = self.state();
        state.take_failure()?;
        Ok(state.balances.get(&account.owner).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_respects_log_bounds() {
        let ledger = MockLedger::new("vault");
        ledger.fill_to(5);

        let reply = ledger.get_transactions("l", 3, 10).await.unwrap();
        assert_eq!(reply.first_index, 0);
        assert_eq!(reply.log_length, 5);
        assert_eq!(reply.transactions.len(), 2);

        let reply = ledger.get_transactions("l", 5, 10).await.unwrap();
        assert!(reply.transactions.is_empty());
        assert_eq!(ledger.requests(), vec![(3, 10), (5, 10)]);
    }

    #[tokio::test]
    async fn test_archived_prefix_is_reported() {
        let ledger = MockLedger::new("vault");
        ledger.fill_to(160);
        ledger.archive_before(150);

        let reply = ledger.get_transactions("l", 102, 40).await.unwrap();
        assert_eq!(reply.first_index, 150);
        assert!(reply.transactions.is_empty());
        assert_eq!(reply.archived_transactions[0].start, 102);
        assert_eq!(reply.archived_transactions[0].length, 40);

        let reply = ledger.get_transactions("l", 102, 100).await.unwrap();
        assert_eq!(reply.transactions.len(), 10);
    }

    #[tokio::test]
    async fn test_raw_entries_keep_their_slot() {
        let ledger = MockLedger::new("vault");
        ledger.push_raw(serde_json::json!({"kind": "transfer", "timestamp": "noon"}));
        ledger.push_transfer("alice", "vault", 5);

        let reply = ledger.get_transactions("l", 0, 10).await.unwrap();
        assert!(matches!(reply.transactions[0], LedgerEntry::Malformed { .. }));
        assert!(reply.transactions[1].transaction().is_some());
        assert_eq!(
            ledger.icrc1_balance_of("l", &Account::new("vault")).await.unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn test_transfer_debits_owner() {
        let ledger = MockLedger::new("vault");
        ledger.push_mint("vault", 100);

        let args = TransferArgs {
            from_subaccount: None,
            to: Account::new("bob"),
            amount: 60,
            fee: None,
            memo: None,
            created_at_time: None,
        };
        assert_eq!(ledger.icrc1_transfer("l", args.clone()).await.unwrap(), 1);
        assert_eq!(
            ledger.icrc1_balance_of("l", &Account::new("bob")).await.unwrap(),
            60
        );

        let err = ledger.icrc1_transfer("l", args).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Rejected(TransferError::InsufficientFunds { balance: 40 })
        ));
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let ledger = MockLedger::new("vault");
        ledger.fail_next(LedgerError::Unavailable("timeout".into()));
        assert!(ledger.get_transactions("l", 0, 1).await.is_err());
        assert!(ledger.get_transactions("l", 0, 1).await.is_ok());

        ledger.pass_next();
        ledger.fail_next(LedgerError::Unavailable("timeout".into()));
        assert!(ledger.get_transactions("l", 0, 1).await.is_ok());
        assert!(ledger.get_transactions("l", 0, 1).await.is_err());
    }
}
