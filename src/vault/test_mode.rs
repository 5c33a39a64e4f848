//! Test-mode operations
//!
//! Available only when the vault was initialized with `test_mode_enabled`.
//! Synthetic transactions take their ids from `test_mode_tx_id` and move
//! balances exactly like projected ledger entries.

use tracing::info;

use super::{load_app_data, positive_amount, Response, ResponseData, Vault};
use crate::error::{Result, VaultError};
use crate::principal;
use crate::store::{AppData, Balance, Mutation, TxKind, VaultTransaction};
use crate::sync::projection::{self, Projection};

impl Vault {
    fn require_test_mode(&self, caller: &str, op: &str) -> Result<AppData> {
        let app = self.require_admin(caller)?;
        if !app.test_mode_enabled {
            return Err(VaultError::TestModeOnly(op.to_string()));
        }
        Ok(app)
    }

    /// Overwrite the balance of `principal_id`.
    pub fn test_mode_set_balance(
        &self,
        caller: &str,
        principal_id: &str,
        amount: i128,
    ) -> Result<Response> {
        let _guard = self.lock()?;
        self.require_test_mode(caller, "test_mode_set_balance")?;
        let principal_id = principal::parse(principal_id)?;

        self.store.put(&Balance {
            principal_id: principal_id.clone(),
            amount,
        })?;

        info!(principal = %principal_id, amount = %amount, "Test balance set");
        Ok(Response::ok(
            "Balance set",
            ResponseData::Message {
                text: format!("balance of {} is now {}", principal_id, amount),
            },
        ))
    }

    /// Record a synthetic transaction. `kind` defaults to `mock_transfer`
    /// and `timestamp` to the current time.
    pub fn test_mode_set_mock_transaction(
        &self,
        caller: &str,
        from: &str,
        to: &str,
        amount: i128,
        timestamp: Option<u64>,
        kind: Option<&str>,
    ) -> Result<Response> {
        let _guard = self.lock()?;
        let app = self.require_test_mode(caller, "test_mode_set_mock_transaction")?;
        let from = principal::parse(from)?;
        let to = principal::parse(to)?;
        let amount = positive_amount(amount)?;
        let kind = kind
            .map(|k| k.parse::<TxKind>().map_err(VaultError::InvalidArgument))
            .transpose()?;

        let tx_id = self.record_synthetic(app, &from, &to, amount, timestamp, kind)?;
        Ok(Response::ok(
            format!("Mock transaction {} recorded", tx_id),
            ResponseData::TransactionId { tx_id },
        ))
    }

    /// Delete every transaction and balance and restart synthetic ids at 0.
    pub fn test_mode_reset(&self, caller: &str) -> Result<Response> {
        let _guard = self.lock()?;
        let mut app = self.require_test_mode(caller, "test_mode_reset")?;

        let mut mutations = Vec::new();
        for tx in self.store.iter::<VaultTransaction>() {
            mutations.push(Mutation::delete::<VaultTransaction>(&tx?.id.to_string()));
        }
        let transactions = mutations.len();
        for balance in self.store.iter::<Balance>() {
            mutations.push(Mutation::delete::<Balance>(&balance?.principal_id));
        }
        let balances = mutations.len() - transactions;

        app.test_mode_tx_id = 0;
        mutations.push(Mutation::put(&app)?);
        self.store.apply(mutations)?;

        info!(transactions, balances, "Test state reset");
        Ok(Response::ok(
            "Test state reset",
            ResponseData::Message {
                text: format!(
                    "deleted {} transactions and {} balances",
                    transactions, balances
                ),
            },
        ))
    }

    pub fn test_mode_status(&self) -> Result<Response> {
        let app = load_app_data(&self.store)?;
        Ok(Response::ok(
            if app.test_mode_enabled {
                "Test mode enabled"
            } else {
                "Test mode disabled"
            },
            ResponseData::TestMode {
                test_mode_enabled: app.test_mode_enabled,
                tx_id: app.test_mode_tx_id,
            },
        ))
    }

    /// Write a synthetic transaction and its balance moves, together with
    /// the bumped id counter, in one store batch. The caller holds the state
    /// gate and passes the AppData it read under it.
    pub(super) fn record_synthetic(
        &self,
        mut app: AppData,
        from: &str,
        to: &str,
        amount: u128,
        timestamp: Option<u64>,
        kind: Option<TxKind>,
    ) -> Result<u64> {
        let tx = VaultTransaction {
            id: app.test_mode_tx_id,
            principal_from: from.to_string(),
            principal_to: to.to_string(),
            amount,
            timestamp: timestamp.unwrap_or_else(now_nanos),
            kind: kind.unwrap_or(TxKind::MockTransfer),
        };

        let mut mutations = match projection::plan(&self.store, &tx)? {
            Projection::Record(mutations) => mutations,
            Projection::Duplicate => {
                return Err(VaultError::Internal(format!(
                    "synthetic transaction id {} is already taken",
                    tx.id
                )))
            }
            Projection::Overflow => {
                return Err(VaultError::InvalidArgument(format!(
                    "amount {} overflows the balance range",
                    amount
                )))
            }
        };

        app.test_mode_tx_id += 1;
        mutations.push(Mutation::put(&app)?);
        self.store.apply(mutations)?;

        info!(
            tx_id = tx.id,
            from = %tx.principal_from,
            to = %tx.principal_to,
            amount = %tx.amount,
            kind = %tx.kind,
            "Synthetic transaction recorded"
        );
        Ok(tx.id)
    }
}

fn now_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or_default()
}
