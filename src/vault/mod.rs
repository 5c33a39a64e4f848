//! Command Surface - the vault's operations over store, ledger and sync engine
//!
//! `Vault` is the context handle every operation runs against. Queries are
//! public; mutating commands check the caller against `admin_principal`.
//!
//! State changes run under a short-lived gate (a std mutex) that is never
//! held across a ledger call. The only cross-call coordination is the
//! persisted `sync_in_progress` flag.

pub mod response;
pub mod test_mode;

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::config::InitArgs;
use crate::error::{Result, VaultError};
use crate::ledger::{Account, LedgerClient, TransferArgs};
use crate::principal;
use crate::store::records::{APP_DATA_ID, KNOWN_CANISTERS, LEDGER_CANISTER};
use crate::store::{AppData, Balance, Canister, Mutation, Store, VaultTransaction};
use crate::sync::SyncEngine;

pub use response::{AppDataView, Response, ResponseData};

/// Runtime settings that are not part of the persisted state.
#[derive(Debug, Clone)]
pub struct VaultSettings {
    /// Ledger-visible principal of the vault account
    pub vault_principal: String,
    /// Upper bound on transactions listed by `status`
    pub status_tx_limit: usize,
}

pub struct Vault {
    store: Store,
    ledger: Arc<dyn LedgerClient>,
    engine: SyncEngine,
    settings: VaultSettings,
    gate: Arc<Mutex<()>>,
}

impl Vault {
    /// Open the vault over `store`.
    ///
    /// A fresh store is initialized from `init`, with `deployer` as admin
    /// unless overridden. An existing store is an upgrade: its records are
    /// kept and only canister roles it has never seen are taken from `init`.
    pub fn open(
        store: Store,
        ledger: Arc<dyn LedgerClient>,
        settings: VaultSettings,
        init: &InitArgs,
        deployer: &str,
    ) -> Result<Self> {
        let vault_principal = principal::parse(&settings.vault_principal)?;
        let settings = VaultSettings {
            vault_principal,
            ..settings
        };

        match store.get::<AppData>(APP_DATA_ID)? {
            Some(app) => upgrade(&store, app, init)?,
            None => {
                init.validate()?;
                initialize(&store, init, deployer)?
            }
        }

        let gate = Arc::new(Mutex::new(()));
        let engine = SyncEngine::new(
            store.clone(),
            Arc::clone(&ledger),
            settings.vault_principal.clone(),
            Arc::clone(&gate),
        );

        Ok(Self {
            store,
            ledger,
            engine,
            settings,
            gate,
        })
    }

    pub fn vault_principal(&self) -> &str {
        &self.settings.vault_principal
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn app_data(&self) -> Result<AppData> {
        load_app_data(&self.store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.gate
            .lock()
            .map_err(|_| VaultError::Internal("state lock poisoned".into()))
    }

    /// Callers that go on to write hold the state gate across this check.
    fn require_admin(&self, caller: &str) -> Result<AppData> {
        let app = load_app_data(&self.store)?;
        if caller != app.admin_principal {
            return Err(VaultError::Unauthorized(format!(
                "caller '{}' is not the vault admin",
                caller
            )));
        }
        Ok(app)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn status(&self) -> Result<Response> {
        let app = load_app_data(&self.store)?;
        let balances = self.store.all::<Balance>()?;

        let mut vault_transactions = self.store.all::<VaultTransaction>()?;
        vault_transactions.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        vault_transactions.truncate(self.settings.status_tx_limit);

        let canisters = self.store.all::<Canister>()?;

        Ok(Response::ok(
            "Vault status",
            ResponseData::Stats {
                app_data: app.into(),
                balances,
                vault_transactions,
                canisters,
            },
        ))
    }

    /// Unknown principals read as a zero balance.
    pub fn get_balance(&self, principal_id: &str) -> Result<Response> {
        let balance = self
            .store
            .get::<Balance>(principal_id)?
            .unwrap_or_else(|| Balance::zero(principal_id));
        Ok(Response::ok(
            format!("Balance of {}", principal_id),
            ResponseData::Balance(balance),
        ))
    }

    /// Transactions involving `principal_id`, newest first.
    pub fn get_transactions(&self, principal_id: &str) -> Result<Response> {
        let mut txs = Vec::new();
        for tx in self.store.iter::<VaultTransaction>() {
            let tx = tx?;
            if tx.involves(principal_id) {
                txs.push(tx);
            }
        }
        txs.sort_unstable_by(|a, b| b.id.cmp(&a.id));

        Ok(Response::ok(
            format!("{} transactions for {}", txs.len(), principal_id),
            ResponseData::Transactions(txs),
        ))
    }

    /// Remote balance of the vault account, straight from the ledger.
    pub async fn ledger_balance(&self) -> Result<Response> {
        let ledger = ledger_principal(&self.store)?;
        let account = Account::new(self.settings.vault_principal.clone());
        let amount = self.ledger.icrc1_balance_of(&ledger, &account).await?;
        let amount = i128::try_from(amount).map_err(|_| {
            VaultError::Internal(format!("ledger balance {} exceeds the balance range", amount))
        })?;

        Ok(Response::ok(
            "Ledger balance of the vault account",
            ResponseData::Balance(Balance {
                principal_id: self.settings.vault_principal.clone(),
                amount,
            }),
        ))
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Send `amount` from the vault to `to`.
    ///
    /// In normal mode the transfer is only submitted to the ledger; the local
    /// record appears once sync scans the new entry. In test mode a
    /// `mock_transfer` is recorded directly.
    pub async fn transfer(&self, caller: &str, to: &str, amount: i128) -> Result<Response> {
        let app = self.require_admin(caller)?;
        let to = principal::parse(to)?;
        let amount = positive_amount(amount)?;

        if app.test_mode_enabled {
            let _guard = self.lock()?;
            let app = self.require_admin(caller)?;
            let from = self.settings.vault_principal.clone();
            let tx_id = self.record_synthetic(app, &from, &to, amount, None, None)?;
            return Ok(Response::ok(
                format!("Mock transfer of {} to {} recorded", amount, to),
                ResponseData::TransactionId { tx_id },
            ));
        }

        let ledger = ledger_principal(&self.store)?;
        let args = TransferArgs {
            from_subaccount: None,
            to: Account::new(to.clone()),
            amount,
            fee: None,
            memo: None,
            created_at_time: None,
        };

        let tx_id = match self.ledger.icrc1_transfer(&ledger, args).await {
            Ok(tx_id) => tx_id,
            Err(e) => {
                warn!(to = %to, amount = %amount, error = %e, "Transfer failed");
                return Err(e.into());
            }
        };

        info!(to = %to, amount = %amount, tx_id, "Transfer submitted to ledger");
        Ok(Response::ok(
            format!("Transferred {} to {}", amount, to),
            ResponseData::TransactionId { tx_id },
        ))
    }

    /// Pull new entries from the ledger into the local store.
    pub async fn update_transaction_history(&self) -> Result<Response> {
        let app = load_app_data(&self.store)?;
        if app.test_mode_enabled {
            return Ok(Response::ok(
                "Test mode: transaction history is not synced",
                ResponseData::TransactionSummary {
                    new_txs_count: 0,
                    sync_status: app.sync_status(),
                    scan_end_tx_id: app.scan_end_tx_id,
                },
            ));
        }

        let (report, app) = self.engine.run().await?;
        Ok(Response::ok(
            format!("{} new transactions", report.new_txs_count),
            ResponseData::TransactionSummary {
                new_txs_count: report.new_txs_count,
                sync_status: app.sync_status(),
                scan_end_tx_id: app.scan_end_tx_id,
            },
        ))
    }

    pub fn set_admin(&self, caller: &str, new_admin: &str) -> Result<Response> {
        let _guard = self.lock()?;
        let mut app = self.require_admin(caller)?;
        let new_admin = principal::parse(new_admin)?;
        if new_admin == principal::ANONYMOUS {
            return Err(anonymous_admin());
        }

        let previous = std::mem::replace(&mut app.admin_principal, new_admin.clone());
        self.store.put(&app)?;

        info!(previous = %previous, admin = %new_admin, "Admin principal replaced");
        Ok(Response::ok(
            "Admin updated",
            ResponseData::Message {
                text: format!("admin is now {}", new_admin),
            },
        ))
    }

    pub fn set_canister(&self, caller: &str, name: &str, canister: &str) -> Result<Response> {
        let _guard = self.lock()?;
        self.require_admin(caller)?;
        let name = known_canister(name)?;
        let canister = principal::parse(canister)?;

        self.store.put(&Canister {
            name: name.to_string(),
            principal: canister.clone(),
        })?;

        info!(name, principal = %canister, "Canister bound");
        Ok(Response::ok(
            "Canister updated",
            ResponseData::Message {
                text: format!("{} is now {}", name, canister),
            },
        ))
    }
}

/// Load the AppData singleton. Its absence means `Vault::open` never ran.
pub(crate) fn load_app_data(store: &Store) -> Result<AppData> {
    store
        .get::<AppData>(APP_DATA_ID)?
        .ok_or_else(|| VaultError::Internal("vault is not initialized".into()))
}

/// Principal currently bound to the ledger role.
pub(crate) fn ledger_principal(store: &Store) -> Result<String> {
    store
        .get::<Canister>(LEDGER_CANISTER)?
        .map(|c| c.principal)
        .ok_or_else(|| {
            VaultError::InvalidArgument(format!("no canister bound to '{}'", LEDGER_CANISTER))
        })
}

fn known_canister(name: &str) -> Result<&'static str> {
    KNOWN_CANISTERS
        .iter()
        .copied()
        .find(|known| *known == name)
        .ok_or_else(|| {
            VaultError::InvalidArgument(format!(
                "unknown canister '{}', expected one of {:?}",
                name, KNOWN_CANISTERS
            ))
        })
}

fn anonymous_admin() -> VaultError {
    VaultError::InvalidArgument(format!(
        "the anonymous principal {} cannot be the admin; set --deployer or init.admin_principal",
        principal::ANONYMOUS
    ))
}

fn positive_amount(amount: i128) -> Result<u128> {
    if amount <= 0 {
        return Err(VaultError::InvalidArgument(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(amount.unsigned_abs())
}

fn initialize(store: &Store, init: &InitArgs, deployer: &str) -> Result<()> {
    let admin = match &init.admin_principal {
        Some(admin) => principal::parse(admin)?,
        None => principal::parse(deployer)?,
    };
    if admin == principal::ANONYMOUS {
        return Err(anonymous_admin());
    }

    let mut app = AppData::new(admin);
    if let Some(max_results) = init.max_results {
        app.max_results = max_results;
    }
    if let Some(max_iteration_count) = init.max_iteration_count {
        app.max_iteration_count = max_iteration_count;
    }
    app.test_mode_enabled = init.test_mode_enabled;

    let mut mutations = vec![Mutation::put(&app)?];
    for binding in &init.canisters {
        mutations.push(Mutation::put(&Canister {
            name: binding.name.clone(),
            principal: principal::parse(&binding.principal)?,
        })?);
    }
    store.apply(mutations)?;

    info!(
        admin = %app.admin_principal,
        max_results = app.max_results,
        max_iteration_count = app.max_iteration_count,
        test_mode = app.test_mode_enabled,
        canisters = init.canisters.len(),
        "Vault initialized"
    );
    Ok(())
}

fn upgrade(store: &Store, mut app: AppData, init: &InitArgs) -> Result<()> {
    let mut mutations = Vec::new();

    if app.sync_in_progress {
        warn!("Clearing a sync flag left behind by an interrupted run");
        app.sync_in_progress = false;
        mutations.push(Mutation::put(&app)?);
    }

    let mut added = 0usize;
    for binding in &init.canisters {
        if store.contains::<Canister>(&binding.name)? {
            continue;
        }
        let name = known_canister(&binding.name)?;
        mutations.push(Mutation::put(&Canister {
            name: name.to_string(),
            principal: principal::parse(&binding.principal)?,
        })?);
        added += 1;
    }
    store.apply(mutations)?;

    info!(
        admin = %app.admin_principal,
        scan_end_tx_id = app.scan_end_tx_id,
        canisters_added = added,
        "Vault state restored"
    );
    Ok(())
}
