//! Sync engine integration tests against the in-memory ledger

use std::sync::Arc;

use serde_json::json;

use icrc_vault::config::{CanisterBinding, InitArgs};
use icrc_vault::ledger::{LedgerTransaction, MockLedger};
use icrc_vault::principal::MINTING_ACCOUNT;
use icrc_vault::store::records::{APP_DATA_ID, LEDGER_CANISTER};
use icrc_vault::store::{AppData, Balance, SyncStatus, VaultTransaction};
use icrc_vault::{LedgerError, Response, ResponseData, Store, Vault, VaultError, VaultSettings};

const VAULT: &str = "vault";
const ADMIN: &str = "admin";
const LEDGER: &str = "mxzaz-hqaaa-aaaar-qaada-cai";
const DEPLOYER: &str = "rwlgt-iiaaa-aaaaa-aaaaa-cai";

fn init(max_results: u64, max_iteration_count: u64) -> InitArgs {
    InitArgs {
        canisters: vec![CanisterBinding {
            name: LEDGER_CANISTER.to_string(),
            principal: LEDGER.to_string(),
        }],
        admin_principal: Some(ADMIN.to_string()),
        max_results: Some(max_results),
        max_iteration_count: Some(max_iteration_count),
        test_mode_enabled: false,
    }
}

fn open(store: Store, ledger: &Arc<MockLedger>, init: &InitArgs) -> Vault {
    Vault::open(
        store,
        ledger.clone(),
        VaultSettings {
            vault_principal: VAULT.to_string(),
            status_tx_limit: 100,
        },
        init,
        DEPLOYER,
    )
    .unwrap()
}

fn setup(max_results: u64, max_iteration_count: u64) -> (Vault, Arc<MockLedger>) {
    let ledger = Arc::new(MockLedger::new(VAULT));
    let vault = open(
        Store::temporary().unwrap(),
        &ledger,
        &init(max_results, max_iteration_count),
    );
    (vault, ledger)
}

/// `(new_txs_count, sync_status, scan_end_tx_id)`
fn summary(response: &Response) -> (u64, SyncStatus, u64) {
    match &response.data {
        ResponseData::TransactionSummary {
            new_txs_count,
            sync_status,
            scan_end_tx_id,
        } => (*new_txs_count, *sync_status, *scan_end_tx_id),
        other => panic!("expected a transaction summary, got {:?}", other),
    }
}

async fn sync(vault: &Vault) -> (u64, SyncStatus, u64) {
    let response = vault.update_transaction_history().await.unwrap();
    assert!(response.success);
    summary(&response)
}

fn app(vault: &Vault) -> AppData {
    vault.app_data().unwrap()
}

fn balance(vault: &Vault, principal: &str) -> Option<i128> {
    vault
        .store()
        .get::<Balance>(principal)
        .unwrap()
        .map(|b| b.amount)
}

fn transactions(vault: &Vault) -> Vec<VaultTransaction> {
    vault.store().all::<VaultTransaction>().unwrap()
}

/// Every balance equals inflows minus outflows over the recorded transactions.
fn assert_balances_consistent(vault: &Vault) {
    let txs = transactions(vault);
    for b in vault.store().all::<Balance>().unwrap() {
        let expected: i128 = txs
            .iter()
            .map(|tx| {
                let amount = tx.amount as i128;
                match (tx.principal_to == b.principal_id, tx.principal_from == b.principal_id) {
                    (true, false) => amount,
                    (false, true) => -amount,
                    _ => 0,
                }
            })
            .sum();
        assert_eq!(b.amount, expected, "balance of {}", b.principal_id);
    }
    for tx in &txs {
        assert!(tx.involves(VAULT), "tx {} does not involve the vault", tx.id);
    }
}

#[tokio::test]
async fn test_cursor_walkthrough() {
    let (vault, ledger) = setup(40, 1);
    ledger.fill_to(100);

    // Initialization at id 100
    let before = app(&vault);
    assert_eq!(
        (before.scan_start_tx_id, before.scan_end_tx_id, before.scan_oldest_tx_id),
        (0, 0, 0)
    );

    let (new_txs, status, scan_end) = sync(&vault).await;
    assert_eq!((new_txs, scan_end), (0, 100));
    assert_eq!(status, SyncStatus::Syncing);
    let a = app(&vault);
    assert_eq!(
        (a.scan_start_tx_id, a.scan_end_tx_id, a.scan_oldest_tx_id),
        (100, 100, 0)
    );
    assert!(transactions(&vault).is_empty());
    assert!(vault.store().all::<Balance>().unwrap().is_empty());
    assert_eq!(ledger.requests(), vec![(0, 1)]);

    // Relevant deposit
    assert_eq!(ledger.push_transfer("alice", VAULT, 500), 100);
    let (new_txs, _, scan_end) = sync(&vault).await;
    assert_eq!((new_txs, scan_end), (1, 101));
    let tx = vault.store().get::<VaultTransaction>("100").unwrap().unwrap();
    assert_eq!(tx.principal_from, "alice");
    assert_eq!(tx.amount, 500);
    assert_eq!(balance(&vault, "alice"), Some(-500));
    assert_eq!(balance(&vault, VAULT), Some(500));

    // Irrelevant entry
    assert_eq!(ledger.push_transfer("xxxxx", "yyyyy", 7), 101);
    let (new_txs, _, scan_end) = sync(&vault).await;
    assert_eq!((new_txs, scan_end), (0, 102));
    assert_eq!(transactions(&vault).len(), 1);
    assert_eq!(balance(&vault, "xxxxx"), None);

    // Archival gap
    ledger.fill_to(160);
    ledger.archive_before(150);
    let (_, _, scan_end) = sync(&vault).await;
    assert_eq!(scan_end, 150);
    let a = app(&vault);
    assert_eq!(a.scan_start_tx_id, 150);
    assert_eq!(a.scan_oldest_tx_id, 150);
    assert_eq!(ledger.requests().last(), Some(&(102, 40)));

    // Next call fetches [150, 160)
    let (_, status, scan_end) = sync(&vault).await;
    assert_eq!(scan_end, 160);
    assert_eq!(ledger.requests().last(), Some(&(150, 40)));
    assert_eq!(status, SyncStatus::Syncing);

    assert_balances_consistent(&vault);
}

#[tokio::test]
async fn test_gap_with_returned_entries_keeps_their_ids() {
    let (vault, ledger) = setup(100, 10);
    ledger.fill_to(102);
    sync(&vault).await;

    ledger.fill_to(155);
    assert_eq!(ledger.push_transfer("alice", VAULT, 9), 155);
    ledger.fill_to(160);
    ledger.archive_before(150);

    let (new_txs, status, scan_end) = sync(&vault).await;
    assert_eq!((new_txs, scan_end), (1, 160));
    assert!(vault.store().contains::<VaultTransaction>("155").unwrap());

    let a = app(&vault);
    assert_eq!(a.scan_start_tx_id, 150);
    assert_eq!(a.scan_oldest_tx_id, 150);
    assert_eq!(status, SyncStatus::Syncing);
}

#[tokio::test]
async fn test_replay_after_restart_is_idempotent() {
    let (vault, ledger) = setup(100, 10);
    ledger.fill_to(100);
    sync(&vault).await;

    ledger.push_transfer("alice", VAULT, 500);
    ledger.push_transfer(VAULT, "bob", 120);
    ledger.push_mint(VAULT, 30);
    sync(&vault).await;
    let balances_before = vault.store().all::<Balance>().unwrap();
    let audit_before = vault.store().audit_len();

    // Fresh handle over the same store, with the cursor rewound
    let store = vault.store().clone();
    drop(vault);
    let vault = open(store.clone(), &ledger, &init(100, 10));
    let mut a = app(&vault);
    a.scan_end_tx_id = 100;
    store.put(&a).unwrap();

    let (new_txs, _, scan_end) = sync(&vault).await;
    assert_eq!((new_txs, scan_end), (0, 103));
    assert_eq!(transactions(&vault).len(), 3);

    let mut balances_after = vault.store().all::<Balance>().unwrap();
    let mut balances_before = balances_before;
    balances_before.sort_by(|a, b| a.principal_id.cmp(&b.principal_id));
    balances_after.sort_by(|a, b| a.principal_id.cmp(&b.principal_id));
    assert_eq!(balances_before, balances_after);

    // Only cursor and flag writes reached the audit trail
    let new_entries = vault.store().audit_tail(vault.store().audit_len() - audit_before).unwrap();
    assert!(new_entries.iter().all(|e| e.kind == "app_data"));

    // Repeated calls after catch-up are no-ops
    assert_eq!(sync(&vault).await.0, 0);
    assert_balances_consistent(&vault);
}

#[tokio::test]
async fn test_batches_and_iteration_cap() {
    let (vault, ledger) = setup(2, 2);
    ledger.fill_to(10);
    sync(&vault).await;

    for _ in 0..5 {
        ledger.push_transfer("alice", VAULT, 1);
    }

    let (new_txs, _, scan_end) = sync(&vault).await;
    assert_eq!((new_txs, scan_end), (4, 14));

    let (new_txs, _, scan_end) = sync(&vault).await;
    assert_eq!((new_txs, scan_end), (1, 15));

    assert_eq!(
        ledger.requests(),
        vec![(0, 1), (10, 2), (12, 2), (14, 2)]
    );
    assert_eq!(balance(&vault, VAULT), Some(5));
}

#[tokio::test]
async fn test_failed_batch_keeps_earlier_progress() {
    let (vault, ledger) = setup(2, 10);
    ledger.fill_to(10);
    sync(&vault).await;
    for _ in 0..5 {
        ledger.push_transfer("alice", VAULT, 10);
    }

    ledger.pass_next();
    ledger.fail_next(LedgerError::Unavailable("connection reset".into()));

    let err = vault.update_transaction_history().await.unwrap_err();
    assert!(matches!(err, VaultError::RemoteUnavailable(_)));

    let a = app(&vault);
    assert_eq!(a.scan_end_tx_id, 12);
    assert!(!a.sync_in_progress);
    assert_eq!(transactions(&vault).len(), 2);

    let (new_txs, _, scan_end) = sync(&vault).await;
    assert_eq!((new_txs, scan_end), (3, 15));
    assert_eq!(balance(&vault, VAULT), Some(50));
}

#[tokio::test]
async fn test_uninterpretable_entries_are_skipped() {
    let (vault, ledger) = setup(100, 10);
    ledger.fill_to(5);
    sync(&vault).await;

    let mut broken = LedgerTransaction::transfer("alice", VAULT, 1, 1);
    broken.transfer = None;
    ledger.push(broken);

    let mut unknown = LedgerTransaction::transfer("alice", VAULT, 1, 1);
    unknown.kind = "icrc3_upgrade".into();
    ledger.push(unknown);

    ledger.push_transfer("alice", VAULT, 25);

    let (new_txs, _, scan_end) = sync(&vault).await;
    assert_eq!((new_txs, scan_end), (1, 8));
    assert!(vault.store().contains::<VaultTransaction>("7").unwrap());
    assert_eq!(balance(&vault, VAULT), Some(25));
}

#[tokio::test]
async fn test_undecodable_entry_is_skipped_and_scan_moves_on() {
    let (vault, ledger) = setup(100, 10);
    ledger.fill_to(10);
    sync(&vault).await;

    ledger.push_raw(json!({
        "kind": "transfer",
        "timestamp": 1,
        "transfer": {"from": {"owner": "alice"}, "to": {"owner": VAULT}, "amount": 1.5}
    }));
    ledger.push_raw(json!({
        "kind": "transfer",
        "timestamp": 2,
        "transfer": {"from": {"owner": "alice"}, "to": {"owner": VAULT}, "amount": "5"}
    }));

    let (new_txs, _, scan_end) = sync(&vault).await;
    assert_eq!((new_txs, scan_end), (1, 12));
    assert!(!vault.store().contains::<VaultTransaction>("10").unwrap());
    assert!(vault.store().contains::<VaultTransaction>("11").unwrap());
    assert_eq!(balance(&vault, VAULT), Some(5));
}

#[tokio::test]
async fn test_mint_and_burn_use_minting_account() {
    let (vault, ledger) = setup(100, 10);
    ledger.fill_to(1);
    sync(&vault).await;

    ledger.push_mint(VAULT, 100);
    ledger.push_burn(VAULT, 30);
    ledger.push_mint("alice", 5);
    sync(&vault).await;

    assert_eq!(transactions(&vault).len(), 2);
    assert_eq!(balance(&vault, VAULT), Some(70));
    assert_eq!(balance(&vault, MINTING_ACCOUNT), Some(-70));
    assert_balances_consistent(&vault);
}

#[tokio::test]
async fn test_sync_busy_flag() {
    let (vault, ledger) = setup(100, 10);

    let mut a = app(&vault);
    a.sync_in_progress = true;
    vault.store().put(&a).unwrap();

    let err = vault.update_transaction_history().await.unwrap_err();
    assert!(matches!(err, VaultError::SyncBusy));
    assert!(ledger.requests().is_empty());

    // A restart clears a flag left behind by an interrupted run
    let store = vault.store().clone();
    drop(vault);
    let vault = open(store, &ledger, &init(100, 10));
    assert!(!app(&vault).sync_in_progress);
    assert!(vault.update_transaction_history().await.is_ok());
}

#[tokio::test]
async fn test_missing_ledger_binding() {
    let ledger = Arc::new(MockLedger::new(VAULT));
    let mut args = init(100, 10);
    args.canisters.clear();
    let vault = open(Store::temporary().unwrap(), &ledger, &args);

    let err = vault.update_transaction_history().await.unwrap_err();
    assert_eq!(err.kind(), "InvalidArgument");
    assert!(!app(&vault).sync_in_progress);
}

#[tokio::test]
async fn test_empty_ledger_stays_uninitialized() {
    let (vault, ledger) = setup(100, 10);
    let (_, status, scan_end) = sync(&vault).await;
    assert_eq!(scan_end, 0);
    assert_eq!(status, SyncStatus::Synced);

    ledger.push_transfer("alice", VAULT, 3);
    sync(&vault).await;
    let a = vault.store().get::<AppData>(APP_DATA_ID).unwrap().unwrap();
    assert_eq!(a.scan_end_tx_id, 1);
    assert!(transactions(&vault).is_empty());
}
