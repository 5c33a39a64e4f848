//! HTTP ledger client tests against a local JSON gateway

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use icrc_vault::config::{CanisterBinding, InitArgs};
use icrc_vault::store::records::LEDGER_CANISTER;
use icrc_vault::store::{Balance, VaultTransaction};
use icrc_vault::{HttpLedgerClient, Store, Vault, VaultSettings};

const VAULT: &str = "vault";
const ADMIN: &str = "admin";
const LEDGER: &str = "mxzaz-hqaaa-aaaar-qaada-cai";

/// Raw JSON text of every log entry, in tx-id order
type Log = Arc<Mutex<Vec<String>>>;

#[derive(Deserialize)]
struct Window {
    start: u64,
    length: u64,
}

async fn get_transactions(State(log): State<Log>, Json(window): Json<Window>) -> impl IntoResponse {
    let log = log.lock().unwrap();
    let len = log.len() as u64;
    let start = window.start.min(len) as usize;
    let end = window.start.saturating_add(window.length).min(len) as usize;
    let body = format!(
        r#"{{"first_index": 0, "log_length": {}, "transactions": [{}]}}"#,
        len,
        log[start..end].join(",")
    );
    ([(header::CONTENT_TYPE, "application/json")], body)
}

fn transfer(from: &str, to: &str, amount: &str, timestamp: &str) -> String {
    format!(
        r#"{{"kind": "transfer", "timestamp": {}, "transfer": {{"from": {{"owner": "{}"}}, "to": {{"owner": "{}"}}, "amount": {}}}}}"#,
        timestamp, from, to, amount
    )
}

async fn gateway(log: Log) -> String {
    let router = Router::new()
        .route("/canister/:ledger/get_transactions", post(get_transactions))
        .with_state(log);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn open_vault(url: &str) -> Vault {
    let ledger = Arc::new(HttpLedgerClient::new(url, Duration::from_secs(5)).unwrap());
    let init = InitArgs {
        canisters: vec![CanisterBinding {
            name: LEDGER_CANISTER.to_string(),
            principal: LEDGER.to_string(),
        }],
        admin_principal: Some(ADMIN.to_string()),
        ..Default::default()
    };
    Vault::open(
        Store::temporary().unwrap(),
        ledger,
        VaultSettings {
            vault_principal: VAULT.to_string(),
            status_tx_limit: 100,
        },
        &init,
        ADMIN,
    )
    .unwrap()
}

#[tokio::test]
async fn test_bad_entries_over_http_do_not_stall_the_cursor() {
    let log: Log = Arc::new(Mutex::new(
        (0..10)
            .map(|_| transfer("xxxxx", "yyyyy", "\"1\"", "1"))
            .collect(),
    ));
    let url = gateway(log.clone()).await;
    let vault = open_vault(&url);

    vault.update_transaction_history().await.unwrap();
    assert_eq!(vault.app_data().unwrap().scan_end_tx_id, 10);

    {
        let mut log = log.lock().unwrap();
        log.push(transfer("alice", VAULT, "1.5", "2"));
        log.push(transfer("alice", VAULT, "7", "\"late\""));
        log.push(transfer("alice", VAULT, "\"5\"", "4"));
        log.push(transfer("bob", VAULT, "18446744073709551616", "5"));
    }

    let response = vault.update_transaction_history().await.unwrap();
    assert!(response.success);

    let app = vault.app_data().unwrap();
    assert_eq!(app.scan_end_tx_id, 14);
    assert!(!vault.store().contains::<VaultTransaction>("10").unwrap());
    assert!(!vault.store().contains::<VaultTransaction>("11").unwrap());

    let deposit = vault.store().get::<VaultTransaction>("12").unwrap().unwrap();
    assert_eq!(deposit.principal_from, "alice");
    assert_eq!(deposit.amount, 5);

    let large = vault.store().get::<VaultTransaction>("13").unwrap().unwrap();
    assert_eq!(large.amount, u64::MAX as u128 + 1);

    let balance = vault.store().get::<Balance>(VAULT).unwrap().unwrap();
    assert_eq!(balance.amount, 5 + u64::MAX as i128 + 1);
}
