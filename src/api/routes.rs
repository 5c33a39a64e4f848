//! API route handlers

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::debug;

use super::{SharedVault, CALLER_HEADER};
use crate::error::Result;
use crate::principal::ANONYMOUS;
use crate::vault::Response;

type Reply = (StatusCode, Json<Response>);

fn reply(result: Result<Response>) -> Reply {
    match result {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(err) => {
            debug!(kind = err.kind(), error = %err, "Request failed");
            (err.status_code(), Json(Response::from_error(&err)))
        }
    }
}

fn caller(headers: &HeaderMap) -> String {
    headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to: String,
    pub amount: i128,
}

#[derive(Debug, Deserialize)]
pub struct AdminRequest {
    pub principal: String,
}

#[derive(Debug, Deserialize)]
pub struct CanisterRequest {
    pub name: String,
    pub principal: String,
}

#[derive(Debug, Deserialize)]
pub struct TestBalanceRequest {
    pub principal: String,
    pub amount: i128,
}

#[derive(Debug, Deserialize)]
pub struct MockTransactionRequest {
    pub from: String,
    pub to: String,
    pub amount: i128,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub kind: Option<String>,
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// GET /status
pub async fn status(State(vault): State<SharedVault>) -> Reply {
    reply(vault.status())
}

/// GET /balance/:principal
pub async fn get_balance(State(vault): State<SharedVault>, Path(principal): Path<String>) -> Reply {
    reply(vault.get_balance(&principal))
}

/// GET /transactions/:principal
pub async fn get_transactions(
    State(vault): State<SharedVault>,
    Path(principal): Path<String>,
) -> Reply {
    reply(vault.get_transactions(&principal))
}

/// GET /ledger_balance
pub async fn ledger_balance(State(vault): State<SharedVault>) -> Reply {
    reply(vault.ledger_balance().await)
}

/// POST /transfer
pub async fn transfer(
    State(vault): State<SharedVault>,
    headers: HeaderMap,
    Json(req): Json<TransferRequest>,
) -> Reply {
    reply(vault.transfer(&caller(&headers), &req.to, req.amount).await)
}

/// POST /update_transaction_history
pub async fn update_transaction_history(State(vault): State<SharedVault>) -> Reply {
    reply(vault.update_transaction_history().await)
}

/// POST /admin
pub async fn set_admin(
    State(vault): State<SharedVault>,
    headers: HeaderMap,
    Json(req): Json<AdminRequest>,
) -> Reply {
    reply(vault.set_admin(&caller(&headers), &req.principal))
}

/// POST /canister
pub async fn set_canister(
    State(vault): State<SharedVault>,
    headers: HeaderMap,
    Json(req): Json<CanisterRequest>,
) -> Reply {
    reply(vault.set_canister(&caller(&headers), &req.name, &req.principal))
}

/// GET /test_mode/status
pub async fn test_mode_status(State(vault): State<SharedVault>) -> Reply {
    reply(vault.test_mode_status())
}

/// POST /test_mode/balance
pub async fn test_mode_set_balance(
    State(vault): State<SharedVault>,
    headers: HeaderMap,
    Json(req): Json<TestBalanceRequest>,
) -> Reply {
    reply(vault.test_mode_set_balance(&caller(&headers), &req.principal, req.amount))
}

/// POST /test_mode/mock_transaction
pub async fn test_mode_set_mock_transaction(
    State(vault): State<SharedVault>,
    headers: HeaderMap,
    Json(req): Json<MockTransactionRequest>,
) -> Reply {
    reply(vault.test_mode_set_mock_transaction(
        &caller(&headers),
        &req.from,
        &req.to,
        req.amount,
        req.timestamp,
        req.kind.as_deref(),
    ))
}

/// POST /test_mode/reset
pub async fn test_mode_reset(State(vault): State<SharedVault>, headers: HeaderMap) -> Reply {
    reply(vault.test_mode_reset(&caller(&headers)))
}
