//! HTTP API - thin envelope over the vault operations
//!
//! Every handler returns the vault `Response` envelope as JSON. The caller
//! identity comes from the `x-caller` header and defaults to the anonymous
//! principal.

pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::vault::Vault;

/// Header carrying the caller principal
pub const CALLER_HEADER: &str = "x-caller";

pub type SharedVault = Arc<Vault>;

/// Create the API router
pub fn create_router(vault: SharedVault) -> Router {
    Router::new()
        // Queries
        .route("/status", get(routes::status))
        .route("/balance/:principal", get(routes::get_balance))
        .route("/transactions/:principal", get(routes::get_transactions))
        .route("/ledger_balance", get(routes::ledger_balance))
        // Commands
        .route("/transfer", post(routes::transfer))
        .route(
            "/update_transaction_history",
            post(routes::update_transaction_history),
        )
        .route("/admin", post(routes::set_admin))
        .route("/canister", post(routes::set_canister))
        // Test mode
        .route("/test_mode/status", get(routes::test_mode_status))
        .route("/test_mode/balance", post(routes::test_mode_set_balance))
        .route(
            "/test_mode/mock_transaction",
            post(routes::test_mode_set_mock_transaction),
        )
        .route("/test_mode/reset", post(routes::test_mode_reset))
        // Health check
        .route("/health", get(routes::health))
        .with_state(vault)
}
