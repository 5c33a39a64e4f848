//! JSON gateway client for the ICRC ledger
//!
//! Every call is `POST {gateway_url}/canister/{ledger}/{method}` with the typed
//! argument as the JSON body; the reply body is the typed result.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Account, GetTransactionsResponse, LedgerClient, TransferArgs, TransferResult};
use crate::error::LedgerError;

#[derive(Debug, Serialize)]
struct GetTransactionsRequest {
    start: u64,
    length: u64,
}

#[derive(Debug, Deserialize)]
struct BalanceReply(#[serde(with = "super::nat")] u128);

/// Ledger client speaking JSON to an HTTP gateway
pub struct HttpLedgerClient {
    client: reqwest::Client,
    gateway_url: String,
}

impl HttpLedgerClient {
    pub fn new(gateway_url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            client,
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn method_url(&self, ledger: &str, method: &str) -> String {
        format!("{}/canister/{}/{}", self.gateway_url, ledger, method)
    }

    async fn call<A, R>(&self, ledger: &str, method: &str, args: &A) -> Result<R, LedgerError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.method_url(ledger, method);
        debug!(%url, "Calling ledger");

        let response = self
            .client
            .post(&url)
            .json(args)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("{} {}: {}", method, ledger, e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(LedgerError::Unavailable(format!(
                "{} {}: HTTP {}",
                method, ledger, status
            )));
        }
        if !status.is_success() {
            return Err(LedgerError::InvalidResponse(format!(
                "{} {}: HTTP {}",
                method, ledger, status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("{} {}: {}", method, ledger, e)))
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn get_transactions(
        &self,
        ledger: &str,
        start: u64,
        length: u64,
    ) -> Result<GetTransactionsResponse, LedgerError> {
        self.call(
            ledger,
            "get_transactions",
            &GetTransactionsRequest { start, length },
        )
        .await
    }

    async fn icrc1_transfer(&self, ledger: &str, args: TransferArgs) -> Result<u64, LedgerError> {
        match self.call(ledger, "icrc1_transfer", &args).await? {
            TransferResult::Ok(block_index) => Ok(block_index),
            TransferResult::Err(e) => Err(LedgerError::Rejected(e)),
        }
    }

    async fn icrc1_balance_of(&self, ledger: &str, account: &Account) -> Result<u128, LedgerError> {
        let BalanceReply(balance) = self.call(ledger, "icrc1_balance_of", account).await?;
        Ok(balance)
    }
}
