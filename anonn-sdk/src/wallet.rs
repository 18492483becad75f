//! Wallet activity signals from the ledger.
//!
//! Wallet age is the block time of the oldest signature in the most recent
//! page of history, and the transaction count is that page's length. Both are
//! approximations bounded by the page limit.

use std::time::Duration;

use anonn_common::{Address, RawSignals};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::SdkError;

pub const SIGNATURE_PAGE_LIMIT: usize = 1000;

/// One entry of a `getSignaturesForAddress` result, newest first.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    #[serde(default)]
    pub block_time: Option<i64>,
}

#[async_trait]
pub trait WalletSignalSource: Send + Sync {
    async fn wallet_signals(&self, wallet: &Address, now: DateTime<Utc>) -> Result<RawSignals, SdkError>;
}

/// Derive wallet signals from a newest-first signature page.
///
/// No history means a wallet created `now` with zero transactions. A missing
/// block time on the oldest signature also falls back to `now`.
pub fn signals_from_signatures(signatures: &[SignatureInfo], now: DateTime<Utc>) -> RawSignals {
    let wallet_created_at = signatures
        .last()
        .and_then(|oldest| oldest.block_time)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or(now);

    RawSignals {
        wallet_created_at: Some(wallet_created_at),
        tx_count: Some(signatures.len() as u64),
        ..Default::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON-RPC SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct RpcWalletSignals {
    rpc_url: String,
    client: Client,
}

impl RpcWalletSignals {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, SdkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SdkError::WalletQuery(e.to_string()))?;
        Ok(Self {
            rpc_url: rpc_url.into(),
            client,
        })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, SdkError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SdkError::WalletQuery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SdkError::WalletQuery(format!("RPC returned HTTP {status}")));
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| SdkError::WalletQuery(e.to_string()))?;

        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(SdkError::WalletQuery(message));
        }

        body.get_mut("result")
            .map(Value::take)
            .ok_or_else(|| SdkError::WalletQuery("missing result in response".into()))
    }
}

#[async_trait]
impl WalletSignalSource for RpcWalletSignals {
    async fn wallet_signals(&self, wallet: &Address, now: DateTime<Utc>) -> Result<RawSignals, SdkError> {
        let result = self
            .rpc_call(
                "getSignaturesForAddress",
                json!([wallet.to_string(), { "limit": SIGNATURE_PAGE_LIMIT }]),
            )
            .await?;
        let signatures: Vec<SignatureInfo> =
            serde_json::from_value(result).map_err(|e| SdkError::WalletQuery(e.to_string()))?;
        debug!(%wallet, count = signatures.len(), "Fetched wallet signatures");
        Ok(signals_from_signatures(&signatures, now))
    }
}
