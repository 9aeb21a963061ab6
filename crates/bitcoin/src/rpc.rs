use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use satshop_core::{AppError, Settings};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// JSON-RPC client for a Bitcoin Core node (optionally scoped to one wallet).
///
/// Every request is bounded by the client timeout; an elapsed timeout maps to
/// the transient `AppError::Timeout`.
pub struct NodeClient {
    http: reqwest::Client,
    url: String,
    user: Option<String>,
    password: Option<String>,
    timeout: Duration,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// `listsinceblock` result.
#[derive(Debug, Clone, Deserialize)]
pub struct ListSinceBlock {
    pub transactions: Vec<WalletTransaction>,
    /// Cursor for the next call.
    pub lastblock: String,
}

/// One wallet entry as reported by `listsinceblock`.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletTransaction {
    pub address: Option<String>,
    pub category: String,
    pub amount: f64,
    pub vout: u32,
    pub confirmations: i64,
    pub txid: String,
}

#[derive(Debug, Deserialize)]
struct DescriptorInfo {
    descriptor: String,
}

#[derive(Debug, Deserialize)]
struct ImportResult {
    success: bool,
    error: Option<RpcErrorBody>,
}

impl NodeClient {
    pub fn new(
        url: &str,
        wallet: Option<&str>,
        user: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("http client: {e}")))?;

        let base = url.trim_end_matches('/');
        let url = match wallet {
            Some(name) => format!("{base}/wallet/{name}"),
            None => base.to_string(),
        };

        Ok(Self {
            http,
            url,
            user,
            password,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        Self::new(
            &settings.rpc_url,
            settings.rpc_wallet.as_deref(),
            settings.rpc_user.clone(),
            settings.rpc_password.clone(),
            settings.rpc_timeout(),
        )
    }

    /// Issue a raw JSON-RPC call and decode its `result`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, AppError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = self.http.post(&self.url).json(&json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        }));
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_ref());
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::Config(format!("node rejected RPC credentials ({status})")));
        }

        // Bitcoin Core reports RPC errors with a 500 status and a JSON body.
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        if let Some(err) = body.error {
            return Err(AppError::Rpc(format!(
                "{method}: {} (code {})",
                err.message, err.code
            )));
        }

        tracing::debug!(method, id, "RPC call succeeded");

        serde_json::from_value(body.result)
            .map_err(|e| AppError::Decode(format!("{method}: {e}")))
    }

    /// Wallet receives since `blockhash` (everything when `None`).
    ///
    /// The returned `lastblock` trails the tip by `target_confirmations - 1`, so
    /// transactions still below that depth are reported again next time.
    pub async fn list_since_block(
        &self,
        blockhash: Option<&str>,
        target_confirmations: u32,
    ) -> Result<ListSinceBlock, AppError> {
        let params = json!([blockhash.unwrap_or(""), target_confirmations.max(1), true, false]);
        self.call("listsinceblock", params).await
    }

    /// Register `address` as a watch-only descriptor so the wallet reports payments to it.
    ///
    /// The wallet rescans blocks from `since` (unix seconds), so payments made
    /// before the import succeeded are still found.
    pub async fn import_address(&self, address: &str, label: &str, since: i64) -> Result<(), AppError> {
        let info: DescriptorInfo = self
            .call("getdescriptorinfo", json!([format!("addr({address})")]))
            .await?;

        let results: Vec<ImportResult> = self
            .call("importdescriptors", import_params(&info.descriptor, label, since))
            .await?;

        match results.into_iter().next() {
            Some(r) if r.success => Ok(()),
            Some(ImportResult {
                error: Some(err), ..
            }) => Err(AppError::Rpc(format!(
                "importdescriptors: {} (code {})",
                err.message, err.code
            ))),
            _ => Err(AppError::Rpc(format!(
                "importdescriptors: {address} was not imported"
            ))),
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout.as_secs())
        } else if e.is_decode() {
            AppError::Decode(e.to_string())
        } else {
            AppError::Network(e.to_string())
        }
    }
}

/// `importdescriptors` parameters for one watch-only descriptor, rescanning from `since`.
fn import_params(descriptor: &str, label: &str, since: i64) -> Value {
    json!([[{
        "desc": descriptor,
        "timestamp": since.max(0),
        "label": label,
    }]])
}
