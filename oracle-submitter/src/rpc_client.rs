use std::time::Duration;

use oracle_common::error::{CoreError, HttpErrorKind};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::{error, warn};

/// Minimal JSON-RPC 2.0 client for the chain RPC endpoint. Request/retry
/// shape is grounded on `kembridge-common::client::ServiceClient`
/// (`retry_request` looping over a fixed attempt count with exponential
/// backoff), adapted from a REST envelope to a JSON-RPC envelope.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
    max_retries: u32,
}

impl RpcClient {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, timeout: Duration, max_retries: u32) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            endpoint: endpoint.into(),
            max_retries,
        }
    }

    /// Invokes `method` with `params`, retrying transient failures the way
    /// `ServiceClient::retry_request` does.
    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, CoreError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let mut attempt = 0;
        loop {
            match self.send_once::<R>(&body).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = matches!(&err, CoreError::Http { kind, .. } if kind.is_retryable());
                    if !retryable || attempt >= self.max_retries {
                        return Err(err);
                    }
                    let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                    warn!(method, attempt, ?delay, "rpc call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn send_once<R: DeserializeOwned>(&self, body: &Value) -> Result<R, CoreError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::Http {
                source_name: "rpc".to_string(),
                kind: classify_reqwest_error(&e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Http {
                source_name: "rpc".to_string(),
                kind: HttpErrorKind::from_status(status.as_u16()),
            });
        }

        let envelope: Value = response.json().await.map_err(|e| {
            error!(error = %e, "failed to parse rpc response body");
            CoreError::Http {
                source_name: "rpc".to_string(),
                kind: HttpErrorKind::Unparseable,
            }
        })?;

        if let Some(err) = envelope.get("error") {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error")
                .to_string();
            return Err(CoreError::Rpc { code, message });
        }

        let result = envelope.get("result").cloned().unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| {
            error!(error = %e, "failed to deserialize rpc result");
            CoreError::Http {
                source_name: "rpc".to_string(),
                kind: HttpErrorKind::Unparseable,
            }
        })
    }

    /// Builds an invocation call whose witnesses array is `witnesses`,
    /// dispatching to `call`. Kept separate from `call` so the submitter
    /// can build method-specific params without duplicating the retry
    /// plumbing.
    pub async fn invoke_function<R: DeserializeOwned>(
        &self,
        script_hash: &str,
        operation: &str,
        args: Value,
        witnesses: Vec<impl Serialize>,
    ) -> Result<R, CoreError> {
        let params = json!([script_hash, operation, args, witnesses]);
        self.call("invokefunction", params).await
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> HttpErrorKind {
    if err.is_timeout() {
        HttpErrorKind::Timeout
    } else if err.is_connect() {
        HttpErrorKind::Connection
    } else if let Some(status) = err.status() {
        HttpErrorKind::from_status(status.as_u16())
    } else {
        HttpErrorKind::Connection
    }
}
