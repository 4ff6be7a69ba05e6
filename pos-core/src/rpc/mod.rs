//! 远端 RPC 客户端
//!
//! The backend speaks JSON-RPC 2.0 over HTTP POST: every call is
//! `{jsonrpc: "2.0", method: "call", params: {model, method, args, kwargs}}`;
//! success carries `{result}`, failure `{error: {code, message, data}}`.
//!
//! Authorization failures (`error.code == 100`, or HTTP 401/403) are a
//! distinct error class: this core never retries them, the host owning the
//! server session is responsible for re-authentication.

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::config::Config;

/// Server-side error code for an expired or missing authorization
pub const AUTH_ERROR_CODE: i64 = 100;

/// RPC 错误
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("authorization rejected: {0}")]
    Auth(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("malformed response: {0}")]
    Protocol(String),
}

/// Request/response transport to the remote backend.
///
/// One implementation speaks HTTP ([`HttpRpcClient`]); tests swap in a
/// scripted mock. Timeouts are the transport's job and surface as
/// [`RpcError::Transport`].
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, RpcError>;
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: CallParams<'a>,
}

#[derive(Serialize)]
struct CallParams<'a> {
    model: &'a str,
    method: &'a str,
    args: Value,
    kwargs: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

fn classify_error(error: JsonRpcErrorBody) -> RpcError {
    if error.code == AUTH_ERROR_CODE {
        return RpcError::Auth(error.message);
    }
    if let Some(data) = &error.data {
        tracing::debug!(code = error.code, %data, "rpc error detail");
    }
    RpcError::Server {
        code: error.code,
        message: error.message,
    }
}

/// HTTP JSON-RPC 客户端
#[derive(Debug, Clone)]
pub struct HttpRpcClient {
    client: Client,
    endpoint: String,
    database: String,
}

impl HttpRpcClient {
    /// Build the client from configuration (base URL, tenant database,
    /// request timeout)
    pub fn new(config: &Config) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.rpc_timeout_ms))
            .build()
            .map_err(|e| RpcError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/rpc", config.base_url.trim_end_matches('/')),
            database: config.database.clone(),
        })
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn call(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: CallParams {
                model,
                method,
                args,
                kwargs,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Tenant-Db", &self.database)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RpcError::Auth(format!("http {status}")));
        }
        if !status.is_success() {
            return Err(RpcError::Transport(format!("http status {status}")));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Protocol(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(classify_error(error));
        }
        body.result
            .ok_or_else(|| RpcError::Protocol("response carries neither result nor error".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_shape() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: CallParams {
                model: "orders",
                method: "create",
                args: json!([{"amount_total": 20}]),
                kwargs: json!({}),
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "call");
        assert_eq!(value["params"]["model"], "orders");
        assert_eq!(value["params"]["method"], "create");
        assert_eq!(value["params"]["args"][0]["amount_total"], 20);
    }

    #[test]
    fn test_auth_code_is_distinct_from_server_errors() {
        let auth = classify_error(JsonRpcErrorBody {
            code: AUTH_ERROR_CODE,
            message: "session expired".into(),
            data: None,
        });
        assert!(matches!(auth, RpcError::Auth(_)));

        let server = classify_error(JsonRpcErrorBody {
            code: 200,
            message: "validation failed".into(),
            data: Some(json!({"field": "lines"})),
        });
        match server {
            RpcError::Server { code, message } => {
                assert_eq!(code, 200);
                assert_eq!(message, "validation failed");
            }
            other => panic!("expected Server, got {other:?}"),
        }
    }

    #[test]
    fn test_response_parsing() {
        let ok: JsonRpcResponse = serde_json::from_str(r#"{"result": {"id": 5}}"#).unwrap();
        assert_eq!(ok.result.unwrap()["id"], 5);
        assert!(ok.error.is_none());

        let err: JsonRpcResponse =
            serde_json::from_str(r#"{"error": {"code": 100, "message": "no"}}"#).unwrap();
        assert!(err.result.is_none());
        assert_eq!(err.error.unwrap().code, 100);
    }
}
