// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-delimited JSON-RPC 2.0 framing over standard streams.
//!
//! One request or response per line. Notifications (requests without an
//! id) get no response. Oversized or unparseable lines produce protocol
//! errors without tearing the stream down.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

/// Maximum accepted request line (1 MB; instructions cap at 32 KiB).
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// JSON-RPC error codes used by this service.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Incoming request (or notification when `id` is absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outgoing response: exactly one of `result` / `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Decode one request line.
pub fn decode_request(line: &str) -> Result<RpcRequest, RpcResponse> {
    if line.len() > MAX_LINE_BYTES {
        return Err(RpcResponse::error(
            Value::Null,
            INVALID_REQUEST,
            format!("request exceeds {MAX_LINE_BYTES} bytes"),
        ));
    }
    let request: RpcRequest = serde_json::from_str(line)
        .map_err(|e| RpcResponse::error(Value::Null, PARSE_ERROR, format!("parse error: {e}")))?;
    if request.jsonrpc != "2.0" {
        return Err(RpcResponse::error(
            request.id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        ));
    }
    Ok(request)
}

/// Serve requests from `reader`, writing responses to `writer`, until
/// end of input. Requests are handled one at a time, in order.
pub async fn serve<R, W, H, Fut>(
    reader: R,
    mut writer: W,
    mut handler: H,
) -> Result<(), TransportError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: FnMut(RpcRequest) -> Fut,
    Fut: std::future::Future<Output = Option<RpcResponse>>,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let response = match decode_request(trimmed) {
            Ok(request) => {
                let is_notification = request.id.is_none();
                let method = request.method.clone();
                let response = handler(request).await;
                if is_notification {
                    debug!(method, "notification handled");
                    None
                } else {
                    response
                }
            }
            Err(error_response) => Some(error_response),
        };
        if let Some(response) = response {
            let mut body = serde_json::to_vec(&response).unwrap_or_else(|e| {
                warn!(error = %e, "response serialization failed");
                // A serialization failure must still answer the caller.
                br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"internal serialization error"}}"#
                    .to_vec()
            });
            body.push(b'\n');
            writer.write_all(&body).await?;
            writer.flush().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
