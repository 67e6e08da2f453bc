//! JSON-RPC 2.0 envelope and the `exec`/`status` payload shapes (§6),
//! carried over from `cori_mcp::protocol::{JsonRpcRequest, JsonRpcResponse,
//! JsonRpcError}` verbatim in shape, retargeted from MCP's
//! `tools/list`/`tools/call` method surface to `exec`/`status`/meta.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn from_qp_error(id: Option<Value>, err: &qp_core::QpError) -> Self {
        Self::error(id, err.rpc_code(), err.to_string())
    }
}

/// Params for the `exec` method.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecParams {
    pub sql: String,
}

/// Result for the `exec` method.
#[derive(Debug, Clone, Serialize)]
pub struct ExecResult {
    pub exec_ms: u64,
    pub columns: Vec<ExecColumn>,
    pub rows: Vec<Vec<Value>>,
    pub rowcount: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Result for the `status` method: a point-in-time connection snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub session_id: String,
    pub connection: Option<String>,
    pub created_at_unix: u64,
    pub last_active_unix: u64,
}
