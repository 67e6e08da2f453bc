//! The unifying error taxonomy (§7). Every fallible operation in the
//! validating pipeline ultimately collapses into one of these kinds before
//! it reaches the broker and becomes a JSON-RPC error object.
//!
//! `RuntimeLimit` deliberately has no variant here: it is not an error, it
//! is a result flag (`result_truncated`) that the result builder sets on a
//! successful `QueryResult`.

use thiserror::Error;

/// Machine-readable policy rejection codes (`QRERR_*`), one per validator
/// rule in the order they're evaluated.
pub mod qrerr {
    pub const PARSE_STATUS: &str = "QRERR_PARSE_STATUS";
    pub const UNSUPPORTED: &str = "QRERR_UNSUPPORTED";
    pub const UNKNOWN_TOUCH: &str = "QRERR_UNKNOWN_TOUCH";
    pub const STAR: &str = "QRERR_STAR";
    pub const SENSITIVE_SCOPE: &str = "QRERR_SENSITIVE_SCOPE";
}

#[derive(Debug, Error)]
pub enum QpError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("policy rejected [{code}]: {message}")]
    PolicyReject { code: &'static str, message: String },

    #[error("backend error: {0}")]
    BackendError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl QpError {
    pub fn policy_reject(code: &'static str, message: impl Into<String>) -> Self {
        QpError::PolicyReject {
            code,
            message: message.into(),
        }
    }

    /// The JSON-RPC error code this kind maps to, following the broad
    /// convention of negative application-defined codes outside the
    /// reserved `-32768..-32000` JSON-RPC range.
    pub fn rpc_code(&self) -> i32 {
        match self {
            QpError::BadInput(_) => -32001,
            QpError::ParseError(_) => -32002,
            QpError::Unsupported(_) => -32003,
            QpError::PolicyReject { .. } => -32004,
            QpError::BackendError(_) => -32005,
            QpError::Internal(_) => -32006,
        }
    }
}
