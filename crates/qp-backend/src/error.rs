//! Backend-local error type. Kept distinct from [`qp_core::QpError`] so the
//! adapter and connection manager don't need to know about the broker's
//! error taxonomy; the `From` impl below is the one conversion point,
//! mirroring how `cori-mcp::McpError` centralizes conversions from its
//! collaborators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unknown connection {0:?}")]
    UnknownConnection(String),

    #[error("failed to connect to {conn:?}: {source}")]
    Connect {
        conn: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("query execution failed: {0}")]
    Exec(#[source] sqlx::Error),
}

impl From<BackendError> for qp_core::QpError {
    fn from(e: BackendError) -> Self {
        qp_core::QpError::BackendError(e.to_string())
    }
}
