//! The narrow backend capability (§4's `[ADD]` connection manager note):
//! every backend driver this codebase ever wires in only needs to do two
//! things — turn SQL text into a [`QueryIr`], and run already-validated SQL
//! text against the live connection, streaming rows into a
//! [`ResultBuilder`]. Everything else (parsing the restricted subset,
//! deciding acceptance, tokenizing sensitive cells) lives above this trait
//! and is backend-independent.

use async_trait::async_trait;
use qp_core::{QpError, SafetyPolicy};
use qp_ir::QueryIr;
use qp_result::{QueryResult, ResultBuilder};

#[async_trait]
pub trait DbBackend: Send + Sync {
    /// Lower `sql` into the query IR. Backend-specific only in which SQL
    /// dialect/AST it parses through; the IR itself is backend-independent.
    fn parse(&self, sql: &str) -> Result<QueryIr, QpError>;

    /// Execute already-accepted `sql` under `policy`'s caps and timeout,
    /// streaming every row through `builder`. The backend carries no
    /// policy logic of its own: `builder` already encodes the validator's
    /// plan, so this is purely a row pump.
    async fn exec(
        &self,
        sql: &str,
        policy: &SafetyPolicy,
        builder: ResultBuilder<'_>,
    ) -> Result<QueryResult, QpError>;
}
