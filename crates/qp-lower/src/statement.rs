use sqlparser::ast::Statement;

use qp_core::QpError;
use qp_ir::{IrArena, QueryId, QueryNode, QueryStatus};

use crate::query::lower_query;

/// Classify a top-level statement per §4.2's acceptance rules. Only
/// `Statement::Query` reaches the real lowering path; everything else
/// (transaction control, PREPARE/EXECUTE, SET, DO, COPY, any
/// data-changing DML/DDL) is `Unsupported` by construction.
pub fn lower_statement(arena: &mut IrArena, stmt: &Statement) -> Result<QueryId, QpError> {
    match stmt {
        Statement::Query(query) => lower_query(arena, query),
        Statement::Insert { .. }
        | Statement::Update { .. }
        | Statement::Delete { .. }
        | Statement::Merge { .. }
        | Statement::Truncate { .. }
        | Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex { .. }
        | Statement::AlterTable { .. }
        | Statement::Drop { .. } => {
            reject(arena, "data-changing or DDL statements are not accepted")
        }
        Statement::StartTransaction { .. }
        | Statement::Commit { .. }
        | Statement::Rollback { .. }
        | Statement::Savepoint { .. } => reject(arena, "transaction control is not accepted"),
        Statement::Prepare { .. } | Statement::Execute { .. } | Statement::Deallocate { .. } => {
            reject(arena, "PREPARE/EXECUTE are not accepted")
        }
        Statement::SetVariable { .. } => reject(arena, "SET is not accepted"),
        Statement::Copy { .. } => reject(arena, "COPY is not accepted"),
        _ => reject(arena, "statement kind is not in the accepted subset"),
    }
}

fn reject(arena: &mut IrArena, reason: &str) -> Result<QueryId, QpError> {
    arena.alloc_query(QueryNode::with_status(QueryStatus::Unsupported(
        reason.to_string(),
    )))
}
