//! SQL → IR lowering (§4.2). Wraps `sqlparser` the same way the analyzer
//! this codebase ships with a hand-rolled `SqlAnalyzer` wraps it: a small
//! struct around a fixed dialect, with a `lower` entry point that always
//! returns a handle (the rejection is encoded as `QueryStatus`, not a
//! `Result::Err` — only true internal failures, like arena exhaustion,
//! surface as `Err`).

mod expr;
mod query;
mod statement;

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use qp_core::QpError;
use qp_ir::{IrArena, QueryId, QueryIr, QueryNode, QueryStatus};

/// Lowers raw SQL text into a [`QueryIr`]. Stateless beyond the dialect;
/// safe to reuse across requests.
pub struct SqlLowerer {
    dialect: PostgreSqlDialect,
}

impl Default for SqlLowerer {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlLowerer {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }

    /// Parse and lower `sql`. Never fails for malformed or excluded SQL:
    /// the returned `QueryIr`'s root status reports `ParseError` or
    /// `Unsupported` instead. Only arena exhaustion returns `Err`.
    pub fn lower(&self, sql: &str) -> Result<QueryIr, QpError> {
        let mut arena = IrArena::new();
        let root = match Parser::parse_sql(&self.dialect, sql) {
            Err(e) => {
                tracing::debug!(error = %e, "sql parse failed");
                arena.alloc_query(QueryNode::with_status(QueryStatus::ParseError(e.to_string())))?
            }
            Ok(statements) => self.lower_statements(&mut arena, statements)?,
        };
        Ok(QueryIr { arena, root })
    }

    fn lower_statements(
        &self,
        arena: &mut IrArena,
        statements: Vec<sqlparser::ast::Statement>,
    ) -> Result<QueryId, QpError> {
        if statements.len() != 1 {
            tracing::debug!(count = statements.len(), "rejecting multi-statement input");
            return arena.alloc_query(QueryNode::with_status(QueryStatus::ParseError(
                "only a single statement is accepted".into(),
            )));
        }
        statement::lower_statement(arena, &statements[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qp_ir::{BinOp, ExprNode};

    #[test]
    fn multiple_statements_are_rejected() {
        let lowerer = SqlLowerer::new();
        let ir = lowerer.lower("SELECT 1; SELECT 2;").unwrap();
        assert!(matches!(ir.root().status, QueryStatus::ParseError(_)));
    }

    #[test]
    fn garbage_input_is_a_parse_error() {
        let lowerer = SqlLowerer::new();
        let ir = lowerer.lower("not even sql (((").unwrap();
        assert!(matches!(ir.root().status, QueryStatus::ParseError(_)));
    }

    /// Scenario S1 (§8): basic aliased base relation, AND'd WHERE, LIMIT.
    #[test]
    fn scenario_s1_accepts_and_shapes_where_and_limit() {
        let lowerer = SqlLowerer::new();
        let ir = lowerer
            .lower("SELECT p.id AS pid FROM private.people AS p WHERE p.age >= 25 AND p.region = 'c' LIMIT 200;")
            .unwrap();
        let root = ir.root();
        assert!(root.status.is_ok());
        assert_eq!(root.select_items.len(), 1);
        assert_eq!(root.select_items[0].out_alias, "pid");
        assert_eq!(root.limit, Some(200));
        match ir.expr(root.where_clause.unwrap()) {
            ExprNode::Binary { op: BinOp::And, .. } => {}
            other => panic!("expected top-level AND, got {other:?}"),
        }
    }

    /// Scenario S5 (§8): DELETE is rejected outright.
    #[test]
    fn scenario_s5_delete_is_unsupported() {
        let lowerer = SqlLowerer::new();
        let ir = lowerer.lower("DELETE FROM users WHERE id=1;").unwrap();
        assert!(ir.root().flags.has_unsupported);
        assert!(matches!(ir.root().status, QueryStatus::Unsupported(_)));
    }

    /// Scenario S6 (§8): SET, transaction control, COPY, recursive CTE are
    /// all rejected before reaching a backend.
    #[test]
    fn scenario_s6_rejects_everything() {
        let lowerer = SqlLowerer::new();
        for sql in [
            "SET statement_timeout=0;",
            "BEGIN; SELECT 1; COMMIT;",
            "COPY (SELECT 1) TO PROGRAM 'x';",
            "WITH RECURSIVE t(n) AS (SELECT 1) SELECT * FROM t;",
        ] {
            let ir = lowerer.lower(sql).unwrap();
            assert!(
                !ir.root().status.is_ok(),
                "expected {sql:?} to be rejected"
            );
        }
    }

    #[test]
    fn unaliased_from_item_is_unsupported() {
        let lowerer = SqlLowerer::new();
        let ir = lowerer.lower("SELECT id FROM users;").unwrap();
        assert!(ir.root().flags.has_unsupported);
    }

    #[test]
    fn exists_subquery_is_accepted_with_nested_touches_available() {
        let lowerer = SqlLowerer::new();
        let ir = lowerer
            .lower(
                "SELECT p.name FROM private.people AS p WHERE EXISTS (SELECT 1 FROM orders AS o WHERE o.user_id = p.id);",
            )
            .unwrap();
        assert!(ir.root().status.is_ok());
        match ir.expr(ir.root().where_clause.unwrap()) {
            ExprNode::Subquery(_) => {}
            other => panic!("expected top-level EXISTS subquery, got {other:?}"),
        }
    }
}
