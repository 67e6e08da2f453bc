//! Touch extraction (§4.3): walks the entire IR and records one [`Touch`]
//! per `ColRef` encountered.
//!
//! Alias resolution is correlation-aware: a qualifier is looked up first
//! against the query block that physically contains the reference, then
//! against each enclosing query in turn (the same scoping SQL itself uses
//! for correlated subqueries). The `scope` recorded on the touch reflects
//! *where the alias is owned* — `MAIN` if the match is the top-level
//! query's own FROM/JOIN item, `NESTED` if it's owned by any enclosing
//! subquery — which is why a correlated reference to an outer alias from
//! inside a nested subquery is itself `MAIN`-scoped (see the `EXISTS`
//! scenario in the test module below). An unresolved qualifier falls back
//! to the scope of whichever query physically contains it.

use std::collections::HashMap;

use qp_ir::{ExprId, ExprNode, FromItemKind, QueryId, QueryIr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Main,
    Nested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Base,
    Derived,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Touch {
    pub scope: Scope,
    pub kind: Kind,
    pub qualifier: String,
    pub column: String,
    /// The query block whose expression tree this `ColRef` physically
    /// appears in (not necessarily the one that owns the resolved alias).
    pub source_query: QueryId,
    /// True when this reference is physically written somewhere in its
    /// `source_query`'s own SELECT list (as opposed to WHERE/GROUP
    /// BY/HAVING/ORDER BY/JOIN ON, or anywhere inside a nested query).
    pub in_select_list: bool,
}

#[derive(Debug, Default)]
pub struct TouchReport {
    pub touches: Vec<Touch>,
    pub has_unknown_touches: bool,
    pub has_unsupported: bool,
}

struct Frame {
    scope: Scope,
    aliases: HashMap<String, Kind>,
}

/// Walk `ir` and produce a complete touch report. Infallible: allocation
/// failures can't happen here (the IR is already fully built), and any
/// construct the lowering layer couldn't model was already turned into
/// `Expr::Unsupported`/`has_unsupported`, which this pass just propagates.
pub fn extract(ir: &QueryIr) -> TouchReport {
    let mut report = TouchReport::default();
    let mut stack = Vec::new();
    walk_query(ir, ir.root, Scope::Main, &mut stack, &mut report);
    report
}

fn alias_kind_map(node: &qp_ir::QueryNode) -> HashMap<String, Kind> {
    let mut map = HashMap::new();
    for item in &node.from_items {
        if let Some(kind) = from_item_kind(&item.kind) {
            map.insert(item.alias.clone(), kind);
        }
    }
    for join in &node.joins {
        if let Some(kind) = from_item_kind(&join.rhs.kind) {
            map.insert(join.rhs.alias.clone(), kind);
        }
    }
    map
}

fn from_item_kind(kind: &FromItemKind) -> Option<Kind> {
    match kind {
        FromItemKind::BaseRel { .. } => Some(Kind::Base),
        FromItemKind::Subquery(_) | FromItemKind::CteRef(_) | FromItemKind::Values(_) => {
            Some(Kind::Derived)
        }
        FromItemKind::Unsupported => None,
    }
}

fn resolve(stack: &[Frame], qualifier: &str) -> Option<(Scope, Kind)> {
    for frame in stack.iter().rev() {
        if let Some(kind) = frame.aliases.get(qualifier) {
            return Some((frame.scope, *kind));
        }
    }
    None
}

fn walk_query(ir: &QueryIr, qid: QueryId, scope: Scope, stack: &mut Vec<Frame>, report: &mut TouchReport) {
    let node = ir.query(qid);
    if node.flags.has_unsupported {
        report.has_unsupported = true;
    }

    stack.push(Frame {
        scope,
        aliases: alias_kind_map(node),
    });

    for cte in &node.ctes {
        walk_query(ir, cte.query, Scope::Nested, stack, report);
    }

    for item in &node.from_items {
        if let FromItemKind::Subquery(sub) = &item.kind {
            walk_query(ir, *sub, Scope::Nested, stack, report);
        }
    }

    for join in &node.joins {
        if let FromItemKind::Subquery(sub) = &join.rhs.kind {
            walk_query(ir, *sub, Scope::Nested, stack, report);
        }
        if let Some(on) = join.on {
            walk_expr(ir, on, qid, false, stack, report);
        }
    }

    for item in &node.select_items {
        walk_expr(ir, item.value, qid, true, stack, report);
    }
    if let Some(w) = node.where_clause {
        walk_expr(ir, w, qid, false, stack, report);
    }
    for g in &node.group_by {
        walk_expr(ir, *g, qid, false, stack, report);
    }
    if let Some(h) = node.having {
        walk_expr(ir, h, qid, false, stack, report);
    }
    for ob in &node.order_by {
        walk_expr(ir, ob.expr, qid, false, stack, report);
    }

    stack.pop();
}

fn walk_expr(
    ir: &QueryIr,
    eid: ExprId,
    qid: QueryId,
    in_select_list: bool,
    stack: &mut Vec<Frame>,
    report: &mut TouchReport,
) {
    match ir.expr(eid) {
        ExprNode::ColRef { qualifier, column } => {
            let (scope, kind) = if qualifier.is_empty() {
                report.has_unknown_touches = true;
                (stack.last().map(|f| f.scope).unwrap_or(Scope::Main), Kind::Unknown)
            } else {
                match resolve(stack, qualifier) {
                    Some(found) => found,
                    None => {
                        report.has_unknown_touches = true;
                        (stack.last().map(|f| f.scope).unwrap_or(Scope::Main), Kind::Unknown)
                    }
                }
            };
            report.touches.push(Touch {
                scope,
                kind,
                qualifier: qualifier.clone(),
                column: column.clone(),
                source_query: qid,
                in_select_list,
            });
        }
        ExprNode::Param(_) | ExprNode::Literal(_) => {}
        ExprNode::FunCall { args, .. } => {
            for a in args {
                walk_expr(ir, *a, qid, in_select_list, stack, report);
            }
        }
        ExprNode::Cast { expr, .. } => walk_expr(ir, *expr, qid, in_select_list, stack, report),
        ExprNode::Binary { lhs, rhs, .. } => {
            walk_expr(ir, *lhs, qid, in_select_list, stack, report);
            walk_expr(ir, *rhs, qid, in_select_list, stack, report);
        }
        ExprNode::Not(e) => walk_expr(ir, *e, qid, in_select_list, stack, report),
        ExprNode::In { lhs, items } => {
            walk_expr(ir, *lhs, qid, in_select_list, stack, report);
            for i in items {
                walk_expr(ir, *i, qid, in_select_list, stack, report);
            }
        }
        ExprNode::Case { arg, whens, els } => {
            if let Some(a) = arg {
                walk_expr(ir, *a, qid, in_select_list, stack, report);
            }
            for (c, r) in whens {
                walk_expr(ir, *c, qid, in_select_list, stack, report);
                walk_expr(ir, *r, qid, in_select_list, stack, report);
            }
            if let Some(e) = els {
                walk_expr(ir, *e, qid, in_select_list, stack, report);
            }
        }
        ExprNode::WindowFunc {
            funcall,
            partition_by,
            order_by,
            ..
        } => {
            walk_expr(ir, *funcall, qid, in_select_list, stack, report);
            for p in partition_by {
                walk_expr(ir, *p, qid, in_select_list, stack, report);
            }
            for ob in order_by {
                walk_expr(ir, ob.expr, qid, in_select_list, stack, report);
            }
        }
        ExprNode::Subquery(sub) => walk_query(ir, *sub, Scope::Nested, stack, report),
        ExprNode::Unsupported => report.has_unsupported = true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qp_lower::SqlLowerer;

    fn extract_sql(sql: &str) -> TouchReport {
        let ir = SqlLowerer::new().lower(sql).unwrap();
        extract(&ir)
    }

    /// Scenario S1 (§8).
    #[test]
    fn scenario_s1_touches() {
        let report = extract_sql(
            "SELECT p.id AS pid FROM private.people AS p WHERE p.age >= 25 AND p.region = 'c' LIMIT 200;",
        );
        assert!(!report.has_unknown_touches);
        let cols: Vec<(Scope, Kind, &str, &str)> = report
            .touches
            .iter()
            .map(|t| (t.scope, t.kind, t.qualifier.as_str(), t.column.as_str()))
            .collect();
        assert!(cols.contains(&(Scope::Main, Kind::Base, "p", "id")));
        assert!(cols.contains(&(Scope::Main, Kind::Base, "p", "age")));
        assert!(cols.contains(&(Scope::Main, Kind::Base, "p", "region")));
    }

    /// Scenario S2 (§8): unknown alias `z` flips `has_unknown_touches`.
    #[test]
    fn scenario_s2_unknown_alias() {
        let report =
            extract_sql("SELECT p.name FROM private.people AS p WHERE p.region = 'a' OR z.id = 1;");
        assert!(report.has_unknown_touches);
        assert!(report
            .touches
            .iter()
            .any(|t| t.scope == Scope::Main && t.kind == Kind::Unknown && t.qualifier == "z" && t.column == "id"));
    }

    /// Scenario S4 (§8): the correlated `p.id` inside the `EXISTS`
    /// subquery resolves against the outer (main) query's alias, so it is
    /// `MAIN`-scoped even though it's physically written inside the
    /// nested subquery; `o.user_id` is owned by the subquery itself and
    /// is `NESTED`.
    #[test]
    fn scenario_s4_correlated_touch_scopes() {
        let report = extract_sql(
            "SELECT p.name FROM private.people AS p WHERE EXISTS (SELECT 1 FROM orders AS o WHERE o.user_id = p.id);",
        );
        assert!(!report.has_unknown_touches);
        assert!(report
            .touches
            .iter()
            .any(|t| t.scope == Scope::Main && t.kind == Kind::Base && t.qualifier == "p" && t.column == "name"));
        assert!(report
            .touches
            .iter()
            .any(|t| t.scope == Scope::Main && t.kind == Kind::Base && t.qualifier == "p" && t.column == "id"));
        assert!(report
            .touches
            .iter()
            .any(|t| t.scope == Scope::Nested && t.kind == Kind::Base && t.qualifier == "o" && t.column == "user_id"));
    }

    #[test]
    fn select_list_touches_are_distinguished_from_other_clauses() {
        let report = extract_sql(
            "SELECT p.name FROM private.people AS p WHERE p.age >= 18 ORDER BY p.name;",
        );
        assert!(report
            .touches
            .iter()
            .any(|t| t.column == "name" && t.in_select_list));
        assert!(report
            .touches
            .iter()
            .any(|t| t.column == "age" && !t.in_select_list));
        assert!(report
            .touches
            .iter()
            .any(|t| t.column == "name" && !t.in_select_list));
    }

    #[test]
    fn derived_alias_is_classified_derived() {
        let report = extract_sql("SELECT s.x FROM (SELECT 1 AS x) AS s;");
        assert!(report
            .touches
            .iter()
            .any(|t| t.kind == Kind::Derived && t.qualifier == "s" && t.column == "x"));
    }

    #[test]
    fn unresolved_qualifier_inside_a_subquery_defaults_to_nested() {
        let report =
            extract_sql("SELECT p.name FROM private.people AS p WHERE EXISTS (SELECT 1 FROM orders AS o WHERE nope.x = 1);");
        assert!(report.has_unknown_touches);
        assert!(report
            .touches
            .iter()
            .any(|t| t.scope == Scope::Nested && t.kind == Kind::Unknown && t.qualifier == "nope"));
    }
}
