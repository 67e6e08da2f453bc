//! Ordered policy validator (§4.4). A single entry point, composed of six
//! rules evaluated in a fixed order — the same shape the role/rules/
//! constraint validators in this codebase's policy layer compose into one
//! `validate()` call, first failing check wins. Here there's only one
//! composed validator rather than three, because the six rules already
//! form a single linear precedence chain in the source design.
//!
//! Rejections reuse `qp_core::QpError::PolicyReject` with the `qrerr::*`
//! codes rather than introducing a parallel validation-error type: the
//! codes already live next to the error enum they attach to, one per rule.

use qp_core::ident::CanonicalColumnId;
use qp_core::{qrerr, ConnProfile, QpError};
use qp_ir::{ExprId, ExprNode, FromItemKind, QueryId, QueryIr, QueryStatus};
use qp_touch::{Kind, TouchReport};

/// Per-output-column disposition (§4.4 rule 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColPlan {
    Plaintext,
    Token {
        col_id: CanonicalColumnId,
        col_id_len: usize,
    },
}

/// The validator's complete output: one [`ColPlan`] per top-level output
/// column, in projection order. A pure data product the result builder
/// executes with no further policy logic of its own.
#[derive(Debug, Clone)]
pub struct ValidatorPlan {
    pub cols: Vec<ColPlan>,
}

#[derive(Default)]
struct GlobalScan {
    has_star: bool,
    has_disallowed_function: bool,
}

pub struct PolicyValidator;

impl PolicyValidator {
    /// Run all six rules in order against an already-lowered, already
    /// touch-extracted query. The first rule that trips decides the
    /// outcome; later rules never run once one has rejected.
    pub fn validate(
        ir: &QueryIr,
        touches: &TouchReport,
        conn: &ConnProfile,
    ) -> Result<ValidatorPlan, QpError> {
        // Rule 1: parser status.
        match &ir.root().status {
            QueryStatus::Ok => {}
            QueryStatus::ParseError(msg) | QueryStatus::Unsupported(msg) => {
                return Err(QpError::policy_reject(qrerr::PARSE_STATUS, msg.clone()));
            }
        }

        let mut scan = GlobalScan::default();
        scan_query(ir, ir.root, conn, &mut scan);

        // Rule 2: unsupported constructs or disallowed function calls.
        if touches.has_unsupported || scan.has_disallowed_function {
            return Err(QpError::policy_reject(
                qrerr::UNSUPPORTED,
                "query uses a construct or function outside the accepted subset",
            ));
        }

        // Rule 3: any touch whose qualifier couldn't be resolved.
        if touches.has_unknown_touches {
            return Err(QpError::policy_reject(
                qrerr::UNKNOWN_TOUCH,
                "column reference could not be proven safe",
            ));
        }

        // Rule 4: SELECT * anywhere, main or nested.
        if scan.has_star {
            return Err(QpError::policy_reject(
                qrerr::STAR,
                "SELECT * is not accepted: output columns must be nameable for the tokenization decision",
            ));
        }

        // Rule 5: sensitive touch outside the top-level SELECT list.
        for touch in &touches.touches {
            if touch.kind == Kind::Unknown {
                continue; // already rejected by rule 3
            }
            let exempt = touch.source_query == ir.root && touch.in_select_list;
            if exempt {
                continue;
            }
            if let Some(col_id) = resolve_canonical(ir, touch.source_query, &touch.qualifier, &touch.column, &conn.default_schema) {
                if conn.is_sensitive(&col_id) {
                    return Err(QpError::policy_reject(
                        qrerr::SENSITIVE_SCOPE,
                        format!(
                            "sensitive column '{col_id}' may only appear in the top-level SELECT list"
                        ),
                    ));
                }
            }
        }

        // Rule 6: build the per-output-column plan.
        let mut cols = Vec::with_capacity(ir.root().select_items.len());
        for item in &ir.root().select_items {
            let plan = match ir.expr(item.value) {
                ExprNode::ColRef { qualifier, column } => {
                    match resolve_canonical(ir, ir.root, qualifier, column, &conn.default_schema) {
                        Some(col_id) if conn.is_sensitive(&col_id) => {
                            let col_id_len = col_id.to_string().len();
                            ColPlan::Token { col_id, col_id_len }
                        }
                        _ => ColPlan::Plaintext,
                    }
                }
                _ => ColPlan::Plaintext,
            };
            cols.push(plan);
        }

        Ok(ValidatorPlan { cols })
    }
}

/// Resolve `qualifier.column`, as referenced inside query `qid`, to its
/// ultimate base `schema.table.column` by walking alias chains through
/// subqueries and CTE bodies. Returns `None` when the chain bottoms out in
/// anything other than a direct base-column reference (a `VALUES` row, an
/// unsupported FROM item, or a computed expression) — such columns simply
/// can't match a literal entry in the sensitive-column list.
fn resolve_canonical(
    ir: &QueryIr,
    qid: QueryId,
    qualifier: &str,
    column: &str,
    default_schema: &str,
) -> Option<CanonicalColumnId> {
    let node = ir.query(qid);
    let from_kind = node
        .from_items
        .iter()
        .map(|i| (i.alias.as_str(), &i.kind))
        .chain(node.joins.iter().map(|j| (j.rhs.alias.as_str(), &j.rhs.kind)))
        .find(|(alias, _)| *alias == qualifier)
        .map(|(_, kind)| kind)?;

    match from_kind {
        FromItemKind::BaseRel { schema, name } => Some(CanonicalColumnId::new(
            schema.as_deref().unwrap_or(default_schema),
            name.clone(),
            column,
        )),
        FromItemKind::Subquery(sub) => resolve_through_select(ir, *sub, column, default_schema),
        FromItemKind::CteRef(name) => {
            let cte = node.ctes.iter().find(|c| &c.name == name)?;
            resolve_through_select(ir, cte.query, column, default_schema)
        }
        FromItemKind::Values(_) | FromItemKind::Unsupported => None,
    }
}

fn resolve_through_select(
    ir: &QueryIr,
    qid: QueryId,
    out_alias: &str,
    default_schema: &str,
) -> Option<CanonicalColumnId> {
    let node = ir.query(qid);
    let item = node.select_items.iter().find(|si| si.out_alias == out_alias)?;
    match ir.expr(item.value) {
        ExprNode::ColRef { qualifier, column } => {
            resolve_canonical(ir, qid, qualifier, column, default_schema)
        }
        _ => None,
    }
}

fn scan_query(ir: &QueryIr, qid: QueryId, conn: &ConnProfile, out: &mut GlobalScan) {
    let node = ir.query(qid);
    if node.flags.has_star {
        out.has_star = true;
    }

    for cte in &node.ctes {
        scan_query(ir, cte.query, conn, out);
    }
    for item in &node.from_items {
        if let FromItemKind::Subquery(sub) = &item.kind {
            scan_query(ir, *sub, conn, out);
        }
    }
    for join in &node.joins {
        if let FromItemKind::Subquery(sub) = &join.rhs.kind {
            scan_query(ir, *sub, conn, out);
        }
        if let Some(on) = join.on {
            scan_expr(ir, on, conn, out);
        }
    }
    for item in &node.select_items {
        scan_expr(ir, item.value, conn, out);
    }
    if let Some(w) = node.where_clause {
        scan_expr(ir, w, conn, out);
    }
    for g in &node.group_by {
        scan_expr(ir, *g, conn, out);
    }
    if let Some(h) = node.having {
        scan_expr(ir, h, conn, out);
    }
    for ob in &node.order_by {
        scan_expr(ir, ob.expr, conn, out);
    }
}

fn scan_expr(ir: &QueryIr, eid: ExprId, conn: &ConnProfile, out: &mut GlobalScan) {
    match ir.expr(eid) {
        ExprNode::FunCall { name, args, .. } => {
            if !conn.allows_function(name) {
                out.has_disallowed_function = true;
            }
            for a in args {
                scan_expr(ir, *a, conn, out);
            }
        }
        ExprNode::Cast { expr, .. } => scan_expr(ir, *expr, conn, out),
        ExprNode::Binary { lhs, rhs, .. } => {
            scan_expr(ir, *lhs, conn, out);
            scan_expr(ir, *rhs, conn, out);
        }
        ExprNode::Not(e) => scan_expr(ir, *e, conn, out),
        ExprNode::In { lhs, items } => {
            scan_expr(ir, *lhs, conn, out);
            for i in items {
                scan_expr(ir, *i, conn, out);
            }
        }
        ExprNode::Case { arg, whens, els } => {
            if let Some(a) = arg {
                scan_expr(ir, *a, conn, out);
            }
            for (c, r) in whens {
                scan_expr(ir, *c, conn, out);
                scan_expr(ir, *r, conn, out);
            }
            if let Some(e) = els {
                scan_expr(ir, *e, conn, out);
            }
        }
        ExprNode::WindowFunc {
            funcall,
            partition_by,
            order_by,
            ..
        } => {
            scan_expr(ir, *funcall, conn, out);
            for p in partition_by {
                scan_expr(ir, *p, conn, out);
            }
            for ob in order_by {
                scan_expr(ir, ob.expr, conn, out);
            }
        }
        ExprNode::Subquery(sub) => scan_query(ir, *sub, conn, out),
        ExprNode::ColRef { .. } | ExprNode::Param(_) | ExprNode::Literal(_) | ExprNode::Unsupported => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qp_core::ConnCatalog;
    use qp_lower::SqlLowerer;

    fn conn(yaml: &str) -> ConnProfile {
        ConnCatalog::from_yaml(yaml).unwrap().get("pgmain").unwrap().clone()
    }

    fn validate_sql(yaml: &str, sql: &str) -> Result<ValidatorPlan, QpError> {
        let c = conn(yaml);
        let ir = SqlLowerer::new().lower(sql).unwrap();
        let touches = qp_touch::extract(&ir);
        PolicyValidator::validate(&ir, &touches, &c)
    }

    const BASE_YAML: &str = r#"
connections:
  pgmain:
    database: appdb
    user: app
    default_schema: private
    sensitive_columns:
      - private.people.ssn
"#;

    /// Scenario S1 (§8): accepted, no sensitive columns touched, plain plan.
    #[test]
    fn scenario_s1_is_accepted_with_plaintext_plan() {
        let plan = validate_sql(
            BASE_YAML,
            "SELECT p.id AS pid FROM private.people AS p WHERE p.age >= 25 AND p.region = 'c' LIMIT 200;",
        )
        .unwrap();
        assert_eq!(plan.cols, vec![ColPlan::Plaintext]);
    }

    /// Scenario S2 (§8): unknown alias is rejected under rule 3.
    #[test]
    fn scenario_s2_unknown_alias_is_rejected() {
        let err = validate_sql(
            BASE_YAML,
            "SELECT p.name FROM private.people AS p WHERE p.region = 'a' OR z.id = 1;",
        )
        .unwrap_err();
        assert!(matches!(err, QpError::PolicyReject { code, .. } if code == qrerr::UNKNOWN_TOUCH));
    }

    #[test]
    fn select_star_is_rejected() {
        let err = validate_sql(BASE_YAML, "SELECT * FROM private.people AS p;").unwrap_err();
        assert!(matches!(err, QpError::PolicyReject { code, .. } if code == qrerr::STAR));
    }

    #[test]
    fn sensitive_column_in_where_is_rejected() {
        let err = validate_sql(
            BASE_YAML,
            "SELECT p.name FROM private.people AS p WHERE p.ssn = 'x';",
        )
        .unwrap_err();
        assert!(matches!(err, QpError::PolicyReject { code, .. } if code == qrerr::SENSITIVE_SCOPE));
    }

    #[test]
    fn sensitive_column_in_top_level_select_gets_token_plan() {
        let plan = validate_sql(BASE_YAML, "SELECT p.ssn FROM private.people AS p;").unwrap();
        match &plan.cols[0] {
            ColPlan::Token { col_id, .. } => assert_eq!(col_id.to_string(), "private.people.ssn"),
            other => panic!("expected Token plan, got {other:?}"),
        }
    }

    #[test]
    fn disallowed_function_is_rejected() {
        let err = validate_sql(
            BASE_YAML,
            "SELECT pg_sleep(p.age) FROM private.people AS p;",
        )
        .unwrap_err();
        assert!(matches!(err, QpError::PolicyReject { code, .. } if code == qrerr::UNSUPPORTED));
    }

    #[test]
    fn status_rejection_reports_parse_status() {
        let err = validate_sql(BASE_YAML, "DELETE FROM private.people;").unwrap_err();
        assert!(matches!(err, QpError::PolicyReject { code, .. } if code == qrerr::PARSE_STATUS));
    }

    #[test]
    fn sensitive_column_through_subquery_alias_is_still_tokenized() {
        let plan = validate_sql(
            BASE_YAML,
            "SELECT s.the_ssn FROM (SELECT p.ssn AS the_ssn FROM private.people AS p) AS s;",
        )
        .unwrap();
        match &plan.cols[0] {
            ColPlan::Token { col_id, .. } => assert_eq!(col_id.to_string(), "private.people.ssn"),
            other => panic!("expected Token plan, got {other:?}"),
        }
    }

    /// Validator monotonicity (§8): a statement rejected because it touches
    /// a sensitive column outside the select list is accepted once that
    /// column is dropped from the catalog's sensitive list — a strictly
    /// more permissive policy never turns an accept into a reject.
    #[test]
    fn dropping_a_sensitive_column_only_ever_widens_acceptance() {
        let sql = "SELECT p.name FROM private.people AS p WHERE p.ssn = 'x';";
        let strict = validate_sql(BASE_YAML, sql).unwrap_err();
        assert!(matches!(strict, QpError::PolicyReject { code, .. } if code == qrerr::SENSITIVE_SCOPE));

        const PERMISSIVE_YAML: &str = r#"
connections:
  pgmain:
    database: appdb
    user: app
    default_schema: private
    sensitive_columns: []
"#;
        let plan = validate_sql(PERMISSIVE_YAML, sql).unwrap();
        assert_eq!(plan.cols, vec![ColPlan::Plaintext]);
    }
}
