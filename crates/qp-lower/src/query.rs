use sqlparser::ast::{
    GroupByExpr, Ident, Join as SqlJoin, JoinConstraint, JoinOperator, OrderByExpr, Query as SqlQuery,
    Select, SelectItem as SqlSelectItem, SetExpr, TableAlias, TableFactor, TableWithJoins,
};

use qp_core::QpError;
use qp_ir::{
    ExprId, ExprNode, FromItem, FromItemKind, Join, JoinKind, OrderByItem, QueryId, QueryNode,
    QueryStatus, SelectItem,
};

use crate::expr::lower_expr;

fn ident_text(ident: &Ident) -> String {
    match ident.quote_style {
        Some(_) => ident.value.clone(),
        None => ident.value.to_ascii_lowercase(),
    }
}

fn alias_name(alias: &TableAlias) -> String {
    ident_text(&alias.name)
}

fn mark_unsupported(node: &mut QueryNode, reason: &str) {
    node.flags.has_unsupported = true;
    if node.status.is_ok() {
        node.status = QueryStatus::Unsupported(reason.to_string());
    }
}

pub fn lower_query(arena: &mut qp_ir::IrArena, query: &SqlQuery) -> Result<QueryId, QpError> {
    let mut node = QueryNode::with_status(QueryStatus::Ok);

    if let Some(with) = &query.with {
        if with.recursive {
            mark_unsupported(&mut node, "recursive CTEs are not accepted");
        }
        for cte in &with.cte_tables {
            let body_id = lower_query(arena, &cte.query)?;
            if arena.query(body_id).flags.has_unsupported {
                node.flags.has_unsupported = true;
            }
            node.ctes.push(qp_ir::Cte {
                name: alias_name(&cte.alias),
                query: body_id,
            });
        }
    }

    match query.body.as_ref() {
        SetExpr::Select(select) => lower_select(arena, select, &mut node)?,
        _ => mark_unsupported(&mut node, "only a single SELECT body is accepted"),
    }

    let order_by_exprs: &[OrderByExpr] = match &query.order_by {
        Some(ob) => &ob.exprs,
        None => &[],
    };
    lower_order_by(arena, order_by_exprs, &mut node)?;

    if let Some(limit_expr) = &query.limit {
        match limit_expr {
            sqlparser::ast::Expr::Value(v) => match &v.value {
                sqlparser::ast::Value::Number(n, _) => match n.parse::<u64>() {
                    Ok(v) => node.limit = Some(v),
                    Err(_) => mark_unsupported(&mut node, "LIMIT is not a non-negative integer"),
                },
                _ => mark_unsupported(&mut node, "LIMIT must be a literal integer"),
            },
            _ => mark_unsupported(&mut node, "LIMIT must be a literal integer"),
        }
    }

    if query.offset.is_some() {
        node.flags.has_offset = true;
    }

    arena.alloc_query(node)
}

fn lower_select(
    arena: &mut qp_ir::IrArena,
    select: &Select,
    node: &mut QueryNode,
) -> Result<(), QpError> {
    if select.distinct.is_some() {
        node.flags.has_distinct = true;
    }

    for table in &select.from {
        lower_table_with_joins(arena, table, node)?;
    }

    for item in &select.projection {
        lower_select_item(arena, item, node)?;
    }

    if let Some(selection) = &select.selection {
        node.where_clause = Some(lower_expr(arena, selection, node)?);
    }

    match &select.group_by {
        GroupByExpr::All(_) => mark_unsupported(node, "GROUP BY ALL is not accepted"),
        GroupByExpr::Expressions(exprs, modifiers) => {
            if !modifiers.is_empty() {
                mark_unsupported(node, "GROUP BY modifiers are not accepted");
            }
            for e in exprs {
                let id = lower_expr(arena, e, node)?;
                node.group_by.push(id);
            }
        }
    }

    if let Some(having) = &select.having {
        node.having = Some(lower_expr(arena, having, node)?);
    }

    Ok(())
}

fn lower_select_item(
    arena: &mut qp_ir::IrArena,
    item: &SqlSelectItem,
    node: &mut QueryNode,
) -> Result<(), QpError> {
    match item {
        SqlSelectItem::UnnamedExpr(expr) => {
            let value = lower_expr(arena, expr, node)?;
            let out_alias = default_alias_for(expr);
            node.select_items.push(SelectItem { value, out_alias });
        }
        SqlSelectItem::ExprWithAlias { expr, alias } => {
            let value = lower_expr(arena, expr, node)?;
            node.select_items.push(SelectItem {
                value,
                out_alias: ident_text(alias),
            });
        }
        SqlSelectItem::Wildcard(_) | SqlSelectItem::QualifiedWildcard(..) => {
            node.flags.has_star = true;
            let value = arena.alloc_expr(ExprNode::Unsupported)?;
            node.select_items.push(SelectItem {
                value,
                out_alias: String::new(),
            });
        }
    }
    Ok(())
}

/// Best-effort default output name for an unaliased select expression: the
/// bare column name for a column reference, otherwise empty (callers that
/// need every output named should alias explicitly; an empty alias simply
/// can never match a sensitive canonical id).
fn default_alias_for(expr: &sqlparser::ast::Expr) -> String {
    match expr {
        sqlparser::ast::Expr::Identifier(ident) => ident_text(ident),
        sqlparser::ast::Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(ident_text)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn lower_table_with_joins(
    arena: &mut qp_ir::IrArena,
    table: &TableWithJoins,
    node: &mut QueryNode,
) -> Result<(), QpError> {
    let from_item = lower_table_factor(arena, &table.relation, node)?;
    node.from_items.push(from_item);
    for join in &table.joins {
        let join = lower_join(arena, join, node)?;
        node.joins.push(join);
    }
    Ok(())
}

fn lower_table_factor(
    arena: &mut qp_ir::IrArena,
    factor: &TableFactor,
    node: &mut QueryNode,
) -> Result<FromItem, QpError> {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let Some(alias) = alias else {
                mark_unsupported(node, "unaliased FROM item");
                return Ok(FromItem {
                    alias: String::new(),
                    kind: FromItemKind::Unsupported,
                });
            };
            let parts: Vec<String> = name.0.iter().map(ident_text).collect();
            let (schema, rel_name) = match parts.as_slice() {
                [n] => (None, n.clone()),
                [s, n] => (Some(s.clone()), n.clone()),
                _ => {
                    mark_unsupported(node, "unsupported table name form");
                    (None, parts.join("."))
                }
            };
            Ok(FromItem {
                alias: alias_name(alias),
                kind: FromItemKind::BaseRel {
                    schema,
                    name: rel_name,
                },
            })
        }
        TableFactor::Derived {
            lateral,
            subquery,
            alias,
        } => {
            if *lateral {
                mark_unsupported(node, "LATERAL is not accepted");
            }
            let Some(alias) = alias else {
                mark_unsupported(node, "unaliased FROM item");
                return Ok(FromItem {
                    alias: String::new(),
                    kind: FromItemKind::Unsupported,
                });
            };
            let sub_id = lower_query(arena, subquery)?;
            if arena.query(sub_id).flags.has_unsupported {
                node.flags.has_unsupported = true;
            }
            Ok(FromItem {
                alias: alias_name(alias),
                kind: FromItemKind::Subquery(sub_id),
            })
        }
        _ => {
            mark_unsupported(node, "unsupported FROM item kind");
            Ok(FromItem {
                alias: String::new(),
                kind: FromItemKind::Unsupported,
            })
        }
    }
}

fn lower_join(
    arena: &mut qp_ir::IrArena,
    join: &SqlJoin,
    node: &mut QueryNode,
) -> Result<Join, QpError> {
    let rhs = lower_table_factor(arena, &join.relation, node)?;
    let (kind, constraint) = match &join.join_operator {
        JoinOperator::Inner(c) => (JoinKind::Inner, Some(c)),
        JoinOperator::LeftOuter(c) => (JoinKind::Left, Some(c)),
        JoinOperator::RightOuter(c) => (JoinKind::Right, Some(c)),
        JoinOperator::FullOuter(c) => (JoinKind::Full, Some(c)),
        JoinOperator::CrossJoin => (JoinKind::Cross, None),
        _ => {
            mark_unsupported(node, "unsupported join kind");
            (JoinKind::Unsupported, None)
        }
    };
    let on = match constraint {
        Some(JoinConstraint::On(expr)) => Some(lower_expr(arena, expr, node)?),
        Some(JoinConstraint::None) | None => None,
        Some(_) => {
            mark_unsupported(node, "only ON join conditions are accepted");
            None
        }
    };
    Ok(Join { kind, rhs, on })
}

fn lower_order_by(
    arena: &mut qp_ir::IrArena,
    order_by: &[OrderByExpr],
    node: &mut QueryNode,
) -> Result<(), QpError> {
    for ob in order_by {
        let expr_id = if let sqlparser::ast::Expr::Identifier(ident) = &ob.expr {
            let name = ident_text(ident);
            let matches: Vec<ExprId> = node
                .select_items
                .iter()
                .filter(|si| si.out_alias == name)
                .map(|si| si.value)
                .collect();
            match matches.len() {
                1 => matches[0],
                0 => lower_expr(arena, &ob.expr, node)?,
                _ => {
                    mark_unsupported(node, "ambiguous ORDER BY alias");
                    matches[0]
                }
            }
        } else {
            lower_expr(arena, &ob.expr, node)?
        };
        node.order_by.push(OrderByItem {
            expr: expr_id,
            desc: ob.asc == Some(false),
        });
    }
    Ok(())
}
