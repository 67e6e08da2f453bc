use sqlparser::ast::{
    BinaryOperator, DuplicateTreatment, Expr as SqlExpr, Function, FunctionArg, FunctionArgExpr,
    FunctionArguments, Value, WindowType,
};

use qp_core::QpError;
use qp_ir::{BinOp, ExprId, ExprNode, IrArena, Literal, OrderByItem, QueryNode};

fn ident_text(ident: &sqlparser::ast::Ident) -> String {
    match ident.quote_style {
        Some(_) => ident.value.clone(),
        None => ident.value.to_ascii_lowercase(),
    }
}

fn mark_unsupported(node: &mut QueryNode, reason: &str) {
    node.flags.has_unsupported = true;
    if node.status.is_ok() {
        node.status = qp_ir::QueryStatus::Unsupported(reason.to_string());
    }
}

fn unsupported(arena: &mut IrArena, node: &mut QueryNode, reason: &str) -> Result<ExprId, QpError> {
    mark_unsupported(node, reason);
    arena.alloc_expr(ExprNode::Unsupported)
}

pub fn lower_expr(arena: &mut IrArena, expr: &SqlExpr, node: &mut QueryNode) -> Result<ExprId, QpError> {
    match expr {
        SqlExpr::Identifier(ident) => arena.alloc_expr(ExprNode::ColRef {
            qualifier: String::new(),
            column: ident_text(ident),
        }),
        SqlExpr::CompoundIdentifier(parts) => match parts.as_slice() {
            [qualifier, column] => arena.alloc_expr(ExprNode::ColRef {
                qualifier: ident_text(qualifier),
                column: ident_text(column),
            }),
            _ => unsupported(arena, node, "only qualifier.column references are accepted"),
        },
        SqlExpr::Value(value) => lower_value(arena, value),
        SqlExpr::TypedString { data_type, value } => arena.alloc_expr(ExprNode::Cast {
            expr: arena_literal_str(arena, value.clone())?,
            type_name: data_type.to_string(),
        }),
        SqlExpr::Cast { expr, data_type, .. } => {
            let inner = lower_expr(arena, expr, node)?;
            arena.alloc_expr(ExprNode::Cast {
                expr: inner,
                type_name: data_type.to_string(),
            })
        }
        SqlExpr::BinaryOp { left, op, right } => lower_binary(arena, left, op, right, node),
        SqlExpr::UnaryOp { op, expr } => match op {
            sqlparser::ast::UnaryOperator::Not => {
                let inner = lower_expr(arena, expr, node)?;
                arena.alloc_expr(ExprNode::Not(inner))
            }
            _ => unsupported(arena, node, "only NOT is accepted as a unary operator"),
        },
        SqlExpr::IsNull(inner) => {
            let lhs = lower_expr(arena, inner, node)?;
            let rhs = arena.alloc_expr(ExprNode::Literal(Literal::Null))?;
            arena.alloc_expr(ExprNode::Binary {
                op: BinOp::Eq,
                lhs,
                rhs,
            })
        }
        SqlExpr::IsNotNull(inner) => {
            let lhs = lower_expr(arena, inner, node)?;
            let rhs = arena.alloc_expr(ExprNode::Literal(Literal::Null))?;
            arena.alloc_expr(ExprNode::Binary {
                op: BinOp::Ne,
                lhs,
                rhs,
            })
        }
        SqlExpr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let e = lower_expr(arena, expr, node)?;
            let lo = lower_expr(arena, low, node)?;
            let hi = lower_expr(arena, high, node)?;
            let ge = arena.alloc_expr(ExprNode::Binary {
                op: BinOp::Ge,
                lhs: e,
                rhs: lo,
            })?;
            let le = arena.alloc_expr(ExprNode::Binary {
                op: BinOp::Le,
                lhs: e,
                rhs: hi,
            })?;
            if *negated {
                let lt = arena.alloc_expr(ExprNode::Binary {
                    op: BinOp::Lt,
                    lhs: e,
                    rhs: lo,
                })?;
                let gt = arena.alloc_expr(ExprNode::Binary {
                    op: BinOp::Gt,
                    lhs: e,
                    rhs: hi,
                })?;
                arena.alloc_expr(ExprNode::Binary {
                    op: BinOp::Or,
                    lhs: lt,
                    rhs: gt,
                })
            } else {
                arena.alloc_expr(ExprNode::Binary {
                    op: BinOp::And,
                    lhs: ge,
                    rhs: le,
                })
            }
        }
        SqlExpr::Like {
            negated,
            expr,
            pattern,
            ..
        } => {
            let lhs = lower_expr(arena, expr, node)?;
            let rhs = lower_expr(arena, pattern, node)?;
            arena.alloc_expr(ExprNode::Binary {
                op: if *negated { BinOp::NotLike } else { BinOp::Like },
                lhs,
                rhs,
            })
        }
        SqlExpr::InList {
            expr,
            list,
            negated,
        } => {
            if list.is_empty() {
                return unsupported(arena, node, "IN with an empty list is a parse error");
            }
            let lhs = lower_expr(arena, expr, node)?;
            let mut items = Vec::with_capacity(list.len());
            for item in list {
                items.push(lower_expr(arena, item, node)?);
            }
            let in_expr = arena.alloc_expr(ExprNode::In { lhs, items })?;
            if *negated {
                arena.alloc_expr(ExprNode::Not(in_expr))
            } else {
                Ok(in_expr)
            }
        }
        SqlExpr::AnyOp {
            left,
            compare_op,
            right,
            ..
        } => lower_any_all(arena, left, compare_op, right, node),
        SqlExpr::AllOp { .. } => unsupported(arena, node, "ALL is not accepted"),
        SqlExpr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            let arg = operand
                .as_ref()
                .map(|e| lower_expr(arena, e, node))
                .transpose()?;
            let mut whens = Vec::with_capacity(conditions.len());
            for (c, r) in conditions.iter().zip(results.iter()) {
                whens.push((lower_expr(arena, c, node)?, lower_expr(arena, r, node)?));
            }
            let els = else_result
                .as_ref()
                .map(|e| lower_expr(arena, e, node))
                .transpose()?;
            arena.alloc_expr(ExprNode::Case { arg, whens, els })
        }
        SqlExpr::Function(func) => lower_function(arena, func, node),
        SqlExpr::Subquery(query) => {
            let qid = qp_lower_subquery(arena, query, node)?;
            arena.alloc_expr(ExprNode::Subquery(qid))
        }
        SqlExpr::Exists { subquery, negated } => {
            let qid = qp_lower_subquery(arena, subquery, node)?;
            let sub = arena.alloc_expr(ExprNode::Subquery(qid))?;
            if *negated {
                arena.alloc_expr(ExprNode::Not(sub))
            } else {
                Ok(sub)
            }
        }
        SqlExpr::Nested(inner) => lower_expr(arena, inner, node),
        _ => unsupported(arena, node, "expression form is not in the accepted subset"),
    }
}

fn qp_lower_subquery(
    arena: &mut IrArena,
    query: &sqlparser::ast::Query,
    node: &mut QueryNode,
) -> Result<qp_ir::QueryId, QpError> {
    let qid = crate::query::lower_query(arena, query)?;
    if arena.query(qid).flags.has_unsupported {
        node.flags.has_unsupported = true;
    }
    Ok(qid)
}

fn lower_any_all(
    arena: &mut IrArena,
    left: &SqlExpr,
    compare_op: &BinaryOperator,
    right: &SqlExpr,
    node: &mut QueryNode,
) -> Result<ExprId, QpError> {
    if !matches!(compare_op, BinaryOperator::Eq) {
        return unsupported(arena, node, "only = ANY(...) is accepted");
    }
    let array_items = match right {
        SqlExpr::Array(arr) => &arr.elem,
        _ => return unsupported(arena, node, "ANY must be over an array literal"),
    };
    if array_items.is_empty() {
        return unsupported(arena, node, "ANY over an empty array is a parse error");
    }
    let lhs = lower_expr(arena, left, node)?;
    let mut items = Vec::with_capacity(array_items.len());
    for item in array_items {
        items.push(lower_expr(arena, item, node)?);
    }
    arena.alloc_expr(ExprNode::In { lhs, items })
}

fn lower_value(arena: &mut IrArena, value: &Value) -> Result<ExprId, QpError> {
    let lit = match value {
        Value::Null => Literal::Null,
        Value::Boolean(b) => Literal::Bool(*b),
        Value::Number(n, _) => match n.parse::<i64>() {
            Ok(i) => Literal::I64(i),
            Err(_) => match n.parse::<f64>() {
                Ok(f) => Literal::F64(f),
                Err(_) => return arena.alloc_expr(ExprNode::Unsupported),
            },
        },
        Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => Literal::Str(s.clone()),
        _ => return arena.alloc_expr(ExprNode::Unsupported),
    };
    arena.alloc_expr(ExprNode::Literal(lit))
}

fn arena_literal_str(arena: &mut IrArena, s: String) -> Result<ExprId, QpError> {
    arena.alloc_expr(ExprNode::Literal(Literal::Str(s)))
}

fn lower_binary(
    arena: &mut IrArena,
    left: &SqlExpr,
    op: &BinaryOperator,
    right: &SqlExpr,
    node: &mut QueryNode,
) -> Result<ExprId, QpError> {
    let mapped = match op {
        BinaryOperator::Eq => Some(BinOp::Eq),
        BinaryOperator::NotEq => Some(BinOp::Ne),
        BinaryOperator::Gt => Some(BinOp::Gt),
        BinaryOperator::GtEq => Some(BinOp::Ge),
        BinaryOperator::Lt => Some(BinOp::Lt),
        BinaryOperator::Le => Some(BinOp::Le),
        BinaryOperator::And => Some(BinOp::And),
        BinaryOperator::Or => Some(BinOp::Or),
        _ => None,
    };
    match mapped {
        Some(op) => {
            let lhs = lower_expr(arena, left, node)?;
            let rhs = lower_expr(arena, right, node)?;
            arena.alloc_expr(ExprNode::Binary { op, lhs, rhs })
        }
        None => unsupported(
            arena,
            node,
            "arithmetic, bitwise, and other operators outside the comparison/logical set are not accepted",
        ),
    }
}

fn lower_function(arena: &mut IrArena, func: &Function, node: &mut QueryNode) -> Result<ExprId, QpError> {
    let parts: Vec<String> = func.name.0.iter().map(ident_text).collect();
    let (schema, name) = match parts.as_slice() {
        [n] => (None, n.clone()),
        [s, n] => (Some(s.clone()), n.clone()),
        _ => (None, parts.join(".")),
    };

    let (mut arg_ids, mut is_star, mut is_distinct) = (Vec::new(), false, false);
    match &func.args {
        FunctionArguments::None => {}
        FunctionArguments::Subquery(_) => {
            mark_unsupported(node, "function arguments as a bare subquery are not accepted");
        }
        FunctionArguments::List(list) => {
            is_distinct = matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct));
            for arg in &list.args {
                match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => is_star = true,
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => {
                        arg_ids.push(lower_expr(arena, e, node)?)
                    }
                    _ => mark_unsupported(node, "unsupported function argument form"),
                }
            }
        }
    }

    let funcall = arena.alloc_expr(ExprNode::FunCall {
        schema,
        name,
        args: arg_ids,
        is_star,
        is_distinct,
    })?;

    match &func.over {
        None => Ok(funcall),
        Some(WindowType::NamedWindow(_)) => {
            mark_unsupported(node, "named windows are not accepted");
            arena.alloc_expr(ExprNode::WindowFunc {
                funcall,
                partition_by: Vec::new(),
                order_by: Vec::new(),
                has_frame: false,
            })
        }
        Some(WindowType::WindowSpec(spec)) => {
            let mut partition_by = Vec::with_capacity(spec.partition_by.len());
            for e in &spec.partition_by {
                partition_by.push(lower_expr(arena, e, node)?);
            }
            let mut order_by = Vec::with_capacity(spec.order_by.len());
            for ob in &spec.order_by {
                let expr = lower_expr(arena, &ob.expr, node)?;
                order_by.push(OrderByItem {
                    expr,
                    desc: ob.asc == Some(false),
                });
            }
            arena.alloc_expr(ExprNode::WindowFunc {
                funcall,
                partition_by,
                order_by,
                has_frame: spec.window_frame.is_some(),
            })
        }
    }
}
