//! The query intermediate representation (§3 `QueryIR`): a typed sum-type
//! tree over the restricted read-only SELECT subset this proxy accepts.
//!
//! Nodes are arena-allocated (`qp_arena::Arena`) and reference each other
//! through small integer handles (`QueryId`, `ExprId`) rather than through
//! `Box`-based ownership. This is the safe-Rust rendition of the source
//! design's "immovable block chain with stable pointers": a `QueryIr`
//! handle owns one arena of queries and one arena of expressions, and
//! dropping the handle invalidates every id derived from it.

use qp_arena::{Arena, ArenaId};
use qp_core::QpError;

/// Default node-count ceiling for a single query's arenas. Generous for
/// the restricted subset this proxy accepts; exists so a pathological
/// input can't exhaust memory rather than being rejected as too complex.
pub const DEFAULT_NODE_CAP: usize = 65_536;

pub type QueryId = ArenaId<QueryNode>;
pub type ExprId = ArenaId<ExprNode>;

/// Parser-assigned status (§3). Monotonic with respect to downstream
/// phases: later phases may flip `Ok` to `Unsupported` but never the
/// reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Ok,
    ParseError(String),
    Unsupported(String),
}

impl QueryStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, QueryStatus::Ok)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryFlags {
    pub has_star: bool,
    pub has_distinct: bool,
    pub has_offset: bool,
    pub has_unsupported: bool,
}

#[derive(Debug, Clone)]
pub struct Cte {
    pub name: String,
    pub query: QueryId,
}

#[derive(Debug, Clone)]
pub enum FromItemKind {
    BaseRel { schema: Option<String>, name: String },
    Subquery(QueryId),
    CteRef(String),
    Values(Vec<String>),
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct FromItem {
    pub alias: String,
    pub kind: FromItemKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub rhs: FromItem,
    pub on: Option<ExprId>,
}

#[derive(Debug, Clone)]
pub struct SelectItem {
    pub value: ExprId,
    pub out_alias: String,
}

#[derive(Debug, Clone)]
pub struct OrderByItem {
    pub expr: ExprId,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
    And,
    Or,
}

/// Tagged union over everything an expression position can hold (§3
/// `Expr`). `Not` is modeled as a unary node (spec: "`NOT` uses only the
/// left slot with right=∅").
#[derive(Debug, Clone)]
pub enum ExprNode {
    ColRef {
        qualifier: String,
        column: String,
    },
    Param(u32),
    Literal(Literal),
    FunCall {
        schema: Option<String>,
        name: String,
        args: Vec<ExprId>,
        is_star: bool,
        is_distinct: bool,
    },
    Cast {
        expr: ExprId,
        type_name: String,
    },
    Binary {
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Not(ExprId),
    In {
        lhs: ExprId,
        items: Vec<ExprId>,
    },
    Case {
        arg: Option<ExprId>,
        whens: Vec<(ExprId, ExprId)>,
        els: Option<ExprId>,
    },
    WindowFunc {
        funcall: ExprId,
        partition_by: Vec<ExprId>,
        order_by: Vec<OrderByItem>,
        has_frame: bool,
    },
    Subquery(QueryId),
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct QueryNode {
    pub status: QueryStatus,
    pub flags: QueryFlags,
    pub ctes: Vec<Cte>,
    pub select_items: Vec<SelectItem>,
    pub from_items: Vec<FromItem>,
    pub joins: Vec<Join>,
    pub where_clause: Option<ExprId>,
    pub group_by: Vec<ExprId>,
    pub having: Option<ExprId>,
    pub order_by: Vec<OrderByItem>,
    /// `None` means no `LIMIT` clause (spec's `limit?=-1` sentinel).
    pub limit: Option<u64>,
}

impl QueryNode {
    /// A fresh, empty query node carrying only a status. Callers fill in
    /// the rest as lowering proceeds.
    pub fn with_status(status: QueryStatus) -> Self {
        Self {
            status,
            flags: QueryFlags::default(),
            ctes: Vec::new(),
            select_items: Vec::new(),
            from_items: Vec::new(),
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
        }
    }
}

/// Owning storage for every query and expression node produced while
/// lowering one top-level statement, including all nested subqueries and
/// CTE bodies.
pub struct IrArena {
    queries: Arena<QueryNode>,
    exprs: Arena<ExprNode>,
}

impl IrArena {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_NODE_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            queries: Arena::new(cap),
            exprs: Arena::new(cap),
        }
    }

    pub fn alloc_query(&mut self, node: QueryNode) -> Result<QueryId, QpError> {
        self.queries
            .alloc(node)
            .map_err(|e| QpError::Internal(format!("query arena: {e}")))
    }

    pub fn alloc_expr(&mut self, node: ExprNode) -> Result<ExprId, QpError> {
        self.exprs
            .alloc(node)
            .map_err(|e| QpError::Internal(format!("expr arena: {e}")))
    }

    pub fn query(&self, id: QueryId) -> &QueryNode {
        self.queries.get(id)
    }

    pub fn query_mut(&mut self, id: QueryId) -> &mut QueryNode {
        self.queries.get_mut(id)
    }

    pub fn expr(&self, id: ExprId) -> &ExprNode {
        self.exprs.get(id)
    }
}

impl Default for IrArena {
    fn default() -> Self {
        Self::new()
    }
}

/// The handle a caller receives for one lowered statement: owns the arena
/// and knows which query within it is the top level.
pub struct QueryIr {
    pub arena: IrArena,
    pub root: QueryId,
}

impl QueryIr {
    pub fn root(&self) -> &QueryNode {
        self.arena.query(self.root)
    }

    pub fn expr(&self, id: ExprId) -> &ExprNode {
        self.arena.expr(id)
    }

    pub fn query(&self, id: QueryId) -> &QueryNode {
        self.arena.query(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_roundtrips_query_and_expr_nodes() {
        let mut arena = IrArena::new();
        let col = arena
            .alloc_expr(ExprNode::ColRef {
                qualifier: "p".into(),
                column: "id".into(),
            })
            .unwrap();
        let mut root = QueryNode::with_status(QueryStatus::Ok);
        root.select_items.push(SelectItem {
            value: col,
            out_alias: "pid".into(),
        });
        let root_id = arena.alloc_query(root).unwrap();
        let ir = QueryIr { arena, root: root_id };
        assert!(ir.root().status.is_ok());
        assert_eq!(ir.root().select_items.len(), 1);
        match ir.expr(ir.root().select_items[0].value) {
            ExprNode::ColRef { qualifier, column } => {
                assert_eq!(qualifier, "p");
                assert_eq!(column, "id");
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn status_is_not_ok_once_parse_error() {
        let status = QueryStatus::ParseError("unexpected token".into());
        assert!(!status.is_ok());
    }
}
