//! Result builder and token substitution (§4.5). A pure executor of the
//! validator's [`ValidatorPlan`]: it carries no policy logic of its own,
//! only cap bookkeeping and the PLAINTEXT/TOKEN dispatch the plan already
//! decided.

use qp_core::QpError;
use qp_policy::{ColPlan, ValidatorPlan};

use crate::token::{DbTokenStore, TokenInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Plaintext,
    Token,
}

#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub value_type: ValueType,
    col_id: Option<String>,
}

/// One raw cell as read off the backend, before tokenization. `text`
/// carries `None` for SQL `NULL` — never a zero-length marker distinct
/// from an empty string.
pub struct RawCell {
    pub text: Option<String>,
    pub oid: u32,
}

/// A single output cell after the builder has applied the plan. Distinct
/// from `Null` so a cap-truncated cell isn't mistaken for a real `NULL`
/// returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Null,
    Text(String),
    Omitted,
}

pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<CellValue>>,
    /// `max_rows` was reached; later rows were dropped entirely.
    pub result_truncated: bool,
    /// `max_query_bytes` was reached; later cells came back `Omitted`.
    pub cells_truncated: bool,
}

/// Inputs the builder needs beyond the raw rows: the validator's plan (if
/// the query produced one — absent only for statements that never reach
/// the validator, which the broker rejects before construction), the
/// token store to mint through, and the generation stamped on every token
/// minted this session.
pub struct BuildPolicy<'a> {
    pub plan: Option<&'a ValidatorPlan>,
    pub store: Option<&'a mut DbTokenStore>,
    pub generation: u32,
}

pub struct ResultBuilder<'a> {
    policy: BuildPolicy<'a>,
    max_rows: u32,
    max_query_bytes: u64,
    cumulative_bytes: u64,
    result: QueryResult,
}

impl<'a> ResultBuilder<'a> {
    pub fn new(
        column_names: Vec<String>,
        policy: BuildPolicy<'a>,
        max_rows: u32,
        max_query_bytes: u32,
    ) -> Self {
        let columns = column_names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let plan_col = policy.plan.and_then(|p| p.cols.get(i));
                match plan_col {
                    Some(ColPlan::Token { col_id, .. }) => ColumnMeta {
                        name,
                        value_type: ValueType::Token,
                        col_id: Some(col_id.to_string()),
                    },
                    _ => ColumnMeta {
                        name,
                        value_type: ValueType::Plaintext,
                        col_id: None,
                    },
                }
            })
            .collect();
        Self {
            policy,
            max_rows,
            max_query_bytes: max_query_bytes as u64,
            cumulative_bytes: 0,
            result: QueryResult {
                columns,
                rows: Vec::new(),
                result_truncated: false,
                cells_truncated: false,
            },
        }
    }

    /// Append one row of raw cells, in column order. Once `max_rows` rows
    /// have been accepted, further rows are silently dropped and
    /// `result_truncated` is set; this is not an error.
    pub fn push_row(&mut self, cells: Vec<RawCell>) -> Result<(), QpError> {
        if self.result.rows.len() as u32 >= self.max_rows {
            self.result.result_truncated = true;
            return Ok(());
        }

        let mut row = Vec::with_capacity(cells.len());
        for (i, cell) in cells.into_iter().enumerate() {
            let Some(text) = cell.text else {
                row.push(CellValue::Null);
                continue;
            };

            if self.result.cells_truncated {
                row.push(CellValue::Omitted);
                continue;
            }

            let value_type = self
                .result
                .columns
                .get(i)
                .map(|c| c.value_type)
                .unwrap_or(ValueType::Plaintext);

            let rendered = match value_type {
                ValueType::Plaintext => Some(text),
                ValueType::Token => {
                    let col_id = self.result.columns[i].col_id.clone().ok_or_else(|| {
                        QpError::Internal("token column missing col_id in plan".into())
                    })?;
                    let store = self
                        .policy
                        .store
                        .as_deref_mut()
                        .ok_or_else(|| QpError::Internal("token column requires a token store".into()))?;
                    store.create_token(
                        self.policy.generation,
                        TokenInput {
                            col_ref: &col_id,
                            value: &text,
                            oid: cell.oid,
                        },
                    )?
                }
            };

            match rendered {
                Some(text) if self.reserve(text.len()) => row.push(CellValue::Text(text)),
                _ => {
                    self.result.cells_truncated = true;
                    row.push(CellValue::Omitted);
                }
            }
        }
        self.result.rows.push(row);
        Ok(())
    }

    fn reserve(&mut self, n: usize) -> bool {
        let next = self.cumulative_bytes + n as u64;
        if next > self.max_query_bytes {
            return false;
        }
        self.cumulative_bytes = next;
        true
    }

    pub fn finish(self) -> QueryResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qp_core::ident::CanonicalColumnId;
    use qp_core::ColumnStrategy;

    fn cell(text: &str, oid: u32) -> RawCell {
        RawCell { text: Some(text.to_string()), oid }
    }

    fn null_cell(oid: u32) -> RawCell {
        RawCell { text: None, oid }
    }

    #[test]
    fn plaintext_columns_pass_through() {
        let policy = BuildPolicy { plan: None, store: None, generation: 1 };
        let mut builder = ResultBuilder::new(vec!["name".into()], policy, 200, 65536);
        builder.push_row(vec![cell("alice", 25)]).unwrap();
        let result = builder.finish();
        assert_eq!(result.rows[0], vec![CellValue::Text("alice".into())]);
    }

    #[test]
    fn null_token_cell_stays_null_without_minting() {
        let plan = ValidatorPlan {
            cols: vec![qp_policy::ColPlan::Token {
                col_id: CanonicalColumnId::new("private", "people", "ssn"),
                col_id_len: "private.people.ssn".len(),
            }],
        };
        let mut store = DbTokenStore::new("pgmain", ColumnStrategy::Deterministic).unwrap();
        let policy = BuildPolicy { plan: Some(&plan), store: Some(&mut store), generation: 1 };
        let mut builder = ResultBuilder::new(vec!["ssn".into()], policy, 200, 65536);
        builder.push_row(vec![null_cell(25)]).unwrap();
        let result = builder.finish();
        assert_eq!(result.rows[0], vec![CellValue::Null]);
    }

    #[test]
    fn non_null_token_cell_is_tokenized() {
        let plan = ValidatorPlan {
            cols: vec![qp_policy::ColPlan::Token {
                col_id: CanonicalColumnId::new("private", "people", "ssn"),
                col_id_len: "private.people.ssn".len(),
            }],
        };
        let mut store = DbTokenStore::new("pgmain", ColumnStrategy::Deterministic).unwrap();
        let policy = BuildPolicy { plan: Some(&plan), store: Some(&mut store), generation: 1 };
        let mut builder = ResultBuilder::new(vec!["ssn".into()], policy, 200, 65536);
        builder.push_row(vec![cell("123-45-6789", 25)]).unwrap();
        let result = builder.finish();
        match &result.rows[0][0] {
            CellValue::Text(tok) => assert!(tok.starts_with("tok_pgmain_1_")),
            other => panic!("expected a token, got {other:?}"),
        }
    }

    #[test]
    fn row_cap_truncates_and_flips_flag() {
        let policy = BuildPolicy { plan: None, store: None, generation: 1 };
        let mut builder = ResultBuilder::new(vec!["x".into()], policy, 1, 65536);
        builder.push_row(vec![cell("a", 23)]).unwrap();
        builder.push_row(vec![cell("b", 23)]).unwrap();
        let result = builder.finish();
        assert_eq!(result.rows.len(), 1);
        assert!(result.result_truncated);
    }

    #[test]
    fn byte_cap_omits_further_cells_without_erroring() {
        let policy = BuildPolicy { plan: None, store: None, generation: 1 };
        let mut builder = ResultBuilder::new(vec!["x".into()], policy, 200, 4);
        builder.push_row(vec![cell("abcd", 23)]).unwrap();
        builder.push_row(vec![cell("e", 23)]).unwrap();
        let result = builder.finish();
        assert_eq!(result.rows[0], vec![CellValue::Text("abcd".into())]);
        assert_eq!(result.rows[1], vec![CellValue::Omitted]);
        assert!(result.cells_truncated);
    }
}
