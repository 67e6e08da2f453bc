//! Postgres adapter (§4.4's `[ADD]`): the one concrete [`DbBackend`] this
//! codebase wires in, following `cori-adapter-pg`'s use of `sqlx` for
//! connectivity and `cori-mcp::executor::row_to_json`'s try-several-types
//! decode cascade, adapted to produce text cells rather than a JSON
//! document.

use async_trait::async_trait;
use futures::TryStreamExt;
use qp_core::{QpError, SafetyPolicy};
use qp_ir::QueryIr;
use qp_result::{QueryResult, RawCell, ResultBuilder};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row};

use crate::backend::DbBackend;
use crate::error::BackendError;

/// One live pool against a single catalog connection. `sqlx::PgPool` is
/// already internally pooled and cheap to clone; the [`crate::manager::ConnectionManager`]
/// owns exactly one of these per connection name.
pub struct PgBackend {
    pool: PgPool,
    lowerer: qp_lower::SqlLowerer,
}

impl PgBackend {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, BackendError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|source| BackendError::Connect {
                conn: url.to_string(),
                source,
            })?;
        Ok(Self {
            pool,
            lowerer: qp_lower::SqlLowerer::new(),
        })
    }
}

#[async_trait]
impl DbBackend for PgBackend {
    fn parse(&self, sql: &str) -> Result<QueryIr, QpError> {
        self.lowerer.lower(sql)
    }

    async fn exec(
        &self,
        sql: &str,
        policy: &SafetyPolicy,
        mut builder: ResultBuilder<'_>,
    ) -> Result<QueryResult, QpError> {
        let mut tx = self.pool.begin().await.map_err(BackendError::Exec)?;

        if policy.read_only {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(BackendError::Exec)?;
        }
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            policy.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await
        .map_err(BackendError::Exec)?;

        {
            let mut rows = sqlx::query(sql).fetch(&mut *tx);
            while let Some(row) = rows.try_next().await.map_err(BackendError::Exec)? {
                builder.push_row(row_to_cells(&row))?;
            }
        }

        tx.commit().await.map_err(BackendError::Exec)?;
        Ok(builder.finish())
    }
}

fn row_to_cells(row: &PgRow) -> Vec<RawCell> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let oid = col.type_info().oid().map(|o| o.0).unwrap_or(0);
            RawCell {
                text: cell_text(row, i),
                oid,
            }
        })
        .collect()
}

/// Try each Rust type sqlx can plausibly decode the column as, in
/// descending specificity, and render whichever one matches. A SQL `NULL`
/// decodes to `None` under every one of these regardless of the column's
/// declared type, so the first attempt always resolves a null cell
/// correctly. A value of a type none of these cover falls back to `None`
/// (surfaced to the client as an empty/omitted cell, not an error).
fn cell_text(row: &PgRow, i: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(i) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
        return v.map(|b| b.to_string());
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i) {
        return v.map(|t| t.to_rfc3339());
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(i) {
        return v.map(|t| t.to_string());
    }
    if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(i) {
        return v.map(|u| u.to_string());
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(i) {
        return v.map(|j| j.to_string());
    }
    None
}
