//! Row inserter: the database side of the pipeline
//!
//! Implement [`RowInserter`] for any sink. [`PgRowInserter`] is the PostgreSQL one
//! used by the server.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::Query;
use sqlx::Postgres;
use std::sync::Arc;

use super::error::InsertError;
use super::schema::{ColumnKind, Schema};
use super::source::Row;

#[async_trait]
pub trait RowInserter: Send + Sync {
    /// Check that the sink can take rows before a run starts.
    async fn ready(&self) -> Result<(), InsertError> {
        Ok(())
    }

    /// Insert one row. Each call is a single attempt.
    async fn insert(&self, row: &Row) -> Result<(), InsertError>;
}

/// Inserts rows with one parameterized statement per row, each attempt on a
/// freshly acquired pooled connection.
#[derive(Clone)]
pub struct PgRowInserter {
    pool: PgPool,
    schema: Arc<Schema>,
    sql: String,
}

impl PgRowInserter {
    pub fn new(pool: PgPool, schema: Arc<Schema>) -> Self {
        let sql = schema.insert_statement();
        Self { pool, schema, sql }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[async_trait]
impl RowInserter for PgRowInserter {
    async fn ready(&self) -> Result<(), InsertError> {
        let mut conn = self.pool.acquire().await.map_err(classify)?;
        sqlx::query("SELECT 1")
            .execute(&mut *conn)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn insert(&self, row: &Row) -> Result<(), InsertError> {
        // returned to the pool on drop, whatever the outcome
        let mut conn = self.pool.acquire().await.map_err(classify)?;
        let query = bind_row(sqlx::query(&self.sql), &self.schema, row)?;
        query.execute(&mut *conn).await.map_err(classify)?;
        Ok(())
    }
}

/// Bind `row` in schema order: integers as `BIGINT`, everything else as text.
fn bind_row<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    schema: &Schema,
    row: &'q Row,
) -> Result<Query<'q, Postgres, PgArguments>, InsertError> {
    if row.fields.len() != schema.len() {
        return Err(InsertError::fatal(format!(
            "line {}: row has {} values for {} columns",
            row.line,
            row.fields.len(),
            schema.len()
        )));
    }

    for (column, value) in schema.columns().iter().zip(&row.fields) {
        query = match column.kind {
            ColumnKind::Integer => {
                let number = value.parse::<i64>().map_err(|e| {
                    InsertError::fatal(format!(
                        "line {}: column {} value '{}': {}",
                        row.line, column.name, value, e
                    ))
                })?;
                query.bind(number)
            },
            ColumnKind::Text => query.bind(value.as_str()),
        };
    }

    Ok(query)
}

/// Sort a sqlx error into retryable or fatal.
pub fn classify(err: sqlx::Error) -> InsertError {
    let retryable = match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    };

    if retryable {
        InsertError::retryable(err)
    } else {
        InsertError::fatal(err)
    }
}

/// SQLSTATE classes worth retrying: connection exceptions (08), transaction
/// rollbacks such as deadlocks (40), insufficient resources (53) and operator
/// intervention such as admin shutdown (57P).
pub fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || code.starts_with("40") || code.starts_with("53") || code.starts_with("57P")
}
