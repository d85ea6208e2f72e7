use async_trait::async_trait;
use ema_core::{SqlError, SqlExecutor, SqlRow};
use serde_json::{Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::DbPool;

/// Executes free-form statements against the mirrored store.
///
/// Every call runs in its own transaction: begin, one statement, commit.
/// A failing statement drops the transaction, which rolls it back.
#[derive(Clone)]
pub struct SqlRunner {
    pool: DbPool,
}

impl SqlRunner {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn run(&self, query: &str) -> Result<Vec<SqlRow>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(query).persistent(false).fetch_all(&mut *tx).await?;
        let decoded = rows.iter().map(row_to_json).collect::<Result<Vec<_>, _>>()?;
        tx.commit().await?;
        Ok(decoded)
    }
}

#[async_trait]
impl SqlExecutor for SqlRunner {
    async fn execute(&self, query: &str) -> Result<Vec<SqlRow>, SqlError> {
        match self.run(query).await {
            Ok(rows) => {
                debug!(
                    event_name = "db.sql.executed",
                    row_count = rows.len(),
                    "sql statement executed"
                );
                Ok(rows)
            }
            Err(error) => Err(sql_error(error)),
        }
    }
}

fn sql_error(error: sqlx::Error) -> SqlError {
    match error.as_database_error() {
        Some(database_error) => SqlError::new(database_error.message()),
        None => SqlError::new(error.to_string()),
    }
}

fn row_to_json(row: &SqliteRow) -> Result<SqlRow, sqlx::Error> {
    let mut object = SqlRow::new();

    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
                "REAL" => Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
                    Value::String(format!("<{} bytes>", bytes.len()))
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
            }
        };

        object.insert(column.name().to_string(), value);
    }

    Ok(object)
}
