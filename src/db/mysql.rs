use super::{Database, PoolSettings, ResultSet, Row, Value};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::{Column, Row as _, TypeInfo};
use std::time::Instant;
use tracing::{error, info};

/// [`Database`] over a shared MySQL pool.
#[derive(Clone)]
pub struct MySqlDatabase {
    pool: MySqlPool,
}

impl MySqlDatabase {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = super::init_pool(database_url, &PoolSettings::default()).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn fetch_all(&self, sql: &str) -> Result<ResultSet> {
        let started = Instant::now();
        let rows = sqlx::query(sql).fetch_all(&self.pool).await.map_err(|e| {
            error!(
                "Database query failed after {}ms: {}",
                started.elapsed().as_millis(),
                e
            );
            PipelineError::Execution(e.to_string())
        })?;

        info!(
            "Database query executed in {}ms, returned {} rows",
            started.elapsed().as_millis(),
            rows.len()
        );
        Ok(rows.iter().map(decode_row).collect())
    }
}

fn decode_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            let value = decode_cell(row, column.ordinal(), column.type_info().name());
            (column.name().to_string(), value)
        })
        .collect()
}

/// Decode one cell using the column type name as a hint, falling back to a
/// few generic attempts.
fn decode_cell(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    let base = type_name.split_whitespace().next().unwrap_or_default();

    match base {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" | "BIT" => {
            if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
                return v.into();
            }
            if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
                return v.map(unsigned_value).unwrap_or(Value::Null);
            }
            if let Ok(v) = row.try_get_unchecked::<Option<i64>, _>(idx) {
                return v.into();
            }
        }
        "FLOAT" | "DOUBLE" => {
            if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
                return v.into();
            }
            if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
                return v.map(|x| Value::Float(x.into())).unwrap_or(Value::Null);
            }
        }
        "DECIMAL" => {
            if let Ok(v) = row.try_get_unchecked::<Option<String>, _>(idx) {
                return v
                    .map(|s| s.parse::<f64>().map(Value::Float).unwrap_or(Value::Text(s)))
                    .unwrap_or(Value::Null);
            }
        }
        "DATE" => {
            if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(idx) {
                return v.into();
            }
        }
        "DATETIME" | "TIMESTAMP" => {
            if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
                return v.map(Value::DateTime).unwrap_or(Value::Null);
            }
            if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
                return v
                    .map(|dt| Value::DateTime(dt.naive_utc()))
                    .unwrap_or(Value::Null);
            }
        }
        _ => {}
    }

    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(bytes_value).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get_unchecked::<Option<String>, _>(idx) {
        return v.into();
    }
    Value::Null
}

fn unsigned_value(n: u64) -> Value {
    i64::try_from(n)
        .map(Value::Integer)
        .unwrap_or(Value::Float(n as f64))
}

fn bytes_value(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(text) => Value::Text(text),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}
