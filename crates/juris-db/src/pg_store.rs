//! PostgreSQL implementation of [`RecordStore`].

use std::collections::BTreeSet;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use juris_core::{defaults, Error, Predicate, Record, RecordStore, Result};

use crate::sql::{
    delete_statement, insert_statement, replace_statement, select_statement, QueryParam,
};

/// Assign a UUIDv7 to records that lack an `id`, returning all ids in order.
pub(crate) fn ensure_ids(records: &mut [Record]) -> Result<Vec<Uuid>> {
    records
        .iter_mut()
        .map(|record| match record.get(defaults::ID_COLUMN) {
            Some(JsonValue::String(s)) => Uuid::parse_str(s)
                .map_err(|e| Error::InvalidInput(format!("Invalid record id '{}': {}", s, e))),
            Some(JsonValue::Null) | None => {
                let id = Uuid::now_v7();
                record.insert(
                    defaults::ID_COLUMN.to_string(),
                    JsonValue::String(id.to_string()),
                );
                Ok(id)
            }
            Some(other) => Err(Error::InvalidInput(format!(
                "Record id must be a UUID string, got {}",
                other
            ))),
        })
        .collect()
}

/// PostgreSQL record store. Tables are addressed by name; every value goes
/// through `jsonb_populate_recordset`, so column types come from the table
/// definition.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool<Postgres>,
}

impl PgRecordStore {
    /// Create a new PgRecordStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    params: Vec<QueryParam>,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        query = match param {
            QueryParam::Text(s) => query.bind(s),
            QueryParam::TextArray(v) => query.bind(v),
            QueryParam::Uuid(id) => query.bind(id),
            QueryParam::UuidArray(ids) => query.bind(ids),
        };
    }
    query
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self, records), fields(subsystem = "store", component = "pg_store", op = "insert_many", table = %table, row_count = records.len()))]
    async fn insert_many(&self, table: &str, mut records: Vec<Record>) -> Result<Vec<Uuid>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let ids = ensure_ids(&mut records)?;

        let columns: Vec<String> = records
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let sql = insert_statement(table, &columns)?;

        let payload = JsonValue::Array(records.into_iter().map(JsonValue::Object).collect());
        let result = sqlx::query(&sql)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() != ids.len() as u64 {
            return Err(Error::Store(format!(
                "Inserted {} of {} rows into {}",
                result.rows_affected(),
                ids.len(),
                table
            )));
        }

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Inserted records"
        );
        Ok(ids)
    }

    #[instrument(skip(self, predicate), fields(subsystem = "store", component = "pg_store", op = "select_where", table = %table))]
    async fn select_where(&self, table: &str, predicate: &Predicate) -> Result<Vec<Record>> {
        let (sql, params) = select_statement(table, predicate)?;
        let rows = bind_params(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| match row.try_get::<JsonValue, _>("row") {
                Ok(JsonValue::Object(map)) => Ok(map),
                Ok(other) => Err(Error::Store(format!(
                    "Expected JSON object row from {}, got {}",
                    table, other
                ))),
                Err(e) => Err(Error::Database(e)),
            })
            .collect()
    }

    #[instrument(skip(self, predicate), fields(subsystem = "store", component = "pg_store", op = "delete_where", table = %table))]
    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<u64> {
        let (sql, params) = delete_statement(table, predicate)?;
        let result = bind_params(sqlx::query(&sql), params)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, record), fields(subsystem = "store", component = "pg_store", op = "replace", table = %table, id = %id))]
    async fn replace(&self, table: &str, id: Uuid, mut record: Record) -> Result<()> {
        record.insert(
            defaults::ID_COLUMN.to_string(),
            JsonValue::String(id.to_string()),
        );
        let columns: Vec<String> = record
            .keys()
            .filter(|k| k.as_str() != defaults::ID_COLUMN)
            .cloned()
            .collect();
        if columns.is_empty() {
            return Ok(());
        }
        let sql = replace_statement(table, &columns)?;
        let result = sqlx::query(&sql)
            .bind(JsonValue::Object(record))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("{} row {}", table, id)));
        }
        Ok(())
    }
}
