//! Record-store abstraction.
//!
//! The tagging and import code never talks to a database directly. It goes
//! through [`RecordStore`], a deliberately small interface (bulk insert,
//! filtered select, filtered delete) that a hosted database, PostgreSQL, or
//! an in-memory map can all satisfy.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::error::Result;

/// One stored row: column name to JSON value.
pub type Record = Map<String, JsonValue>;

// =============================================================================
// PREDICATES
// =============================================================================

/// Row filter understood by every store adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    All,
    /// `field = value`
    Eq(String, JsonValue),
    /// `field IN (values)`; an empty list matches nothing.
    In(String, Vec<JsonValue>),
    /// `field = id` on a UUID column.
    IdEq(String, Uuid),
    /// `field IN (ids)` on a UUID column; an empty list matches nothing.
    IdIn(String, Vec<Uuid>),
    /// Conjunction; an empty list matches every row.
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Predicate::Eq(field.into(), value.into())
    }

    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        Predicate::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// `field = id` for UUID columns.
    pub fn id_eq(field: impl Into<String>, id: Uuid) -> Self {
        Predicate::IdEq(field.into(), id)
    }

    /// `field IN (ids)` for UUID columns.
    pub fn id_in<'a>(field: impl Into<String>, ids: impl IntoIterator<Item = &'a Uuid>) -> Self {
        Predicate::IdIn(field.into(), ids.into_iter().copied().collect())
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    pub fn and(self, other: Predicate) -> Self {
        let mut parts = match self {
            Predicate::And(parts) => parts,
            Predicate::All => Vec::new(),
            p => vec![p],
        };
        match other {
            Predicate::And(more) => parts.extend(more),
            Predicate::All => {}
            p => parts.push(p),
        }
        Predicate::And(parts)
    }

    /// Field names referenced by this predicate, in first-seen order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::All => {}
            Predicate::Eq(f, _)
            | Predicate::In(f, _)
            | Predicate::IdEq(f, _)
            | Predicate::IdIn(f, _) => {
                if !out.contains(&f.as_str()) {
                    out.push(f.as_str());
                }
            }
            Predicate::And(parts) => parts.iter().for_each(|p| p.collect_fields(out)),
        }
    }

    /// Evaluate against an in-memory record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq(field, value) => record
                .get(field)
                .map(|v| values_equal(v, value))
                .unwrap_or(false),
            Predicate::In(field, values) => record
                .get(field)
                .map(|v| values.iter().any(|candidate| values_equal(v, candidate)))
                .unwrap_or(false),
            Predicate::IdEq(field, id) => record_id(record, field) == Some(*id),
            Predicate::IdIn(field, ids) => record_id(record, field)
                .map(|v| ids.contains(&v))
                .unwrap_or(false),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(record)),
        }
    }
}

fn record_id(record: &Record, field: &str) -> Option<Uuid> {
    record
        .get(field)
        .and_then(JsonValue::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Equality that treats `"42"` and `42` alike, the way a text cast in SQL
/// would. Nulls never compare equal.
fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Null, _) | (_, JsonValue::Null) => false,
        (JsonValue::String(x), JsonValue::String(y)) => x == y,
        (JsonValue::String(x), other) | (other, JsonValue::String(x)) => *x == other.to_string(),
        _ => a == b,
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Generic queryable record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert all records in one call; either every record is written or
    /// none is. Records without an `id` get a fresh UUIDv7. Returns the ids
    /// in input order.
    async fn insert_many(&self, table: &str, records: Vec<Record>) -> Result<Vec<Uuid>>;

    /// Fetch every row matching `predicate`.
    async fn select_where(&self, table: &str, predicate: &Predicate) -> Result<Vec<Record>>;

    /// Delete every row matching `predicate`, returning the count.
    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<u64>;

    /// Overwrite the columns present in `record` on the row with `id`.
    /// Columns absent from `record` keep their stored value. Errors with
    /// `NotFound` if no such row exists.
    async fn replace(&self, table: &str, id: Uuid, record: Record) -> Result<()>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn insert_many(&self, table: &str, records: Vec<Record>) -> Result<Vec<Uuid>> {
        (**self).insert_many(table, records).await
    }

    async fn select_where(&self, table: &str, predicate: &Predicate) -> Result<Vec<Record>> {
        (**self).select_where(table, predicate).await
    }

    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<u64> {
        (**self).delete_where(table, predicate).await
    }

    async fn replace(&self, table: &str, id: Uuid, record: Record) -> Result<()> {
        (**self).replace(table, id, record).await
    }
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for &S {
    async fn insert_many(&self, table: &str, records: Vec<Record>) -> Result<Vec<Uuid>> {
        (**self).insert_many(table, records).await
    }

    async fn select_where(&self, table: &str, predicate: &Predicate) -> Result<Vec<Record>> {
        (**self).select_where(table, predicate).await
    }

    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<u64> {
        (**self).delete_where(table, predicate).await
    }

    async fn replace(&self, table: &str, id: Uuid, record: Record) -> Result<()> {
        (**self).replace(table, id, record).await
    }
}
