//! In-process [`RecordStore`].
//!
//! Backs the test suites of every crate and embedders that do not need
//! persistence. Besides storage it counts calls per table and can be told to
//! fail specific operations, which is how batch-failure and cascade-failure
//! paths are exercised without a database.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

use juris_core::{defaults, Error, Predicate, Record, RecordStore, Result};

use crate::identifiers::validate_identifier;
use crate::pg_store::ensure_ids;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Op {
    Insert,
    Select,
    Delete,
}

#[derive(Default)]
struct FailurePlan {
    /// (op, table) that always fail.
    always: HashSet<(Op, String)>,
    /// (op, table, call index) that fail once.
    on_call: HashSet<(Op, String, usize)>,
}

/// Thread-safe in-memory record store.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    calls: Mutex<HashMap<(Op, String), usize>>,
    failures: Mutex<FailurePlan>,
    total_calls: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every insert into `table` fails.
    pub fn fail_inserts(&self, table: &str) {
        self.plan(|p| {
            p.always.insert((Op::Insert, table.to_string()));
        });
    }

    /// The `n`-th (0-based) insert call into `table` fails.
    pub fn fail_insert_call(&self, table: &str, n: usize) {
        self.plan(|p| {
            p.on_call.insert((Op::Insert, table.to_string(), n));
        });
    }

    /// Every select from `table` fails.
    pub fn fail_selects(&self, table: &str) {
        self.plan(|p| {
            p.always.insert((Op::Select, table.to_string()));
        });
    }

    /// Every delete from `table` fails.
    pub fn fail_deletes(&self, table: &str) {
        self.plan(|p| {
            p.always.insert((Op::Delete, table.to_string()));
        });
    }

    /// Clear all injected failures.
    pub fn heal(&self) {
        self.plan(|p| *p = FailurePlan::default());
    }

    pub fn insert_calls(&self, table: &str) -> usize {
        self.count(Op::Insert, table)
    }

    pub fn select_calls(&self, table: &str) -> usize {
        self.count(Op::Select, table)
    }

    pub fn delete_calls(&self, table: &str) -> usize {
        self.count(Op::Delete, table)
    }

    /// Calls of any kind against any table.
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Number of rows currently stored in `table`.
    pub async fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Snapshot of every row in `table`.
    pub async fn dump(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn plan<F: FnOnce(&mut FailurePlan)>(&self, f: F) {
        let mut plan = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut plan);
    }

    fn count(&self, op: Op, table: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(op, table.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Record the call and return an error if a failure was planned for it.
    fn enter(&self, op: Op, table: &str) -> Result<()> {
        validate_identifier(table)?;
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let index = {
            let mut calls = self
                .calls
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let counter = calls.entry((op, table.to_string())).or_insert(0);
            let index = *counter;
            *counter += 1;
            index
        };

        let plan = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let key = (op, table.to_string());
        if plan.always.contains(&key) || plan.on_call.contains(&(op, table.to_string(), index)) {
            return Err(Error::Store(format!(
                "injected {:?} failure on {} (call {})",
                op, table, index
            )));
        }
        Ok(())
    }
}

fn record_id(record: &Record) -> Option<&str> {
    record.get(defaults::ID_COLUMN).and_then(JsonValue::as_str)
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_many(&self, table: &str, mut records: Vec<Record>) -> Result<Vec<Uuid>> {
        self.enter(Op::Insert, table)?;
        let ids = ensure_ids(&mut records)?;

        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();

        let existing: HashSet<&str> = rows.iter().filter_map(record_id).collect();
        let mut incoming = HashSet::new();
        for id in &ids {
            let id = id.to_string();
            if existing.contains(id.as_str()) || !incoming.insert(id.clone()) {
                return Err(Error::Store(format!(
                    "duplicate key value violates primary key of {}: {}",
                    table, id
                )));
            }
        }

        trace!(table, row_count = records.len(), "memory insert");
        rows.extend(records);
        Ok(ids)
    }

    async fn select_where(&self, table: &str, predicate: &Predicate) -> Result<Vec<Record>> {
        self.enter(Op::Select, table)?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| predicate.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<u64> {
        self.enter(Op::Delete, table)?;
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !predicate.matches(r));
        Ok((before - rows.len()) as u64)
    }

    async fn replace(&self, table: &str, id: Uuid, record: Record) -> Result<()> {
        validate_identifier(table)?;
        let id_str = id.to_string();
        let mut tables = self.tables.write().await;
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| record_id(r) == Some(id_str.as_str())))
            .ok_or_else(|| Error::NotFound(format!("{} row {}", table, id)))?;

        for (column, value) in record {
            if column != defaults::ID_COLUMN {
                row.insert(column, value);
            }
        }
        Ok(())
    }
}
