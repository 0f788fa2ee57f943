//! Import reconciler: spreadsheet rows in, deduplicated tagged records out.
//!
//! ```text
//! Idle -> Analyzing -> MappingReview -> Importing -> Completed
//!              \                           \
//!               -> Failed                   -> Failed
//! ```
//!
//! Structural problems (unsupported or empty file, incomplete mapping, a
//! failed duplicate preload) abort before anything is written. Once batches
//! start, failures are recorded in the [`ImportResult`] instead: a failed
//! batch counts its rows as errors and the run moves on, and tag attachment
//! failures never undo inserted records.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use juris_core::mapping::validate_unique_sources;
use juris_core::{
    defaults, suggest, validate_required_fields, Error, FieldMapping, ImportConfig, Owner,
    Predicate, Record, RecordStore, Result, SynonymTable,
};
use juris_db::VinculoIndex;

use crate::coerce::{coerce, digits_only, FieldKind};
use crate::result::{
    batch_percent, BatchOutcome, ImportProgress, ImportResult, Outcome, RowOutcome,
};
use crate::schema::TargetSchema;
use crate::sheet::{read_sheet, Cell, Sheet};

/// Lifecycle of one reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportState {
    Idle,
    Analyzing,
    MappingReview,
    Importing,
    Completed(ImportResult),
    Failed(String),
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Analyzing => f.write_str("analyzing"),
            Self::MappingReview => f.write_str("mapping_review"),
            Self::Importing => f.write_str("importing"),
            Self::Completed(_) => f.write_str("completed"),
            Self::Failed(_) => f.write_str("failed"),
        }
    }
}

/// What the mapping screen needs after a file is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub headers: Vec<String>,
    pub suggested_mapping: Vec<FieldMapping>,
    pub row_count: usize,
}

/// Read a file and suggest a mapping without touching any store.
pub fn analyze_file(
    bytes: &[u8],
    file_name: &str,
    schema: &TargetSchema,
    synonyms: &SynonymTable,
) -> Result<(Sheet, Analysis)> {
    let sheet = read_sheet(bytes, file_name)?;
    let analysis = analysis_of(&sheet, schema, synonyms);
    Ok((sheet, analysis))
}

fn analysis_of(sheet: &Sheet, schema: &TargetSchema, synonyms: &SynonymTable) -> Analysis {
    Analysis {
        headers: sheet.headers().to_vec(),
        suggested_mapping: suggest(sheet.headers(), &schema.field_names(), synonyms),
        row_count: sheet.row_count(),
    }
}

/// One mapping row resolved against the sheet and schema.
struct Column {
    index: usize,
    target: String,
    kind: FieldKind,
    default: Option<Cell>,
    required: bool,
}

/// A row accepted for writing.
struct Pending {
    row: usize,
    key: Option<String>,
    record: Record,
}

impl Pending {
    fn new(row: usize, key: Option<String>, record: Record) -> Self {
        Self { row, key, record }
    }
}

/// Drives one spreadsheet import for one tenant.
pub struct ImportReconciler<S> {
    store: S,
    schema: TargetSchema,
    owner: Owner,
    config: ImportConfig,
    synonyms: SynonymTable,
    cancel: Arc<AtomicBool>,
    state: ImportState,
    sheet: Option<Sheet>,
}

impl<S: RecordStore> ImportReconciler<S> {
    /// Fails with `Config` when the schema or configuration is invalid.
    pub fn new(store: S, schema: TargetSchema, owner: Owner, config: ImportConfig) -> Result<Self> {
        schema.validate()?;
        config.validate()?;
        Ok(Self {
            store,
            schema,
            owner,
            config,
            synonyms: SynonymTable::backoffice(),
            cancel: Arc::new(AtomicBool::new(false)),
            state: ImportState::Idle,
            sheet: None,
        })
    }

    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.synonyms = synonyms;
        self
    }

    /// Share an externally owned cancellation flag.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Setting the returned flag stops the run before its next batch.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn state(&self) -> &ImportState {
        &self.state
    }

    pub fn schema(&self) -> &TargetSchema {
        &self.schema
    }

    pub fn sheet(&self) -> Option<&Sheet> {
        self.sheet.as_ref()
    }

    /// Back to `Idle`, dropping any loaded sheet.
    pub fn reset(&mut self) {
        self.sheet = None;
        self.cancel.store(false, Ordering::SeqCst);
        self.state = ImportState::Idle;
    }

    fn fail(&mut self, err: Error) -> Error {
        self.sheet = None;
        self.state = ImportState::Failed(err.to_string());
        err
    }

    /// Read `bytes`, suggest a mapping and enter `MappingReview`.
    #[instrument(skip(self, bytes), fields(subsystem = "import", component = "reconciler", op = "analyze", tenant_id = %self.owner.tenant_id, table = %self.schema.table, file_name = %file_name))]
    pub async fn analyze(&mut self, bytes: &[u8], file_name: &str) -> Result<Analysis> {
        self.ensure_not_importing()?;
        self.state = ImportState::Analyzing;
        self.cancel.store(false, Ordering::SeqCst);

        match analyze_file(bytes, file_name, &self.schema, &self.synonyms) {
            Ok((sheet, analysis)) => {
                info!(
                    columns = analysis.headers.len(),
                    row_count = analysis.row_count,
                    "File analyzed"
                );
                self.sheet = Some(sheet);
                self.state = ImportState::MappingReview;
                Ok(analysis)
            }
            Err(e) => {
                warn!(error = %e, "File rejected");
                Err(self.fail(e))
            }
        }
    }

    /// Enter `MappingReview` with rows parsed elsewhere.
    pub fn load_sheet(&mut self, sheet: Sheet) -> Result<Analysis> {
        self.ensure_not_importing()?;
        let analysis = analysis_of(&sheet, &self.schema, &self.synonyms);
        self.cancel.store(false, Ordering::SeqCst);
        self.sheet = Some(sheet);
        self.state = ImportState::MappingReview;
        Ok(analysis)
    }

    fn ensure_not_importing(&self) -> Result<()> {
        if self.state == ImportState::Importing {
            return Err(Error::InvalidState(
                "an import is already running".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve mapping rows to sheet columns, rejecting unknown columns or
    /// targets. Ignored rows are dropped.
    fn resolve_columns(&self, sheet: &Sheet, mapping: &[FieldMapping]) -> Result<Vec<Column>> {
        validate_unique_sources(mapping)?;
        validate_required_fields(mapping, &self.schema.name_field)?;

        let mut columns = Vec::new();
        for m in mapping.iter().filter(|m| !m.is_ignored()) {
            let index = sheet.column(&m.source_field).ok_or_else(|| {
                Error::InvalidInput(format!("column '{}' is not in the file", m.source_field))
            })?;
            let kind = self.schema.kind_of(&m.target_field).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "'{}' is not a field of {}",
                    m.target_field, self.schema.table
                ))
            })?;
            columns.push(Column {
                index,
                target: m.target_field.clone(),
                kind,
                default: m
                    .default_value
                    .as_deref()
                    .map(Cell::text)
                    .filter(|c| !c.is_empty()),
                required: m.required,
            });
        }
        Ok(columns)
    }

    /// Natural keys already stored for this tenant, digits only.
    async fn preload_keys(&self) -> Result<HashSet<String>> {
        let Some(key) = self.schema.natural_key.as_deref() else {
            return Ok(HashSet::new());
        };
        let rows = self
            .store
            .select_where(
                &self.schema.table,
                &Predicate::id_eq(defaults::TENANT_COLUMN, self.owner.tenant_id),
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get(key))
            .filter_map(|v| match v {
                JsonValue::String(s) => Some(digits_only(s)),
                JsonValue::Number(n) => Some(digits_only(&n.to_string())),
                _ => None,
            })
            .filter(|k| !k.is_empty())
            .collect())
    }

    /// Turn one row into a record, or say why it cannot be imported.
    fn build_record(
        &self,
        columns: &[Column],
        cells: &[Cell],
    ) -> std::result::Result<Option<Record>, String> {
        let has_data = columns
            .iter()
            .any(|c| cells.get(c.index).map(|cell| !cell.is_empty()).unwrap_or(false));
        if !has_data {
            return Ok(None);
        }

        let mut record = Record::new();
        for column in columns {
            let cell = match cells.get(column.index) {
                Some(cell) if !cell.is_empty() => cell,
                _ => match &column.default {
                    Some(default) => default,
                    None => continue,
                },
            };
            let value = coerce(column.kind, cell);
            if !value.is_null() {
                record.insert(column.target.clone(), value);
            }
        }

        for (field, value) in &self.schema.defaults {
            record
                .entry(field.clone())
                .or_insert_with(|| value.clone());
        }

        let missing = |field: &str| record.get(field).map(JsonValue::is_null).unwrap_or(true);
        if missing(&self.schema.name_field) {
            return Err(format!("'{}' is empty", self.schema.name_field));
        }
        if let Some(column) = columns.iter().find(|c| c.required && missing(&c.target)) {
            return Err(format!("required field '{}' is empty or invalid", column.target));
        }

        record.insert(
            defaults::TENANT_COLUMN.to_string(),
            JsonValue::String(self.owner.tenant_id.to_string()),
        );
        Ok(Some(record))
    }

    /// Import the loaded sheet with `mapping`, tagging every inserted record
    /// with `tag_ids`. Only legal in `MappingReview`.
    #[instrument(skip(self, mapping, tag_ids, on_progress), fields(subsystem = "import", component = "reconciler", op = "run", tenant_id = %self.owner.tenant_id, table = %self.schema.table))]
    pub async fn run<F>(
        &mut self,
        mapping: &[FieldMapping],
        tag_ids: &[Uuid],
        mut on_progress: F,
    ) -> Result<ImportResult>
    where
        F: FnMut(ImportProgress),
    {
        if self.state != ImportState::MappingReview {
            return Err(Error::InvalidState(format!(
                "run requires mapping_review, reconciler is {}",
                self.state
            )));
        }
        let sheet = self
            .sheet
            .take()
            .ok_or_else(|| Error::InvalidState("no sheet loaded".to_string()))?;

        // Mapping problems leave the reconciler in review so the caller can
        // fix the mapping and call run again.
        let columns = match self.resolve_columns(&sheet, mapping) {
            Ok(columns) => columns,
            Err(e) => {
                debug!(error = %e, "Mapping rejected");
                self.sheet = Some(sheet);
                return Err(e);
            }
        };
        let start = Instant::now();

        // Keys present in the store: preloaded, then every key a written batch
        // adds. Only these make a later row a duplicate.
        let mut stored = match self.preload_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Duplicate preload failed");
                return Err(self.fail(e));
            }
        };
        debug!(known_keys = stored.len(), "Preloaded natural keys");

        let mut result = ImportResult::new(self.config.max_error_details);
        let mut queue: Vec<Pending> = Vec::new();
        // Rows repeating a key that is queued but not yet written.
        let mut deferred: Vec<Pending> = Vec::new();
        let mut claimed: HashSet<String> = HashSet::new();
        for (idx, cells) in sheet.rows().iter().enumerate() {
            // Header is spreadsheet row 1.
            let row = idx + 2;
            let outcome = match self.build_record(&columns, cells) {
                Ok(None) => RowOutcome::Skipped { row },
                Err(message) => RowOutcome::Rejected { row, message },
                Ok(Some(record)) => {
                    let key = self
                        .schema
                        .natural_key
                        .as_deref()
                        .and_then(|k| record.get(k))
                        .and_then(JsonValue::as_str)
                        .map(digits_only)
                        .filter(|k| !k.is_empty());
                    match key {
                        Some(key) if stored.contains(&key) => RowOutcome::Duplicate { row, key },
                        Some(key) if claimed.contains(&key) => {
                            deferred.push(Pending::new(row, Some(key), record));
                            RowOutcome::Queued { row }
                        }
                        key => {
                            if let Some(k) = &key {
                                claimed.insert(k.clone());
                            }
                            queue.push(Pending::new(row, key, record));
                            RowOutcome::Queued { row }
                        }
                    }
                }
            };
            trace!(row, outcome = ?outcome, "Row classified");
            result = result.apply(outcome);
        }

        self.state = ImportState::Importing;
        info!(
            row_count = result.total,
            queued = queue.len(),
            deferred = deferred.len(),
            duplicates = result.duplicates,
            skipped = result.skipped,
            "Rows classified"
        );

        let batch_size = self.config.batch_size;
        let mut planned = queue.len().div_ceil(batch_size);
        let mut inserted: Vec<Uuid> = Vec::with_capacity(queue.len());
        let mut batch = 0usize;
        let mut percent = 0u8;

        'rounds: loop {
            let mut pending = queue.len() + deferred.len();
            let mut batches = std::mem::take(&mut queue).into_iter().peekable();
            while batches.peek().is_some() {
                if self.cancel.load(Ordering::SeqCst) {
                    info!(batch = batch + 1, pending, "Import cancelled");
                    result = result.apply(Outcome::Cancelled { pending });
                    break 'rounds;
                }
                let (keys, records): (Vec<Option<String>>, Vec<Record>) = batches
                    .by_ref()
                    .take(batch_size)
                    .map(|p| (p.key, p.record))
                    .unzip();
                let rows = records.len();
                pending -= rows;
                batch += 1;

                let outcome = match self.store.insert_many(&self.schema.table, records).await {
                    Ok(ids) => {
                        debug!(batch, row_count = rows, "Batch written");
                        inserted.extend(ids);
                        stored.extend(keys.into_iter().flatten());
                        BatchOutcome::Written { batch, rows }
                    }
                    Err(e) => {
                        let err = Error::BatchWrite {
                            batch,
                            message: e.to_string(),
                        };
                        warn!(batch, row_count = rows, error = %err, "Batch failed");
                        BatchOutcome::Failed {
                            batch,
                            rows,
                            message: err.to_string(),
                        }
                    }
                };
                result = result.apply(outcome);
                percent = percent.max(batch_percent(batch, planned));
                on_progress(ImportProgress {
                    percent,
                    result: result.clone(),
                });
                tokio::task::yield_now().await;
            }

            if deferred.is_empty() {
                break;
            }
            // A repeat of a written key is a duplicate. The first repeat of a
            // key whose batch failed takes its place in the next round.
            claimed.clear();
            for p in std::mem::take(&mut deferred) {
                let Some(key) = p.key.clone() else {
                    queue.push(p);
                    continue;
                };
                if stored.contains(&key) {
                    result = result.apply(Outcome::RepeatedKey { row: p.row, key });
                } else if claimed.insert(key) {
                    queue.push(p);
                } else {
                    deferred.push(p);
                }
            }
            debug!(
                requeued = queue.len(),
                deferred = deferred.len(),
                "Repeated keys reconciled"
            );
            planned = batch + queue.len().div_ceil(batch_size);
        }

        if !tag_ids.is_empty() && !inserted.is_empty() {
            let index = VinculoIndex::new(&self.store, self.owner)
                .with_in_clause_limit(self.config.in_clause_limit);
            match index
                .attach_many(self.schema.entity_kind, &inserted, tag_ids)
                .await
            {
                Ok(created) => debug!(created, "Tags attached"),
                Err(e) => {
                    let err = Error::TagAttach(e.to_string());
                    warn!(error = %err, "Tag attachment failed, records kept");
                    result = result.apply(Outcome::TagAttachFailed {
                        message: err.to_string(),
                    });
                }
            }
        }

        on_progress(ImportProgress {
            percent: 100,
            result: result.clone(),
        });

        info!(
            total = result.total,
            success = result.success,
            errors = result.errors,
            skipped = result.skipped,
            duplicates = result.duplicates,
            cancelled = result.cancelled,
            duration_ms = start.elapsed().as_millis() as u64,
            "Import completed"
        );
        self.state = ImportState::Completed(result.clone());
        Ok(result)
    }
}
