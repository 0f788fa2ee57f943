//! Import accounting.
//!
//! [`ImportResult`] is built by folding outcomes through
//! [`ImportResult::apply`]; nothing else mutates the counters. Snapshots
//! handed to progress callbacks are clones, so a consumer never observes a
//! half-applied outcome.

use serde::{Deserialize, Serialize};

use juris_core::defaults;

/// Classification of one data row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// No mapped cell had data.
    Skipped { row: usize },
    /// Natural key already stored before the run.
    Duplicate { row: usize, key: String },
    /// The row cannot be imported as-is.
    Rejected { row: usize, message: String },
    /// Accepted and waiting for its batch.
    Queued { row: usize },
}

/// Result of one batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Written { batch: usize, rows: usize },
    /// `message` is the rendered batch-write error.
    Failed { batch: usize, rows: usize, message: String },
}

/// Anything the reducer accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Row(RowOutcome),
    Batch(BatchOutcome),
    /// Tag attachment failed after the records were written; `message` is
    /// the rendered tag-attach error.
    TagAttachFailed { message: String },
    /// The run stopped before submitting `pending` queued rows.
    Cancelled { pending: usize },
    /// A queued row whose key was written by an earlier row of the file.
    RepeatedKey { row: usize, key: String },
}

impl From<RowOutcome> for Outcome {
    fn from(o: RowOutcome) -> Self {
        Outcome::Row(o)
    }
}

impl From<BatchOutcome> for Outcome {
    fn from(o: BatchOutcome) -> Self {
        Outcome::Batch(o)
    }
}

/// Totals of one import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Data rows read.
    pub total: usize,
    /// Rows written.
    pub success: usize,
    /// Rows rejected or lost in a failed batch.
    pub errors: usize,
    /// Empty rows, plus queued rows a cancelled run never submitted.
    pub skipped: usize,
    pub duplicates: usize,
    /// First diagnostics, then one `... and N more` line.
    pub error_details: Vec<String>,
    pub cancelled: bool,
    #[serde(skip)]
    max_error_details: usize,
    #[serde(skip)]
    omitted: usize,
}

impl Default for ImportResult {
    fn default() -> Self {
        Self::new(defaults::MAX_ERROR_DETAILS)
    }
}

impl ImportResult {
    /// Empty result keeping at most `max_error_details` diagnostics.
    pub fn new(max_error_details: usize) -> Self {
        Self {
            total: 0,
            success: 0,
            errors: 0,
            skipped: 0,
            duplicates: 0,
            error_details: Vec::new(),
            cancelled: false,
            max_error_details,
            omitted: 0,
        }
    }

    /// Fold one outcome into the totals.
    pub fn apply(mut self, outcome: impl Into<Outcome>) -> Self {
        match outcome.into() {
            Outcome::Row(row) => {
                self.total += 1;
                match row {
                    RowOutcome::Skipped { .. } => self.skipped += 1,
                    RowOutcome::Duplicate { .. } => self.duplicates += 1,
                    RowOutcome::Rejected { row, message } => {
                        self.errors += 1;
                        self.push_detail(format!("Row {}: {}", row, message));
                    }
                    RowOutcome::Queued { .. } => {}
                }
            }
            Outcome::Batch(BatchOutcome::Written { rows, .. }) => self.success += rows,
            Outcome::Batch(BatchOutcome::Failed { rows, message, .. }) => {
                self.errors += rows;
                self.push_detail(format!("{} ({} rows)", message, rows));
            }
            Outcome::TagAttachFailed { message } => self.push_detail(message),
            Outcome::Cancelled { pending } => {
                self.cancelled = true;
                self.skipped += pending;
            }
            Outcome::RepeatedKey { .. } => self.duplicates += 1,
        }
        self
    }

    fn push_detail(&mut self, message: String) {
        if self.error_details.len() < self.max_error_details && self.omitted == 0 {
            self.error_details.push(message);
            return;
        }
        if self.omitted > 0 {
            self.error_details.pop();
        }
        self.omitted += 1;
        self.error_details
            .push(format!("... and {} more", self.omitted));
    }

    /// Rows accounted for by a final classification.
    pub fn classified(&self) -> usize {
        self.success + self.errors + self.skipped + self.duplicates
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0 || !self.error_details.is_empty()
    }
}

/// Snapshot passed to progress callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    /// 0-100, never decreasing within a run.
    pub percent: u8,
    pub result: ImportResult,
}

/// Percent reached after `done` of `total` batches.
pub fn batch_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return defaults::BATCH_PROGRESS_CEILING;
    }
    let ceiling = defaults::BATCH_PROGRESS_CEILING as usize;
    (ceiling * done.min(total) / total) as u8
}
