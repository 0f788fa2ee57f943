//! # juris-import
//!
//! Bulk import of spreadsheet rows into back-office tables.
//!
//! A file is read into a [`Sheet`], its headers are matched to the target
//! fields of a [`TargetSchema`], and the [`ImportReconciler`] turns rows into
//! records: coercing values, skipping empty rows, rejecting incomplete ones,
//! dropping duplicates of already-stored records, writing the rest in
//! batches and tagging everything it wrote.
//!
//! ```rust,ignore
//! use juris_import::{ImportReconciler, TargetSchema};
//!
//! let mut reconciler =
//!     ImportReconciler::new(store, TargetSchema::contatos(), owner, ImportConfig::from_env())?;
//! let analysis = reconciler.analyze(&bytes, "clientes.csv").await?;
//! let result = reconciler
//!     .run(&analysis.suggested_mapping, &[vip_tag], |p| println!("{}%", p.percent))
//!     .await?;
//! ```

pub mod coerce;
pub mod reconciler;
pub mod result;
pub mod schema;
pub mod sheet;

pub use coerce::{coerce, FieldKind};
pub use reconciler::{analyze_file, Analysis, ImportReconciler, ImportState};
pub use result::{BatchOutcome, ImportProgress, ImportResult, Outcome, RowOutcome};
pub use schema::{TargetField, TargetSchema};
pub use sheet::{detect_format, read_sheet, Cell, Sheet, SheetFormat};
