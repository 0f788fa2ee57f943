//! # juris-core
//!
//! Core types, traits, and abstractions for the juris tagging and import
//! subsystem.
//!
//! This crate provides the tag data model, the record-store abstraction that
//! storage adapters implement, and the pure building blocks that never touch
//! I/O: tag scope resolution, include/exclude tag filtering, and
//! spreadsheet field-mapping suggestion.

pub mod config;
pub mod defaults;
pub mod error;
pub mod filter;
pub mod logging;
pub mod mapping;
pub mod models;
pub mod scope;
pub mod store;

// Re-export commonly used types at crate root
pub use config::ImportConfig;
pub use error::{Error, Result};
pub use filter::{apply_tag_filters, HasTags, TagFilter};
pub use mapping::{
    normalize_header, resuggest, set_target, suggest, validate_required_fields, FieldMapping,
    SynonymTable,
};
pub use models::*;
pub use scope::{group_by_grupo, visible_for, visible_for_kind};
pub use store::{Predicate, Record, RecordStore};
