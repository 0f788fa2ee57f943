//! Centralized default constants for the juris tagging and import subsystem.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// TABLES
// =============================================================================

/// Table holding tag definitions.
pub const TABLE_ETIQUETAS: &str = "etiquetas";

/// Polymorphic association table between tags and entities.
pub const TABLE_VINCULOS: &str = "etiqueta_vinculos";

/// Column every stored record carries for tenant isolation.
pub const TENANT_COLUMN: &str = "tenant_id";

/// Primary key column.
pub const ID_COLUMN: &str = "id";

// =============================================================================
// TAGS
// =============================================================================

/// Colour applied to tags created without one (neutral grey).
pub const TAG_COLOR: &str = "#6b7280";

/// Glyph applied to tags created without one.
pub const TAG_ICON: &str = "tag";

// =============================================================================
// IMPORT
// =============================================================================

/// Records written per `insert_many` call.
pub const IMPORT_BATCH_SIZE: usize = 50;

/// Largest id set sent in a single `IN (...)` lookup.
pub const IN_CLAUSE_LIMIT: usize = 500;

/// Error messages kept verbatim in an import result.
pub const MAX_ERROR_DETAILS: usize = 20;

/// Share of the progress bar covered by the batch loop; tag attachment
/// takes it to 100.
pub const BATCH_PROGRESS_CEILING: u8 = 90;

/// Minimum length for substring matching between headers and field names.
pub const MIN_CONTAINMENT_LEN: usize = 3;
