//! Structured logging field name constants.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation can query by the same names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Import or delete aborted, requires operator attention |
//! | WARN  | Recoverable issue (failed batch, tag attach failure) |
//! | INFO  | Lifecycle events, import completions |
//! | DEBUG | Decision points, mapping suggestions, chunk counts |
//! | TRACE | Per-row classification |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "store", "tags", "import"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pg_store", "memory_store", "vinculo_index", "reconciler"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "insert_many", "attach", "resolve", "run"
pub const OPERATION: &str = "op";

/// Tenant the operation is scoped to.
pub const TENANT_ID: &str = "tenant_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Tag UUID being operated on.
pub const ETIQUETA_ID: &str = "etiqueta_id";

/// Entity kind discriminator (`referencia_tipo`).
pub const REFERENCIA_TIPO: &str = "referencia_tipo";

/// Target table name.
pub const TABLE: &str = "table";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of records/rows involved.
pub const ROW_COUNT: &str = "row_count";

/// One-based batch number inside an import run.
pub const BATCH: &str = "batch";

/// Number of `IN (...)` chunks issued by a bulk lookup.
pub const CHUNK_COUNT: &str = "chunk_count";
