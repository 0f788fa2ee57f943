//! # juris-db
//!
//! Storage layer for the juris tagging subsystem.
//!
//! This crate provides:
//! - Connection pool management
//! - [`RecordStore`] adapters for PostgreSQL and in-process use
//! - Parameterized SQL generation with identifier validation
//! - The tenant-scoped tag catalogue ([`TagStore`])
//! - The polymorphic tag link index ([`VinculoIndex`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use juris_db::{Database, EntityKind, EtiquetaDraft, Owner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/juris").await?;
//!     let owner = Owner::new(tenant_id);
//!
//!     let vip = db.tags(owner).create(EtiquetaDraft::new("VIP")).await?;
//!     db.vinculos(owner).attach(vip.id, EntityKind::Contato, contato_id).await?;
//!     Ok(())
//! }
//! ```
pub mod identifiers;
pub mod memory;
pub mod pg_store;
pub mod pool;
pub mod sql;
pub mod tags;
pub mod vinculos;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use juris_core::*;

pub use identifiers::{validate_identifier, validate_identifiers};
pub use memory::MemoryRecordStore;
pub use pg_store::PgRecordStore;
pub use pool::{create_pool, log_pool_usage, PoolConfig, PoolUsage};
pub use sql::{PredicateSqlBuilder, QueryParam};
pub use tags::{sort_by_nome, TagStore};
pub use vinculos::VinculoIndex;

use std::sync::Arc;

/// PostgreSQL-backed entry point: one pool, one shared record store.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Generic record store over `pool`.
    pub records: Arc<PgRecordStore>,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            records: Arc::new(PgRecordStore::new(pool.clone())),
            pool,
        }
    }

    /// Connect with the default pool settings.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool(url, &config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Tag catalogue for `owner`'s tenant.
    pub fn tags(&self, owner: Owner) -> TagStore<Arc<PgRecordStore>> {
        TagStore::new(self.records.clone(), owner)
    }

    /// Tag link index for `owner`'s tenant.
    pub fn vinculos(&self, owner: Owner) -> VinculoIndex<Arc<PgRecordStore>> {
        VinculoIndex::new(self.records.clone(), owner)
    }
}
