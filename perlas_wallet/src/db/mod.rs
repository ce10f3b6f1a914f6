//! Persistence for the ledger services.
//!
//! Services never talk to `sqlx` directly; they hold an `Arc<dyn Store>`
//! which is either a [`PgStore`] over the pool managed here or an in-process
//! [`MemoryStore`] with the same transactional semantics.

use sqlx::postgres::PgPool;

pub mod config;
pub mod errors;
pub mod memory;
pub mod postgres;
pub mod store;

pub use config::DatabaseConfig;
pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PageRequest, Store, UnitOfWork};

/// PostgreSQL pool shared by the store and the health check
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the pool described by `config`
    ///
    /// ```no_run
    /// use perlas_wallet::db::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), sqlx::Error> {
    /// let db = Database::new(&DatabaseConfig::development()).await?;
    /// db.migrate().await?;
    /// let store = db.store();
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        log::info!("Opening database pool for {}", config.redacted_url());
        let pool = config
            .pool_options()
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded wallet ledger migrations
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Store backed by this pool
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Wait for checked-out connections and close the pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}
