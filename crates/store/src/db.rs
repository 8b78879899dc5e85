//! Database connection and pool management.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use tracing::{debug, instrument};

use crate::error::{DatabaseResultExt, ErrorKind, Result};
use crate::session::Session;

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
const MAX_CONNECTIONS: u32 = 5;
/// Basket version given to new regions and retail sites unless configured otherwise.
pub const DEFAULT_INITIAL_VERSION: i64 = 1;

/// Database connection pool for the basket store.
///
/// This is the main entry point: every read and write happens inside a
/// [`Session`] obtained from [`begin`](Self::begin).
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    initial_version: i64,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Apply the query-based PRAGMAs to every connection the pool
            // opens, not only the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool, initial_version: DEFAULT_INITIAL_VERSION };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to the database at the given path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn connect(path: impl AsRef<Path>, max_connections: Option<u32>) -> Result<Self> {
        let path = path.as_ref();
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, max_connections).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    /// - A [`Session`] holds the only connection until it is committed or
    ///   rolled back, so don't open two sessions at once.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // In-memory database must be limited to one connection, otherwise
        // parallel connections see different databases.
        Self::new(options, Some(1)).await
    }

    /// Set the basket version new regions and retail sites start at.
    pub fn with_initial_version(mut self, version: i64) -> Self {
        self.initial_version = version;
        self
    }

    pub fn initial_version(&self) -> i64 {
        self.initial_version
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            // Item/region and rule/item associations rely on cascades.
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // Sessions take the write lock up front (BEGIN IMMEDIATE), so a
            // second writer waits here instead of failing straight away.
            .busy_timeout(std::time::Duration::from_millis(1500))
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Run database migrations.
    ///
    /// This is called automatically by `connect` and `connect_in_memory`.
    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    /// Open a unit of work.
    ///
    /// The underlying transaction is started with `BEGIN IMMEDIATE`: the
    /// session holds the write lock from the start, so two sessions bumping
    /// the same region's basket version are serialized rather than racing.
    #[instrument(skip(self))]
    pub async fn begin(&self) -> Result<Session> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await.or_db()?;
        debug!("session started");
        Ok(Session::new(tx, self.initial_version))
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        // Let SQLite update query planner statistics
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1, "foreign_keys should be ON");
        db.close().await;
    }

    #[tokio::test]
    async fn test_initial_version_is_configurable() {
        let db = Database::connect_in_memory().await.unwrap().with_initial_version(10);
        assert_eq!(db.initial_version(), 10);
        db.close().await;
    }
}
