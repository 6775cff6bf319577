//! Database context for the destination store.
//!
//! Holds the connection pool, creates the schema and hands out the store
//! used by the importers.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::diesel_store::DieselStore;
use super::pool::{DbError, DbPool};
use super::store::StoreError;
use super::util::to_diesel_error;

/// Database context that owns the connection pool.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_url("sqlite:migration.db")?;
/// ctx.init_schema().await?;
/// let store = ctx.store();
/// ```
#[derive(Clone)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Create a context from a database file path (SQLite only).
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: DbPool::sqlite_from_path(db_path),
        }
    }

    /// Create a context from a database URL.
    ///
    /// Supports:
    /// - SQLite: file paths or `sqlite:` URLs
    /// - PostgreSQL: `postgres://` or `postgresql://` URLs
    pub fn from_url(url: &str) -> Result<Self, DbError> {
        Ok(Self {
            pool: DbPool::from_url(url)?,
        })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn is_sqlite(&self) -> bool {
        self.pool.is_sqlite()
    }

    /// Get the destination store.
    pub fn store(&self) -> DieselStore {
        DieselStore::new(self.pool.clone())
    }

    /// Create the destination tables if they don't exist.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        crate::with_conn_split!(self.pool,
            sqlite: conn => {
                Ok(init_sqlite_schema(&mut conn).await?)
            },
            postgres: conn => {
                Ok(init_postgres_schema(&mut conn).await?)
            }
        )
    }

    /// Create the parent directory of a SQLite database file.
    pub fn ensure_parent_dir(db_path: &Path) -> Result<(), DbError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(to_diesel_error)?;
        }
        Ok(())
    }
}

async fn init_sqlite_schema(conn: &mut super::pool::SqliteConn) -> Result<(), DbError> {
    conn.batch_execute(include_str!("schema_sqlite.sql")).await
}

#[cfg(feature = "postgres")]
async fn init_postgres_schema(conn: &mut diesel_async::AsyncPgConnection) -> Result<(), DbError> {
    use diesel_async::RunQueryDsl;

    // PostgreSQL needs statements executed separately
    let script: String = include_str!("schema_postgres.sql")
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    for stmt in script.split(';') {
        let stmt = stmt.trim();
        if !stmt.is_empty() {
            diesel::sql_query(stmt).execute(conn).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;
    use crate::repository::DestinationStore;

    #[tokio::test]
    async fn test_init_schema_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("dest.db"));
        ctx.init_schema().await.unwrap();
        ctx.init_schema().await.unwrap();

        let store = ctx.store();
        store.ping().await.unwrap();
        for entity in EntityType::ALL {
            assert_eq!(store.count(entity).await.unwrap(), 0);
        }
    }

    #[test]
    fn test_ensure_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested/deeper/dest.db");
        DbContext::ensure_parent_dir(&db_path).unwrap();
        assert!(db_path.parent().unwrap().is_dir());
    }
}
