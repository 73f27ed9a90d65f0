//! Connection pools.
//!
//! Two handles wrap the same SQLite pool with different capabilities:
//!
//! - [`TenantPool`] is what request-serving code holds (via `AppState`). It
//!   exposes no raw connection for tenant data; the only way to touch
//!   tenant-scoped tables through it is `tenant::with_session_context`.
//! - [`MaintenancePool`] bypasses row security. It exists for migrations,
//!   seeds and operator tooling and must never be stored in `AppState` or
//!   reachable from a route handler.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::Executor;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;

use crate::app::config::Config;
use crate::app::rls::CONNECTION_SETUP_SQL;

/// Request-serving pool. Cloning is cheap.
#[derive(Clone)]
pub struct TenantPool {
    pool: SqlitePool,
    reparent_lock: Arc<Mutex<()>>,
}

impl TenantPool {
    /// Raw pool for tables that are not tenant-scoped (sessions, users) and
    /// for opening request transactions.
    pub(crate) fn inner(&self) -> &SqlitePool {
        &self.pool
    }

    /// Serializes subtree recomputation within this process.
    pub(crate) fn reparent_lock(&self) -> Arc<Mutex<()>> {
        self.reparent_lock.clone()
    }
}

/// Row-security-bypassing pool for maintenance tooling only.
pub struct MaintenancePool {
    pool: SqlitePool,
    reparent_lock: Arc<Mutex<()>>,
}

impl MaintenancePool {
    /// Open the database described by `config`. Every connection is prepared
    /// with the connection-local session tables.
    pub async fn connect(config: &Config) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute(sqlx::raw_sql(CONNECTION_SETUP_SQL)).await?;
                    Ok(())
                })
            });
        if config.is_in_memory() {
            // Closing the only connection would drop the database.
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;
        tracing::debug!(max_connections = config.db_max_connections, "database pool ready");

        Ok(Self {
            pool,
            reparent_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Apply embedded migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Raw pool. Queries through it are not subject to session context.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Serializes subtree recomputation; shared with derived tenant pools.
    pub fn reparent_lock(&self) -> Arc<Mutex<()>> {
        self.reparent_lock.clone()
    }

    /// Request-serving handle over the same database.
    pub fn tenant_pool(&self) -> TenantPool {
        TenantPool {
            pool: self.pool.clone(),
            reparent_lock: self.reparent_lock.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> MaintenancePool {
    let pool = MaintenancePool::connect(&Config::for_tests()).await.unwrap();
    pool.migrate().await.unwrap();
    pool
}
