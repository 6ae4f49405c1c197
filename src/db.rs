use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbBackend};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

/// Establishes a connection pool to the database
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

/// Establishes a connection pool with custom pool settings
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt).await.map_err(ServiceError::db_error)?;
    Ok(db_pool)
}

/// Whether the backend honors `SELECT ... FOR UPDATE` row locks.
///
/// SQLite has no row-level locks; its writers serialize on the whole
/// file, which gives the same race-freedom for the single-connection
/// test setup. The balance-row lock helpers skip the lock clause there.
pub fn supports_row_locks(backend: DbBackend) -> bool {
    !matches!(backend, DbBackend::Sqlite)
}

/// Retries `op` a bounded number of times while it fails with a
/// retryable [`ServiceError::Conflict`] (lock wait timeout or
/// serialization failure). Every other error surfaces immediately.
pub async fn retry_on_conflict<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(attempt, error = %e, "retrying transaction after conflict");
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::Conflict("lock timeout".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_surface_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::NotFound("no balance".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_passes_through() {
        let result = retry_on_conflict(3, || async { Ok::<_, ServiceError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
