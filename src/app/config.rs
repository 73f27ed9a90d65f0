/// Centralized environment configuration.
/// All env vars and defaults are defined here.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL. Required.
    pub database_url: String,

    /// Address the HTTP server binds to.
    /// Default: 0.0.0.0:3000
    pub bind_addr: String,

    /// Upper bound on pooled connections.
    /// Default: 5
    pub db_max_connections: u32,

    /// Seconds to wait for a pooled connection before failing the request.
    /// Default: 3
    pub db_acquire_timeout_secs: u64,

    /// Lifetime of newly issued sessions, in days.
    /// Default: 30
    pub session_ttl_days: i64,
}

impl Config {
    /// Build config from environment variables.
    /// Returns an error if required vars are missing or malformed.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set in .env")?;

        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MAX_CONNECTIONS must be a positive integer")?;
        if db_max_connections == 0 {
            return Err("DB_MAX_CONNECTIONS must be a positive integer".to_string());
        }

        let db_acquire_timeout_secs = std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u64>()
            .map_err(|_| "DB_ACQUIRE_TIMEOUT_SECS must be a number of seconds")?;

        let session_ttl_days = std::env::var("SESSION_TTL_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<i64>()
            .map_err(|_| "SESSION_TTL_DAYS must be a number of days")?;

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            db_acquire_timeout_secs,
            session_ttl_days,
        })
    }

    /// True for `sqlite::memory:`-style URLs. Such databases live and die with
    /// their single connection.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }

    /// Config for tests. In-memory database behind a single connection.
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            db_max_connections: 1,
            db_acquire_timeout_secs: 5,
            session_ttl_days: 30,
        }
    }
}
