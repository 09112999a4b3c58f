//! libsql database handles for the SQL store

use std::sync::{Arc, Mutex};
use std::time::Duration;

use libsql::{Builder, Connection, Database};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::{Error, Result};

const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_LOCAL_CONNECTIONS: usize = 4;

/// Where the SQL store lives and how many connections it may hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// File path, `:memory:`, or a `libsql://` / `http(s)://` URL
    pub database_url: String,
    /// Required for remote databases
    pub auth_token: Option<String>,
    pub max_connections: usize,
    /// Open timeout, also used as the local busy timeout
    pub timeout_ms: u64,
}

impl ConnectionConfig {
    /// Private in-memory database; a single connection so every query sees it
    pub fn in_memory() -> Self {
        Self {
            database_url: ":memory:".to_string(),
            auth_token: None,
            max_connections: 1,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self {
            database_url: path.into(),
            auth_token: None,
            max_connections: DEFAULT_LOCAL_CONNECTIONS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn remote(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: Some(auth_token.into()),
            ..Self::local(url)
        }
    }

    /// Pick the flavour from the URL; remote tokens come from `LIBSQL_AUTH_TOKEN`
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        match DatabaseLocation::of(&url) {
            DatabaseLocation::Memory => Self::in_memory(),
            DatabaseLocation::Remote => Self {
                auth_token: std::env::var("LIBSQL_AUTH_TOKEN").ok(),
                ..Self::local(url)
            },
            DatabaseLocation::File => Self::local(url),
        }
    }

    fn location(&self) -> DatabaseLocation {
        DatabaseLocation::of(&self.database_url)
    }

    /// Connections actually opened; an in-memory database is per connection
    fn pool_size(&self) -> usize {
        match self.location() {
            DatabaseLocation::Memory => 1,
            _ => self.max_connections,
        }
    }

    fn check(&self) -> Result<()> {
        let problem = if self.database_url.trim().is_empty() {
            Some("database_url must be provided")
        } else if self.max_connections == 0 {
            Some("max_connections must be greater than zero")
        } else if self.timeout_ms == 0 {
            Some("timeout_ms must be greater than zero")
        } else if self.location() == DatabaseLocation::Remote && self.auth_token.is_none() {
            Some("auth_token is required for remote databases")
        } else {
            None
        };
        match problem {
            Some(details) => Err(Error::Config {
                details: details.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatabaseLocation {
    Memory,
    File,
    Remote,
}

impl DatabaseLocation {
    fn of(url: &str) -> Self {
        let url = url.trim();
        if ["libsql://", "https://", "http://"]
            .iter()
            .any(|scheme| url.starts_with(scheme))
        {
            Self::Remote
        } else if url == ":memory:" || url.starts_with("file::memory:") || url.contains("mode=memory") {
            Self::Memory
        } else {
            Self::File
        }
    }
}

fn libsql_error(context: &str) -> impl FnOnce(libsql::Error) -> Error + '_ {
    move |source| Error::Libsql {
        context: context.to_string(),
        source,
    }
}

async fn open_database(config: &ConnectionConfig) -> Result<Database> {
    let url = config.database_url.trim();
    match config.location() {
        DatabaseLocation::Remote => {
            let token = config.auth_token.clone().unwrap_or_default();
            Builder::new_remote(url.to_string(), token)
                .build()
                .await
                .map_err(libsql_error("open remote database"))
        }
        DatabaseLocation::Memory | DatabaseLocation::File => {
            Builder::new_local(url.strip_prefix("file:").unwrap_or(url))
                .build()
                .await
                .map_err(libsql_error("open local database"))
        }
    }
}

/// Fixed set of connections handed out one task at a time
#[derive(Clone)]
pub(crate) struct ConnectionPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    // Connections are only valid while their database is alive
    _database: Database,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
}

impl ConnectionPool {
    pub(crate) async fn open(config: &ConnectionConfig) -> Result<Self> {
        config.check()?;
        let timeout = Duration::from_millis(config.timeout_ms);
        let database = tokio::time::timeout(timeout, open_database(config))
            .await
            .map_err(|_| Error::Connection {
                details: format!("opening {} timed out after {}ms", config.database_url, config.timeout_ms),
            })??;

        let size = config.pool_size();
        let mut idle = Vec::with_capacity(size);
        for _ in 0..size {
            let connection = database.connect().map_err(libsql_error("connect database"))?;
            if config.location() != DatabaseLocation::Remote {
                connection
                    .busy_timeout(timeout)
                    .map_err(libsql_error("set busy timeout"))?;
            }
            idle.push(connection);
        }
        debug!(database = %config.database_url, connections = size, "Opened connection pool");

        Ok(Self {
            shared: Arc::new(PoolShared {
                _database: database,
                idle: Mutex::new(idle),
                permits: Arc::new(Semaphore::new(size)),
            }),
        })
    }

    /// Wait for a free connection
    pub(crate) async fn acquire(&self) -> Result<PooledConnection> {
        let permit = Arc::clone(&self.shared.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Connection {
                details: "connection pool is closed".to_string(),
            })?;
        let connection = self
            .shared
            .idle
            .lock()
            .map_err(|_| Error::Connection {
                details: "connection pool lock is poisoned".to_string(),
            })?
            .pop()
            .ok_or_else(|| Error::Connection {
                details: "no idle connection despite a free permit".to_string(),
            })?;
        Ok(PooledConnection {
            shared: Arc::clone(&self.shared),
            connection: Some(connection),
            _permit: permit,
        })
    }
}

/// A borrowed connection, returned to the pool on drop
pub(crate) struct PooledConnection {
    shared: Arc<PoolShared>,
    connection: Option<Connection>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub(crate) fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or_else(|| Error::Connection {
            details: "pooled connection already returned".to_string(),
        })
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let (Some(connection), Ok(mut idle)) = (self.connection.take(), self.shared.idle.lock()) {
            idle.push(connection);
        }
    }
}
