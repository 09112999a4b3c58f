//! libsql version store
//!
//! Claims live in their own table so a deleted version keeps its number. The
//! claim is an `INSERT ... ON CONFLICT DO NOTHING`: zero changed rows means
//! another writer holds the slot.

use std::fmt;

use chrono::{DateTime, Utc};
use libsql::{Connection, Value, params_from_iter};
use tracing::{debug, info};

use crate::connection::{ConnectionConfig, ConnectionPool};
use crate::version::{StoredVersion, VersionEntry, VersionSelector, VersionStore};
use crate::{Error, Result, check_instance_id};

const CREATE_CLAIMS: &str = "CREATE TABLE IF NOT EXISTS sdm_claims (
    instance_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    claimed_at TEXT NOT NULL,
    PRIMARY KEY (instance_id, version)
)";

const CREATE_VERSIONS: &str = "CREATE TABLE IF NOT EXISTS sdm_versions (
    instance_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    version_label TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    document TEXT NOT NULL,
    snapshot BLOB NOT NULL,
    PRIMARY KEY (instance_id, version)
)";

const CLAIM: &str = "INSERT INTO sdm_claims (instance_id, version, claimed_at) VALUES (?1, ?2, ?3) \
     ON CONFLICT DO NOTHING";
const PUBLISH: &str = "INSERT INTO sdm_versions \
     (instance_id, version, version_label, content_hash, created_at, document, snapshot) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";
const MAX_CLAIM: &str = "SELECT MAX(version) FROM sdm_claims WHERE instance_id = ?1";
const LIST: &str = "SELECT version, version_label, content_hash, created_at FROM sdm_versions \
     WHERE instance_id = ?1 ORDER BY version ASC";
const FETCH: &str = "SELECT version, version_label, content_hash, created_at, document, snapshot \
     FROM sdm_versions WHERE instance_id = ?1 AND version = ?2";
const DELETE: &str = "DELETE FROM sdm_versions WHERE instance_id = ?1 AND version = ?2";

/// Store backed by a local or remote libsql database
#[derive(Clone)]
pub struct SqlVersionStore {
    pool: ConnectionPool,
    config: ConnectionConfig,
}

impl fmt::Debug for SqlVersionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlVersionStore")
            .field("database_url", &self.config.database_url)
            .field("max_connections", &self.config.max_connections)
            .finish_non_exhaustive()
    }
}

async fn execute(connection: &Connection, sql: &str, params: Vec<Value>) -> Result<u64> {
    connection
        .execute(sql, params_from_iter(params))
        .await
        .map_err(|source| Error::Sql {
            statement: sql.to_string(),
            source,
        })
}

/// Run a query and decode every row before the cursor moves on
async fn query<T>(
    connection: &Connection,
    sql: &str,
    params: Vec<Value>,
    decode: impl Fn(&libsql::Row) -> Result<T>,
) -> Result<Vec<T>> {
    let mut rows = connection
        .query(sql, params_from_iter(params))
        .await
        .map_err(|source| Error::Sql {
            statement: sql.to_string(),
            source,
        })?;

    let mut output = Vec::new();
    while let Some(row) = rows.next().await.map_err(|source| Error::Sql {
        statement: sql.to_string(),
        source,
    })? {
        output.push(decode(&row)?);
    }
    Ok(output)
}

fn column(row: &libsql::Row, idx: i32) -> Result<Value> {
    row.get_value(idx).map_err(|source| Error::Libsql {
        context: format!("read column {idx}"),
        source,
    })
}

fn unexpected(idx: i32, expected: &str) -> Error {
    Error::Connection {
        details: format!("column {idx}: expected {expected}"),
    }
}

fn integer(row: &libsql::Row, idx: i32) -> Result<i64> {
    match column(row, idx)? {
        Value::Integer(value) => Ok(value),
        _ => Err(unexpected(idx, "integer")),
    }
}

fn version_number(row: &libsql::Row, idx: i32) -> Result<u32> {
    u32::try_from(integer(row, idx)?).map_err(|_| unexpected(idx, "version number"))
}

/// Highest claimed version; an aggregate over no rows reads as NULL
fn highest_claim(row: &libsql::Row) -> Result<u32> {
    match column(row, 0)? {
        Value::Null => Ok(0),
        _ => version_number(row, 0),
    }
}

fn text(row: &libsql::Row, idx: i32) -> Result<String> {
    match column(row, idx)? {
        Value::Text(value) => Ok(value),
        Value::Blob(value) => String::from_utf8(value).map_err(|_| unexpected(idx, "utf-8 text")),
        _ => Err(unexpected(idx, "text")),
    }
}

fn blob(row: &libsql::Row, idx: i32) -> Result<Vec<u8>> {
    match column(row, idx)? {
        Value::Blob(value) => Ok(value),
        Value::Text(value) => Ok(value.into_bytes()),
        _ => Err(unexpected(idx, "blob")),
    }
}

fn timestamp(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text(row, idx)?)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| unexpected(idx, "RFC 3339 timestamp"))
}

fn entry_from_row(row: &libsql::Row) -> Result<VersionEntry> {
    Ok(VersionEntry {
        version: version_number(row, 0)?,
        version_label: text(row, 1)?,
        content_hash: text(row, 2)?,
        created_at: timestamp(row, 3)?,
    })
}

impl SqlVersionStore {
    /// Open the database and create the store tables
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be opened or the schema cannot be applied.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let pool = ConnectionPool::open(&config).await?;
        let store = Self { pool, config };
        {
            let pooled = store.pool.acquire().await?;
            let connection = pooled.connection()?;
            execute(connection, CREATE_CLAIMS, Vec::new()).await?;
            execute(connection, CREATE_VERSIONS, Vec::new()).await?;
        }
        info!(database = %store.config.database_url, "Opened SQL version store");
        Ok(store)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl VersionStore for SqlVersionStore {
    fn backend(&self) -> &'static str {
        "sql"
    }

    async fn next_version(&self, instance_id: &str) -> Result<u32> {
        check_instance_id(instance_id)?;
        let pooled = self.pool.acquire().await?;
        let highest = query(
            pooled.connection()?,
            MAX_CLAIM,
            vec![Value::Text(instance_id.to_string())],
            highest_claim,
        )
        .await?;
        Ok(highest.into_iter().max().unwrap_or(0) + 1)
    }

    async fn put(&self, version: &StoredVersion) -> Result<()> {
        check_instance_id(&version.instance_id)?;
        let pooled = self.pool.acquire().await?;
        let connection = pooled.connection()?;

        let claimed = execute(
            connection,
            CLAIM,
            vec![
                Value::Text(version.instance_id.clone()),
                Value::Integer(i64::from(version.version)),
                Value::Text(Utc::now().to_rfc3339()),
            ],
        )
        .await?;
        if claimed == 0 {
            return Err(Error::conflict(&version.instance_id, version.version));
        }

        execute(
            connection,
            PUBLISH,
            vec![
                Value::Text(version.instance_id.clone()),
                Value::Integer(i64::from(version.version)),
                Value::Text(version.version_label.clone()),
                Value::Text(version.content_hash.clone()),
                Value::Text(version.created_at.to_rfc3339()),
                Value::Text(version.document.clone()),
                Value::Blob(version.snapshot.clone()),
            ],
        )
        .await
        .map_err(|err| Error::persistence(&version.instance_id, version.version, err.to_string()))?;

        debug!(
            instance_id = %version.instance_id,
            version = version.version,
            "Published version in database"
        );
        Ok(())
    }

    async fn get(&self, instance_id: &str, selector: &VersionSelector) -> Result<StoredVersion> {
        let entries = self.list_versions(instance_id).await?;
        let number = selector
            .select(&entries)
            .ok_or_else(|| Error::not_found(instance_id, selector))?;

        let pooled = self.pool.acquire().await?;
        let mut rows = query(
            pooled.connection()?,
            FETCH,
            vec![
                Value::Text(instance_id.to_string()),
                Value::Integer(i64::from(number)),
            ],
            |row| {
                let entry = entry_from_row(row)?;
                Ok(StoredVersion {
                    instance_id: instance_id.to_string(),
                    version: entry.version,
                    version_label: entry.version_label,
                    content_hash: entry.content_hash,
                    created_at: entry.created_at,
                    document: text(row, 4)?,
                    snapshot: blob(row, 5)?,
                })
            },
        )
        .await?;
        // Deleted between listing and fetching
        rows.pop()
            .ok_or_else(|| Error::not_found(instance_id, selector))
    }

    async fn list_versions(&self, instance_id: &str) -> Result<Vec<VersionEntry>> {
        check_instance_id(instance_id)?;
        let pooled = self.pool.acquire().await?;
        query(
            pooled.connection()?,
            LIST,
            vec![Value::Text(instance_id.to_string())],
            entry_from_row,
        )
        .await
    }

    async fn delete(&self, instance_id: &str, version: u32) -> Result<()> {
        let pooled = self.pool.acquire().await?;
        let removed = execute(
            pooled.connection()?,
            DELETE,
            vec![
                Value::Text(instance_id.to_string()),
                Value::Integer(i64::from(version)),
            ],
        )
        .await?;
        if removed == 0 {
            return Err(Error::not_found(
                instance_id,
                &VersionSelector::Number(version),
            ));
        }
        Ok(())
    }
}
