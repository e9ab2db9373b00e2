//! SQLite implementation of MetadataStorage trait

use crate::config::MetadataConfig;
use crate::metadata::{MetadataError, MetadataResult, MetadataStorage, PathRule, Partition};
use log::{debug, info};
use rusqlite::{ffi, params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS partitions (
        name TEXT PRIMARY KEY NOT NULL,
        max_size INTEGER NOT NULL CHECK (max_size > 0),
        path_prefix TEXT NOT NULL,
        exact INTEGER NOT NULL DEFAULT 0,
        validates TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS partitions_usage (
        name TEXT PRIMARY KEY NOT NULL REFERENCES partitions (name) ON DELETE CASCADE,
        size INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS partitions_files (
        name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        PRIMARY KEY (name, file_path)
    );
    CREATE TABLE IF NOT EXISTS keys (
        key TEXT NOT NULL,
        partition TEXT NOT NULL REFERENCES partitions (name) ON DELETE CASCADE,
        PRIMARY KEY (key, partition)
    );
    CREATE INDEX IF NOT EXISTS keys_by_partition ON keys (partition);
";

// Creates the usage row when the first reservation fits, otherwise bumps it
// when the sum still fits. A first reservation that is too large inserts a
// NULL name (NOT NULL violation); a later one updates zero rows.
const RESERVE_USAGE: &str = "
    INSERT INTO partitions_usage (name, size) VALUES
        ((SELECT name FROM partitions WHERE name = ?1 AND max_size >= ?2), ?2)
    ON CONFLICT (name) DO UPDATE SET size = partitions_usage.size + excluded.size
    WHERE (SELECT max_size FROM partitions WHERE name = ?1) >= partitions_usage.size + excluded.size
";

const RELEASE_USAGE: &str =
    "UPDATE partitions_usage SET size = MAX(size - ?1, 0) WHERE name = ?2";

const PARTITIONS_BY_KEY: &str = "
    SELECT partitions.name, partitions.max_size, partitions.path_prefix, partitions.exact, partitions.validates
        FROM keys INNER JOIN partitions ON partitions.name = keys.partition
        WHERE keys.key = ?1
        ORDER BY partitions.name
";

/// SQLite implementation of MetadataStorage
pub struct SQLiteMetadataStore {
    conn: Mutex<Connection>,
}

impl SQLiteMetadataStore {
    /// Open (or create) the database described by the metadata configuration
    pub fn open(config: &MetadataConfig) -> MetadataResult<Self> {
        let path = Path::new(&config.db_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MetadataError::Internal(format!(
                        "failed to create metadata directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        info!("Opening SQLite metadata store at {}", path.display());
        let conn = Connection::open(path)?;
        Self::initialise(conn, config.wal_mode, Duration::from_millis(config.busy_timeout_ms))
    }

    /// Open a private in-memory database (tests and the mock configuration)
    pub fn open_in_memory() -> MetadataResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialise(conn, false, Duration::from_secs(5))
    }

    fn initialise(conn: Connection, wal_mode: bool, busy_timeout: Duration) -> MetadataResult<Self> {
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        if wal_mode {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("SQLite journal mode: {}", mode);
        }
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MetadataResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MetadataError::Internal("metadata connection lock poisoned".to_string()))
    }
}

fn to_sql_size(size: u64) -> MetadataResult<i64> {
    i64::try_from(size).map_err(|_| MetadataError::SizeOutOfRange(size))
}

fn from_sql_size(size: i64) -> u64 {
    u64::try_from(size).unwrap_or(0)
}

fn is_constraint(err: &rusqlite::Error, extended_code: i32) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.extended_code == extended_code)
}

fn partition_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Partition> {
    let path: String = row.get(2)?;
    let exact: bool = row.get(3)?;
    Ok(Partition {
        name: row.get(0)?,
        max_size: from_sql_size(row.get(1)?),
        path_rule: if exact { PathRule::Exact(path) } else { PathRule::Prefix(path) },
        validates: row.get(4)?,
    })
}

impl MetadataStorage for SQLiteMetadataStore {
    fn partitions_for_key(&self, key: &str) -> MetadataResult<Vec<Partition>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(PARTITIONS_BY_KEY)?;
        let rows = stmt.query_map(params![key], partition_from_row)?;
        let partitions = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(partitions)
    }

    fn get_partition(&self, name: &str) -> MetadataResult<Option<Partition>> {
        let conn = self.conn()?;
        let partition = conn
            .query_row(
                "SELECT name, max_size, path_prefix, exact, validates FROM partitions WHERE name = ?1",
                params![name],
                partition_from_row,
            )
            .optional()?;
        Ok(partition)
    }

    fn insert_partition(&self, partition: &Partition) -> MetadataResult<()> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO partitions (name, max_size, path_prefix, exact, validates) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                partition.name,
                to_sql_size(partition.max_size)?,
                partition.path_rule.path(),
                partition.path_rule.is_exact(),
                partition.validates,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
                Err(MetadataError::PartitionExists(partition.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete_partition(&self, name: &str) -> MetadataResult<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
        if deleted == 0 {
            return Err(MetadataError::PartitionNotExists(name.to_string()));
        }
        Ok(())
    }

    fn insert_key(&self, key: &str, partitions: &[String]) -> MetadataResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO keys (key, partition) VALUES (?1, ?2)")?;
            for partition in partitions {
                match stmt.execute(params![key, partition]) {
                    Ok(_) => {}
                    Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                        return Err(MetadataError::PartitionNotExists(partition.clone()));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_key(&self, key: &str) -> MetadataResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM keys WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn reserve_usage(&self, name: &str, size: u64) -> MetadataResult<()> {
        let conn = self.conn()?;
        let quota_exceeded = || MetadataError::QuotaExceeded {
            partition: name.to_string(),
            requested: size,
        };
        match conn.execute(RESERVE_USAGE, params![name, to_sql_size(size)?]) {
            Ok(0) => Err(quota_exceeded()),
            Ok(_) => Ok(()),
            Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_NOTNULL) => Err(quota_exceeded()),
            Err(e) => Err(e.into()),
        }
    }

    fn release_usage(&self, name: &str, size: u64) -> MetadataResult<()> {
        let conn = self.conn()?;
        conn.execute(RELEASE_USAGE, params![to_sql_size(size)?, name])?;
        Ok(())
    }

    fn usage(&self, name: &str) -> MetadataResult<u64> {
        let conn = self.conn()?;
        let size: Option<i64> = conn
            .query_row(
                "SELECT size FROM partitions_usage WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(size.map(from_sql_size).unwrap_or(0))
    }

    fn insert_file(&self, name: &str, file_path: &str) -> MetadataResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO partitions_files (name, file_path) VALUES (?1, ?2) ON CONFLICT (name, file_path) DO NOTHING",
            params![name, file_path],
        )?;
        Ok(())
    }

    fn delete_file(&self, name: &str, file_path: &str) -> MetadataResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM partitions_files WHERE name = ?1 AND file_path = ?2",
            params![name, file_path],
        )?;
        Ok(())
    }

    fn list_files(&self, name: &str) -> MetadataResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT file_path FROM partitions_files WHERE name = ?1 ORDER BY file_path")?;
        let rows = stmt.query_map(params![name], |row| row.get(0))?;
        let files = rows.collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(files)
    }

    fn orphaned_partitions(&self) -> MetadataResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT partitions_files.name FROM partitions_files
                LEFT JOIN partitions ON partitions.name = partitions_files.name
                WHERE partitions.name IS NULL
                ORDER BY partitions_files.name",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let names = rows.collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }
}
