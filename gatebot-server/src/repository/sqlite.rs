//! SQLite implementation of `DocumentRepository`.
//!
//! This provides persistent storage that survives service restarts and is
//! shared with the operator CLI.
//!
//! # Schema Versioning
//!
//! A `schema_version` table records the version of the `documents` table.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a step to `run_migrations()`. Steps run in order from the stored version.
//!
//! # Revisions
//!
//! Every row carries a `revision` that increases by one per write.
//! Compare-and-swap is a single conditional statement, so two processes
//! writing the same document cannot both succeed from the same revision.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::{DocumentRepository, RepositoryError, Revision, StoredDocument};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed document repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and bring the schema up to date.
    ///
    /// The database is configured with `journal_mode = WAL`,
    /// `synchronous = FULL` and a 5 second `busy_timeout`, so the server and
    /// the CLI can open it at the same time.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // User records are personal data; keep the file private (Unix only).
        #[cfg(unix)]
        if !is_in_memory && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        // In-memory databases report "memory" instead of "wal".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "SQLite returned '{}' instead of 'wal'; the filesystem probably \
                     does not support shared memory",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure database", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS documents (
                    key TEXT PRIMARY KEY,
                    revision INTEGER NOT NULL CHECK (revision > 0),
                    body TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Stored schema version (for diagnostics and tests).
    pub async fn schema_version(&self) -> Result<i64, RepositoryError> {
        self.with_conn("schema_version", |conn| {
            conn.query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .map_err(|e| RepositoryError::storage("schema_version", e.to_string()))
        })
        .await
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn, operation)?;
            f(&guard)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

fn lock<'a>(
    conn: &'a Mutex<Connection>,
    operation: &str,
) -> Result<MutexGuard<'a, Connection>, RepositoryError> {
    conn.lock()
        .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))
}

fn current_revision(conn: &Connection, key: &str) -> Result<Revision, RepositoryError> {
    let revision: Option<i64> = conn
        .query_row(
            "SELECT revision FROM documents WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| RepositoryError::storage("read revision", e.to_string()))?;
    revision_from_column(revision.unwrap_or(0))
}

fn revision_from_column(value: i64) -> Result<Revision, RepositoryError> {
    u64::try_from(value)
        .map(Revision)
        .map_err(|_| RepositoryError::corruption(format!("revision {}", value)))
}

fn revision_to_column(revision: Revision) -> Result<i64, RepositoryError> {
    i64::try_from(revision.0)
        .map_err(|_| RepositoryError::storage("write revision", "revision out of range"))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl DocumentRepository for SqliteRepository {
    async fn get(&self, key: &str) -> Result<Option<StoredDocument>, RepositoryError> {
        let key = key.to_string();
        self.with_conn("get", move |conn| {
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT revision, body FROM documents WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get", e.to_string()))?;

            match row {
                Some((revision, body)) => Ok(Some(StoredDocument {
                    revision: revision_from_column(revision)?,
                    body,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put(&self, key: &str, body: String) -> Result<Revision, RepositoryError> {
        let key = key.to_string();
        self.with_conn("put", move |conn| {
            let revision: i64 = conn
                .query_row(
                    "INSERT INTO documents (key, revision, body, updated_at)
                     VALUES (?1, 1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                         revision = documents.revision + 1,
                         body = excluded.body,
                         updated_at = excluded.updated_at
                     RETURNING revision",
                    params![key, body, now()],
                    |row| row.get(0),
                )
                .map_err(|e| RepositoryError::storage("put", e.to_string()))?;
            revision_from_column(revision)
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Revision,
        body: String,
    ) -> Result<Revision, RepositoryError> {
        let key = key.to_string();
        self.with_conn("compare_and_swap", move |conn| {
            let changed = if expected == Revision::ABSENT {
                conn.execute(
                    "INSERT INTO documents (key, revision, body, updated_at)
                     VALUES (?1, 1, ?2, ?3)
                     ON CONFLICT(key) DO NOTHING",
                    params![key, body, now()],
                )
            } else {
                conn.execute(
                    "UPDATE documents
                     SET revision = revision + 1, body = ?2, updated_at = ?3
                     WHERE key = ?1 AND revision = ?4",
                    params![key, body, now(), revision_to_column(expected)?],
                )
            }
            .map_err(|e| RepositoryError::storage("compare_and_swap", e.to_string()))?;

            if changed == 1 {
                return Ok(expected.next());
            }

            Err(RepositoryError::Conflict {
                actual: current_revision(conn, &key)?,
                key,
                expected,
            })
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<String>, RepositoryError> {
        self.with_conn("keys", |conn| {
            let mut stmt = conn
                .prepare("SELECT key FROM documents ORDER BY key")
                .map_err(|e| RepositoryError::storage("keys", e.to_string()))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| RepositoryError::storage("keys", e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| RepositoryError::storage("keys", e.to_string()))
        })
        .await
    }
}
