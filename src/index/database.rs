//! SQLite-backed file index.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE files (
//!     id        TEXT PRIMARY KEY,
//!     fullname  TEXT NOT NULL,
//!     directory TEXT NOT NULL,
//!     hash      TEXT NOT NULL,
//!     original  TEXT,
//!     uptodate  BOOLEAN NOT NULL DEFAULT 0
//! );
//! CREATE INDEX idx_files_hash ON files(hash);
//! ```
//!
//! Inserts use `INSERT OR IGNORE`: a second record with the same id is
//! dropped, the first one stays untouched.
//!
//! # Example
//!
//! ```no_run
//! use dupestash::index::{FileIndex, FileRecord, IndexError};
//! use std::path::Path;
//!
//! let mut index = FileIndex::open(Path::new("photos.db")).unwrap();
//! let hash = [0u8; 32];
//! let record = FileRecord::new(Path::new("/photos/a.jpg"), &hash).unwrap();
//!
//! index
//!     .write_scan(|writer| -> Result<(), IndexError> {
//!         writer.insert(&record)?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert!(index.is_populated().unwrap());
//! ```

use std::io;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use thiserror::Error;

use super::record::FileRecord;
use crate::duplicates::groups::{group_records, DuplicateGroup};

/// Current schema version, stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS files (
        id        TEXT PRIMARY KEY,
        fullname  TEXT NOT NULL,
        directory TEXT NOT NULL,
        hash      TEXT NOT NULL,
        original  TEXT,
        uptodate  BOOLEAN NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_files_hash ON files(hash);
";

const INSERT_SQL: &str = "INSERT OR IGNORE INTO files (id, fullname, directory, hash, original, uptodate) \
                          VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const SELECT_COLUMNS: &str = "SELECT id, fullname, directory, hash, original, uptodate FROM files";

/// Errors raised by the file index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The database file could not be opened or configured.
    #[error("failed to open index at {path}: {source}")]
    Open {
        /// Location of the index file
        path: PathBuf,
        /// Underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// Schema creation or migration failed.
    #[error("index schema error: {0}")]
    Schema(#[source] rusqlite::Error),

    /// The scan transaction failed; nothing from the scan was kept.
    #[error("index transaction failed: {0}")]
    Transaction(#[source] rusqlite::Error),

    /// A read query failed.
    #[error("index query failed: {0}")]
    Query(#[source] rusqlite::Error),

    /// The database was written by an incompatible version.
    #[error("index schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found in the file
        found: i64,
        /// Highest version this build understands
        supported: i64,
    },

    /// Removing the persisted store failed.
    #[error("failed to remove index file {path}: {source}")]
    Remove {
        /// File that could not be removed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;

/// Persistent index of scanned files.
///
/// Owns its SQLite connection; dropping the index closes it.
pub struct FileIndex {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for FileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIndex").field("path", &self.path).finish()
    }
}

impl FileIndex {
    /// Open or create the index at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Open`] if the file cannot be opened or is not
    /// a SQLite database, [`IndexError::Schema`] if the schema cannot be
    /// created.
    pub fn open(path: &Path) -> IndexResult<Self> {
        let open_err = |source| IndexError::Open {
            path: path.to_path_buf(),
            source,
        };

        let conn = Connection::open(path).map_err(open_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(open_err)?;

        let index = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        index.migrate_schema()?;
        log::debug!("Opened file index at {}", path.display());
        Ok(index)
    }

    /// Open a throwaway in-memory index.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> IndexResult<Self> {
        let conn = Connection::open_in_memory().map_err(|source| IndexError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        let index = Self { conn, path: None };
        index.migrate_schema()?;
        Ok(index)
    }

    fn migrate_schema(&self) -> IndexResult<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|source| IndexError::Open {
                path: self.path.clone().unwrap_or_else(|| PathBuf::from(":memory:")),
                source,
            })?;

        if version > SCHEMA_VERSION {
            return Err(IndexError::UnsupportedVersion {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }

        self.conn
            .execute_batch(SCHEMA)
            .map_err(IndexError::Schema)?;
        if version < SCHEMA_VERSION {
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)
                .map_err(IndexError::Schema)?;
            log::debug!("Index schema initialized (version {})", SCHEMA_VERSION);
        }
        Ok(())
    }

    /// Location of the index file, `None` for in-memory indexes.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether at least one record exists.
    ///
    /// A populated index means a previous scan committed, so scanning can
    /// be skipped.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] if the lookup fails.
    pub fn is_populated(&self) -> IndexResult<bool> {
        self.conn
            .query_row("SELECT EXISTS (SELECT 1 FROM files)", [], |row| row.get(0))
            .map_err(IndexError::Query)
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] if the count fails.
    pub fn record_count(&self) -> IndexResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .map_err(IndexError::Query)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Insert a single record outside any scan transaction.
    ///
    /// Returns `true` if the record was stored, `false` if a record with the
    /// same id already existed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Transaction`] if the write fails.
    pub fn insert(&self, record: &FileRecord) -> IndexResult<bool> {
        insert_with(&self.conn, record)
    }

    /// Look up a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] if the lookup fails.
    pub fn get(&self, id: &str) -> IndexResult<Option<FileRecord>> {
        self.conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                row_to_record,
            )
            .optional()
            .map_err(IndexError::Query)
    }

    /// All records sharing a hash with at least one other record, ordered
    /// by hash and then by [`FileRecord::sort_key`].
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] if the query fails.
    pub fn duplicate_records(&self) -> IndexResult<Vec<FileRecord>> {
        let sql = format!(
            "{} WHERE hash IN (SELECT hash FROM files GROUP BY hash HAVING COUNT(*) > 1) \
             ORDER BY hash, directory || '/' || fullname, id",
            SELECT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).map_err(IndexError::Query)?;
        let records = stmt
            .query_map([], row_to_record)
            .map_err(IndexError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(IndexError::Query)?;
        Ok(records)
    }

    /// Duplicate groups: one per hash with two or more records.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] if the query fails.
    pub fn duplicate_groups(&self) -> IndexResult<Vec<DuplicateGroup>> {
        Ok(group_records(self.duplicate_records()?))
    }

    /// Run `f` inside one write transaction.
    ///
    /// If `f` returns `Ok`, the transaction commits. If `f` returns `Err`
    /// (or panics), everything it inserted is rolled back and the index is
    /// exactly as it was before the call.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `f`, or [`IndexError::Transaction`] if
    /// the transaction cannot be started or committed.
    pub fn write_scan<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut ScanWriter<'_>) -> Result<T, E>,
        E: From<IndexError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(IndexError::Transaction)?;
        let mut writer = ScanWriter {
            tx,
            inserted: 0,
            ignored: 0,
        };

        match f(&mut writer) {
            Ok(value) => {
                let (inserted, ignored) = (writer.inserted, writer.ignored);
                writer.tx.commit().map_err(IndexError::Transaction)?;
                log::debug!(
                    "Scan transaction committed ({} inserted, {} ignored)",
                    inserted,
                    ignored
                );
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = writer.tx.rollback() {
                    log::error!("Rollback of scan transaction failed: {}", rollback);
                } else {
                    log::warn!(
                        "Scan transaction rolled back, {} pending records discarded",
                        writer.inserted
                    );
                }
                Err(e)
            }
        }
    }

    /// Close the connection, surfacing any error SQLite reports.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] if SQLite refuses to close.
    pub fn close(self) -> IndexResult<()> {
        self.conn
            .close()
            .map_err(|(_, e)| IndexError::Query(e))
    }

    /// Delete a persisted index and its WAL side files.
    ///
    /// Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Remove`] if an existing file cannot be deleted.
    pub fn remove_store(path: &Path) -> IndexResult<()> {
        let mut targets = vec![path.to_path_buf()];
        for suffix in ["-wal", "-shm"] {
            let mut name = path.as_os_str().to_owned();
            name.push(suffix);
            targets.push(PathBuf::from(name));
        }

        for target in targets {
            match std::fs::remove_file(&target) {
                Ok(()) => log::debug!("Removed {}", target.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(IndexError::Remove {
                        path: target,
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Write handle for one scan; only exists inside [`FileIndex::write_scan`].
pub struct ScanWriter<'conn> {
    tx: Transaction<'conn>,
    inserted: usize,
    ignored: usize,
}

impl ScanWriter<'_> {
    /// Insert a record into the pending scan.
    ///
    /// Returns `true` if stored, `false` if the id already existed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Transaction`] if the write fails; the caller
    /// should propagate it so the whole scan rolls back.
    pub fn insert(&mut self, record: &FileRecord) -> IndexResult<bool> {
        let stored = insert_with(&self.tx, record)?;
        if stored {
            self.inserted += 1;
        } else {
            log::debug!("Record already indexed, ignoring: {}", record.sort_key());
            self.ignored += 1;
        }
        Ok(stored)
    }

    /// Records stored so far in this transaction.
    #[must_use]
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Inserts skipped because the id already existed.
    #[must_use]
    pub fn ignored(&self) -> usize {
        self.ignored
    }
}

fn insert_with(conn: &Connection, record: &FileRecord) -> IndexResult<bool> {
    let mut stmt = conn
        .prepare_cached(INSERT_SQL)
        .map_err(IndexError::Transaction)?;
    let changed = stmt
        .execute(params![
            record.id,
            record.fullname,
            record.directory,
            record.hash,
            record.original,
            record.uptodate,
        ])
        .map_err(IndexError::Transaction)?;
    Ok(changed == 1)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        fullname: row.get(1)?,
        directory: row.get(2)?,
        hash: row.get(3)?,
        original: row.get(4)?,
        uptodate: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(path: &str, content: &[u8]) -> FileRecord {
        FileRecord::new(Path::new(path), blake3::hash(content).as_bytes()).unwrap()
    }

    #[test]
    fn test_new_index_is_empty() {
        let index = FileIndex::open_in_memory().unwrap();

        assert!(!index.is_populated().unwrap());
        assert_eq!(index.record_count().unwrap(), 0);
        assert!(index.duplicate_groups().unwrap().is_empty());
        assert!(index.path().is_none());
    }

    #[test]
    fn test_insert_is_idempotent_on_id() {
        let index = FileIndex::open_in_memory().unwrap();
        let first = record("/r/a.txt", b"one");
        let mut second = record("/r/a.txt", b"two");
        second.fullname = "a.txt".to_string();

        assert!(index.insert(&first).unwrap());
        assert!(!index.insert(&second).unwrap());

        assert_eq!(index.record_count().unwrap(), 1);
        let stored = index.get(&first.id).unwrap().unwrap();
        assert_eq!(stored.hash, first.hash, "second insert must not overwrite");
    }

    #[test]
    fn test_duplicate_records_excludes_singletons() {
        let index = FileIndex::open_in_memory().unwrap();
        index.insert(&record("/r/a/2.txt", b"X")).unwrap();
        index.insert(&record("/r/a/1.txt", b"X")).unwrap();
        index.insert(&record("/r/b/3.txt", b"Y")).unwrap();

        let records = index.duplicate_records().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sort_key(), "/r/a/1.txt");
        assert_eq!(records[1].sort_key(), "/r/a/2.txt");
    }

    #[test]
    fn test_duplicate_groups_ordered_by_hash() {
        let index = FileIndex::open_in_memory().unwrap();
        for (path, content) in [
            ("/r/z1", b"A" as &[u8]),
            ("/r/z2", b"A"),
            ("/r/y1", b"B"),
            ("/r/y2", b"B"),
            ("/r/y3", b"B"),
        ] {
            index.insert(&record(path, content)).unwrap();
        }

        let groups = index.duplicate_groups().unwrap();

        assert_eq!(groups.len(), 2);
        assert!(groups[0].hash < groups[1].hash);
        let sizes: Vec<_> = groups.iter().map(DuplicateGroup::len).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 5);
    }

    #[test]
    fn test_write_scan_commits() {
        let mut index = FileIndex::open_in_memory().unwrap();

        let inserted = index
            .write_scan(|writer| -> IndexResult<usize> {
                writer.insert(&record("/r/a", b"1"))?;
                writer.insert(&record("/r/b", b"2"))?;
                writer.insert(&record("/r/a", b"1"))?;
                assert_eq!(writer.ignored(), 1);
                Ok(writer.inserted())
            })
            .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(index.record_count().unwrap(), 2);
    }

    #[test]
    fn test_write_scan_rolls_back_on_error() {
        let mut index = FileIndex::open_in_memory().unwrap();
        index.insert(&record("/r/existing", b"e")).unwrap();

        let result = index.write_scan(|writer| -> IndexResult<()> {
            writer.insert(&record("/r/a", b"1"))?;
            writer.insert(&record("/r/b", b"2"))?;
            Err(IndexError::Transaction(rusqlite::Error::InvalidQuery))
        });

        assert!(matches!(result, Err(IndexError::Transaction(_))));
        assert_eq!(index.record_count().unwrap(), 1);
        assert!(index.get(&record_id_of("/r/a")).unwrap().is_none());
    }

    fn record_id_of(path: &str) -> String {
        crate::index::record_id(Path::new(path))
    }

    #[test]
    fn test_persisted_index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("photos.db");

        {
            let mut index = FileIndex::open(&db).unwrap();
            index
                .write_scan(|writer| -> IndexResult<()> {
                    writer.insert(&record("/r/a", b"1"))?;
                    Ok(())
                })
                .unwrap();
            index.close().unwrap();
        }

        let index = FileIndex::open(&db).unwrap();
        assert!(index.is_populated().unwrap());
        assert_eq!(index.path(), Some(db.as_path()));
    }

    #[test]
    fn test_remove_store() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("photos.db");
        FileIndex::open(&db).unwrap().close().unwrap();
        assert!(db.exists());

        FileIndex::remove_store(&db).unwrap();
        assert!(!db.exists());

        // Already gone
        FileIndex::remove_store(&db).unwrap();
    }

    #[test]
    fn test_open_rejects_garbage_file() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("garbage.db");
        std::fs::write(&db, vec![0xAB; 4096]).unwrap();

        assert!(FileIndex::open(&db).is_err());
    }

    #[test]
    fn test_open_rejects_newer_schema() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("future.db");
        {
            let conn = Connection::open(&db).unwrap();
            conn.pragma_update(None, "user_version", 99).unwrap();
        }

        let err = FileIndex::open(&db).unwrap_err();
        assert!(matches!(
            err,
            IndexError::UnsupportedVersion { found: 99, .. }
        ));
    }
}
