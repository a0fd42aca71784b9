// memreplay (camcorder sidecar cataloguer)
// Copyright (C) 2025 Andrew Nissen

use crate::error::{is_constraint_violation, is_lock_contention, CatalogError};
use crate::modd::ModdRecord;
use crate::time::Time;
use crate::video::{ContentHash, VideoRecord};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PREPARE_MODD_TABLE: &str = "CREATE TABLE IF NOT EXISTS modd (
    checkCode INTEGER UNIQUE,
    name TEXT,
    dateTime INTEGER,
    videoDuration REAL,
    videoFileSize INTEGER,
    moddFileLocation TEXT UNIQUE,
    PRIMARY KEY(checkCode)
)";

const PREPARE_VIDEO_TABLE: &str = "CREATE TABLE IF NOT EXISTS video (
    hash BLOB PRIMARY KEY UNIQUE,
    name TEXT,
    moddCheckCode INTEGER UNIQUE,
    dateTime INTEGER,
    duration REAL,
    fileLocation TEXT,
    fileSize INTEGER,
    FOREIGN KEY(moddCheckCode) REFERENCES modd(checkCode)
)";

const MODD_COLUMNS: &str =
    "checkCode, name, dateTime, videoDuration, videoFileSize, moddFileLocation";
const VIDEO_COLUMNS: &str = "hash, name, moddCheckCode, dateTime, duration, fileLocation, fileSize";

pub fn get_db_path() -> PathBuf {
    let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home_dir.join(".memreplay/library.db")
}

/// A `modd` row as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredModd {
    pub check_code: u32,
    pub name: String,
    pub date_time: Time,
    pub video_duration: f64,
    pub video_file_size: u64,
    pub location: PathBuf,
}

/// Row counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Already in the catalog before the batch started
    pub skipped: usize,
    /// Refused by a constraint, or unkeyed
    pub rejected: usize,
}

impl BatchReport {
    pub fn merge(&mut self, other: BatchReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.rejected += other.rejected;
    }
}

enum Outcome {
    Inserted,
    Updated,
    Unchanged,
}

/// An `UPDATE` restricted to the columns whose values changed.
#[derive(Debug, Default)]
pub struct DiffUpdate {
    table: &'static str,
    key_column: &'static str,
    key: Option<Value>,
    columns: Vec<&'static str>,
    values: Vec<Value>,
}

impl DiffUpdate {
    fn new(table: &'static str, key_column: &'static str, key: Value) -> Self {
        DiffUpdate {
            table,
            key_column,
            key: Some(key),
            ..Default::default()
        }
    }

    fn set_if_changed<T: PartialEq + Into<Value>>(&mut self, column: &'static str, stored: T, current: T) {
        if stored != current {
            self.columns.push(column);
            self.values.push(current.into());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn sql(&self) -> String {
        let assignments: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            self.table,
            assignments.join(", "),
            self.key_column,
            self.columns.len() + 1
        )
    }

    fn execute(self, conn: &Connection) -> rusqlite::Result<usize> {
        let sql = self.sql();
        let mut values = self.values;
        values.extend(self.key);
        conn.execute(&sql, params_from_iter(values))
    }
}

/// A record kind the catalog can store.
pub trait CatalogEntry {
    /// Short description used in logs and error messages.
    fn describe(&self) -> String;

    /// False when the record has no usable primary key.
    fn is_keyed(&self) -> bool {
        true
    }

    fn exists(&self, conn: &Connection) -> rusqlite::Result<bool>;

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize>;

    /// Compare against the persisted row. `None` means there is no row.
    fn diff(&self, conn: &Connection) -> rusqlite::Result<Option<DiffUpdate>>;
}

impl CatalogEntry for ModdRecord {
    fn describe(&self) -> String {
        format!("modd {:X} ({})", self.check_code, self.location.display())
    }

    fn exists(&self, conn: &Connection) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT 1 FROM modd WHERE checkCode = ?1",
            [self.check_code],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO modd ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            MODD_COLUMNS
        ))?;
        stmt.execute(params![
            self.check_code,
            self.name,
            self.date_time_actual,
            self.duration,
            self.file_size as i64,
            self.location.to_string_lossy(),
        ])
    }

    fn diff(&self, conn: &Connection) -> rusqlite::Result<Option<DiffUpdate>> {
        let Some(stored) = select_modd(conn, self.check_code)? else {
            return Ok(None);
        };

        let mut update = DiffUpdate::new("modd", "checkCode", Value::Integer(self.check_code.into()));
        update.set_if_changed("name", stored.name, self.name.clone());
        update.set_if_changed("dateTime", stored.date_time.unix_secs(), self.date_time_actual);
        update.set_if_changed("videoDuration", stored.video_duration, self.duration);
        update.set_if_changed(
            "videoFileSize",
            stored.video_file_size as i64,
            self.file_size as i64,
        );
        update.set_if_changed(
            "moddFileLocation",
            stored.location.to_string_lossy().to_string(),
            self.location.to_string_lossy().to_string(),
        );
        Ok(Some(update))
    }
}

impl CatalogEntry for VideoRecord {
    fn describe(&self) -> String {
        format!("video {}", self)
    }

    fn is_keyed(&self) -> bool {
        !self.hash.is_empty()
    }

    fn exists(&self, conn: &Connection) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT 1 FROM video WHERE hash = ?1",
            [self.hash.as_bytes()],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO video ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            VIDEO_COLUMNS
        ))?;
        stmt.execute(params![
            self.hash.as_bytes(),
            self.name,
            self.modd_check_code,
            self.creation_time.unix_secs(),
            self.duration,
            self.location.to_string_lossy(),
            self.file_size as i64,
        ])
    }

    fn diff(&self, conn: &Connection) -> rusqlite::Result<Option<DiffUpdate>> {
        let Some(stored) = select_video(conn, &self.hash)? else {
            return Ok(None);
        };

        let mut update = DiffUpdate::new("video", "hash", Value::Blob(self.hash.as_bytes().to_vec()));
        update.set_if_changed("name", stored.name, self.name.clone());
        update.set_if_changed(
            "dateTime",
            stored.creation_time.unix_secs(),
            self.creation_time.unix_secs(),
        );
        update.set_if_changed("duration", stored.duration, self.duration);
        update.set_if_changed(
            "fileLocation",
            stored.location.to_string_lossy().to_string(),
            self.location.to_string_lossy().to_string(),
        );
        Ok(Some(update))
    }
}

fn modd_from_row(row: &Row) -> rusqlite::Result<StoredModd> {
    Ok(StoredModd {
        check_code: row.get(0)?,
        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        date_time: Time::from_unix_secs(row.get::<_, Option<i64>>(2)?.unwrap_or_default()),
        video_duration: row.get::<_, Option<f64>>(3)?.unwrap_or_default(),
        video_file_size: row.get::<_, Option<i64>>(4)?.unwrap_or_default() as u64,
        location: PathBuf::from(row.get::<_, Option<String>>(5)?.unwrap_or_default()),
    })
}

fn video_from_row(row: &Row) -> rusqlite::Result<VideoRecord> {
    let hash: Vec<u8> = row.get(0)?;
    let name: Option<String> = row.get(1)?;
    let location = PathBuf::from(row.get::<_, Option<String>>(5)?.unwrap_or_default());
    let mut video = VideoRecord::from_parts(
        &location,
        Time::from_unix_secs(row.get::<_, Option<i64>>(3)?.unwrap_or_default()),
        row.get::<_, Option<f64>>(4)?.unwrap_or_default(),
        ContentHash::from_bytes(hash),
        row.get::<_, Option<i64>>(6)?.unwrap_or_default() as u64,
        row.get(2)?,
    );
    if let Some(name) = name {
        video.name = name;
    }
    Ok(video)
}

fn select_modd(conn: &Connection, check_code: u32) -> rusqlite::Result<Option<StoredModd>> {
    conn.query_row(
        &format!("SELECT {} FROM modd WHERE checkCode = ?1", MODD_COLUMNS),
        [check_code],
        modd_from_row,
    )
    .optional()
}

fn select_video(conn: &Connection, hash: &ContentHash) -> rusqlite::Result<Option<VideoRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM video WHERE hash = ?1", VIDEO_COLUMNS),
        [hash.as_bytes()],
        video_from_row,
    )
    .optional()
}

/// The persistent `modd`/`video` catalog, accessed through one connection.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open or create the catalog at `path`, creating tables if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CatalogError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CatalogError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let tx = conn.unchecked_transaction()?;
        tx.execute(PREPARE_MODD_TABLE, [])?;
        tx.execute(PREPARE_VIDEO_TABLE, [])?;
        tx.commit()?;
        Ok(Catalog { conn })
    }

    pub fn contains<E: CatalogEntry>(&self, entry: &E) -> Result<bool, CatalogError> {
        if !entry.is_keyed() {
            return Ok(false);
        }
        Ok(entry.exists(&self.conn)?)
    }

    pub fn get_video(&self, hash: &ContentHash) -> Result<Option<VideoRecord>, CatalogError> {
        Ok(select_video(&self.conn, hash)?)
    }

    pub fn get_modd(&self, check_code: u32) -> Result<Option<StoredModd>, CatalogError> {
        Ok(select_modd(&self.conn, check_code)?)
    }

    /// Insert the records that are not yet catalogued, all in one
    /// transaction. Rows refused by a constraint (such as a duplicate key
    /// arriving twice in the same batch) are logged and skipped; lock
    /// contention rolls the whole batch back.
    pub fn add_entries<E: CatalogEntry>(&self, batch: &[E]) -> Result<BatchReport, CatalogError> {
        let mut report = BatchReport::default();
        let mut pending = Vec::with_capacity(batch.len());
        for entry in batch {
            if !entry.is_keyed() {
                warn!(entry = %entry.describe(), "skipping record without a key");
                report.rejected += 1;
            } else if entry
                .exists(&self.conn)
                .map_err(|source| batch_error(&entry.describe(), source))?
            {
                report.skipped += 1;
            } else {
                pending.push(entry);
            }
        }

        self.run_batch(pending, &mut report, |conn, entry| {
            entry.insert(conn).map(|_| Outcome::Inserted)
        })?;
        Ok(report)
    }

    /// Insert absent records and diff-update present ones, all in one
    /// transaction. Unchanged records issue no `UPDATE`.
    pub fn update_entries<E: CatalogEntry>(&self, batch: &[E]) -> Result<BatchReport, CatalogError> {
        let mut report = BatchReport::default();
        let mut pending = Vec::with_capacity(batch.len());
        for entry in batch {
            if entry.is_keyed() {
                pending.push(entry);
            } else {
                warn!(entry = %entry.describe(), "skipping record without a key");
                report.rejected += 1;
            }
        }

        self.run_batch(pending, &mut report, |conn, entry| match entry.diff(conn)? {
            None => entry.insert(conn).map(|_| Outcome::Inserted),
            Some(update) if update.is_empty() => Ok(Outcome::Unchanged),
            Some(update) => {
                debug!(entry = %entry.describe(), sql = %update.sql(), "updating changed columns");
                update.execute(conn).map(|_| Outcome::Updated)
            }
        })?;

        info!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            "updated/added catalog entries"
        );
        Ok(report)
    }

    fn run_batch<E, F>(&self, batch: Vec<&E>, report: &mut BatchReport, mut step: F) -> Result<(), CatalogError>
    where
        E: CatalogEntry,
        F: FnMut(&Connection, &E) -> rusqlite::Result<Outcome>,
    {
        if batch.is_empty() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction().map_err(|source| batch_error("BEGIN", source))?;
        for entry in batch {
            match step(&tx, entry) {
                Ok(Outcome::Inserted) => report.inserted += 1,
                Ok(Outcome::Updated) => report.updated += 1,
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Err(e) if is_lock_contention(&e) => {
                    let entry = entry.describe();
                    if let Err(rollback) = tx.rollback() {
                        warn!(error = %rollback, "rollback after lock contention failed");
                    }
                    return Err(CatalogError::Busy { entry, source: e });
                }
                Err(e) if is_constraint_violation(&e) => {
                    warn!(entry = %entry.describe(), error = %e, "catalog rejected record");
                    report.rejected += 1;
                }
                Err(e) => return Err(batch_error(&entry.describe(), e)),
            }
        }

        tx.commit().map_err(|source| batch_error("COMMIT", source))
    }

    /// Stream every `video` row through `f`. The iterator is lazy and can be
    /// consumed once.
    pub fn scan_videos<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&mut dyn Iterator<Item = rusqlite::Result<VideoRecord>>) -> T,
    {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM video ORDER BY dateTime, name",
            VIDEO_COLUMNS
        ))?;
        let mut rows = stmt.query_map([], video_from_row)?;
        Ok(f(&mut rows))
    }

    /// Stream every `modd` row through `f`.
    pub fn scan_modds<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&mut dyn Iterator<Item = rusqlite::Result<StoredModd>>) -> T,
    {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM modd ORDER BY dateTime, name",
            MODD_COLUMNS
        ))?;
        let mut rows = stmt.query_map([], modd_from_row)?;
        Ok(f(&mut rows))
    }

    pub fn list_videos(&self) -> Result<Vec<VideoRecord>, CatalogError> {
        let videos = self.scan_videos(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())??;
        Ok(videos)
    }

    pub fn list_modds(&self) -> Result<Vec<StoredModd>, CatalogError> {
        let modds = self.scan_modds(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())??;
        Ok(modds)
    }
}

fn batch_error(entry: &str, source: rusqlite::Error) -> CatalogError {
    if is_lock_contention(&source) {
        CatalogError::Busy {
            entry: entry.to_string(),
            source,
        }
    } else {
        CatalogError::Statement {
            entry: entry.to_string(),
            source,
        }
    }
}
