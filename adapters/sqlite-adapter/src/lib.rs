//! sqlite-adapter — SQLite implementation of the LinkRepository port.
//!
//! Purpose
//! - Provide the durable, file-based record store for the service.
//! - Implements the `LinkRepository` trait from the `domain` crate.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - One connection behind a mutex; code uniqueness comes from the primary
//!   key and click counting from a single conditional `UPDATE`, so neither
//!   depends on application-level read-then-write.
//! - Stores timestamps as seconds since UNIX_EPOCH.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::{CoreError, LinkRepository, ShortCode, ShortLink};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

const SELECT_COLUMNS: &str =
    "SELECT code, target_url, created_at, updated_at, expires_at, click_count, is_active FROM shortlinks";

/// SQLite-backed link repository.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    /// Missing parent directories are created.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(map_sqerr)?;
        }
        let conn = Connection::open(path).map_err(map_sqerr)?;
        debug!(path = %path.display(), "opened sqlite database");
        Self::from_connection(conn)
    }

    /// Private in-memory database, handy for tests and throwaway demos.
    pub fn in_memory() -> Result<Self, CoreError> {
        Self::from_connection(Connection::open_in_memory().map_err(map_sqerr)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Storage("mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS shortlinks (
            code TEXT PRIMARY KEY NOT NULL,
            target_url TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER,
            expires_at INTEGER,
            click_count INTEGER NOT NULL DEFAULT 0 CHECK (click_count >= 0),
            is_active INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_shortlinks_created_at ON shortlinks(created_at);
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Storage(format!("sqlite error: {e}"))
}

/// Only a primary key clash means the code is taken; CHECK and NOT NULL
/// failures stay storage errors.
fn is_duplicate_key(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn system_time_to_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

fn secs_to_system_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn row_to_shortlink(row: &rusqlite::Row) -> rusqlite::Result<Result<ShortLink, CoreError>> {
    let code: String = row.get(0)?;
    let target_url: String = row.get(1)?;
    let created_at: i64 = row.get(2)?;
    let updated_at: Option<i64> = row.get(3)?;
    let expires_at: Option<i64> = row.get(4)?;
    let click_count: i64 = row.get(5)?;
    let is_active: i64 = row.get(6)?;

    Ok(ShortCode::new(code)
        .map_err(|e| CoreError::Storage(format!("bad code in db: {e}")))
        .map(|code| ShortLink {
            code,
            target_url,
            created_at: secs_to_system_time(created_at),
            updated_at: updated_at.map(secs_to_system_time),
            expires_at: expires_at.map(secs_to_system_time),
            click_count: click_count.max(0) as u64,
            is_active: is_active != 0,
        }))
}

impl LinkRepository for SqliteRepo {
    fn insert(&self, link: ShortLink) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let res = conn.execute(
            "INSERT INTO shortlinks(code, target_url, created_at, updated_at, expires_at, click_count, is_active) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                link.code.as_str(),
                link.target_url,
                system_time_to_secs(link.created_at),
                link.updated_at.map(system_time_to_secs),
                link.expires_at.map(system_time_to_secs),
                link.click_count as i64,
                link.is_active as i64,
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(CoreError::DuplicateCode),
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn get(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!("{SELECT_COLUMNS} WHERE code = ?1"))
            .map_err(map_sqerr)?;
        let found = stmt
            .query_row(params![code.as_str()], row_to_shortlink)
            .optional()
            .map_err(map_sqerr)?;
        found.transpose()
    }

    fn update(&self, link: &ShortLink) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE shortlinks SET target_url = ?1, expires_at = ?2, updated_at = ?3 WHERE code = ?4 AND is_active = 1",
                params![
                    link.target_url,
                    link.expires_at.map(system_time_to_secs),
                    link.updated_at.map(system_time_to_secs),
                    link.code.as_str(),
                ],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn delete(&self, code: &ShortCode, deleted_at: SystemTime) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE shortlinks SET is_active = 0, updated_at = ?1 WHERE code = ?2 AND is_active = 1",
                params![system_time_to_secs(deleted_at), code.as_str()],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn increment_clicks(&self, code: &ShortCode) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE shortlinks SET click_count = click_count + 1 WHERE code = ?1 AND is_active = 1",
                params![code.as_str()],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn list(&self, limit: usize) -> Result<Vec<ShortLink>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "{SELECT_COLUMNS} WHERE is_active = 1 ORDER BY created_at DESC, code ASC LIMIT ?1"
            ))
            .map_err(map_sqerr)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], row_to_shortlink)
            .map_err(map_sqerr)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(map_sqerr)??);
        }
        Ok(out)
    }
}
