//! Index cache - SQLite store of raw cell data per file / 인덱스 캐시
//!
//! Lets the import pipeline rebuild the in-memory index without re-reading
//! spreadsheets. A record is valid only while the file's modification time
//! and size are exactly the stored ones.
//!
//! Tables:
//! - file_meta: file_path -> name, mtime (ns), size
//! - cell_data: one row per non-empty cell, indexed by file_path
//! - sheet_headers: (file_path, sheet_name) -> header list as JSON
//!
//! Failure policy: if the database cannot be opened the cache is disabled for
//! the session and every call degrades to a miss / no-op. Errors on later
//! calls are logged and treated the same way for that call.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::search::schema::{Cell, RowBatch};

/// Cache storage errors / 캐시 오류
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid header data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt cache record: {0}")]
    Corrupt(String),
    #[error("cache is unavailable")]
    Unavailable,
}

/// Modification time and size of a file on disk / 파일 변경 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    /// Nanoseconds since the Unix epoch (negative before it)
    pub mtime_ns: i64,
    pub size: i64,
}

impl FileStamp {
    pub async fn of(path: &Path) -> Result<Self, CacheError> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(Self {
            mtime_ns: system_time_ns(meta.modified()?),
            size: meta.len() as i64,
        })
    }
}

fn system_time_ns(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(e) => -(e.duration().as_nanos() as i64),
    }
}

/// Cached data of one file / 캐시된 파일 데이터
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedFile {
    pub file_path: String,
    pub file_name: String,
    /// Sheet name -> ordered headers
    pub headers: HashMap<String, Vec<String>>,
    pub cells: Vec<Cell>,
}

impl CachedFile {
    /// Regroup cells into per-sheet row batches / 시트별 행 배치로 변환
    ///
    /// One batch per run of consecutive cached row indices, at most
    /// `max_rows` rows long, offset at the run's first index. Gaps between
    /// cached rows are never materialized. Sheets without stored headers are
    /// dropped.
    pub fn to_batches(&self, max_rows: usize) -> Vec<(RowBatch, usize)> {
        let max_rows = max_rows.max(1);
        let mut sheets: BTreeMap<&str, BTreeMap<usize, Vec<&Cell>>> = BTreeMap::new();
        for cell in &self.cells {
            sheets
                .entry(cell.sheet_name.as_str())
                .or_default()
                .entry(cell.row_idx)
                .or_default()
                .push(cell);
        }

        let mut batches = Vec::new();
        for (sheet_name, rows) in sheets {
            let Some(headers) = self.headers.get(sheet_name) else {
                tracing::warn!("Cached sheet without headers skipped: {} [{}]", self.file_name, sheet_name);
                continue;
            };

            let mut current: Option<(RowBatch, usize)> = None;
            for (row_idx, cells) in rows {
                let mut values: Vec<Option<String>> = vec![None; headers.len()];
                for cell in cells {
                    if let Some(slot) = values.get_mut(cell.col_idx) {
                        *slot = Some(cell.value.clone());
                    }
                }

                let extends = current.as_ref().is_some_and(|(batch, offset)| {
                    batch.rows.len() < max_rows && offset.checked_add(batch.rows.len()) == Some(row_idx)
                });
                if !extends {
                    batches.extend(current.take());
                    current = Some((RowBatch::new(sheet_name, headers.clone()), row_idx));
                }
                if let Some((batch, _)) = current.as_mut() {
                    batch.rows.push(values);
                }
            }
            batches.extend(current);
        }
        batches
    }
}

/// SQLite-backed index cache / SQLite 인덱스 캐시
pub struct IndexCache {
    db: Option<Pool<Sqlite>>,
    db_path: PathBuf,
}

impl IndexCache {
    /// Open (or create) the cache database; disables caching on failure
    pub async fn open(db_path: impl AsRef<Path>) -> Self {
        let db_path = db_path.as_ref().to_path_buf();
        match Self::connect(&db_path).await {
            Ok(db) => {
                tracing::info!("Index cache opened: {:?} (WAL mode)", db_path);
                Self { db: Some(db), db_path }
            }
            Err(e) => {
                tracing::error!("Index cache init failed, caching disabled: {}", e);
                Self { db: None, db_path }
            }
        }
    }

    /// A cache that never hits and never stores
    pub fn disabled() -> Self {
        Self {
            db: None,
            db_path: PathBuf::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.db.is_some()
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn connect(db_path: &Path) -> Result<Pool<Sqlite>, CacheError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let db = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        Self::init_schema(&db).await?;
        Ok(db)
    }

    /// Create tables if they do not exist / 스키마 초기화
    async fn init_schema(db: &Pool<Sqlite>) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_meta (
                file_path TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                file_mtime INTEGER NOT NULL,
                file_size INTEGER NOT NULL,
                indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
        "#,
        )
        .execute(db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cell_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path TEXT NOT NULL,
                sheet_name TEXT NOT NULL,
                row_idx INTEGER NOT NULL,
                col_idx INTEGER NOT NULL,
                col_name TEXT NOT NULL,
                cell_value TEXT NOT NULL,
                FOREIGN KEY (file_path) REFERENCES file_meta(file_path)
            )
        "#,
        )
        .execute(db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_cell_file ON cell_data(file_path)")
            .execute(db)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sheet_headers (
                file_path TEXT NOT NULL,
                sheet_name TEXT NOT NULL,
                headers_json TEXT NOT NULL,
                PRIMARY KEY (file_path, sheet_name)
            )
        "#,
        )
        .execute(db)
        .await?;

        Ok(())
    }

    fn pool(&self) -> Result<&Pool<Sqlite>, CacheError> {
        self.db.as_ref().ok_or(CacheError::Unavailable)
    }

    /// Whether a valid record exists for the file / 캐시 유효성 확인
    ///
    /// Valid means the stored mtime and size equal the file's current ones;
    /// any change, including an older mtime, invalidates the record.
    pub async fn is_file_cached(&self, file_path: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match self.check_cached(file_path).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::debug!("Cache check failed for {}: {}", file_path, e);
                false
            }
        }
    }

    async fn check_cached(&self, file_path: &str) -> Result<bool, CacheError> {
        let db = self.pool()?;
        let path = Path::new(file_path);
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(false);
        }
        let current = FileStamp::of(path).await?;

        let stored: Option<(i64, i64)> =
            sqlx::query_as("SELECT file_mtime, file_size FROM file_meta WHERE file_path = ?")
                .bind(file_path)
                .fetch_optional(db)
                .await?;

        Ok(match stored {
            Some((mtime_ns, size)) => FileStamp { mtime_ns, size } == current,
            None => false,
        })
    }

    /// Replace the file's record with fresh data / 캐시 저장
    pub async fn save_file_data(
        &self,
        file_path: &str,
        file_name: &str,
        cells: &[Cell],
        headers: &HashMap<String, Vec<String>>,
    ) {
        if !self.is_enabled() {
            return;
        }
        match self.do_save(file_path, file_name, cells, headers).await {
            Ok(()) => tracing::info!("Cache saved: {} ({} cells)", file_name, cells.len()),
            Err(e) => tracing::error!("Cache save failed: {}: {}", file_path, e),
        }
    }

    async fn do_save(
        &self,
        file_path: &str,
        file_name: &str,
        cells: &[Cell],
        headers: &HashMap<String, Vec<String>>,
    ) -> Result<(), CacheError> {
        let db = self.pool()?;
        let stamp = FileStamp::of(Path::new(file_path)).await?;

        let mut tx = db.begin().await?;

        for table in ["cell_data", "sheet_headers", "file_meta"] {
            sqlx::query(&format!("DELETE FROM {} WHERE file_path = ?", table))
                .bind(file_path)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO file_meta (file_path, file_name, file_mtime, file_size) VALUES (?, ?, ?, ?)",
        )
        .bind(file_path)
        .bind(file_name)
        .bind(stamp.mtime_ns)
        .bind(stamp.size)
        .execute(&mut *tx)
        .await?;

        for (sheet_name, header_list) in headers {
            sqlx::query(
                "INSERT INTO sheet_headers (file_path, sheet_name, headers_json) VALUES (?, ?, ?)",
            )
            .bind(file_path)
            .bind(sheet_name)
            .bind(serde_json::to_string(header_list)?)
            .execute(&mut *tx)
            .await?;
        }

        for cell in cells {
            sqlx::query(
                "INSERT INTO cell_data (file_path, sheet_name, row_idx, col_idx, col_name, cell_value) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(file_path)
            .bind(&cell.sheet_name)
            .bind(cell.row_idx as i64)
            .bind(cell.col_idx as i64)
            .bind(&cell.col_name)
            .bind(&cell.value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load a file's record / 캐시 로드
    pub async fn load_file_data(&self, file_path: &str) -> Option<CachedFile> {
        if !self.is_enabled() {
            return None;
        }
        match self.do_load(file_path).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::error!("Cache load failed: {}: {}", file_path, e);
                None
            }
        }
    }

    async fn do_load(&self, file_path: &str) -> Result<Option<CachedFile>, CacheError> {
        let db = self.pool()?;

        let meta: Option<(String,)> =
            sqlx::query_as("SELECT file_name FROM file_meta WHERE file_path = ?")
                .bind(file_path)
                .fetch_optional(db)
                .await?;
        let Some((file_name,)) = meta else {
            return Ok(None);
        };

        let header_rows: Vec<(String, String)> =
            sqlx::query_as("SELECT sheet_name, headers_json FROM sheet_headers WHERE file_path = ?")
                .bind(file_path)
                .fetch_all(db)
                .await?;
        let mut headers = HashMap::with_capacity(header_rows.len());
        for (sheet_name, json) in header_rows {
            headers.insert(sheet_name, serde_json::from_str::<Vec<String>>(&json)?);
        }

        let cell_rows: Vec<(String, i64, i64, String, String)> = sqlx::query_as(
            "SELECT sheet_name, row_idx, col_idx, col_name, cell_value FROM cell_data WHERE file_path = ? ORDER BY id",
        )
        .bind(file_path)
        .fetch_all(db)
        .await?;

        let mut cells = Vec::with_capacity(cell_rows.len());
        for (sheet_name, row_idx, col_idx, col_name, value) in cell_rows {
            let row_idx = usize::try_from(row_idx)
                .map_err(|_| CacheError::Corrupt(format!("negative row index {}", row_idx)))?;
            let col_idx = usize::try_from(col_idx)
                .map_err(|_| CacheError::Corrupt(format!("negative column index {}", col_idx)))?;
            cells.push(Cell {
                file_path: file_path.to_string(),
                file_name: file_name.clone(),
                sheet_name,
                row_idx,
                col_idx,
                col_name,
                value,
            });
        }

        Ok(Some(CachedFile {
            file_path: file_path.to_string(),
            file_name,
            headers,
            cells,
        }))
    }

    /// Delete one file's record / 캐시 삭제
    pub async fn remove_file(&self, file_path: &str) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.do_remove(file_path).await {
            tracing::error!("Cache delete failed: {}: {}", file_path, e);
        }
    }

    async fn do_remove(&self, file_path: &str) -> Result<(), CacheError> {
        let db = self.pool()?;
        let mut tx = db.begin().await?;
        for table in ["cell_data", "sheet_headers", "file_meta"] {
            sqlx::query(&format!("DELETE FROM {} WHERE file_path = ?", table))
                .bind(file_path)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Paths of every cached file / 캐시된 파일 목록
    pub async fn cached_files(&self) -> Vec<String> {
        let Ok(db) = self.pool() else {
            return Vec::new();
        };
        let rows: Result<Vec<(String,)>, sqlx::Error> =
            sqlx::query_as("SELECT file_path FROM file_meta ORDER BY file_path")
                .fetch_all(db)
                .await;
        match rows {
            Ok(rows) => rows.into_iter().map(|(path,)| path).collect(),
            Err(e) => {
                tracing::error!("Cache listing failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Delete every record / 전체 캐시 삭제
    pub async fn clear_all(&self) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.do_clear().await {
            tracing::error!("Cache clear failed: {}", e);
        }
    }

    async fn do_clear(&self) -> Result<(), CacheError> {
        let db = self.pool()?;
        let mut tx = db.begin().await?;
        for table in ["cell_data", "sheet_headers", "file_meta"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Close the connection pool; the cache is disabled afterwards
    pub async fn close(&mut self) {
        if let Some(db) = self.db.take() {
            db.close().await;
        }
    }
}
