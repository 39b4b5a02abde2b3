//! Import task - feeds spreadsheet files into the shared index / 가져오기 작업
//!
//! For every requested file, in order:
//! 1. stop if cancellation was requested
//! 2. skip files already indexed (files the index marks partial are removed
//!    and redone)
//! 3. restore from the index cache when its record is still valid
//! 4. otherwise read batches from the `RowSource`, index them and save the
//!    file's cells into the cache
//!
//! The BM25 corpus is rebuilt once at the end unless the run was cancelled.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use super::state::ImportState;
use super::types::{ImportEvent, ImportSummary};
use super::SharedIndex;
use crate::cache::{CachedFile, IndexCache};
use crate::search::schema::RowBatch;

/// Rows per batch requested from the row source
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

pub type RowBatches<'a> = Box<dyn Iterator<Item = anyhow::Result<RowBatch>> + Send + 'a>;

/// External file reader boundary / 파일 리더
///
/// Yields the file's rows as batches of at most `batch_size` rows, sheet by
/// sheet, with row indices counted from zero within each sheet.
pub trait RowSource: Send + Sync {
    fn read_batches(&self, path: &Path, batch_size: usize) -> anyhow::Result<RowBatches<'_>>;
}

enum FileLoad {
    Complete,
    Cancelled,
    Failed(anyhow::Error),
}

/// Result of reading one file through the row source
struct Loaded {
    rows: usize,
    outcome: FileLoad,
}

/// Import task / 가져오기 작업
#[derive(Clone)]
pub struct ImportTask {
    index: SharedIndex,
    cache: Arc<IndexCache>,
    source: Arc<dyn RowSource>,
    state: Arc<ImportState>,
    event_sender: broadcast::Sender<ImportEvent>,
    batch_size: usize,
}

impl ImportTask {
    pub fn new(index: SharedIndex, cache: Arc<IndexCache>, source: Arc<dyn RowSource>) -> Self {
        let (event_sender, _) = broadcast::channel(256);
        Self {
            index,
            cache,
            source,
            state: Arc::new(ImportState::new()),
            event_sender,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Share an existing state (progress, cancel flag)
    pub fn with_state(mut self, state: Arc<ImportState>) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> Arc<ImportState> {
        Arc::clone(&self.state)
    }

    /// Subscribe to import events
    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.event_sender.subscribe()
    }

    fn broadcast(&self, event: ImportEvent) {
        let _ = self.event_sender.send(event);
    }

    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Run the import on a background task
    pub fn spawn(&self, files: Vec<String>) -> JoinHandle<anyhow::Result<ImportSummary>> {
        let task = self.clone();
        tokio::spawn(async move { task.run(&files).await })
    }

    /// Import the files in order / 파일 가져오기
    pub async fn run(&self, files: &[String]) -> anyhow::Result<ImportSummary> {
        if !self.state.start(files.len()) {
            anyhow::bail!("Import already running");
        }

        let total = files.len().max(1) as f32;
        let mut summary = ImportSummary::default();

        for (i, file_path) in files.iter().enumerate() {
            if self.state.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let file_name = display_name(file_path);
            self.state.set_current(file_path);
            self.broadcast(ImportEvent::Progress {
                message: format!("Loading {}", file_name),
                percent: i as f32 * 100.0 / total,
            });

            let already = {
                let mut index = self.index.write();
                if index.is_partial(file_path) {
                    tracing::info!("Replacing partially indexed file: {}", file_name);
                    index.remove_file(file_path);
                    false
                } else {
                    index.is_indexed(file_path)
                }
            };
            if already {
                tracing::debug!("Already indexed, skipped: {}", file_name);
                summary.skipped.push(file_path.clone());
                self.state.file_done();
                continue;
            }

            if self.cache.is_file_cached(file_path).await {
                if let Some(cached) = self.cache.load_file_data(file_path).await {
                    match self.restore(cached).await {
                        Ok(rows) => {
                            tracing::info!("Restored from cache: {} ({} rows)", file_name, rows);
                            summary.rows += rows;
                            summary.restored.push(file_path.clone());
                            self.broadcast(ImportEvent::FileRestored {
                                file_path: file_path.clone(),
                                rows,
                            });
                            self.state.file_done();
                            continue;
                        }
                        Err(e) => {
                            tracing::warn!("Cache restore failed, reading file instead: {}: {}", file_name, e);
                            self.index.write().remove_file(file_path);
                        }
                    }
                }
            }

            let loaded = self.index_file(file_path, &file_name).await;
            summary.rows += loaded.rows;

            match loaded.outcome {
                FileLoad::Complete => {
                    let (cells, headers) = {
                        let index = self.index.read();
                        (index.cells_for_file(file_path), index.headers_for_file(file_path))
                    };
                    self.cache
                        .save_file_data(file_path, &file_name, &cells, &headers)
                        .await;

                    tracing::info!("Indexed: {} ({} rows)", file_name, loaded.rows);
                    summary.indexed.push(file_path.clone());
                    self.broadcast(ImportEvent::FileIndexed {
                        file_path: file_path.clone(),
                        rows: loaded.rows,
                    });
                }
                FileLoad::Cancelled => {
                    self.index.write().mark_partial(file_path);
                    summary.cancelled = true;
                    break;
                }
                FileLoad::Failed(e) => {
                    self.index.write().mark_partial(file_path);
                    tracing::warn!("Failed to import {}: {:#}", file_name, e);
                    let error = format!("{:#}", e);
                    self.broadcast(ImportEvent::FileFailed {
                        file_path: file_path.clone(),
                        error: error.clone(),
                    });
                    summary.failed.push((file_path.clone(), error));
                }
            }

            self.state.file_done();
        }

        if summary.cancelled {
            tracing::info!("Import cancelled after {} files", summary.loaded_files());
        } else {
            self.index.read().build_bm25();
        }

        self.broadcast(ImportEvent::Completed {
            files: summary.loaded_files(),
            rows: summary.rows,
        });
        self.state.finish(summary.cancelled.then(|| "Import cancelled".to_string()));

        tracing::info!(
            "Import finished: {} indexed, {} restored, {} skipped, {} failed, {} rows",
            summary.indexed.len(),
            summary.restored.len(),
            summary.skipped.len(),
            summary.failed.len(),
            summary.rows
        );
        Ok(summary)
    }

    /// Re-feed cached cells through the index / 캐시에서 복원
    async fn restore(&self, cached: CachedFile) -> anyhow::Result<usize> {
        let index = Arc::clone(&self.index);
        let batch_size = self.batch_size;
        let rows = tokio::task::spawn_blocking(move || {
            let mut index = index.write();
            let before = index.total_rows();
            for (batch, offset) in cached.to_batches(batch_size) {
                index.add_row_batch(&cached.file_path, &cached.file_name, &batch, offset);
            }
            index.total_rows() - before
        })
        .await?;
        Ok(rows)
    }

    /// Read a file through the row source on a blocking thread
    async fn index_file(&self, file_path: &str, file_name: &str) -> Loaded {
        let source = Arc::clone(&self.source);
        let index = Arc::clone(&self.index);
        let state = Arc::clone(&self.state);
        let path = file_path.to_string();
        let name = file_name.to_string();
        let batch_size = self.batch_size;

        let joined = tokio::task::spawn_blocking(move || {
            let mut rows = 0usize;
            let mut batches = match source.read_batches(Path::new(&path), batch_size) {
                Ok(batches) => batches,
                Err(e) => return Loaded { rows, outcome: FileLoad::Failed(e) },
            };

            // Row offsets restart for every sheet
            let mut offsets: HashMap<String, usize> = HashMap::new();
            loop {
                if state.is_cancelled() {
                    return Loaded { rows, outcome: FileLoad::Cancelled };
                }
                let batch = match batches.next() {
                    Some(Ok(batch)) => batch,
                    Some(Err(e)) => return Loaded { rows, outcome: FileLoad::Failed(e) },
                    None => break,
                };

                let offset = offsets.entry(batch.sheet_name.clone()).or_insert(0);
                let mut writer = index.write();
                let before = writer.total_rows();
                writer.add_row_batch(&path, &name, &batch, *offset);
                rows += writer.total_rows() - before;
                *offset += batch.len();
            }

            Loaded { rows, outcome: FileLoad::Complete }
        })
        .await;

        match joined {
            Ok(loaded) => loaded,
            Err(e) => Loaded {
                rows: 0,
                outcome: FileLoad::Failed(anyhow::anyhow!("reader task failed: {}", e)),
            },
        }
    }
}

/// File name part of a path / 파일명
fn display_name(file_path: &str) -> String {
    Path::new(file_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.to_string())
}

fn has_supported_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
        return false;
    };
    extensions
        .iter()
        .any(|supported| supported.trim_start_matches('.').eq_ignore_ascii_case(&ext))
}

/// Expand files and directories into supported file paths / 지원 파일 수집
///
/// Directories are walked recursively. Order follows the input, directory
/// entries sorted by name; duplicates are dropped.
pub fn collect_supported_files<P: AsRef<Path>>(paths: &[P], extensions: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    let mut push = |path: &Path| {
        let path = path.to_string_lossy().to_string();
        if seen.insert(path.clone()) {
            files.push(path);
        }
    };

    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && has_supported_extension(entry.path(), extensions) {
                    push(entry.path());
                }
            }
        } else if path.is_file() && has_supported_extension(path, extensions) {
            push(path);
        } else {
            tracing::debug!("Unsupported or missing path skipped: {:?}", path);
        }
    }

    files
}
