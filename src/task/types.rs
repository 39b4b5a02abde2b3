use serde::{Deserialize, Serialize};

/// Import events (broadcast to subscribers) / 가져오기 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImportEvent {
    Progress { message: String, percent: f32 },
    /// File rebuilt from the index cache
    FileRestored { file_path: String, rows: usize },
    /// File read through the row source
    FileIndexed { file_path: String, rows: usize },
    FileFailed { file_path: String, error: String },
    Completed { files: usize, rows: usize },
}

/// Outcome of one import run / 가져오기 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Files read through the row source
    pub indexed: Vec<String>,
    /// Files rebuilt from the cache
    pub restored: Vec<String>,
    /// Files already in the index
    pub skipped: Vec<String>,
    /// (file path, error message)
    pub failed: Vec<(String, String)>,
    /// Rows added by this run
    pub rows: usize,
    pub cancelled: bool,
}

impl ImportSummary {
    /// Files whose rows are now in the index because of this run
    pub fn loaded_files(&self) -> usize {
        self.indexed.len() + self.restored.len()
    }
}
