use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

/// Import progress snapshot / 가져오기 진행 상황
#[derive(Debug, Clone)]
pub struct ImportProgress {
    pub is_running: bool,
    pub is_done: bool,
    pub total_files: usize,
    pub processed_files: usize,
    pub current_file: Option<String>,
    pub error: Option<String>,
    pub last_done_time: Option<i64>,
}

impl Default for ImportProgress {
    fn default() -> Self {
        Self {
            is_running: false,
            is_done: true,
            total_files: 0,
            processed_files: 0,
            current_file: None,
            error: None,
            last_done_time: None,
        }
    }
}

impl ImportProgress {
    pub fn percent(&self) -> f32 {
        if self.total_files == 0 {
            return 100.0;
        }
        self.processed_files as f32 * 100.0 / self.total_files as f32
    }
}

/// Import state management / 가져오기 상태 관리
///
/// Shared between the import task and whoever controls it. A cancel
/// requested before a run starts applies to that run; `finish` resets it.
pub struct ImportState {
    pub running: AtomicBool,
    pub cancel_flag: AtomicBool,
    pub progress: RwLock<ImportProgress>,
}

impl ImportState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            cancel_flag: AtomicBool::new(false),
            progress: RwLock::new(ImportProgress::default()),
        }
    }

    /// Mark an import as started; false if one is already running
    pub fn start(&self, total_files: usize) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let mut progress = self.progress.write();
        let last_done_time = progress.last_done_time;
        *progress = ImportProgress {
            is_running: true,
            is_done: false,
            total_files,
            last_done_time,
            ..Default::default()
        };
        true
    }

    pub fn set_current(&self, file_path: &str) {
        self.progress.write().current_file = Some(file_path.to_string());
    }

    pub fn file_done(&self) {
        let mut progress = self.progress.write();
        progress.processed_files += 1;
        progress.current_file = None;
    }

    pub fn finish(&self, error: Option<String>) {
        self.cancel_flag.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        let mut progress = self.progress.write();
        progress.is_running = false;
        progress.is_done = error.is_none();
        progress.current_file = None;
        progress.error = error;
        progress.last_done_time = Some(chrono::Utc::now().timestamp());
    }

    /// Request cancellation; polled between files and between batches
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn get_progress(&self) -> ImportProgress {
        self.progress.read().clone()
    }
}

impl Default for ImportState {
    fn default() -> Self {
        Self::new()
    }
}
