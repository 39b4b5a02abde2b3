pub mod import;
pub mod search;
pub mod state;
pub mod types;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::search::SearchIndex;

/// Index shared by the import task (single writer) and searches (readers)
pub type SharedIndex = Arc<RwLock<SearchIndex>>;

pub fn shared_index(index: SearchIndex) -> SharedIndex {
    Arc::new(RwLock::new(index))
}

pub use import::{collect_supported_files, ImportTask, RowBatches, RowSource};
pub use search::{run_search, search_now, SearchOutcome};
pub use state::{ImportProgress, ImportState};
pub use types::{ImportEvent, ImportSummary};
