use std::time::{Duration, Instant};

use super::SharedIndex;
use crate::search::ranking::NoFuzzy;
use crate::search::schema::{ScoredRow, SearchOptions};
use crate::search::searcher::MultiLayerSearcher;

/// Search result with timing / 검색 결과
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub query: String,
    pub results: Vec<ScoredRow>,
    pub elapsed: Duration,
}

/// Run a search on a blocking worker thread / 백그라운드 검색
pub async fn run_search(index: SharedIndex, options: SearchOptions) -> anyhow::Result<SearchOutcome> {
    let outcome = tokio::task::spawn_blocking(move || search_now(&index, &options)).await?;
    Ok(outcome)
}

/// Run a search on the current thread under a read lock
pub fn search_now(index: &SharedIndex, options: &SearchOptions) -> SearchOutcome {
    let started = Instant::now();
    let index = index.read();

    let mut searcher = MultiLayerSearcher::new(&index).with_fuzzy_candidates(options.fuzzy_candidates);
    if !options.fuzzy {
        searcher = searcher.with_fuzzy(Box::new(NoFuzzy));
    }
    let results = searcher.search(&options.query, options.min_similarity, options.limit);

    let elapsed = started.elapsed();
    tracing::debug!(
        "Search '{}' finished in {:?}: {} results",
        options.query,
        elapsed,
        results.len()
    );

    SearchOutcome {
        query: options.query.clone(),
        results,
        elapsed,
    }
}
