use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scavenger::cache::IndexCache;
use scavenger::config;
use scavenger::search::SearchIndex;
use scavenger::task::{collect_supported_files, run_search, shared_index, ImportTask, RowBatches, RowSource};

#[derive(Parser)]
#[command(name = "scavenger")]
#[command(about = "Search spreadsheet rows restored from the index cache (Korean chosung, fuzzy, ranges).")]
struct Cli {
    /// Fuzzy cutoff, 0.0 ~ 1.0 (default: from config.json)
    #[arg(long)]
    min_similarity: Option<f64>,

    /// Maximum rows printed (default: from config.json)
    #[arg(long)]
    limit: Option<usize>,

    /// Disable fuzzy matching
    #[arg(long)]
    no_fuzzy: bool,

    /// Only search these files or directories (default: every cached file)
    #[arg(long = "path")]
    paths: Vec<PathBuf>,

    /// Query terms: keywords, -exclude, min~max
    #[arg(required = true)]
    query: Vec<String>,
}

/// The CLI has no spreadsheet reader: files must come from the cache
struct CacheOnly;

impl RowSource for CacheOnly {
    fn read_batches(&self, path: &Path, _batch_size: usize) -> anyhow::Result<RowBatches<'_>> {
        anyhow::bail!("{:?} is not cached or changed since it was cached", path)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scavenger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::info!("scavenger {} (built {})", env!("CARGO_PKG_VERSION"), env!("BUILD_TIME"));

    // Load configuration / 설정 로드
    if let Err(e) = config::init_config() {
        tracing::warn!("{}, using defaults", e);
    }
    let app_config = config::config();

    let cache = if app_config.cache.enabled {
        IndexCache::open(app_config.get_cache_db_path()).await
    } else {
        IndexCache::disabled()
    };
    if !cache.is_enabled() {
        tracing::warn!("Index cache unavailable, nothing to search");
    }

    let files = if cli.paths.is_empty() {
        cache.cached_files().await
    } else {
        collect_supported_files(&cli.paths, &app_config.import.supported_extensions)
    };
    let index = shared_index(SearchIndex::new());
    let cache_arc = Arc::new(cache);
    let task = ImportTask::new(index.clone(), cache_arc.clone(), Arc::new(CacheOnly))
        .with_batch_size(app_config.import.batch_size);
    let summary = task.run(&files).await?;
    drop(task);
    tracing::info!(
        "{} files restored, {} rows searchable",
        summary.restored.len(),
        index.read().total_rows()
    );

    let mut options = app_config
        .search_options(cli.query.join(" "))
        .fuzzy(!cli.no_fuzzy);
    if let Some(min_similarity) = cli.min_similarity {
        options = options.with_min_similarity(min_similarity.clamp(0.0, 1.0));
    }
    if let Some(limit) = cli.limit {
        options = options.with_limit(limit);
    }

    let outcome = run_search(index, options).await?;
    for hit in &outcome.results {
        let cells: Vec<String> = hit
            .row
            .cells
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        println!(
            "{:.3}\t{}\t{} [{}] #{}\t{}",
            hit.score,
            hit.match_type,
            hit.row.file_name,
            hit.row.sheet_name,
            hit.row.row_idx,
            cells.join(" | ")
        );
    }
    eprintln!("{} results in {:?}", outcome.results.len(), outcome.elapsed);

    if let Ok(mut cache) = Arc::try_unwrap(cache_arc) {
        cache.close().await;
    }
    Ok(())
}
