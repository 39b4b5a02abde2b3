//! Search module - only provides search capabilities (primitives), does not control flow / 검색 모듈
//!
//! Architecture principles:
//! - The index only exposes primitive operations: add_row_batch, remove_file, find_*
//! - Tasks control importing, progress, cancellation and caching
//! - Call direction: Task → Search (unidirectional)
//!
//! Retrieval layers:
//! - exact/substring matching through an inverted index
//! - Korean chosung (initial consonant) matching
//! - fuzzy matching over the token vocabulary
//! - numeric ranges, with BM25 as a relevance bonus

pub mod engine;
pub mod jamo;
pub mod query;
pub mod ranking;
pub mod schema;
pub mod searcher;
pub mod tokenizer;

pub use engine::SearchIndex;
pub use query::{parse as parse_query, SearchQuery};
pub use ranking::{Bm25Okapi, FuzzyMatcher, NoFuzzy, NoRelevance, RelevanceModel, WeightedRatio};
pub use schema::{Cell, CellHandle, MatchDetail, MatchType, RowBatch, RowData, RowKey, ScoredRow, SearchOptions};
pub use searcher::MultiLayerSearcher;
