//! Multi-layer searcher / 다중 계층 검색
//!
//! Layers run per keyword and merge into one score per row:
//! 1. exact/substring via the inverted index (weight 1.0)
//! 2. chosung, only for chosung-only keywords (weight 0.85)
//! 3. fuzzy over the vocabulary (weight 0.7)
//! Numeric ranges scan every live cell (weight 0.9). BM25 then adds a
//! normalized bonus to rows that already matched, before the NOT and AND
//! filters are applied.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::engine::SearchIndex;
use super::jamo::{extract_chosung, is_chosung_query};
use super::query::{parse, SearchQuery};
use super::ranking::{FuzzyMatcher, WeightedRatio};
use super::schema::{Cell, MatchDetail, MatchType, RowKey, ScoredRow};

pub const WEIGHT_EXACT: f64 = 1.0;
pub const WEIGHT_CHOSUNG: f64 = 0.85;
pub const WEIGHT_FUZZY: f64 = 0.7;
pub const WEIGHT_BM25: f64 = 0.3;
pub const WEIGHT_RANGE: f64 = 0.9;

/// Default cap on fuzzy vocabulary candidates per keyword
pub const DEFAULT_FUZZY_CANDIDATES: usize = 50;

/// Running score of one row
struct RowScore {
    score: f64,
    match_type: MatchType,
    similarity: f64,
    matches: Vec<MatchDetail>,
    seen: HashSet<(String, String)>,
}

type ScoreBoard = HashMap<RowKey, RowScore>;

/// Multi-layer searcher over a borrowed index / 다중 계층 검색기
pub struct MultiLayerSearcher<'a> {
    index: &'a SearchIndex,
    fuzzy: Box<dyn FuzzyMatcher>,
    fuzzy_candidates: usize,
}

impl<'a> MultiLayerSearcher<'a> {
    pub fn new(index: &'a SearchIndex) -> Self {
        Self {
            index,
            fuzzy: Box::new(WeightedRatio),
            fuzzy_candidates: DEFAULT_FUZZY_CANDIDATES,
        }
    }

    /// Replace the fuzzy backend (`NoFuzzy` disables layer 3)
    pub fn with_fuzzy(mut self, fuzzy: Box<dyn FuzzyMatcher>) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    pub fn with_fuzzy_candidates(mut self, limit: usize) -> Self {
        self.fuzzy_candidates = limit;
        self
    }

    /// Search and return rows ranked by score / 검색
    ///
    /// `min_similarity` (0.0 ~ 1.0) is the fuzzy cutoff.
    pub fn search(&self, raw_query: &str, min_similarity: f64, max_results: usize) -> Vec<ScoredRow> {
        let query = parse(raw_query);
        self.search_query(&query, min_similarity, max_results)
    }

    /// Search with an already parsed query
    pub fn search_query(
        &self,
        query: &SearchQuery,
        min_similarity: f64,
        max_results: usize,
    ) -> Vec<ScoredRow> {
        if query.is_empty() {
            return Vec::new();
        }

        let mut board = ScoreBoard::new();

        for keyword in &query.keywords {
            self.exact_search(keyword, &mut board);
            if is_chosung_query(keyword) {
                self.chosung_search(keyword, &mut board);
            }
            if self.fuzzy.enabled() {
                self.fuzzy_search(keyword, min_similarity, &mut board);
            }
        }

        for (min, max) in &query.ranges {
            self.range_search(*min, *max, &mut board);
        }

        if !query.keywords.is_empty() {
            self.apply_bm25(&query.keywords.join(" "), &mut board);
        }

        if !query.excludes.is_empty() {
            self.apply_excludes(&query.excludes, &mut board);
        }

        if query.keywords.len() > 1 {
            self.apply_and_condition(&query.keywords, &mut board);
        }

        let mut results: Vec<(RowKey, ScoredRow)> = board
            .into_iter()
            .filter_map(|(key, entry)| {
                let row = self.index.row(&key)?.clone();
                Some((
                    key,
                    ScoredRow {
                        row,
                        score: entry.score,
                        match_type: entry.match_type,
                        similarity: entry.similarity,
                        matches: entry.matches,
                    },
                ))
            })
            .collect();

        results.sort_by(|(ka, a), (kb, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| ka.cmp(kb))
        });
        results.truncate(max_results);

        tracing::debug!("Search '{}' -> {} rows", query.raw, results.len());
        results.into_iter().map(|(_, row)| row).collect()
    }

    /// Layer 1: inverted index exact/substring match / 정확 매칭
    fn exact_search(&self, keyword: &str, board: &mut ScoreBoard) {
        let kw_lower = keyword.to_lowercase();

        for handle in self.index.find_cells_containing(keyword) {
            let Some(cell) = self.index.cell(handle) else {
                continue;
            };

            let val_lower = cell.value.to_lowercase();
            let sim = if val_lower == kw_lower {
                1.0
            } else if val_lower.contains(&kw_lower) {
                0.9
            } else {
                0.8
            };
            record(board, cell, WEIGHT_EXACT * sim, MatchType::Exact, sim);
        }
    }

    /// Layer 2: chosung index match / 초성 검색
    fn chosung_search(&self, keyword: &str, board: &mut ScoreBoard) {
        for handle in self.index.find_cells_by_chosung(keyword) {
            let Some(cell) = self.index.cell(handle) else {
                continue;
            };

            let sim = if extract_chosung(&cell.value).contains(keyword) {
                0.85
            } else {
                0.7
            };
            record(board, cell, WEIGHT_CHOSUNG * sim, MatchType::Chosung, sim);
        }
    }

    /// Layer 3: fuzzy match against the vocabulary / 퍼지 매칭
    fn fuzzy_search(&self, keyword: &str, min_similarity: f64, board: &mut ScoreBoard) {
        let vocabulary = self.index.vocabulary();
        if vocabulary.is_empty() {
            return;
        }

        let kw_lower = keyword.to_lowercase();
        let cutoff = min_similarity * 100.0;

        let mut candidates: Vec<(&String, f64)> = vocabulary
            .iter()
            .map(|token| (token, self.fuzzy.similarity(&kw_lower, token)))
            .filter(|(_, score)| *score >= cutoff && *score > 0.0)
            .collect();
        candidates.sort_by(|(ta, a), (tb, b)| {
            b.partial_cmp(a).unwrap_or(Ordering::Equal).then_with(|| ta.cmp(tb))
        });
        candidates.truncate(self.fuzzy_candidates);

        for (token, score) in candidates {
            // Already counted by layer 1
            if *token == kw_lower {
                continue;
            }
            let sim = score / 100.0;
            let Some(handles) = self.index.postings(token) else {
                continue;
            };
            for handle in handles {
                if let Some(cell) = self.index.cell(*handle) {
                    record(board, cell, WEIGHT_FUZZY * sim, MatchType::Fuzzy, sim);
                }
            }
        }
    }

    /// Numeric range scan over live cells / 숫자 범위 검색
    fn range_search(&self, min: f64, max: f64, board: &mut ScoreBoard) {
        for (_, cell) in self.index.iter_cells() {
            let Some(value) = parse_number(&cell.value) else {
                continue;
            };
            if min <= value && value <= max {
                record(board, cell, WEIGHT_RANGE, MatchType::Range, 0.9);
            }
        }
    }

    /// Layer 4: normalized BM25 bonus for rows already matched / BM25 가산
    fn apply_bm25(&self, query: &str, board: &mut ScoreBoard) {
        let scores = self.index.bm25_scores(query);
        let max_score = scores.values().copied().fold(0.0f64, f64::max);
        if max_score <= 0.0 {
            return;
        }

        for (key, score) in scores {
            if let Some(entry) = board.get_mut(&key) {
                entry.score += (score / max_score) * WEIGHT_BM25;
            }
        }
    }

    /// Drop rows whose text contains any exclude term / 제외 조건
    fn apply_excludes(&self, excludes: &[String], board: &mut ScoreBoard) {
        let excludes: Vec<String> = excludes.iter().map(|e| e.to_lowercase()).collect();
        board.retain(|key, _| match self.index.row(key) {
            Some(row) => {
                let text = row.text();
                !excludes.iter().any(|ex| text.contains(ex.as_str()))
            }
            None => true,
        });
    }

    /// Keep only rows whose text contains every keyword / AND 조건
    fn apply_and_condition(&self, keywords: &[String], board: &mut ScoreBoard) {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        board.retain(|key, _| match self.index.row(key) {
            Some(row) => {
                let text = row.text();
                keywords.iter().all(|kw| text.contains(kw.as_str()))
            }
            None => true,
        });
    }
}

/// Parse a cell as a number, ignoring thousands separators / 숫자 변환
pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned = value.replace(',', "");
    let parsed: f64 = cleaned.trim().parse().ok()?;
    if parsed.is_nan() {
        None
    } else {
        Some(parsed)
    }
}

/// Merge one weighted contribution into the row's running score
fn record(board: &mut ScoreBoard, cell: &Cell, score: f64, match_type: MatchType, similarity: f64) {
    let detail_key = (cell.col_name.clone(), cell.value.clone());
    let detail = MatchDetail {
        col_name: cell.col_name.clone(),
        cell_value: cell.value.clone(),
        match_type,
        similarity,
    };

    match board.get_mut(&cell.row_key()) {
        Some(entry) => {
            entry.score = entry.score.max(score);
            if similarity > entry.similarity {
                entry.similarity = similarity;
                entry.match_type = match_type;
            }
            if entry.seen.insert(detail_key) {
                entry.matches.push(detail);
            }
        }
        None => {
            let mut seen = HashSet::new();
            seen.insert(detail_key);
            board.insert(
                cell.row_key(),
                RowScore {
                    score,
                    match_type,
                    similarity,
                    matches: vec![detail],
                    seen,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ranking::{NoFuzzy, NoRelevance};
    use crate::search::schema::RowBatch;

    fn text_index(values: &[&str]) -> SearchIndex {
        let mut index = SearchIndex::new();
        let mut batch = RowBatch::new("Sheet1", vec!["Text".to_string()]);
        for v in values {
            batch = batch.with_row([*v]);
        }
        index.add_row_batch("/data/text.csv", "text.csv", &batch, 0);
        index
    }

    fn values(results: &[ScoredRow]) -> Vec<String> {
        results
            .iter()
            .filter_map(|r| r.row.get("Text").map(str::to_string))
            .collect()
    }

    #[test]
    fn test_empty_query() {
        let index = text_index(&["Seoul"]);
        let searcher = MultiLayerSearcher::new(&index);
        assert!(searcher.search("", 0.6, 500).is_empty());
        assert!(searcher.search("   ", 0.6, 500).is_empty());
        assert!(searcher.search("-Seoul", 0.6, 500).is_empty());
    }

    #[test]
    fn test_chosung_search() {
        let mut index = SearchIndex::new();
        let batch = RowBatch::new("Sheet1", vec!["Name".to_string(), "Dept".to_string()])
            .with_row(["홍길동", "Sales"])
            .with_row(["김철수", "Dev"]);
        index.add_row_batch("/data/people.xlsx", "people.xlsx", &batch, 0);

        let results = MultiLayerSearcher::new(&index).search("ㅎㄱㄷ", 0.6, 500);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].row.get("Name"), Some("홍길동"));
        assert_eq!(results[0].match_type, MatchType::Chosung);
        assert!((results[0].similarity - 0.85).abs() < 1e-9);
        assert!((results[0].score - WEIGHT_CHOSUNG * 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_range_search() {
        let mut index = SearchIndex::new();
        let batch = RowBatch::new("Sheet1", vec!["Item".to_string(), "Price".to_string()])
            .with_row(["apple", "250"])
            .with_row(["pear", "600"])
            .with_row(["plum", "n/a"]);
        index.add_row_batch("/data/prices.csv", "prices.csv", &batch, 0);

        let results = MultiLayerSearcher::new(&index).search("100~500", 0.6, 500);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].row.get("Item"), Some("apple"));
        assert_eq!(results[0].match_type, MatchType::Range);
        assert!((results[0].score - WEIGHT_RANGE).abs() < 1e-9);
    }

    #[test]
    fn test_range_thousands_separator() {
        let index = text_index(&["1,250", " 3,000 ", "12,500"]);
        let results = MultiLayerSearcher::new(&index).search("1000-5000", 0.6, 500);
        let mut found = values(&results);
        found.sort();
        assert_eq!(found, vec![" 3,000 ", "1,250"]);
    }

    #[test]
    fn test_exclude() {
        let index = text_index(&["Seoul Gangnam", "Seoul Gangbuk"]);
        let results = MultiLayerSearcher::new(&index).search("Seoul -Gangnam", 0.6, 500);
        assert_eq!(values(&results), vec!["Seoul Gangbuk"]);
    }

    #[test]
    fn test_and_condition() {
        let index = text_index(&["Seoul Gangnam", "Seoul Gangbuk", "Busan Gangnam"]);
        let results = MultiLayerSearcher::new(&index)
            .with_fuzzy(Box::new(NoFuzzy))
            .search("Seoul Gangnam", 0.6, 500);
        assert_eq!(values(&results), vec!["Seoul Gangnam"]);
    }

    #[test]
    fn test_exact_similarity_levels() {
        let index = text_index(&["seoul", "seoul tower", "busan"]);
        let results = MultiLayerSearcher::new(&index)
            .with_fuzzy(Box::new(NoFuzzy))
            .search("SEOUL", 0.6, 500);
        assert_eq!(results.len(), 2);

        let full = results.iter().find(|r| r.row.get("Text") == Some("seoul")).unwrap();
        let part = results.iter().find(|r| r.row.get("Text") == Some("seoul tower")).unwrap();
        assert_eq!(full.similarity, 1.0);
        assert_eq!(part.similarity, 0.9);
        assert_eq!(full.match_type, MatchType::Exact);
        assert!(full.score >= part.score);
    }

    #[test]
    fn test_fuzzy_layer() {
        let index = text_index(&["gangnam", "haeundae"]);
        let results = MultiLayerSearcher::new(&index).search("gangnm", 0.6, 500);
        assert_eq!(values(&results), vec!["gangnam"]);
        assert_eq!(results[0].match_type, MatchType::Fuzzy);
        assert!(results[0].similarity >= 0.6 && results[0].similarity < 1.0);

        let none = MultiLayerSearcher::new(&index)
            .with_fuzzy(Box::new(NoFuzzy))
            .search("gangnm", 0.6, 500);
        assert!(none.is_empty());
    }

    #[test]
    fn test_exact_token_not_rescored_as_fuzzy() {
        let index = text_index(&["Seoul", "seoul tower"]);
        let fuzzy = MultiLayerSearcher::new(&index).search("seoul", 0.6, 500);
        let plain = MultiLayerSearcher::new(&index)
            .with_fuzzy(Box::new(NoFuzzy))
            .search("seoul", 0.6, 500);

        let exact = fuzzy.iter().find(|r| r.row.get("Text") == Some("Seoul")).unwrap();
        assert_eq!(exact.match_type, MatchType::Exact);
        assert_eq!(exact.similarity, 1.0);
        assert_eq!(exact.matches.len(), 1);
        assert_eq!(exact.matches[0].match_type, MatchType::Exact);

        let baseline = plain.iter().find(|r| r.row.get("Text") == Some("Seoul")).unwrap();
        assert!((exact.score - baseline.score).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_matches_indel_typos() {
        // 92.3 and 88.9 on the Indel scale
        let index = text_index(&["gangnam", "seoul"]);
        let results = MultiLayerSearcher::new(&index).search("gangnm", 0.9, 500);
        assert_eq!(values(&results), vec!["gangnam"]);
        let results = MultiLayerSearcher::new(&index).search("seol", 0.85, 500);
        assert_eq!(values(&results), vec!["seoul"]);
    }

    #[test]
    fn test_fuzzy_respects_cutoff() {
        let index = text_index(&["gangnam"]);
        let results = MultiLayerSearcher::new(&index).search("gangnm", 0.99, 500);
        assert!(results.is_empty());
    }

    #[test]
    fn test_bm25_bonus_is_additive() {
        let mut index = SearchIndex::new();
        let batch = RowBatch::new("S", vec!["Text".to_string()])
            .with_row(["alpha report"])
            .with_row(["beta summary"])
            .with_row(["gamma notes"])
            .with_row(["delta memo"]);
        index.add_row_batch("/a.csv", "a.csv", &batch, 0);

        let results = MultiLayerSearcher::new(&index)
            .with_fuzzy(Box::new(NoFuzzy))
            .search("alpha", 0.6, 500);
        assert_eq!(results.len(), 1);
        // 0.9 (substring of value) + full normalized bonus
        assert!((results[0].score - (0.9 + WEIGHT_BM25)).abs() < 1e-9);

        let mut plain = SearchIndex::with_relevance(Box::new(NoRelevance));
        plain.add_row_batch("/a.csv", "a.csv", &batch, 0);
        let results = MultiLayerSearcher::new(&plain)
            .with_fuzzy(Box::new(NoFuzzy))
            .search("alpha", 0.6, 500);
        assert!((results[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_matches_are_deduplicated() {
        let index = text_index(&["서울"]);
        // "서울" hits layer 1 as exact value and the chosung layer is skipped
        let results = MultiLayerSearcher::new(&index).search("서울 서울", 0.6, 500);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matches.len(), 1);
    }

    #[test]
    fn test_max_results_and_order() {
        let index = text_index(&["seoul", "seoul a", "seoul b", "seoul c"]);
        let results = MultiLayerSearcher::new(&index)
            .with_fuzzy(Box::new(NoFuzzy))
            .search("seoul", 0.6, 2);
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        assert_eq!(results[0].row.get("Text"), Some("seoul"));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("NaN"), None);
    }
}
