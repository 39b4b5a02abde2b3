//! Search index - in-memory multi-layer index / 검색 인덱스
//!
//! Architecture principle: only expose primitive operations, do not control flow
//! - add_row_batch: index one batch of rows / 행 배치 인덱싱
//! - remove_file: drop every trace of one file / 파일 제거
//! - build_bm25 / bm25_scores: row relevance / BM25 랭킹
//! - find_cells_containing / find_cells_by_chosung: cell lookups / 셀 조회
//! - clear: reset / 초기화
//!
//! Cells live in an append-only arena. A removed cell leaves a tombstone, so
//! handles held by the inverted and chosung indices never shift.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use super::jamo::{contains_hangul, extract_chosung};
use super::ranking::{Bm25Okapi, RelevanceModel};
use super::schema::{Cell, CellHandle, RowBatch, RowData, RowKey};
use super::tokenizer::{normalize, tokenize, tokenize_query};

/// String forms that count as an absent value / 무효값
const ABSENT_VALUES: [&str; 4] = ["nan", "None", "NaT", ""];

/// Check if a raw value should be skipped / 무효값 여부
pub fn is_absent(value: &str) -> bool {
    ABSENT_VALUES.contains(&value)
}

/// BM25 corpus state, rebuilt lazily after mutations
struct Bm25State {
    model: Box<dyn RelevanceModel>,
    row_keys: Vec<RowKey>,
    dirty: bool,
}

/// Multi-layer search index / 다중 계층 검색 인덱스
///
/// - inverted index: normalized token -> cell handles (exact/substring)
/// - chosung index: chosung token -> cell handles
/// - vocabulary: live inverted-index keys (fuzzy candidates)
/// - BM25 corpus: one document per row
pub struct SearchIndex {
    /// Cell arena; `None` is a tombstone / 셀 저장소
    cells: Vec<Option<Cell>>,
    /// Row storage / 행 저장소
    rows: HashMap<RowKey, RowData>,
    /// (file path, sheet name) -> headers / 시트별 헤더
    file_headers: HashMap<(String, String), Vec<String>>,
    inverted_index: HashMap<String, HashSet<CellHandle>>,
    chosung_index: HashMap<String, HashSet<CellHandle>>,
    vocabulary: HashSet<String>,
    indexed_files: HashSet<String>,
    /// Files whose import was interrupted / 부분 인덱싱된 파일
    partial_files: HashSet<String>,
    bm25: Mutex<Bm25State>,
}

impl SearchIndex {
    /// Create an empty index ranking rows with Okapi BM25
    pub fn new() -> Self {
        Self::with_relevance(Box::new(Bm25Okapi::new()))
    }

    /// Create an empty index with a specific relevance backend
    pub fn with_relevance(model: Box<dyn RelevanceModel>) -> Self {
        Self {
            cells: Vec::new(),
            rows: HashMap::new(),
            file_headers: HashMap::new(),
            inverted_index: HashMap::new(),
            chosung_index: HashMap::new(),
            vocabulary: HashSet::new(),
            indexed_files: HashSet::new(),
            partial_files: HashSet::new(),
            bm25: Mutex::new(Bm25State {
                model,
                row_keys: Vec::new(),
                dirty: true,
            }),
        }
    }

    /// Arena length, tombstones included
    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn live_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn total_files(&self) -> usize {
        self.indexed_files.len()
    }

    /// Snapshot of indexed file paths / 인덱싱된 파일 목록
    pub fn indexed_files(&self) -> HashSet<String> {
        self.indexed_files.clone()
    }

    pub fn is_indexed(&self, file_path: &str) -> bool {
        self.indexed_files.contains(file_path)
    }

    /// Flag an indexed file as incomplete, so the next import re-reads it
    pub fn mark_partial(&mut self, file_path: &str) {
        if self.indexed_files.contains(file_path) {
            self.partial_files.insert(file_path.to_string());
        }
    }

    pub fn is_partial(&self, file_path: &str) -> bool {
        self.partial_files.contains(file_path)
    }

    /// Get a live cell by handle
    pub fn cell(&self, handle: CellHandle) -> Option<&Cell> {
        self.cells.get(handle).and_then(Option::as_ref)
    }

    /// Iterate over live cells with their handles
    pub fn iter_cells(&self) -> impl Iterator<Item = (CellHandle, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(handle, cell)| cell.as_ref().map(|c| (handle, c)))
    }

    pub fn cell_to_row_key(&self, handle: CellHandle) -> Option<RowKey> {
        self.cell(handle).map(Cell::row_key)
    }

    pub fn row(&self, key: &RowKey) -> Option<&RowData> {
        self.rows.get(key)
    }

    pub fn rows(&self) -> impl Iterator<Item = &RowData> {
        self.rows.values()
    }

    pub fn headers(&self, file_path: &str, sheet_name: &str) -> Option<&Vec<String>> {
        self.file_headers
            .get(&(file_path.to_string(), sheet_name.to_string()))
    }

    /// Headers of every sheet of one file / 파일의 시트별 헤더
    pub fn headers_for_file(&self, file_path: &str) -> HashMap<String, Vec<String>> {
        self.file_headers
            .iter()
            .filter(|((path, _), _)| path == file_path)
            .map(|((_, sheet), headers)| (sheet.clone(), headers.clone()))
            .collect()
    }

    /// Live cells of one file, in arena order / 파일의 셀 목록
    pub fn cells_for_file(&self, file_path: &str) -> Vec<Cell> {
        self.iter_cells()
            .filter(|(_, c)| c.file_path == file_path)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn postings(&self, token: &str) -> Option<&HashSet<CellHandle>> {
        self.inverted_index.get(token)
    }

    pub fn chosung_postings(&self, token: &str) -> Option<&HashSet<CellHandle>> {
        self.chosung_index.get(token)
    }

    pub fn vocabulary(&self) -> &HashSet<String> {
        &self.vocabulary
    }

    pub fn chosung_tokens(&self) -> impl Iterator<Item = &String> {
        self.chosung_index.keys()
    }

    /// Reset to the empty state / 인덱스 초기화
    pub fn clear(&mut self) {
        self.cells.clear();
        self.rows.clear();
        self.file_headers.clear();
        self.inverted_index.clear();
        self.chosung_index.clear();
        self.vocabulary.clear();
        self.indexed_files.clear();
        self.partial_files.clear();

        let mut bm25 = self.bm25.lock();
        bm25.model.rebuild(&[]);
        bm25.row_keys.clear();
        bm25.dirty = true;
    }

    /// Index one batch of rows (primitive operation) / 행 배치 인덱싱
    ///
    /// Row `i` of the batch gets absolute index `row_offset + i`. Absent
    /// values ("nan", "None", "NaT", empty) are skipped, and a row is only
    /// recorded when at least one cell survives.
    pub fn add_row_batch(
        &mut self,
        file_path: &str,
        file_name: &str,
        batch: &RowBatch,
        row_offset: usize,
    ) {
        let header_key = (file_path.to_string(), batch.sheet_name.clone());
        self.file_headers
            .entry(header_key)
            .or_insert_with(|| batch.headers.clone());

        self.indexed_files.insert(file_path.to_string());
        self.bm25.get_mut().dirty = true;

        let mut added_rows = 0usize;
        for (local_idx, values) in batch.rows.iter().enumerate() {
            let row_idx = row_offset + local_idx;
            let mut row = RowData {
                file_path: file_path.to_string(),
                file_name: file_name.to_string(),
                sheet_name: batch.sheet_name.clone(),
                row_idx,
                cells: Vec::new(),
                headers: batch.headers.clone(),
            };

            for (col_idx, col_name) in batch.headers.iter().enumerate() {
                let value = match values.get(col_idx) {
                    Some(Some(v)) if !is_absent(v) => v,
                    _ => continue,
                };

                row.insert(col_name.clone(), value.clone());
                self.push_cell(Cell {
                    file_path: file_path.to_string(),
                    file_name: file_name.to_string(),
                    sheet_name: batch.sheet_name.clone(),
                    row_idx,
                    col_idx,
                    col_name: col_name.clone(),
                    value: value.clone(),
                });
            }

            if !row.cells.is_empty() {
                self.rows.insert(row.key(), row);
                added_rows += 1;
            }
        }

        tracing::debug!(
            "Indexed batch: {} [{}] rows {}..{} ({} kept)",
            file_name,
            batch.sheet_name,
            row_offset,
            row_offset + batch.rows.len(),
            added_rows
        );
    }

    /// Append a cell to the arena and index its tokens
    fn push_cell(&mut self, cell: Cell) -> CellHandle {
        let handle = self.cells.len();

        for token in tokenize(&normalize(&cell.value)) {
            self.vocabulary.insert(token.clone());
            self.inverted_index.entry(token).or_default().insert(handle);
        }

        if contains_hangul(&cell.value) {
            let chosung = extract_chosung(&cell.value).to_lowercase();
            for token in tokenize(&chosung) {
                self.chosung_index.entry(token).or_default().insert(handle);
            }
        }

        self.cells.push(Some(cell));
        handle
    }

    /// Remove every cell, row and header of a file / 파일 제거
    ///
    /// Removed handles are tombstoned in place; no-op when the file has no
    /// live cells (apart from dropping its partial mark).
    pub fn remove_file(&mut self, file_path: &str) {
        self.partial_files.remove(file_path);
        let removed: HashSet<CellHandle> = self
            .iter_cells()
            .filter(|(_, c)| c.file_path == file_path)
            .map(|(handle, _)| handle)
            .collect();
        if removed.is_empty() {
            return;
        }

        let vocabulary = &mut self.vocabulary;
        self.inverted_index.retain(|token, handles| {
            handles.retain(|h| !removed.contains(h));
            if handles.is_empty() {
                vocabulary.remove(token);
                false
            } else {
                true
            }
        });

        self.chosung_index.retain(|_, handles| {
            handles.retain(|h| !removed.contains(h));
            !handles.is_empty()
        });

        for handle in &removed {
            self.cells[*handle] = None;
        }

        self.rows.retain(|key, _| key.file_path != file_path);
        self.file_headers.retain(|(path, _), _| path != file_path);
        self.indexed_files.remove(file_path);
        self.bm25.get_mut().dirty = true;

        tracing::info!("Removed {} cells of {} from index", removed.len(), file_path);
    }

    /// Rebuild the BM25 corpus from live rows / BM25 재구축
    pub fn build_bm25(&self) {
        let mut state = self.bm25.lock();
        self.rebuild_bm25_locked(&mut state);
    }

    fn rebuild_bm25_locked(&self, state: &mut Bm25State) {
        let mut corpus = Vec::with_capacity(self.rows.len());
        let mut row_keys = Vec::with_capacity(self.rows.len());

        for (key, row) in &self.rows {
            corpus.push(tokenize_query(&row.text()));
            row_keys.push(key.clone());
        }

        state.model.rebuild(&corpus);
        state.row_keys = row_keys;
        state.dirty = false;
        tracing::debug!("BM25 corpus rebuilt: {} rows", state.row_keys.len());
    }

    /// BM25 scores per row, strictly positive only / BM25 점수
    pub fn bm25_scores(&self, query: &str) -> HashMap<RowKey, f64> {
        let mut state = self.bm25.lock();
        if state.dirty {
            self.rebuild_bm25_locked(&mut state);
        }
        if state.row_keys.is_empty() {
            return HashMap::new();
        }

        let terms = tokenize_query(query);
        state
            .model
            .scores(&terms)
            .into_iter()
            .zip(state.row_keys.iter())
            .filter(|(score, _)| *score > 0.0)
            .map(|(score, key)| (key.clone(), score))
            .collect()
    }

    pub fn bm25_dirty(&self) -> bool {
        self.bm25.lock().dirty
    }

    /// Cells with a token equal to or containing the keyword / 키워드 포함 셀
    pub fn find_cells_containing(&self, keyword: &str) -> HashSet<CellHandle> {
        let keyword = normalize(keyword);
        if keyword.is_empty() {
            return HashSet::new();
        }

        let mut result = HashSet::new();
        if let Some(handles) = self.inverted_index.get(&keyword) {
            result.extend(handles.iter().copied());
        }

        for (token, handles) in &self.inverted_index {
            if *token != keyword && token.contains(&keyword) {
                result.extend(handles.iter().copied());
            }
        }
        result
    }

    /// Cells whose chosung tokens contain the query / 초성 매칭 셀
    pub fn find_cells_by_chosung(&self, query: &str) -> HashSet<CellHandle> {
        let query = normalize(query);
        if query.is_empty() {
            return HashSet::new();
        }

        let mut result = HashSet::new();
        for (token, handles) in &self.chosung_index {
            if token.contains(&query) {
                result.extend(handles.iter().copied());
            }
        }
        result
    }
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ranking::NoRelevance;

    fn people_batch() -> RowBatch {
        RowBatch::new("Sheet1", vec!["Name".to_string(), "City".to_string()])
            .with_row(["홍길동", "Seoul Gangnam"])
            .with_row(["Kim", "Busan"])
    }

    fn assert_consistent(index: &SearchIndex) {
        for (token, handles) in &index.inverted_index {
            assert!(index.vocabulary.contains(token));
            for h in handles {
                let cell = index.cell(*h).expect("indexed handle must be live");
                assert!(tokenize(&normalize(&cell.value)).contains(token));
            }
        }
        for handles in index.chosung_index.values() {
            for h in handles {
                assert!(index.cell(*h).is_some());
            }
        }
        assert_eq!(index.vocabulary.len(), index.inverted_index.len());
    }

    #[test]
    fn test_add_row_batch() {
        let mut index = SearchIndex::new();
        index.add_row_batch("/data/people.xlsx", "people.xlsx", &people_batch(), 0);

        assert_eq!(index.total_cells(), 4);
        assert_eq!(index.total_rows(), 2);
        assert_eq!(index.total_files(), 1);
        assert!(index.postings("seoul gangnam").is_some());
        assert!(index.postings("gangnam").is_some());
        assert!(index.postings("홍길동").is_some());
        assert!(index.chosung_postings("ㅎㄱㄷ").is_some());

        let row = index.row(&RowKey::new("/data/people.xlsx", "Sheet1", 1)).unwrap();
        assert_eq!(row.get("Name"), Some("Kim"));
        assert_consistent(&index);
    }

    #[test]
    fn test_row_offset_and_absent_values() {
        let mut index = SearchIndex::new();
        let mut batch = RowBatch::new("S", vec!["A".to_string(), "B".to_string()]);
        batch.rows.push(vec![Some("nan".to_string()), None]);
        batch.rows.push(vec![Some("x".to_string()), Some("NaT".to_string())]);
        batch.rows.push(vec![Some("".to_string()), Some("None".to_string())]);
        index.add_row_batch("/f.csv", "f.csv", &batch, 100);

        assert_eq!(index.total_rows(), 1);
        assert_eq!(index.total_cells(), 1);
        let row = index.row(&RowKey::new("/f.csv", "S", 101)).unwrap();
        assert_eq!(row.cells, vec![("A".to_string(), "x".to_string())]);
        assert!(index.row(&RowKey::new("/f.csv", "S", 100)).is_none());
    }

    #[test]
    fn test_headers_first_batch_wins() {
        let mut index = SearchIndex::new();
        let first = RowBatch::new("S", vec!["A".to_string()]).with_row(["1"]);
        let second = RowBatch::new("S", vec!["B".to_string()]).with_row(["2"]);
        index.add_row_batch("/f.csv", "f.csv", &first, 0);
        index.add_row_batch("/f.csv", "f.csv", &second, 1);
        assert_eq!(index.headers("/f.csv", "S"), Some(&vec!["A".to_string()]));
    }

    #[test]
    fn test_remove_file_leaves_no_trace() {
        let mut index = SearchIndex::new();
        index.add_row_batch("/data/people.xlsx", "people.xlsx", &people_batch(), 0);
        let other = RowBatch::new("Main", vec!["Item".to_string()]).with_row(["Seoul tower"]);
        index.add_row_batch("/data/other.csv", "other.csv", &other, 0);

        index.remove_file("/data/people.xlsx");

        assert!(!index.is_indexed("/data/people.xlsx"));
        assert!(index.is_indexed("/data/other.csv"));
        assert!(index.postings("gangnam").is_none());
        assert!(!index.vocabulary().contains("gangnam"));
        assert!(index.chosung_postings("ㅎㄱㄷ").is_none());
        assert!(index.headers("/data/people.xlsx", "Sheet1").is_none());
        assert!(index.rows().all(|r| r.file_path != "/data/people.xlsx"));
        assert!(index.iter_cells().all(|(_, c)| c.file_path != "/data/people.xlsx"));

        // shared token survives for the remaining file
        assert_eq!(index.postings("seoul").map(|h| h.len()), Some(1));
        // arena is tombstoned, not compacted
        assert_eq!(index.total_cells(), 5);
        assert_eq!(index.live_cells(), 1);
        assert!(index.cell(0).is_none());
        assert!(index.cell(4).is_some());
        assert_consistent(&index);
    }

    #[test]
    fn test_remove_unknown_file_is_noop() {
        let mut index = SearchIndex::new();
        index.add_row_batch("/a.csv", "a.csv", &people_batch(), 0);
        index.build_bm25();
        index.remove_file("/missing.csv");
        assert!(!index.bm25_dirty());
        assert_eq!(index.total_files(), 1);
    }

    #[test]
    fn test_partial_mark_follows_file() {
        let mut index = SearchIndex::new();
        index.mark_partial("/a.csv");
        assert!(!index.is_partial("/a.csv"), "only indexed files can be partial");

        index.add_row_batch("/a.csv", "a.csv", &people_batch(), 0);
        index.add_row_batch("/b.csv", "b.csv", &people_batch(), 0);
        index.mark_partial("/a.csv");
        index.mark_partial("/b.csv");
        assert!(index.is_partial("/a.csv"));

        index.remove_file("/a.csv");
        assert!(!index.is_partial("/a.csv"));
        assert!(index.is_partial("/b.csv"));

        index.clear();
        assert!(!index.is_partial("/b.csv"));
    }

    #[test]
    fn test_handles_not_reused_after_remove() {
        let mut index = SearchIndex::new();
        index.add_row_batch("/a.csv", "a.csv", &people_batch(), 0);
        index.remove_file("/a.csv");
        index.add_row_batch("/b.csv", "b.csv", &people_batch(), 0);
        let handles = index.postings("kim").unwrap();
        assert_eq!(handles.iter().copied().collect::<Vec<_>>(), vec![6]);
    }

    #[test]
    fn test_find_cells_containing() {
        let mut index = SearchIndex::new();
        index.add_row_batch("/a.csv", "a.csv", &people_batch(), 0);

        let hits = index.find_cells_containing("GANG");
        assert_eq!(hits.len(), 1);
        let hits = index.find_cells_containing("kim");
        assert_eq!(hits.len(), 1);
        assert!(index.find_cells_containing("   ").is_empty());
        assert!(index.find_cells_containing("daegu").is_empty());
    }

    #[test]
    fn test_find_cells_by_chosung() {
        let mut index = SearchIndex::new();
        index.add_row_batch("/a.csv", "a.csv", &people_batch(), 0);
        assert_eq!(index.find_cells_by_chosung("ㄱㄷ").len(), 1);
        assert!(index.find_cells_by_chosung("ㅂㅅ").is_empty());
    }

    #[test]
    fn test_bm25_lazy_rebuild() {
        let mut index = SearchIndex::new();
        let batch = RowBatch::new("S", vec!["Text".to_string()])
            .with_row(["seoul gangnam"])
            .with_row(["busan haeundae"])
            .with_row(["daegu suseong"]);
        index.add_row_batch("/a.csv", "a.csv", &batch, 0);
        assert!(index.bm25_dirty());

        let scores = index.bm25_scores("Gangnam");
        assert!(!index.bm25_dirty());
        assert_eq!(scores.len(), 1);
        assert!(scores.contains_key(&RowKey::new("/a.csv", "S", 0)));

        index.remove_file("/a.csv");
        assert!(index.bm25_dirty());
        assert!(index.bm25_scores("gangnam").is_empty());
    }

    #[test]
    fn test_bm25_unavailable() {
        let mut index = SearchIndex::with_relevance(Box::new(NoRelevance));
        index.add_row_batch("/a.csv", "a.csv", &people_batch(), 0);
        assert!(index.bm25_scores("kim").is_empty());
    }

    #[test]
    fn test_clear() {
        let mut index = SearchIndex::new();
        index.add_row_batch("/a.csv", "a.csv", &people_batch(), 0);
        index.clear();
        assert_eq!(index.total_cells(), 0);
        assert_eq!(index.total_rows(), 0);
        assert_eq!(index.total_files(), 0);
        assert!(index.vocabulary().is_empty());
        assert!(index.bm25_scores("kim").is_empty());
    }

    #[test]
    fn test_file_snapshots() {
        let mut index = SearchIndex::new();
        index.add_row_batch("/a.csv", "a.csv", &people_batch(), 0);
        let cells = index.cells_for_file("/a.csv");
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[0].value, "홍길동");
        let headers = index.headers_for_file("/a.csv");
        assert_eq!(headers.get("Sheet1").map(Vec::len), Some(2));
    }
}
