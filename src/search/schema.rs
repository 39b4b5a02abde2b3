//! Search index schema definition / 검색 인덱스 스키마

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cell handle - stable position in the cell arena / 셀 핸들
pub type CellHandle = usize;

/// One non-empty spreadsheet value / 셀 정보
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Owning file path / 파일 경로
    pub file_path: String,
    /// File display name / 파일명
    pub file_name: String,
    /// Sheet name / 시트명
    pub sheet_name: String,
    /// Zero-based row index / 행 번호
    pub row_idx: usize,
    /// Zero-based column index / 열 번호
    pub col_idx: usize,
    /// Column header / 열 이름
    pub col_name: String,
    /// Raw string value / 값
    pub value: String,
}

impl Cell {
    pub fn row_key(&self) -> RowKey {
        RowKey::new(&self.file_path, &self.sheet_name, self.row_idx)
    }
}

/// Row key - (file path, sheet name, row index) / 행 키
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    pub file_path: String,
    pub sheet_name: String,
    pub row_idx: usize,
}

impl RowKey {
    pub fn new(file_path: &str, sheet_name: &str, row_idx: usize) -> Self {
        Self {
            file_path: file_path.to_string(),
            sheet_name: sheet_name.to_string(),
            row_idx,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_path, self.sheet_name, self.row_idx)
    }
}

/// Row data - non-empty cells sharing one row key / 행 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowData {
    pub file_path: String,
    pub file_name: String,
    pub sheet_name: String,
    pub row_idx: usize,
    /// Column name -> value, in column order / 열 이름 -> 값
    pub cells: Vec<(String, String)>,
    /// Ordered headers of the sheet / 시트 헤더
    pub headers: Vec<String>,
}

impl RowData {
    pub fn key(&self) -> RowKey {
        RowKey::new(&self.file_path, &self.sheet_name, self.row_idx)
    }

    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Insert a value, replacing an earlier value of the same column
    pub fn insert(&mut self, column: String, value: String) {
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    /// Space-joined lowercase cell values / 행 텍스트
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .map(|(_, value)| value.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// One batch of rows from the file reader / 행 배치
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    pub sheet_name: String,
    pub headers: Vec<String>,
    /// Row values in header order; `None` is an absent value
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowBatch {
    pub fn new(sheet_name: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            headers,
            rows: Vec::new(),
        }
    }

    pub fn with_row<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows
            .push(values.into_iter().map(|v| Some(v.into())).collect());
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Which layer produced a match / 매칭 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Chosung,
    Fuzzy,
    Range,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Chosung => "chosung",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Range => "range",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contributing cell match / 매칭 상세
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetail {
    pub col_name: String,
    pub cell_value: String,
    pub match_type: MatchType,
    /// 0.0 ~ 1.0
    pub similarity: f64,
}

/// Ranked search result (one per row) / 검색 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRow {
    pub row: RowData,
    /// Aggregate score / 종합 점수
    pub score: f64,
    /// Match type of the best similarity seen
    pub match_type: MatchType,
    /// Best similarity seen
    pub similarity: f64,
    pub matches: Vec<MatchDetail>,
}

/// Search query options / 검색 옵션
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Raw query text / 검색어
    pub query: String,
    /// Fuzzy cutoff, 0.0 ~ 1.0 / 퍼지 최소 유사도
    pub min_similarity: f64,
    /// Maximum number of rows returned / 최대 결과 수
    pub limit: usize,
    /// Enable the fuzzy layer / 퍼지 매칭 사용
    pub fuzzy: bool,
    /// Vocabulary candidates kept per keyword
    pub fuzzy_candidates: usize,
}

impl SearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            min_similarity: 0.6,
            limit: 500,
            fuzzy: true,
            fuzzy_candidates: 50,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f64) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn with_fuzzy_candidates(mut self, candidates: usize) -> Self {
        self.fuzzy_candidates = candidates;
        self
    }

    pub fn fuzzy(mut self, enabled: bool) -> Self {
        self.fuzzy = enabled;
        self
    }
}
