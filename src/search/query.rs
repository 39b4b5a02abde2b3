//! Query parser / 쿼리 파서
//!
//! Rules:
//! - whitespace separates terms; plain terms are AND keywords
//! - `-term` excludes rows containing `term`
//! - `min~max` or `min-max` is a numeric range (bounds swapped if reversed)

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Numeric range token, e.g. 100~500, 1.5-2.5 / 숫자 범위 패턴
static RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*[~\-]\s*([0-9]+(?:\.[0-9]+)?)$")
        .expect("range pattern is valid")
});

/// Parsed search query / 파싱된 검색 쿼리
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// AND keywords / 일반 검색어
    pub keywords: Vec<String>,
    /// Exclude terms, without the leading '-' / 제외 검색어
    pub excludes: Vec<String>,
    /// Inclusive numeric ranges (min, max) / 숫자 범위
    pub ranges: Vec<(f64, f64)>,
    /// Original query string / 원본 검색어
    pub raw: String,
}

impl SearchQuery {
    /// Nothing to match on (excludes alone select nothing)
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.ranges.is_empty()
    }
}

/// Parse a raw query string / 검색어 파싱
pub fn parse(raw_query: &str) -> SearchQuery {
    let mut query = SearchQuery {
        raw: raw_query.to_string(),
        ..Default::default()
    };

    for token in raw_query.split_whitespace() {
        if let Some(term) = token.strip_prefix('-') {
            if !term.is_empty() {
                query.excludes.push(term.to_string());
                continue;
            }
        }

        if let Some(range) = parse_range(token) {
            query.ranges.push(range);
            continue;
        }

        query.keywords.push(token.to_string());
    }

    query
}

fn parse_range(token: &str) -> Option<(f64, f64)> {
    let caps = RANGE_PATTERN.captures(token)?;
    let min: f64 = caps.get(1)?.as_str().parse().ok()?;
    let max: f64 = caps.get(2)?.as_str().parse().ok()?;
    if min > max {
        Some((max, min))
    } else {
        Some((min, max))
    }
}
