//! Cell tokenizer / 셀 토크나이저
//!
//! Tokens are produced from already-normalized (lowercased, trimmed) text:
//! - the whole string, so a full-value match is a single lookup
//! - every piece between punctuation/whitespace delimiters

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Delimiters between word pieces / 구분자
static DELIMITERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[\s,;|/\\()\[\]{}<>:"']+"#).expect("delimiter pattern is valid")
});

/// Tokenize normalized text into a set of search tokens / 토큰 분리
pub fn tokenize(text: &str) -> HashSet<String> {
    let mut tokens = HashSet::new();
    if text.is_empty() {
        return tokens;
    }

    tokens.insert(text.to_string());
    for word in DELIMITERS.split(text) {
        let word = word.trim();
        if !word.is_empty() {
            tokens.insert(word.to_string());
        }
    }
    tokens
}

/// Normalize a cell value before tokenizing / 정규화
pub fn normalize(text: &str) -> String {
    text.to_lowercase().trim().to_string()
}

/// Split a ranking query into lowercase whitespace terms / 쿼리 분리
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
