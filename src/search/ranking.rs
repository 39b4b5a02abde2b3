//! Ranking backends / 랭킹 백엔드
//!
//! Fuzzy matching and BM25 are optional capabilities. Each sits behind a
//! trait with a pass-through implementation, so the searcher never branches
//! on whether a backend exists.

use std::collections::{BTreeSet, HashMap};

/// Fuzzy string similarity on a 0-100 scale / 퍼지 유사도
pub trait FuzzyMatcher: Send + Sync {
    /// Whether this matcher produces any candidates at all
    fn enabled(&self) -> bool {
        true
    }

    /// Similarity of `candidate` to `query`, 0.0 ~ 100.0
    fn similarity(&self, query: &str, candidate: &str) -> f64;
}

/// Weighted ratio over Indel similarity / 가중 유사도
///
/// Indel similarity is `2 * LCS / (len_a + len_b)`. Strings of similar length
/// are scored whole and by their sorted/shared word tokens (scaled by 0.95).
/// When one string is at least 1.5 times longer, the best aligned window of
/// the longer string is scored too, scaled by 0.9 (0.6 once the length ratio
/// reaches 8).
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedRatio;

const UNBASE_SCALE: f64 = 0.95;

/// Length of the longest common subsequence
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Indel similarity, 0.0 ~ 100.0
fn indel_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    indel_ratio(&a, &b)
}

/// Best Indel similarity of `shorter` against any alignment inside `longer`,
/// including windows cut off at either end
fn partial_ratio(shorter: &[char], longer: &[char]) -> f64 {
    let n = shorter.len();
    if n == 0 || longer.len() <= n {
        return indel_ratio(shorter, longer);
    }

    let len = longer.len();
    let prefixes = (1..n).map(|end| &longer[..end]);
    let windows = (0..=len - n).map(|start| &longer[start..start + n]);
    let suffixes = (len - n + 1..len).map(|start| &longer[start..]);

    let mut best = 0.0f64;
    for window in prefixes.chain(windows).chain(suffixes) {
        best = best.max(indel_ratio(shorter, window));
        if best >= 100.0 {
            break;
        }
    }
    best
}

fn sorted_tokens(text: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens
}

fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a).join(" "), &sorted_tokens(b).join(" "))
}

fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let sect: Vec<&str> = ta.intersection(&tb).copied().collect();
    let diff_ab: Vec<&str> = ta.difference(&tb).copied().collect();
    let diff_ba: Vec<&str> = tb.difference(&ta).copied().collect();
    if !sect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let diff_ab = diff_ab.join(" ");
    let diff_ba = diff_ba.join(" ");
    let mut best = ratio(&diff_ab, &diff_ba);
    if sect.is_empty() {
        return best;
    }

    let sect = sect.join(" ");
    let sect_ab = format!("{} {}", sect, diff_ab);
    let sect_ba = format!("{} {}", sect, diff_ba);
    best = best.max(ratio(&sect_ab, &sect_ba));
    best = best.max(ratio(&sect, &sect_ab));
    best.max(ratio(&sect, &sect_ba))
}

fn partial_token_ratio(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    if !ta.is_disjoint(&tb) {
        return 100.0;
    }

    let sa: Vec<char> = sorted_tokens(a).join(" ").chars().collect();
    let sb: Vec<char> = sorted_tokens(b).join(" ").chars().collect();
    if sa.len() <= sb.len() {
        partial_ratio(&sa, &sb)
    } else {
        partial_ratio(&sb, &sa)
    }
}

impl FuzzyMatcher for WeightedRatio {
    fn similarity(&self, query: &str, candidate: &str) -> f64 {
        let q: Vec<char> = query.chars().collect();
        let c: Vec<char> = candidate.chars().collect();
        if q.is_empty() || c.is_empty() {
            return 0.0;
        }

        let score = indel_ratio(&q, &c);
        let len_ratio = q.len().max(c.len()) as f64 / q.len().min(c.len()) as f64;
        if len_ratio < 1.5 {
            let token_ratio = token_sort_ratio(query, candidate).max(token_set_ratio(query, candidate));
            return score.max(token_ratio * UNBASE_SCALE);
        }

        let scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
        let (shorter, longer) = if q.len() <= c.len() { (&q, &c) } else { (&c, &q) };
        let score = score.max(partial_ratio(shorter, longer) * scale);
        score.max(partial_token_ratio(query, candidate) * UNBASE_SCALE * scale)
    }
}

/// Disabled fuzzy layer / 퍼지 비활성
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFuzzy;

impl FuzzyMatcher for NoFuzzy {
    fn enabled(&self) -> bool {
        false
    }

    fn similarity(&self, _query: &str, _candidate: &str) -> f64 {
        0.0
    }
}

/// Relevance model over a corpus of tokenized documents / 관련도 모델
pub trait RelevanceModel: Send + Sync {
    /// Replace the corpus and recompute statistics
    fn rebuild(&mut self, corpus: &[Vec<String>]);

    /// One score per document, in corpus order. Empty when unavailable.
    fn scores(&self, query: &[String]) -> Vec<f64>;
}

/// Okapi BM25 / BM25 랭킹
#[derive(Debug, Clone)]
pub struct Bm25Okapi {
    k1: f64,
    b: f64,
    epsilon: f64,
    avgdl: f64,
    doc_len: Vec<usize>,
    doc_freqs: Vec<HashMap<String, usize>>,
    idf: HashMap<String, f64>,
}

impl Bm25Okapi {
    pub fn new() -> Self {
        Self::with_params(1.5, 0.75, 0.25)
    }

    pub fn with_params(k1: f64, b: f64, epsilon: f64) -> Self {
        Self {
            k1,
            b,
            epsilon,
            avgdl: 0.0,
            doc_len: Vec::new(),
            doc_freqs: Vec::new(),
            idf: HashMap::new(),
        }
    }

    pub fn corpus_size(&self) -> usize {
        self.doc_len.len()
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }
}

impl Default for Bm25Okapi {
    fn default() -> Self {
        Self::new()
    }
}

impl RelevanceModel for Bm25Okapi {
    fn rebuild(&mut self, corpus: &[Vec<String>]) {
        self.doc_len.clear();
        self.doc_freqs.clear();
        self.idf.clear();

        let mut nd: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for document in corpus {
            self.doc_len.push(document.len());
            total_len += document.len();

            let mut frequencies: HashMap<String, usize> = HashMap::new();
            for word in document {
                *frequencies.entry(word.clone()).or_default() += 1;
            }
            for word in frequencies.keys() {
                *nd.entry(word.clone()).or_default() += 1;
            }
            self.doc_freqs.push(frequencies);
        }

        let corpus_size = corpus.len() as f64;
        self.avgdl = if corpus.is_empty() {
            0.0
        } else {
            total_len as f64 / corpus_size
        };

        // Terms present in more than half the corpus get a negative IDF;
        // they are floored to epsilon * average IDF.
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (term, freq) in nd {
            let freq = freq as f64;
            let idf = (corpus_size - freq + 0.5).ln() - (freq + 0.5).ln();
            idf_sum += idf;
            if idf < 0.0 {
                negative.push(term.clone());
            }
            self.idf.insert(term, idf);
        }

        if !self.idf.is_empty() {
            let eps = self.epsilon * idf_sum / self.idf.len() as f64;
            for term in negative {
                self.idf.insert(term, eps);
            }
        }
    }

    fn scores(&self, query: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.doc_len.len()];
        if scores.is_empty() {
            return scores;
        }

        let avgdl = if self.avgdl > 0.0 { self.avgdl } else { 1.0 };
        for term in query {
            let idf = self.idf.get(term).copied().unwrap_or(0.0);
            if idf == 0.0 {
                continue;
            }
            for (i, freqs) in self.doc_freqs.iter().enumerate() {
                let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let dl = self.doc_len[i] as f64;
                let norm = tf + self.k1 * (1.0 - self.b + self.b * dl / avgdl);
                scores[i] += idf * (tf * (self.k1 + 1.0)) / norm;
            }
        }
        scores
    }
}

/// Disabled relevance layer / 랭킹 비활성
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRelevance;

impl RelevanceModel for NoRelevance {
    fn rebuild(&mut self, _corpus: &[Vec<String>]) {}

    fn scores(&self, _query: &[String]) -> Vec<f64> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_weighted_ratio_identity() {
        let m = WeightedRatio;
        assert_eq!(m.similarity("seoul", "seoul"), 100.0);
        assert_eq!(m.similarity("", "seoul"), 0.0);
    }

    #[test]
    fn test_weighted_ratio_typo() {
        let m = WeightedRatio;
        let score = m.similarity("seoul", "seoull");
        assert!(score > 80.0 && score < 100.0, "score = {}", score);
        assert!(m.similarity("seoul", "busan") < 60.0);
    }

    #[test]
    fn test_weighted_ratio_indel_values() {
        let m = WeightedRatio;
        // deletion and insertion typos: 2 * LCS / total length
        assert!((m.similarity("gangnm", "gangnam") - 92.3077).abs() < 1e-3);
        assert!((m.similarity("seol", "seoul") - 88.8889).abs() < 1e-3);
        // length ratio 1.5 switches to window scoring: 100 * 0.9
        assert!((m.similarity("서울시", "서울") - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_ratio_token_order() {
        let m = WeightedRatio;
        // same words in another order: token sort ratio scaled by 0.95
        let score = m.similarity("gangnam seoul", "seoul gangnam");
        assert!((score - 95.0).abs() < 1e-9, "score = {}", score);
    }

    #[test]
    fn test_partial_ratio_edge_windows() {
        let short: Vec<char> = "nam".chars().collect();
        let long: Vec<char> = "amxxxxxxxx".chars().collect();
        // "am" at the very start only matches as a cut-off window
        assert!((partial_ratio(&short, &long) - 80.0).abs() < 1e-9);
        assert_eq!(lcs_len(&short, &long), 2);
    }

    #[test]
    fn test_weighted_ratio_partial() {
        let m = WeightedRatio;
        // "gangnam" is a window of the longer token
        let score = m.similarity("gangnam", "gangnam-gu office");
        assert!((score - 90.0).abs() < 1e-9, "score = {}", score);
    }

    #[test]
    fn test_no_fuzzy() {
        assert!(!NoFuzzy.enabled());
        assert_eq!(NoFuzzy.similarity("a", "a"), 0.0);
    }

    #[test]
    fn test_bm25_scores() {
        let mut bm25 = Bm25Okapi::new();
        bm25.rebuild(&[
            doc("seoul gangnam apartment"),
            doc("busan haeundae beach"),
            doc("daegu suseong lake"),
            doc("incheon songdo park"),
        ]);
        assert_eq!(bm25.corpus_size(), 4);

        let scores = bm25.scores(&["gangnam".to_string()]);
        assert_eq!(scores.len(), 4);
        assert!(scores[0] > 0.0);
        assert_eq!(scores[1], 0.0);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn test_bm25_unknown_term() {
        let mut bm25 = Bm25Okapi::new();
        bm25.rebuild(&[doc("a b"), doc("c d")]);
        assert!(bm25.scores(&["zzz".to_string()]).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_bm25_empty_corpus() {
        let mut bm25 = Bm25Okapi::new();
        bm25.rebuild(&[]);
        assert!(bm25.scores(&["a".to_string()]).is_empty());
    }

    #[test]
    fn test_no_relevance() {
        let mut model = NoRelevance;
        model.rebuild(&[doc("a")]);
        assert!(model.scores(&["a".to_string()]).is_empty());
    }
}
