//! Hangul jamo utilities / 한글 자모 분해
//!
//! Pure Unicode arithmetic over the precomposed syllable block, used for
//! chosung (initial consonant) indexing and matching:
//! - decompose a syllable into (cho, jung, jong) indices
//! - extract the chosung form of a string, keeping non-Hangul text verbatim
//! - detect chosung-only queries

/// First precomposed syllable ('가') / 첫 음절
pub const HANGUL_BASE: u32 = 0xAC00;
/// Last precomposed syllable ('힣') / 마지막 음절
pub const HANGUL_END: u32 = 0xD7A3;

/// Number of medial vowels / 중성 개수
pub const JUNG_COUNT: u32 = 21;
/// Number of finals, including "no final" / 종성 개수
pub const JONG_COUNT: u32 = 28;

/// Initial consonants in Unicode order / 초성 목록
pub const CHO_LIST: [char; 19] = [
    'ㄱ', 'ㄲ', 'ㄴ', 'ㄷ', 'ㄸ', 'ㄹ', 'ㅁ', 'ㅂ', 'ㅃ',
    'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅉ', 'ㅊ', 'ㅋ', 'ㅌ', 'ㅍ', 'ㅎ',
];

/// Check if a char is a precomposed Hangul syllable / 완성형 음절 여부
pub fn is_hangul_syllable(c: char) -> bool {
    (HANGUL_BASE..=HANGUL_END).contains(&(c as u32))
}

/// Check if a char is a standalone initial consonant / 단독 초성 여부
pub fn is_chosung_char(c: char) -> bool {
    CHO_LIST.contains(&c)
}

/// Check if text contains any Hangul syllable / 한글 음절 포함 여부
pub fn contains_hangul(text: &str) -> bool {
    text.chars().any(is_hangul_syllable)
}

/// Decompose a syllable into (cho, jung, jong) indices / 음절 분해
///
/// Returns `None` for anything outside the syllable block.
pub fn decompose(c: char) -> Option<(usize, usize, usize)> {
    if !is_hangul_syllable(c) {
        return None;
    }
    let code = c as u32 - HANGUL_BASE;
    let cho = code / (JUNG_COUNT * JONG_COUNT);
    let jung = (code % (JUNG_COUNT * JONG_COUNT)) / JONG_COUNT;
    let jong = code % JONG_COUNT;
    Some((cho as usize, jung as usize, jong as usize))
}

/// Recompose (cho, jung, jong) indices back into a syllable / 음절 조합
pub fn compose(cho: usize, jung: usize, jong: usize) -> Option<char> {
    if cho >= CHO_LIST.len() || jung >= JUNG_COUNT as usize || jong >= JONG_COUNT as usize {
        return None;
    }
    let code = HANGUL_BASE
        + (cho as u32) * JUNG_COUNT * JONG_COUNT
        + (jung as u32) * JONG_COUNT
        + jong as u32;
    char::from_u32(code)
}

/// Extract the chosung form of text / 초성 추출
///
/// Example: "홍길동" -> "ㅎㄱㄷ", "Hello홍" -> "Helloㅎ"
pub fn extract_chosung(text: &str) -> String {
    text.chars()
        .map(|c| match decompose(c) {
            Some((cho, _, _)) => CHO_LIST[cho],
            None => c,
        })
        .collect()
}

/// Check whether a query consists only of initial consonants / 초성 쿼리 여부
///
/// Spaces are ignored; empty or whitespace-only input is not a chosung query.
pub fn is_chosung_query(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    text.chars().filter(|c| *c != ' ').all(is_chosung_char)
}

/// Check whether the query is a contiguous part of the text's chosung form
pub fn match_chosung(query: &str, text: &str) -> bool {
    if query.is_empty() || text.is_empty() {
        return false;
    }
    extract_chosung(text).contains(query)
}

/// Chosung similarity in [0, 1] / 초성 유사도
///
/// 1.0 on exact equality, `0.8 + 0.2 * coverage` when the query is a
/// substring of the chosung form, otherwise 0.0.
pub fn chosung_similarity(query: &str, text: &str) -> f64 {
    if query.is_empty() || text.is_empty() {
        return 0.0;
    }
    let text_chosung = extract_chosung(text);
    if query == text_chosung {
        return 1.0;
    }
    if text_chosung.contains(query) {
        let coverage = query.chars().count() as f64 / text_chosung.chars().count() as f64;
        return 0.8 + coverage * 0.2;
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_roundtrip() {
        for code in HANGUL_BASE..=HANGUL_END {
            let c = char::from_u32(code).unwrap();
            let (cho, jung, jong) = decompose(c).unwrap();
            assert_eq!(compose(cho, jung, jong), Some(c));
        }
        assert_eq!(decompose('a'), None);
        assert_eq!(decompose('ㄱ'), None);
    }

    #[test]
    fn test_decompose_known() {
        // 한 = ㅎ + ㅏ + ㄴ
        assert_eq!(decompose('한'), Some((18, 0, 4)));
        assert_eq!(decompose('가'), Some((0, 0, 0)));
    }

    #[test]
    fn test_extract_chosung() {
        assert_eq!(extract_chosung("홍길동"), "ㅎㄱㄷ");
        assert_eq!(extract_chosung("Hello홍"), "Helloㅎ");
        assert_eq!(extract_chosung("서울 2024"), "ㅅㅇ 2024");
        assert_eq!(extract_chosung(""), "");
    }

    #[test]
    fn test_is_chosung_query() {
        assert!(is_chosung_query("ㅎㄱㄷ"));
        assert!(is_chosung_query("ㅎㄱ ㄷ"));
        assert!(!is_chosung_query("ㅎ길ㄷ"));
        assert!(!is_chosung_query("abc"));
        assert!(!is_chosung_query(""));
        assert!(!is_chosung_query("   "));
    }

    #[test]
    fn test_match_chosung() {
        assert!(match_chosung("ㅎㄱㄷ", "홍길동입니다"));
        assert!(match_chosung("ㅎㄱ", "한강"));
        assert!(!match_chosung("ㄱㅎ", "한강"));
        assert!(!match_chosung("", "한강"));
    }

    #[test]
    fn test_chosung_similarity() {
        assert_eq!(chosung_similarity("ㅎㄱㄷ", "홍길동"), 1.0);
        let partial = chosung_similarity("ㅎㄱ", "홍길동");
        assert!((partial - (0.8 + 0.2 * 2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(chosung_similarity("ㅅㅇ", "홍길동"), 0.0);
    }
}
