//! Tokenization and Unicode normalization shared by every C1 pass.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#[\w\-]+|\w+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Hashtag(String),
    Word(String),
}

/// Splits content into hashtag and word tokens, Unicode-aware, left to right.
pub fn tokenize(content: &str) -> Vec<Token> {
    TOKEN_RE
        .find_iter(content)
        .map(|m| {
            let raw = m.as_str();
            if let Some(tag) = raw.strip_prefix('#') {
                Token::Hashtag(format!("#{tag}"))
            } else {
                Token::Word(raw.to_string())
            }
        })
        .collect()
}

/// Lowercase, NFKD-decompose, then drop combining marks.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// [`normalize`] plus whitespace collapsed to single spaces and trimmed,
/// used for whole-content phrase matching.
pub fn normalize_single_spaced(s: &str) -> String {
    normalize(s).split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_employee(user_id: &str) -> bool {
    normalize(user_id).contains("mbras")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_separates_hashtags_from_words() {
        let tokens = tokenize("adorei produto #produto-novo!");
        assert_eq!(
            tokens,
            vec![
                Token::Word("adorei".into()),
                Token::Word("produto".into()),
                Token::Hashtag("#produto-novo".into()),
            ]
        );
    }

    #[test]
    fn normalize_strips_accents_and_lowercases() {
        assert_eq!(normalize("TÉCNICO"), "tecnico");
    }

    #[test]
    fn normalize_single_spaced_collapses_whitespace() {
        assert_eq!(normalize_single_spaced("teste   técnico\tmbras"), "teste tecnico mbras");
    }

    #[test]
    fn employee_detection_matches_substring() {
        assert!(is_employee("team_mbras_07"));
        assert!(!is_employee("user_abc123"));
    }
}
