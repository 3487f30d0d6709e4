//! Per-message sentiment scoring: negation windows, intensifier scope and
//! the employee polarity bonus.

use super::lexicon;
use super::text::{self, Token};
use super::types::SentimentLabel;

pub struct ScoredMessage {
    pub label: SentimentLabel,
    pub score: f64,
    pub is_meta: bool,
}

pub fn score_message(content: &str, is_employee: bool) -> ScoredMessage {
    let single_spaced = text::normalize_single_spaced(content);
    if single_spaced == lexicon::META_PHRASE {
        return ScoredMessage { label: SentimentLabel::Meta, score: 0.0, is_meta: true };
    }

    let words: Vec<String> = text::tokenize(content)
        .into_iter()
        .filter_map(|t| match t {
            Token::Word(w) => Some(text::normalize(&w)),
            Token::Hashtag(_) => None,
        })
        .collect();

    if words.is_empty() {
        return ScoredMessage { label: SentimentLabel::Neutral, score: 0.0, is_meta: false };
    }

    let mut negation_marks = vec![0u32; words.len()];
    for (i, word) in words.iter().enumerate() {
        if lexicon::NEGATIONS.contains(&word.as_str()) {
            let end = (i + lexicon::NEGATION_WINDOW).min(words.len() - 1);
            for mark in negation_marks.iter_mut().take(end + 1).skip(i + 1) {
                *mark += 1;
            }
        }
    }

    let mut pending_intensifier = false;
    let mut score_sum = 0.0;
    let mut polar_count = 0u32;

    for (i, word) in words.iter().enumerate() {
        if lexicon::INTENSIFIERS.contains(&word.as_str()) {
            pending_intensifier = true;
            continue;
        }
        if lexicon::NEGATIONS.contains(&word.as_str()) {
            continue;
        }

        let base = if lexicon::POSITIVE.contains(&word.as_str()) {
            1.0
        } else if lexicon::NEGATIVE.contains(&word.as_str()) {
            -1.0
        } else {
            continue;
        };

        let mut value = base;
        if pending_intensifier {
            value *= lexicon::INTENSIFIER_MULTIPLIER;
            pending_intensifier = false;
        }
        if negation_marks[i] % 2 == 1 {
            value *= -1.0;
        }
        if is_employee && base > 0.0 {
            value *= lexicon::EMPLOYEE_BONUS_MULTIPLIER;
        }

        score_sum += value;
        polar_count += 1;
    }

    if polar_count == 0 {
        return ScoredMessage { label: SentimentLabel::Neutral, score: 0.0, is_meta: false };
    }

    let score = score_sum / polar_count as f64;
    let label = if score > 0.1 {
        SentimentLabel::Positive
    } else if score < -0.1 {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };
    ScoredMessage { label, score, is_meta: false }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_positive_word_scores_positive() {
        let result = score_message("adorei o produto", false);
        assert_eq!(result.label, SentimentLabel::Positive);
    }

    #[test]
    fn negation_flips_polarity_within_window() {
        let result = score_message("nao gostei do produto", false);
        assert_eq!(result.label, SentimentLabel::Negative);
    }

    #[test]
    fn negation_outside_window_does_not_flip() {
        let result = score_message("nao muito muito muito gostei", false);
        // "gostei" sits 4 tokens after "nao" (outside the 3-token window).
        assert_eq!(result.label, SentimentLabel::Positive);
    }

    #[test]
    fn intensifier_amplifies_next_polar_word() {
        let plain = score_message("bom", false);
        let amplified = score_message("muito bom", false);
        assert!(amplified.score > plain.score);
    }

    #[test]
    fn employee_positive_gets_doubled() {
        let plain = score_message("bom", false);
        let employee = score_message("bom", true);
        assert_eq!(employee.score, plain.score * 2.0);
    }

    #[test]
    fn meta_phrase_short_circuits_to_zero() {
        let result = score_message("teste técnico mbras", false);
        assert!(result.is_meta);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn hashtag_only_content_is_neutral() {
        let result = score_message("#produto", false);
        assert_eq!(result.label, SentimentLabel::Neutral);
    }
}
