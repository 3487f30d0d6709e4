//! The analytic engine (C1): a pure, deterministic function from a list of
//! feed messages and a time window to a sentiment/engagement/influence/
//! anomaly analysis. No I/O, no clock reads beyond a single `reference_now`
//! fallback for an empty input, no panics — malformed input is coerced
//! rather than rejected.

mod anomaly;
mod influence;
mod lexicon;
mod sentiment;
mod text;
mod trending;
mod types;

pub use sentiment::ScoredMessage;
pub use types::{
    Analysis, AnomalyResult, FeedMessageInput, InfluenceRankingEntry, SentimentLabel, TrendingTopic,
};

use chrono::{DateTime, Utc};

use crate::domain::{MessageFlags, MessageSentiment};

/// A message alongside everything computed about it that later passes need:
/// its sentiment label/score and whether its author is an employee.
struct Scored<'a> {
    message: &'a FeedMessageInput,
    label: SentimentLabel,
    score: f64,
    is_meta: bool,
    is_employee: bool,
}

pub fn analyze(messages: &[FeedMessageInput], time_window_minutes: i64) -> Analysis {
    if messages.is_empty() {
        return Analysis {
            sentiment_distribution: MessageSentiment::default(),
            engagement_score: 0.0,
            trending_topics: Vec::new(),
            influence_ranking: Vec::new(),
            anomaly: AnomalyResult { anomaly_detected: false, anomaly_type: None },
            flags: MessageFlags::default(),
        };
    }

    let reference_now = messages.iter().map(|m| m.timestamp).max().unwrap_or_else(Utc::now);
    let filtered = filter_window(messages, reference_now, time_window_minutes);
    let working_set: &[FeedMessageInput] = if filtered.is_empty() { messages } else { &filtered };

    let scored: Vec<Scored> = working_set
        .iter()
        .map(|message| {
            let is_employee = text::is_employee(&message.user_id);
            let result = sentiment::score_message(&message.content, is_employee);
            Scored {
                message,
                label: result.label,
                score: result.score,
                is_meta: result.is_meta,
                is_employee,
            }
        })
        .collect();

    let flags = compute_flags(&scored);
    let sentiment_distribution = compute_distribution(&scored);
    let engagement_score = compute_engagement(&scored, flags.candidate_awareness);
    let trending_topics = trending::compute(&scored, reference_now);
    let influence_ranking = influence::compute(&scored);
    let anomaly = anomaly::detect(&scored);

    Analysis {
        sentiment_distribution,
        engagement_score,
        trending_topics,
        influence_ranking,
        anomaly,
        flags,
    }
}

fn filter_window(
    messages: &[FeedMessageInput],
    reference_now: DateTime<Utc>,
    time_window_minutes: i64,
) -> Vec<FeedMessageInput> {
    let start_window = reference_now - chrono::Duration::minutes(time_window_minutes);
    let cutoff = reference_now + chrono::Duration::seconds(5);
    messages
        .iter()
        .filter(|m| m.timestamp >= start_window && m.timestamp <= cutoff)
        .cloned()
        .collect()
}

fn compute_flags(scored: &[Scored]) -> MessageFlags {
    let mbras_employee = scored.iter().any(|s| s.is_employee);
    let special_pattern = scored.iter().any(|s| {
        s.message.content.chars().count() == 42 && text::normalize(&s.message.content).contains("mbras")
    });
    let candidate_awareness = scored.iter().any(|s| {
        let normalized = text::normalize_single_spaced(&s.message.content);
        normalized == lexicon::META_PHRASE
            || (normalized.contains("teste") && normalized.contains("mbras") && normalized.contains("tecnico"))
    });
    MessageFlags { mbras_employee, special_pattern, candidate_awareness }
}

fn compute_distribution(scored: &[Scored]) -> MessageSentiment {
    let countable: Vec<&Scored> = scored.iter().filter(|s| !s.is_meta).collect();
    if countable.is_empty() {
        return MessageSentiment::default();
    }
    let total = countable.len() as f64;
    let positive = countable.iter().filter(|s| s.label == SentimentLabel::Positive).count() as f64;
    let negative = countable.iter().filter(|s| s.label == SentimentLabel::Negative).count() as f64;
    let neutral = total - positive - negative;

    MessageSentiment {
        positive: round2(positive / total * 100.0),
        negative: round2(negative / total * 100.0),
        neutral: round2(neutral / total * 100.0),
    }
}

fn compute_engagement(scored: &[Scored], candidate_awareness: bool) -> f64 {
    if candidate_awareness {
        return lexicon::CANDIDATE_AWARENESS_ENGAGEMENT_OVERRIDE;
    }

    let rates: Vec<f64> = scored
        .iter()
        .filter(|s| s.message.views > 0)
        .map(|s| per_message_rate(s.message))
        .collect();

    if rates.is_empty() {
        return 0.0;
    }
    round2(rates.iter().sum::<f64>() / rates.len() as f64 * 100.0)
}

fn per_message_rate(message: &FeedMessageInput) -> f64 {
    if message.views <= 0 {
        return 0.0;
    }
    let engaged = (message.reactions + message.shares) as f64;
    let mut rate = engaged / message.views as f64;
    if message.reactions + message.shares > 0 && (message.reactions + message.shares) % 7 == 0 {
        rate *= golden_ratio_bonus();
    }
    rate
}

fn golden_ratio_bonus() -> f64 {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    1.0 + 1.0 / phi
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(user_id: &str, content: &str, reactions: i64, shares: i64, views: i64, ts: &str) -> FeedMessageInput {
        FeedMessageInput {
            user_id: user_id.to_string(),
            content: content.to_string(),
            timestamp: DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
            hashtags: Vec::new(),
            reactions,
            shares,
            views,
        }
    }

    #[test]
    fn empty_input_is_fully_zeroed() {
        let analysis = analyze(&[], 30);
        assert_eq!(analysis.engagement_score, 0.0);
        assert!(!analysis.anomaly.anomaly_detected);
    }

    #[test]
    fn basic_positive_message_scores_100_percent_positive() {
        let messages = vec![message(
            "user_abc123",
            "adorei produto #produto",
            2,
            1,
            10,
            "2026-02-20T10:00:00Z",
        )];
        let analysis = analyze(&messages, 30);
        assert_eq!(analysis.sentiment_distribution.positive, 100.0);
        assert_eq!(analysis.sentiment_distribution.negative, 0.0);
        assert_eq!(analysis.sentiment_distribution.neutral, 0.0);
        assert_eq!(analysis.trending_topics.first().unwrap().tag, "#produto");
    }

    #[test]
    fn meta_phrase_overrides_engagement_and_raises_flags() {
        let messages = vec![message(
            "user_mbras_meta001",
            "teste técnico mbras",
            0,
            0,
            0,
            "2026-02-20T10:00:00Z",
        )];
        let analysis = analyze(&messages, 30);
        assert!(analysis.flags.mbras_employee);
        assert!(analysis.flags.candidate_awareness);
        assert_eq!(analysis.engagement_score, 9.42);
        assert_eq!(analysis.sentiment_distribution.positive, 0.0);
        assert_eq!(analysis.sentiment_distribution.negative, 0.0);
        assert_eq!(analysis.sentiment_distribution.neutral, 0.0);
    }

    #[test]
    fn golden_ratio_bonus_lifts_engagement_above_baseline() {
        let messages = vec![message("user_x", "ok", 4, 3, 20, "2026-02-20T10:00:00Z")];
        let analysis = analyze(&messages, 30);
        // (7/20) * (1 + 1/phi) ~= 0.566 -> *100 rounded to 2 decimals.
        assert!((analysis.engagement_score - 56.6).abs() < 0.1);
        assert!(analysis.engagement_score > 35.0);
    }

    #[test]
    fn special_pattern_flag_fires_on_42_char_mbras_content() {
        let content = format!("mbras {}", "á".repeat(36));
        assert_eq!(content.chars().count(), 42);
        let messages = vec![message("user_y", &content, 0, 0, 1, "2026-02-20T10:00:00Z")];
        let analysis = analyze(&messages, 30);
        assert!(analysis.flags.special_pattern);
    }

    #[test]
    fn determinism_holds_across_repeated_calls() {
        let messages = vec![
            message("user_a", "adorei muito bom", 5, 2, 30, "2026-02-20T10:00:00Z"),
            message("user_b", "ruim pessimo", 0, 0, 5, "2026-02-20T10:01:00Z"),
        ];
        let first = analyze(&messages, 60);
        let second = analyze(&messages, 60);
        let first_json = serde_json::to_string(&first).unwrap();
        let second_json = serde_json::to_string(&second).unwrap();
        assert_eq!(first_json, second_json);
    }

    #[test]
    fn degenerate_window_falls_back_to_full_input() {
        let messages = vec![message(
            "user_a",
            "adorei",
            1,
            0,
            5,
            "2020-01-01T00:00:00Z",
        )];
        // reference_now == the only timestamp, so a 5-minute window easily
        // contains it; this exercises the fallback path structurally even
        // though it isn't exercised by this particular input.
        let analysis = analyze(&messages, 5);
        assert_eq!(analysis.sentiment_distribution.positive, 100.0);
    }

    #[test]
    fn synchronized_posting_anomaly_wins_when_no_burst_or_alternation() {
        let base = DateTime::parse_from_rfc3339("2026-02-20T10:00:00Z").unwrap().with_timezone(&Utc);
        let messages = vec![
            message("user_a", "bom", 0, 0, 1, &base.to_rfc3339()),
            message("user_b", "bom", 0, 0, 1, &(base + chrono::Duration::seconds(1)).to_rfc3339()),
            message("user_c", "bom", 0, 0, 1, &(base + chrono::Duration::seconds(2)).to_rfc3339()),
        ];
        let analysis = analyze(&messages, 60);
        assert!(analysis.anomaly.anomaly_detected);
        assert_eq!(
            analysis.anomaly.anomaly_type,
            Some(crate::domain::AnomalyType::SynchronizedPosting)
        );
    }
}
