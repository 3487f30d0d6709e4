//! Trending-hashtag weighting: recency, sentiment and tag-length all pull on
//! the ranking, with ties broken deterministically by tag name.

use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;

use super::types::{SentimentLabel, TrendingTopic};
use super::Scored;

struct Accumulator {
    weight: f64,
    count: u32,
    sum_sentiment_weight: f64,
}

pub fn compute(scored: &[Scored], reference_now: DateTime<Utc>) -> Vec<TrendingTopic> {
    let mut accum: HashMap<String, Accumulator> = HashMap::new();

    for s in scored {
        if s.is_meta {
            continue;
        }
        let age_minutes = (reference_now - s.message.timestamp).num_seconds() as f64 / 60.0;
        let time_weight = 1.0 + 1.0 / age_minutes.max(0.01);
        let sentiment_weight = match s.label {
            SentimentLabel::Positive => 1.2,
            SentimentLabel::Negative => 0.8,
            SentimentLabel::Neutral | SentimentLabel::Meta => 1.0,
        };

        for tag in &s.message.hashtags {
            let len = tag.chars().count();
            let length_factor = if len > 8 { (len as f64).log10() / 8f64.log10() } else { 1.0 };
            let entry = accum.entry(tag.clone()).or_insert(Accumulator {
                weight: 0.0,
                count: 0,
                sum_sentiment_weight: 0.0,
            });
            entry.weight += time_weight * sentiment_weight / length_factor.max(1e-4);
            entry.count += 1;
            entry.sum_sentiment_weight += sentiment_weight;
        }
    }

    let mut topics: Vec<(String, Accumulator)> = accum.into_iter().collect();
    topics.sort_by(|(tag_a, a), (tag_b, b)| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap()
            .then(b.count.cmp(&a.count))
            .then(b.sum_sentiment_weight.partial_cmp(&a.sum_sentiment_weight).unwrap())
            .then(tag_a.cmp(tag_b))
    });

    topics
        .into_iter()
        .take(5)
        .map(|(tag, a)| TrendingTopic { tag, count: a.count, weight: a.weight })
        .collect()
}
