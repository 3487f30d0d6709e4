//! Three anomaly heuristics evaluated in a fixed priority order; the first
//! one that fires wins.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::AnomalyType;

use super::types::{AnomalyResult, SentimentLabel};
use super::Scored;

const BURST_WINDOW_SECS: i64 = 5 * 60;
const BURST_THRESHOLD: usize = 10;
const ALTERNATION_THRESHOLD: usize = 10;
const SYNCHRONIZED_THRESHOLD: usize = 3;
const SYNCHRONIZED_WINDOW_SECS: i64 = 2;

pub fn detect(scored: &[Scored]) -> AnomalyResult {
    if detect_burst(scored) {
        return hit(AnomalyType::Burst);
    }
    if detect_alternation(scored) {
        return hit(AnomalyType::Alternation);
    }
    if detect_synchronized_posting(scored) {
        return hit(AnomalyType::SynchronizedPosting);
    }
    AnomalyResult { anomaly_detected: false, anomaly_type: None }
}

fn hit(kind: AnomalyType) -> AnomalyResult {
    AnomalyResult { anomaly_detected: true, anomaly_type: Some(kind) }
}

fn detect_burst(scored: &[Scored]) -> bool {
    let mut by_user: HashMap<&str, Vec<DateTime<Utc>>> = HashMap::new();
    for s in scored {
        by_user.entry(s.message.user_id.as_str()).or_default().push(s.message.timestamp);
    }
    by_user.values().any(|timestamps| has_window_exceeding(timestamps, BURST_WINDOW_SECS, BURST_THRESHOLD))
}

fn has_window_exceeding(timestamps: &[DateTime<Utc>], window_secs: i64, threshold: usize) -> bool {
    let mut sorted = timestamps.to_vec();
    sorted.sort();
    for i in 0..sorted.len() {
        let mut count = 1;
        for ts in sorted.iter().skip(i + 1) {
            if (*ts - sorted[i]).num_seconds() <= window_secs {
                count += 1;
            } else {
                break;
            }
        }
        if count > threshold {
            return true;
        }
    }
    false
}

fn detect_alternation(scored: &[Scored]) -> bool {
    let mut by_user: HashMap<&str, Vec<(DateTime<Utc>, SentimentLabel)>> = HashMap::new();
    for s in scored {
        if s.is_meta || s.label == SentimentLabel::Neutral {
            continue;
        }
        by_user.entry(s.message.user_id.as_str()).or_default().push((s.message.timestamp, s.label));
    }

    by_user.values().any(|entries| {
        if entries.len() < ALTERNATION_THRESHOLD {
            return false;
        }
        let mut sorted = entries.clone();
        sorted.sort_by_key(|(ts, _)| *ts);
        sorted.windows(2).all(|pair| pair[0].1 != pair[1].1)
    })
}

// Whole-feed span, not a sliding sub-window: the full batch must have
// >= 3 messages whose earliest and latest timestamps sit within 2 seconds.
fn detect_synchronized_posting(scored: &[Scored]) -> bool {
    if scored.len() < SYNCHRONIZED_THRESHOLD {
        return false;
    }
    let mut timestamps = scored.iter().map(|s| s.message.timestamp);
    let first = timestamps.next().expect("len checked above");
    let (min, max) = timestamps.fold((first, first), |(min, max), ts| (min.min(ts), max.max(ts)));
    (max - min).num_seconds() <= SYNCHRONIZED_WINDOW_SECS
}
