//! Per-user influence ranking: a deterministic stand-in for a real
//! follower-count lookup, combined with the user's aggregate engagement.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use super::text;
use super::types::InfluenceRankingEntry;
use super::Scored;

struct UserAggregate {
    reactions: i64,
    shares: i64,
    views: i64,
    any_employee: bool,
}

pub fn compute(scored: &[Scored]) -> Vec<InfluenceRankingEntry> {
    let mut by_user: HashMap<&str, UserAggregate> = HashMap::new();

    for s in scored {
        let entry = by_user.entry(s.message.user_id.as_str()).or_insert(UserAggregate {
            reactions: 0,
            shares: 0,
            views: 0,
            any_employee: false,
        });
        entry.reactions += s.message.reactions;
        entry.shares += s.message.shares;
        entry.views += s.message.views;
        entry.any_employee |= s.is_employee;
    }

    let mut entries: Vec<InfluenceRankingEntry> = by_user
        .into_iter()
        .map(|(user_id, agg)| {
            let rate = aggregate_rate(&agg);
            let followers = follower_count(user_id);
            let mut score = followers as f64 * 0.4 + rate * 100.0 * 0.6;
            if text::normalize(user_id).ends_with("007") {
                score /= 2.0;
            }
            if agg.any_employee {
                score += 2.0;
            }
            InfluenceRankingEntry {
                user_id: user_id.to_string(),
                followers,
                engagement_rate: round6(rate),
                influence_score: round6(score),
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.influence_score
            .partial_cmp(&a.influence_score)
            .unwrap()
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    entries
}

fn aggregate_rate(agg: &UserAggregate) -> f64 {
    if agg.views <= 0 {
        return 0.0;
    }
    let engaged = (agg.reactions + agg.shares) as f64;
    let mut rate = engaged / agg.views as f64;
    if agg.reactions + agg.shares > 0 && (agg.reactions + agg.shares) % 7 == 0 {
        rate *= super::golden_ratio_bonus();
    }
    rate
}

fn follower_count(user_id: &str) -> u64 {
    let normalized = text::normalize(user_id);
    if normalized.contains("cafe") {
        return 4242;
    }
    if user_id.chars().count() == 13 {
        return 233;
    }
    if normalized.ends_with("_prime") {
        return 7919;
    }
    sha256_mod(user_id, 10_000) + 100
}

/// Reduces the SHA-256 digest of `input`, read as a big-endian integer,
/// modulo `modulus` via Horner's method over the digest bytes.
fn sha256_mod(input: &str, modulus: u64) -> u64 {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().fold(0u64, |acc, byte| (acc * 256 + *byte as u64) % modulus)
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follower_count_is_deterministic_for_same_id() {
        assert_eq!(follower_count("user_abc123"), follower_count("user_abc123"));
    }

    #[test]
    fn cafe_substring_forces_fixed_follower_count() {
        assert_eq!(follower_count("user_cafecito"), 4242);
    }

    #[test]
    fn thirteen_char_raw_id_forces_fixed_follower_count() {
        let id = "user_abcdefg1";
        assert_eq!(id.chars().count(), 13);
        assert_eq!(follower_count(id), 233);
    }

    #[test]
    fn prime_suffix_forces_fixed_follower_count() {
        assert_eq!(follower_count("user_x_prime"), 7919);
    }
}
