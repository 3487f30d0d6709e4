// HTTP-level validation for /analyze-feed's online (`messages[]`) shape.
// Items for the bulk (`items[]`) shape are considered already validated —
// that path belongs to the fast path (C3), not this adapter.

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::engine::FeedMessageInput;

#[derive(Debug, Deserialize)]
pub struct RawFeedMessage {
    pub user_id: String,
    #[serde(default)]
    pub content: String,
    pub timestamp: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub reactions: i64,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub views: i64,
}

const RESERVED_TIME_WINDOW: i64 = 123;

fn user_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^user_[a-z0-9_]{3,}$").expect("static regex is valid"))
}

pub fn validate_user_id(user_id: &str) -> bool {
    user_id_pattern().is_match(user_id) || uuid::Uuid::parse_str(user_id).is_ok()
}

pub fn validate_time_window(minutes: i64) -> Result<(), ()> {
    if minutes == RESERVED_TIME_WINDOW {
        return Err(());
    }
    if minutes <= 0 {
        return Err(());
    }
    Ok(())
}

pub fn is_reserved_time_window(minutes: i64) -> bool {
    minutes == RESERVED_TIME_WINDOW
}

/// Validates and converts one raw wire message into the engine's input
/// shape. Returns the field name that failed on the first violation.
pub fn validate_message(raw: &RawFeedMessage) -> Result<FeedMessageInput, &'static str> {
    if !validate_user_id(&raw.user_id) {
        return Err("user_id");
    }

    let content = raw.content.trim();
    if content.is_empty() || content.chars().count() > 280 {
        return Err("content");
    }

    let timestamp = parse_offset_timestamp(&raw.timestamp).ok_or("timestamp")?;

    for tag in &raw.hashtags {
        if !tag.starts_with('#') || tag.chars().count() < 2 {
            return Err("hashtags");
        }
    }

    if raw.reactions < 0 || raw.shares < 0 || raw.views < 0 {
        return Err("reactions");
    }
    if raw.views < raw.reactions + raw.shares {
        return Err("views");
    }

    Ok(FeedMessageInput {
        user_id: raw.user_id.clone(),
        content: raw.content.clone(),
        timestamp,
        hashtags: raw.hashtags.clone(),
        reactions: raw.reactions,
        shares: raw.shares,
        views: raw.views,
    })
}

/// RFC3339 with an explicit offset (a bare `Z` counts as an explicit offset).
fn parse_offset_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let parsed: DateTime<FixedOffset> = DateTime::parse_from_rfc3339(raw).ok()?;
    Some(parsed.with_timezone(&chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_user_prefixed_handle_and_uuid() {
        assert!(validate_user_id("user_abc123"));
        assert!(validate_user_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!validate_user_id("nope"));
    }

    #[test]
    fn rejects_reserved_time_window() {
        assert!(validate_time_window(123).is_err());
        assert!(validate_time_window(30).is_ok());
        assert!(validate_time_window(0).is_err());
    }

    #[test]
    fn rejects_views_below_reactions_plus_shares() {
        let raw = RawFeedMessage {
            user_id: "user_abc123".to_string(),
            content: "ola".to_string(),
            timestamp: "2026-02-20T10:00:00Z".to_string(),
            hashtags: vec![],
            reactions: 5,
            shares: 5,
            views: 1,
        };
        assert_eq!(validate_message(&raw).unwrap_err(), "views");
    }

    #[test]
    fn rejects_malformed_hashtag() {
        let raw = RawFeedMessage {
            user_id: "user_abc123".to_string(),
            content: "ola".to_string(),
            timestamp: "2026-02-20T10:00:00Z".to_string(),
            hashtags: vec!["nohash".to_string()],
            reactions: 0,
            shares: 0,
            views: 0,
        };
        assert_eq!(validate_message(&raw).unwrap_err(), "hashtags");
    }
}
