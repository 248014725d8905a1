#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Reward shaping and retrospective feedback analysis.
//!
//! The shaping side turns a UI feedback tag (or an externally computed
//! quality score) into a bounded scalar reward for the agent. The
//! analysis side aggregates recorded feedback per action so operators
//! can see which retrieval filters earn thumbs-down. Analysis only ever
//! reads: it never modifies the live value table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use suchlern_core::Action;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Canonical reward bounds.
pub const REWARD_MIN: f32 = -1.0;
pub const REWARD_MAX: f32 = 1.0;

/// Fallback timestamp when formatting fails
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

/// Classification of a raw feedback tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackClass {
    Positive,
    Negative,
    Neutral,
}

/// Classifies a feedback tag against the closed, case-insensitive
/// vocabulary. Anything outside it is [`FeedbackClass::Neutral`];
/// malformed tags never error.
#[must_use]
pub fn classify(tag: &str) -> FeedbackClass {
    match tag.trim().to_lowercase().as_str() {
        "up" | "thumbs_up" | "good" | "helpful" | "👍" => FeedbackClass::Positive,
        "down" | "thumbs_down" | "bad" | "not_helpful" | "👎" => FeedbackClass::Negative,
        _ => FeedbackClass::Neutral,
    }
}

/// Maps a feedback tag to a reward: +1.0, −1.0, or 0.0 for unrecognized
/// tags.
#[must_use]
pub fn feedback_reward(tag: &str) -> f32 {
    match classify(tag) {
        FeedbackClass::Positive => REWARD_MAX,
        FeedbackClass::Negative => REWARD_MIN,
        FeedbackClass::Neutral => 0.0,
    }
}

/// Clamps an externally computed quality score into `[min, max]`.
///
/// Pure clamping, no rescaling. Degenerate bounds (non-finite, or
/// `min > max`) fall back to the canonical range; a non-finite score
/// maps to neutral 0.0.
#[must_use]
pub fn scale_reward(raw: f32, min: f32, max: f32) -> f32 {
    let (lo, hi) = if min.is_finite() && max.is_finite() && min <= max {
        (min, max)
    } else {
        (REWARD_MIN, REWARD_MAX)
    };
    if raw.is_finite() {
        raw.clamp(lo, hi)
    } else {
        0.0
    }
}

/// One recorded feedback observation, as logged by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// RFC 3339 timestamp of the observation.
    pub ts: String,
    /// Canonical key of the state the action was chosen for.
    pub state_key: String,
    /// Action the feedback refers to.
    pub action: Action,
    /// Raw tag as received, if the signal was a tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Shaped reward in `[-1, 1]`.
    pub reward: f32,
}

impl FeedbackEvent {
    /// Event from an explicit feedback tag.
    #[must_use]
    pub fn from_tag(state_key: impl Into<String>, action: Action, tag: &str) -> Self {
        Self {
            ts: iso8601_now(),
            state_key: state_key.into(),
            action,
            tag: Some(tag.to_string()),
            reward: feedback_reward(tag),
        }
    }

    /// Event from a precomputed quality score, clamped to the canonical
    /// range.
    #[must_use]
    pub fn from_score(state_key: impl Into<String>, action: Action, score: f32) -> Self {
        Self {
            ts: iso8601_now(),
            state_key: state_key.into(),
            action,
            tag: None,
            reward: scale_reward(score, REWARD_MIN, REWARD_MAX),
        }
    }
}

/// Feedback statistics for one action.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ActionStats {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub total_reward: f32,
}

impl ActionStats {
    /// Share of positive feedback (0.0 to 1.0).
    #[must_use]
    pub fn positive_rate(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.positive as f32 / self.total as f32
        }
    }

    #[must_use]
    pub fn average_reward(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.total_reward / self.total as f32
        }
    }
}

/// Aggregates recorded events per action. Events with a non-finite
/// reward are counted but excluded from the reward sum.
#[must_use]
pub fn summarize_by_action(events: &[FeedbackEvent]) -> BTreeMap<Action, ActionStats> {
    let mut stats: BTreeMap<Action, ActionStats> = BTreeMap::new();

    for event in events {
        let entry = stats.entry(event.action).or_default();
        entry.total += 1;
        if event.reward > 0.0 {
            entry.positive += 1;
        } else if event.reward < 0.0 {
            entry.negative += 1;
        } else {
            entry.neutral += 1;
        }
        if event.reward.is_finite() {
            entry.total_reward += event.reward;
        }
    }

    stats
}

fn iso8601_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string())
}
