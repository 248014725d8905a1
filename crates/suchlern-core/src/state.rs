//! Turns a (query, profile) pair into a coarse, stable state descriptor.
//!
//! The buckets are deliberately small so the value table stays tabular:
//! a topic drawn from an ordered rule list, a query-length band, the
//! profile's sector and size, and the current UTC month as a light
//! recency signal. Identical inputs within the same month always encode
//! to the same state.

use crate::CompanyProfile;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use time::OffsetDateTime;

/// Query-length thresholds in characters (exclusive upper bounds).
const LEN_SHORT_MAX: usize = 80;
const LEN_MEDIUM_MAX: usize = 200;

/// Sentinel for absent profile fields.
const UNKNOWN: &str = "unknown";

/// Topic bucket of a query. Classification tests the rule list top to
/// bottom; the first match wins and [`Topic::Other`] catches everything
/// else, so every query is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Legal,
    Fin,
    Ghg,
    Other,
}

impl Topic {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legal => "legal",
            Self::Fin => "fin",
            Self::Ghg => "ghg",
            Self::Other => "other",
        }
    }
}

/// Query-length band with fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LenBucket {
    Short,
    Medium,
    Long,
}

impl LenBucket {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }

    fn of(query: &str) -> Self {
        match query.chars().count() {
            n if n < LEN_SHORT_MAX => Self::Short,
            n if n < LEN_MEDIUM_MAX => Self::Medium,
            _ => Self::Long,
        }
    }
}

fn topic_rules() -> &'static [(Topic, Regex)] {
    static RULES: OnceLock<Vec<(Topic, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| {
        // Order matters: first match wins.
        [
            (
                Topic::Legal,
                r"law|legal|sue|regulat|policy|compliance|malpractice",
            ),
            (Topic::Fin, r"budget|cost|price|fund|profit|finance|investment"),
            (
                Topic::Ghg,
                r"ghg|emission|carbon|co2|footprint|offset|net\s*zero|scope\s*[123]",
            ),
        ]
        .into_iter()
        .map(|(topic, pattern)| {
            (
                topic,
                Regex::new(pattern).expect("topic rule patterns are valid"),
            )
        })
        .collect()
    })
}

fn classify_topic(query: &str) -> Topic {
    let lowered = query.to_lowercase();
    topic_rules()
        .iter()
        .find(|(_, re)| re.is_match(&lowered))
        .map_or(Topic::Other, |(topic, _)| *topic)
}

/// Discrete descriptor of a query's context, the learning key of the
/// value table.
///
/// Fields are declared in lexicographic order; [`QueryState::key`]
/// relies on sorted field names for its canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryState {
    pub len: LenBucket,
    /// UTC month bucket, `YYYY-MM`.
    pub month: String,
    pub sector: String,
    pub size: String,
    pub topic: Topic,
}

impl QueryState {
    /// Canonical string identity of this state: compact JSON with
    /// lexicographically sorted field names. Injective over the state
    /// domain; free-form sector/size values are JSON-escaped, so two
    /// distinct states can never collide.
    #[must_use]
    pub fn key(&self) -> String {
        serde_json::json!({
            "len": self.len.as_str(),
            "month": self.month,
            "sector": self.sector,
            "size": self.size,
            "topic": self.topic.as_str(),
        })
        .to_string()
    }
}

/// Encodes a query and optional profile against the current UTC clock.
#[must_use]
pub fn encode(query: &str, profile: Option<&CompanyProfile>) -> QueryState {
    encode_at(query, profile, OffsetDateTime::now_utc())
}

/// Same as [`encode`] with the clock injected, for deterministic tests.
#[must_use]
pub fn encode_at(query: &str, profile: Option<&CompanyProfile>, now: OffsetDateTime) -> QueryState {
    let field = |f: fn(&CompanyProfile) -> Option<&str>| {
        profile
            .and_then(f)
            .map_or_else(|| UNKNOWN.to_string(), str::to_lowercase)
    };

    QueryState {
        len: LenBucket::of(query),
        month: format!("{:04}-{:02}", now.year(), u8::from(now.month())),
        sector: field(|p| p.sector.as_deref()),
        size: field(|p| p.size.as_deref()),
        topic: classify_topic(query),
    }
}
