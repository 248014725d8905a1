//! Documents the JSONL wire format accepted by `suchlern replay`.

use serde::Deserialize;

#[derive(Deserialize, Debug)]
struct FeedbackRecord {
    query: String,
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    company: Option<String>,
    action: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    score: Option<f32>,
}

#[test]
fn full_feedback_record_deserializes() {
    let json = r#"
    {
        "query": "What is our scope 3 emissions deadline?",
        "sector": "energy",
        "size": "large",
        "company": "Acme Energy",
        "action": "company_only",
        "tag": "down"
    }
    "#;

    let record: FeedbackRecord =
        serde_json::from_str(json).expect("Failed to deserialize record");

    assert_eq!(record.query, "What is our scope 3 emissions deadline?");
    assert_eq!(record.sector.as_deref(), Some("energy"));
    assert_eq!(record.size.as_deref(), Some("large"));
    assert_eq!(record.company.as_deref(), Some("Acme Energy"));
    assert_eq!(record.action, "company_only");
    assert_eq!(record.tag.as_deref(), Some("down"));
    assert!(record.score.is_none());
}

#[test]
fn minimal_score_record_deserializes() {
    let json = r#"{"query": "anything", "action": "broad", "score": 0.75}"#;

    let record: FeedbackRecord =
        serde_json::from_str(json).expect("Failed to deserialize record");

    assert_eq!(record.action, "broad");
    assert!(record.sector.is_none());
    assert!(record.tag.is_none());
    assert_eq!(record.score, Some(0.75));
}
