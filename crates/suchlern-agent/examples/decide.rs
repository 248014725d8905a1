use suchlern_agent::{AgentConfig, RetrievalAgent};
use suchlern_core::{encode, CompanyProfile};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

fn main() {
    let table = std::env::temp_dir().join("suchlern_example_q_table.json");
    let agent = RetrievalAgent::new(AgentConfig::with_table_path(table));

    let profile = CompanyProfile {
        name: Some("Acme Energy".into()),
        sector: Some("energy".into()),
        size: Some("large".into()),
    };
    let state = encode("What is our scope 3 emissions deadline?", Some(&profile));
    let action = agent.select(&state);
    let filter = action.filter(profile.name.as_deref());

    let ts = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());

    let record = serde_json::json!({
        "ts": ts,
        "policy_id": "retrieval-agent-v1",
        "state": &state,
        "state_key": state.key(),
        "action": action,
        "filter": filter,
    });

    println!("{}", serde_json::to_string_pretty(&record).unwrap());
}
