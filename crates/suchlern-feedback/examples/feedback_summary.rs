//! Example demonstrating retrospective feedback aggregation per action.
//!
//! Run with: cargo run -p suchlern-feedback --example feedback_summary

use suchlern_core::Action;
use suchlern_feedback::{summarize_by_action, FeedbackEvent};

fn main() {
    // Simulated feedback log from the answer UI.
    let events = vec![
        FeedbackEvent::from_tag("ghg/short", Action::CompanyOnly, "up"),
        FeedbackEvent::from_tag("ghg/short", Action::CompanyOnly, "up"),
        FeedbackEvent::from_tag("ghg/short", Action::CompanyOnly, "down"),
        FeedbackEvent::from_tag("legal/medium", Action::LegalOnly, "up"),
        FeedbackEvent::from_tag("legal/medium", Action::Broad, "down"),
        FeedbackEvent::from_tag("legal/medium", Action::Broad, "not_helpful"),
        FeedbackEvent::from_score("fin/long", Action::FinancialOnly, 0.6),
    ];

    println!("📊 Summarizing {} feedback events...\n", events.len());

    for (action, stats) in summarize_by_action(&events) {
        println!(
            "  {} → 👍 {} / 👎 {} of {} ({:.0}% positive), avg reward {:.2}",
            action,
            stats.positive,
            stats.negative,
            stats.total,
            stats.positive_rate() * 100.0,
            stats.average_reward()
        );
    }
}
