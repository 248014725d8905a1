//! CLI for suchlern.
//!
//! Provides one-shot policy decisions, feedback application, JSONL replay of
//! recorded feedback, and value-table inspection. It serves as the
//! operational interface for the retrieval-policy agent.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use suchlern_agent::{AgentConfig, RetrievalAgent};
use suchlern_core::{encode, Action, CompanyProfile, QueryState, ACTION_SET_VERSION};
use suchlern_feedback::{
    feedback_reward, scale_reward, summarize_by_action, FeedbackEvent, REWARD_MAX, REWARD_MIN,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick a retrieval action for a query and print the decision record
    Decide {
        #[command(flatten)]
        query: QueryArgs,

        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Apply one feedback signal to the value table
    Feedback {
        #[command(flatten)]
        query: QueryArgs,

        #[command(flatten)]
        agent: AgentArgs,

        /// Action the feedback refers to (as printed by `decide`)
        #[arg(long)]
        action: String,

        /// Feedback tag, e.g. "up" or "down"
        #[arg(long)]
        tag: Option<String>,

        /// Precomputed quality score, clamped into [-1, 1]
        #[arg(long)]
        score: Option<f32>,
    },
    /// Replay a JSONL file of feedback records against the value table
    Replay {
        /// Input file, one feedback record per line
        #[arg(long)]
        path: PathBuf,

        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Show learned values for a state, or the whole table
    Inspect {
        /// Question text to encode (omit with --all)
        #[arg(long)]
        query: Option<String>,

        /// Company sector
        #[arg(long)]
        sector: Option<String>,

        /// Company size class
        #[arg(long)]
        size: Option<String>,

        /// Dump the entire value table
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        agent: AgentArgs,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Question text to encode
    #[arg(long)]
    query: String,

    /// Company sector
    #[arg(long)]
    sector: Option<String>,

    /// Company size class
    #[arg(long)]
    size: Option<String>,

    /// Company name, used by the company_only filter
    #[arg(long)]
    company: Option<String>,
}

impl QueryArgs {
    fn profile(&self) -> CompanyProfile {
        CompanyProfile {
            name: self.company.clone(),
            sector: self.sector.clone(),
            size: self.size.clone(),
        }
    }

    fn encode(&self) -> QueryState {
        encode(&self.query, Some(&self.profile()))
    }
}

#[derive(Args)]
struct AgentArgs {
    /// Path to the persisted value table
    #[arg(long, default_value = "data/q_table.json")]
    table_file: PathBuf,

    /// Exploration rate
    #[arg(long, default_value_t = 0.2)]
    epsilon: f32,

    /// Learning rate
    #[arg(long, default_value_t = 0.3)]
    alpha: f32,

    /// Discount factor
    #[arg(long, default_value_t = 0.9)]
    gamma: f32,
}

impl AgentArgs {
    fn build(&self) -> RetrievalAgent {
        RetrievalAgent::new(AgentConfig {
            epsilon: self.epsilon,
            alpha: self.alpha,
            gamma: self.gamma,
            table_path: self.table_file.clone(),
        })
    }
}

/// One replayable feedback record. Exactly the shape the answer UI logs:
/// the original query and profile, the action that was taken, and either
/// a feedback tag or a quality score.
#[derive(Debug, Deserialize)]
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

#[derive(Debug)]
struct ReplaySummary {
    applied: usize,
    skipped: usize,
    events: Vec<FeedbackEvent>,
}

/// Shapes a reward from whichever signal is present; tags win over
/// scores, and no signal at all yields `None`.
fn shaped_reward(tag: Option<&str>, score: Option<f32>) -> Option<f32> {
    match (tag, score) {
        (Some(tag), _) => Some(feedback_reward(tag)),
        (None, Some(score)) => Some(scale_reward(score, REWARD_MIN, REWARD_MAX)),
        (None, None) => None,
    }
}

fn parse_action(raw: &str) -> Result<Action> {
    Action::parse(raw).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown action '{}'; expected one of: {}",
            raw,
            Action::ALL.map(Action::as_str).join(", ")
        )
    })
}

fn run_replay(path: &Path, agent: &RetrievalAgent) -> Result<ReplaySummary> {
    let file = File::open(path)
        .with_context(|| format!("failed to open replay file {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut summary = ReplaySummary {
        applied: 0,
        skipped: 0,
        events: Vec::new(),
    };

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: FeedbackRecord = serde_json::from_str(&line)
            .with_context(|| format!("malformed feedback record on line {}", idx + 1))?;

        // Unknown actions and signal-less records fail open: they are
        // skipped with a note, never abort the replay.
        let Some(action) = Action::parse(&record.action) else {
            eprintln!(
                "line {}: skipping unknown action '{}'",
                idx + 1,
                record.action
            );
            summary.skipped += 1;
            continue;
        };
        let Some(reward) = shaped_reward(record.tag.as_deref(), record.score) else {
            eprintln!("line {}: skipping record without tag or score", idx + 1);
            summary.skipped += 1;
            continue;
        };

        let profile = CompanyProfile {
            name: record.company.clone(),
            sector: record.sector.clone(),
            size: record.size.clone(),
        };
        let state = encode(&record.query, Some(&profile));
        agent
            .update(&state, action, reward, None)
            .with_context(|| format!("failed to apply feedback from line {}", idx + 1))?;

        summary.events.push(match record.tag.as_deref() {
            Some(tag) => FeedbackEvent::from_tag(state.key(), action, tag),
            None => FeedbackEvent::from_score(state.key(), action, reward),
        });
        summary.applied += 1;
    }

    Ok(summary)
}

fn iso8601_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Decide { query, agent } => {
            let agent = agent.build();
            let state = query.encode();
            let action = agent.select(&state);
            let filter = action.filter(query.company.as_deref());

            print_pretty(&serde_json::json!({
                "ts": iso8601_now(),
                "policy_id": "retrieval-agent-v1",
                "action_set": ACTION_SET_VERSION,
                "state": &state,
                "state_key": state.key(),
                "action": action,
                "filter": filter,
            }))?;
        }
        Commands::Feedback {
            query,
            agent,
            action,
            tag,
            score,
        } => {
            if tag.is_some() == score.is_some() {
                anyhow::bail!("provide exactly one of --tag or --score");
            }
            let action = parse_action(&action)?;
            let reward = shaped_reward(tag.as_deref(), score)
                .context("provide exactly one of --tag or --score")?;

            let agent = agent.build();
            let state = query.encode();
            agent
                .update(&state, action, reward, None)
                .context("failed to apply feedback")?;

            print_pretty(&serde_json::json!({
                "state_key": state.key(),
                "reward": reward,
                "values": agent.values(&state),
                "best": agent.best_action(&state),
            }))?;
        }
        Commands::Replay { path, agent } => {
            let agent = agent.build();
            let summary = run_replay(&path, &agent)?;

            println!(
                "Applied {} feedback records ({} skipped).",
                summary.applied, summary.skipped
            );
            for (action, stats) in summarize_by_action(&summary.events) {
                println!(
                    "  {} → {} positive / {} negative of {}, avg reward {:.2}",
                    action,
                    stats.positive,
                    stats.negative,
                    stats.total,
                    stats.average_reward()
                );
            }
        }
        Commands::Inspect {
            query,
            sector,
            size,
            all,
            agent,
        } => {
            let agent = agent.build();
            if all {
                print_pretty(&serde_json::to_value(agent.snapshot())?)?;
            } else {
                let query = query.context("provide --query, or --all for the whole table")?;
                let profile = CompanyProfile {
                    name: None,
                    sector,
                    size,
                };
                let state = encode(&query, Some(&profile));
                print_pretty(&serde_json::json!({
                    "state": &state,
                    "state_key": state.key(),
                    "values": agent.values(&state),
                    "best": agent.best_action(&state),
                }))?;
            }
        }
    }

    Ok(())
}
