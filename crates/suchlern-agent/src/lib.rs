#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Tabular ε-greedy agent that learns which retrieval filter to apply.
//!
//! The agent owns a value table mapping state keys to per-action reward
//! estimates. [`RetrievalAgent::select`] picks an action ε-greedily with
//! uniform tie-breaking, [`RetrievalAgent::update`] applies the standard
//! incremental estimate `new = old + α·(target − old)` and durably
//! persists the table before returning. One coarse mutex covers every
//! read-modify-write including the persistence step, so concurrent
//! callers can never lose an increment or observe a half-written row.

use rand::prelude::*;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use suchlern_core::{Action, QueryState};

mod error;

pub use error::{AgentError, Result};

/// Per-state value estimates, one entry per action in the current set.
pub type ActionValues = BTreeMap<Action, f32>;

type ValueTable = BTreeMap<String, ActionValues>;

/// Self-describing on-disk shape: state key → action name → value.
type RawTable = BTreeMap<String, BTreeMap<String, f32>>;

const DEFAULT_TABLE_PATH: &str = "data/q_table.json";

/// Tunables for the agent, injected at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Exploration rate: probability of picking a uniformly random action.
    pub epsilon: f32,
    /// Learning rate: step size of each value update.
    pub alpha: f32,
    /// Discount factor for one-step bootstrapped updates.
    pub gamma: f32,
    /// Where the value table is persisted.
    pub table_path: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.2,
            alpha: 0.3,
            gamma: 0.9,
            table_path: PathBuf::from(DEFAULT_TABLE_PATH),
        }
    }
}

impl AgentConfig {
    /// Default tunables against a custom table location.
    #[must_use]
    pub fn with_table_path(path: impl Into<PathBuf>) -> Self {
        Self {
            table_path: path.into(),
            ..Self::default()
        }
    }

    /// Clamps the tunables into their valid ranges, falling back to the
    /// defaults for non-finite values.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        let clamp = |value: f32, fallback: f32| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                fallback
            }
        };
        self.epsilon = clamp(self.epsilon, defaults.epsilon);
        self.alpha = clamp(self.alpha, defaults.alpha);
        self.gamma = clamp(self.gamma, defaults.gamma);
        self
    }
}

/// Learns and serves a retrieval-action policy from sparse feedback.
///
/// Construct one per process (or per test) and share it by reference;
/// all methods take `&self` and synchronize internally.
#[derive(Debug)]
pub struct RetrievalAgent {
    cfg: AgentConfig,
    table: Mutex<ValueTable>,
}

impl RetrievalAgent {
    /// Builds an agent, loading the persisted value table if one exists.
    ///
    /// A missing file is a normal cold start. An unreadable or corrupt
    /// file also degrades to an empty table, but the condition is
    /// reported (via `tracing::warn!` with the `telemetry` feature,
    /// `eprintln!` otherwise) instead of being swallowed.
    #[must_use]
    pub fn new(cfg: AgentConfig) -> Self {
        let cfg = cfg.sanitized();
        let table = load_table(&cfg.table_path);
        Self {
            cfg,
            table: Mutex::new(table),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.cfg
    }

    /// ε-greedy selection. Lazily initializes the state's row (all
    /// actions at zero) on first sight; ties between maximal actions are
    /// broken uniformly at random.
    pub fn select(&self, state: &QueryState) -> Action {
        let key = state.key();
        let mut rng = thread_rng();
        let mut table = self.lock();
        let row = ensure_row(&mut table, &key);
        if rng.gen::<f32>() < self.cfg.epsilon {
            random_action(&mut rng)
        } else {
            best_of(row, &mut rng).0
        }
    }

    /// Applies one feedback observation and persists the table.
    ///
    /// Without `next_state` the update target is the reward alone; with
    /// it, the target is `reward + γ·max(next)`. The new estimate is
    /// `old + α·(target − old)`. A failed write leaves the previously
    /// persisted table intact (atomic replace) and surfaces as `Err`;
    /// the in-memory update is applied either way.
    pub fn update(
        &self,
        state: &QueryState,
        action: Action,
        reward: f32,
        next_state: Option<&QueryState>,
    ) -> Result<()> {
        let key = state.key();
        let mut table = self.lock();

        let target = match next_state {
            None => reward,
            Some(next) => {
                let mut rng = thread_rng();
                let next_row = ensure_row(&mut table, &next.key());
                let (_, best_next) = best_of(next_row, &mut rng);
                reward + self.cfg.gamma * best_next
            }
        };

        let row = ensure_row(&mut table, &key);
        let old = row.get(&action).copied().unwrap_or(0.0);
        row.insert(action, old + self.cfg.alpha * (target - old));

        persist(&self.cfg.table_path, &table)
    }

    /// Current per-action estimates for a state, zeros if unseen.
    /// Diagnostic only; does not touch the table.
    #[must_use]
    pub fn values(&self, state: &QueryState) -> ActionValues {
        let table = self.lock();
        table.get(&state.key()).cloned().unwrap_or_else(zero_row)
    }

    /// Current best action for a state, using the same uniform
    /// tie-breaking as [`RetrievalAgent::select`]'s exploitation branch.
    #[must_use]
    pub fn best_action(&self, state: &QueryState) -> Action {
        let mut rng = thread_rng();
        best_of(&self.values(state), &mut rng).0
    }

    /// Copy of the whole table in its on-disk shape, for inspection.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, f32>> {
        to_raw(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, ValueTable> {
        // A poisoned lock only means another caller panicked mid-call;
        // every mutation is applied row-complete under the lock, so the
        // table itself is still consistent.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn zero_row() -> ActionValues {
    Action::ALL.iter().map(|a| (*a, 0.0)).collect()
}

fn random_action(rng: &mut impl Rng) -> Action {
    Action::ALL.choose(rng).copied().unwrap_or(Action::Broad)
}

/// Inserts a fully populated row for unseen states: all known actions at
/// zero, in one step, so no partially initialized row is ever visible.
fn ensure_row<'t>(table: &'t mut ValueTable, key: &str) -> &'t mut ActionValues {
    table.entry(key.to_string()).or_insert_with(zero_row)
}

fn best_of(row: &ActionValues, rng: &mut impl Rng) -> (Action, f32) {
    let best = row.values().copied().fold(f32::NEG_INFINITY, f32::max);
    let tied: Vec<Action> = row
        .iter()
        .filter(|(_, value)| **value == best)
        .map(|(action, _)| *action)
        .collect();
    (tied.choose(rng).copied().unwrap_or(Action::Broad), best)
}

fn to_raw(table: &ValueTable) -> RawTable {
    table
        .iter()
        .map(|(key, row)| {
            let raw_row = row
                .iter()
                .map(|(action, value)| (action.as_str().to_string(), *value))
                .collect();
            (key.clone(), raw_row)
        })
        .collect()
}

fn load_table(path: &Path) -> ValueTable {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return ValueTable::new(),
        Err(e) => {
            warn(&format!(
                "value table {} unreadable, starting cold: {e}",
                path.display()
            ));
            return ValueTable::new();
        }
    };

    let raw: RawTable = match serde_json::from_str(&text) {
        Ok(raw) => raw,
        Err(e) => {
            warn(&format!(
                "value table {} corrupt, starting cold: {e}",
                path.display()
            ));
            return ValueTable::new();
        }
    };

    // Explicit migration: entries referencing actions outside the current
    // set (or carrying non-finite values) are dropped, never left
    // dangling, and every row is re-completed to the full action set.
    let mut dropped = 0usize;
    let table = raw
        .into_iter()
        .map(|(key, raw_row)| {
            let mut row = zero_row();
            for (name, value) in raw_row {
                match Action::parse(&name) {
                    Some(action) if value.is_finite() => {
                        row.insert(action, value);
                    }
                    _ => dropped += 1,
                }
            }
            (key, row)
        })
        .collect();

    if dropped > 0 {
        warn(&format!(
            "value table {}: dropped {dropped} stale entr{} (unknown action or non-finite value)",
            path.display(),
            if dropped == 1 { "y" } else { "ies" }
        ));
    }

    table
}

/// Atomic replace: the table is written to a temporary sibling and
/// renamed into place, so a crash or concurrent reader never observes a
/// half-written file.
fn persist(path: &Path, table: &ValueTable) -> Result<()> {
    let json = serde_json::to_string_pretty(&to_raw(table))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(feature = "telemetry")]
fn warn(msg: &str) {
    tracing::warn!("{msg}");
}

#[cfg(not(feature = "telemetry"))]
fn warn(msg: &str) {
    eprintln!("suchlern-agent: {msg}");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use suchlern_core::{encode_at, CompanyProfile};
    use time::macros::datetime;

    const NOW: time::OffsetDateTime = datetime!(2026-08-30 12:00:00 UTC);

    fn temp_table(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "suchlern_agent_{}_{name}.json",
            std::process::id()
        ))
    }

    fn greedy_agent(name: &str) -> RetrievalAgent {
        let path = temp_table(name);
        let _ = fs::remove_file(&path);
        RetrievalAgent::new(AgentConfig {
            epsilon: 0.0,
            ..AgentConfig::with_table_path(path)
        })
    }

    fn ghg_state() -> QueryState {
        let profile = CompanyProfile {
            name: Some("Acme Energy".to_string()),
            sector: Some("energy".to_string()),
            size: Some("large".to_string()),
        };
        encode_at(
            "What is our scope 3 emissions deadline?",
            Some(&profile),
            NOW,
        )
    }

    fn other_state() -> QueryState {
        encode_at("something else entirely", None, NOW)
    }

    #[test]
    fn cold_start_against_missing_path_yields_valid_actions() {
        let agent = greedy_agent("cold_start");
        let state = ghg_state();
        assert!(Action::ALL.contains(&agent.select(&state)));
        assert!(agent.values(&state).values().all(|v| *v == 0.0));
        assert_eq!(agent.values(&state).len(), Action::ALL.len());
    }

    #[test]
    fn constant_reward_drives_value_monotonically_toward_one() {
        let agent = greedy_agent("convergence");
        let state = ghg_state();
        let mut prev = 0.0;
        for _ in 0..20 {
            agent.update(&state, Action::LegalOnly, 1.0, None).unwrap();
            let value = agent.values(&state)[&Action::LegalOnly];
            assert!(value > prev);
            prev = value;
        }
        assert!(prev >= 0.99);
        assert_eq!(agent.best_action(&state), Action::LegalOnly);
        // Never-updated actions stay at zero.
        assert_eq!(agent.values(&state)[&Action::Broad], 0.0);
    }

    #[test]
    fn down_vote_reduces_a_learned_preference() {
        let agent = greedy_agent("down_vote");
        let state = ghg_state();
        // One update with target 3.0 puts company_only at 0 + 0.3·3 = 0.9.
        agent.update(&state, Action::CompanyOnly, 3.0, None).unwrap();
        assert!((agent.values(&state)[&Action::CompanyOnly] - 0.9).abs() < 1e-6);
        assert_eq!(agent.select(&state), Action::CompanyOnly);

        agent.update(&state, Action::CompanyOnly, -1.0, None).unwrap();
        let value = agent.values(&state)[&Action::CompanyOnly];
        assert!((value - 0.33).abs() < 1e-6, "got {value}");
    }

    #[test]
    fn exploitation_breaks_ties_uniformly() {
        let agent = greedy_agent("tie_break");
        let state = other_state();
        let mut counts: HashMap<Action, usize> = HashMap::new();
        for _ in 0..400 {
            *counts.entry(agent.select(&state)).or_insert(0) += 1;
        }
        // All four actions are tied at zero; each should show up well
        // clear of never (expected ~100 of 400 each).
        for action in Action::ALL {
            let n = counts.get(&action).copied().unwrap_or(0);
            assert!(n >= 50, "{action} chosen only {n} times out of 400");
        }
    }

    #[test]
    fn bootstrapped_update_uses_discounted_next_best() {
        let agent = greedy_agent("bootstrap");
        let state = ghg_state();
        let next = other_state();
        // Put the next state's best action at 0.9.
        agent.update(&next, Action::Broad, 3.0, None).unwrap();

        agent
            .update(&state, Action::FinancialOnly, 0.0, Some(&next))
            .unwrap();
        // target = 0 + 0.9·0.9 = 0.81, new = 0.3·0.81 = 0.243
        let value = agent.values(&state)[&Action::FinancialOnly];
        assert!((value - 0.243).abs() < 1e-6, "got {value}");
    }

    #[test]
    fn concurrent_updates_match_a_sequential_run() {
        let agent = greedy_agent("concurrency");
        let state = ghg_state();
        let threads = 8;
        let per_thread = 25;

        std::thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|| {
                    for _ in 0..per_thread {
                        agent.update(&state, Action::Broad, 1.0, None).unwrap();
                    }
                });
            }
        });

        // Identical updates commute, so any serialization of the 200
        // calls lands on the same value as running them in a row.
        let mut expected: f32 = 0.0;
        for _ in 0..threads * per_thread {
            expected += 0.3 * (1.0 - expected);
        }
        let value = agent.values(&state)[&Action::Broad];
        assert!((value - expected).abs() < 1e-6, "got {value}, want {expected}");
    }

    #[test]
    fn table_survives_a_restart() {
        let path = temp_table("restart");
        let _ = fs::remove_file(&path);
        let state = ghg_state();

        let agent = RetrievalAgent::new(AgentConfig {
            epsilon: 0.0,
            ..AgentConfig::with_table_path(&path)
        });
        agent.update(&state, Action::LegalOnly, 1.0, None).unwrap();
        let before = agent.values(&state);
        drop(agent);

        let reloaded = RetrievalAgent::new(AgentConfig {
            epsilon: 0.0,
            ..AgentConfig::with_table_path(&path)
        });
        assert_eq!(reloaded.values(&state), before);
        assert_eq!(reloaded.select(&state), Action::LegalOnly);
    }

    #[test]
    fn corrupt_table_degrades_to_cold_start() {
        let path = temp_table("corrupt");
        fs::write(&path, "definitely{not json").unwrap();

        let agent = RetrievalAgent::new(AgentConfig {
            epsilon: 0.0,
            ..AgentConfig::with_table_path(&path)
        });
        assert!(agent.snapshot().is_empty());
        assert!(Action::ALL.contains(&agent.select(&ghg_state())));
    }

    #[test]
    fn stale_actions_are_dropped_and_rows_completed() {
        let path = temp_table("stale");
        let state = ghg_state();
        let mut row = BTreeMap::new();
        row.insert("legal_only".to_string(), 0.5f32);
        row.insert("ancient_action".to_string(), 0.9f32);
        let mut raw = BTreeMap::new();
        raw.insert(state.key(), row);
        fs::write(&path, serde_json::to_string_pretty(&raw).unwrap()).unwrap();

        let agent = RetrievalAgent::new(AgentConfig {
            epsilon: 0.0,
            ..AgentConfig::with_table_path(&path)
        });
        let values = agent.values(&state);
        assert_eq!(values.len(), Action::ALL.len());
        assert!((values[&Action::LegalOnly] - 0.5).abs() < 1e-6);
        assert_eq!(values[&Action::Broad], 0.0);
        assert_eq!(agent.select(&state), Action::LegalOnly);
    }

    #[test]
    fn non_finite_config_falls_back_to_defaults() {
        let agent = RetrievalAgent::new(AgentConfig {
            epsilon: f32::NAN,
            alpha: 9.0,
            gamma: f32::INFINITY,
            table_path: temp_table("sanitize"),
        });
        let cfg = agent.config();
        assert!((cfg.epsilon - 0.2).abs() < 1e-6);
        assert!((cfg.alpha - 1.0).abs() < 1e-6);
        assert!((cfg.gamma - 0.9).abs() < 1e-6);
    }

    #[test]
    #[cfg(unix)]
    fn failed_write_surfaces_and_keeps_previous_table() {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!(
            "suchlern_agent_{}_readonly",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("q_table.json");
        let state = ghg_state();

        let agent = RetrievalAgent::new(AgentConfig {
            epsilon: 0.0,
            ..AgentConfig::with_table_path(&path)
        });
        agent.update(&state, Action::Broad, 1.0, None).unwrap();
        let durable = fs::read_to_string(&path).unwrap();

        let mut perms = fs::metadata(&dir).unwrap().permissions();
        perms.set_mode(0o500);
        fs::set_permissions(&dir, perms).unwrap();
        if fs::metadata(&dir).unwrap().permissions().mode() & 0o777 != 0o500 {
            // Filesystem ignores permission bits; nothing to verify here.
            let mut perms = fs::metadata(&dir).unwrap().permissions();
            perms.set_mode(0o700);
            let _ = fs::set_permissions(&dir, perms);
            let _ = fs::remove_dir_all(&dir);
            return;
        }

        let result = agent.update(&state, Action::Broad, 1.0, None);

        let mut perms = fs::metadata(&dir).unwrap().permissions();
        perms.set_mode(0o700);
        fs::set_permissions(&dir, perms).unwrap();

        assert!(matches!(result, Err(AgentError::Persist(_))));
        // The previously durable file is untouched.
        assert_eq!(fs::read_to_string(&path).unwrap(), durable);

        let _ = fs::remove_dir_all(&dir);
    }
}
