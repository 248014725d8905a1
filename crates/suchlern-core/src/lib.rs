//! Core types for suchlern, the adaptive retrieval-policy selector.
//!
//! This crate holds the two stateless leaves of the system: the state
//! encoder ([`state`]), which collapses a free-text query plus an optional
//! [`CompanyProfile`] into a small discrete [`QueryState`], and the action
//! space ([`action`]), which maps a learned [`Action`] to the metadata
//! filter handed to the retrieval layer. The learning agent itself lives
//! in `suchlern-agent`.

use serde::{Deserialize, Serialize};

pub mod action;
pub mod state;

pub use action::{action_to_filter, Action, RetrievalFilter, ACTION_SET_VERSION};
pub use state::{encode, encode_at, LenBucket, QueryState, Topic};

/// Structured company context attached to a query.
///
/// Every field is optional; missing values degrade to the `"unknown"`
/// sentinel during encoding instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    /// Company name, used by the company-specific retrieval filter.
    pub name: Option<String>,
    /// Industry sector, e.g. "energy".
    pub sector: Option<String>,
    /// Size class, e.g. "large".
    pub size: Option<String>,
}
