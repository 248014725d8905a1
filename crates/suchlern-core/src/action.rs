//! The fixed action vocabulary and the action → metadata-filter mapping.
//!
//! Actions decide how narrowly retrieval is constrained before it runs.
//! The set is versioned: changing it invalidates previously learned
//! values, so stale entries are dropped explicitly on load (see
//! `suchlern-agent`). The mapper itself is stateless and total: any
//! unknown or empty action string maps to "no constraint" rather than
//! blocking retrieval.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version tag of the action vocabulary below. Bump when the set changes.
pub const ACTION_SET_VERSION: &str = "v1";

/// A retrieval-narrowing strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// No extra filter.
    Broad,
    /// Restrict to legal documents.
    LegalOnly,
    /// Restrict to financial documents.
    FinancialOnly,
    /// Prefer the requesting company's own material.
    CompanyOnly,
}

impl Action {
    /// The full action set, in canonical order.
    pub const ALL: [Action; 4] = [
        Action::Broad,
        Action::LegalOnly,
        Action::FinancialOnly,
        Action::CompanyOnly,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Broad => "broad",
            Self::LegalOnly => "legal_only",
            Self::FinancialOnly => "financial_only",
            Self::CompanyOnly => "company_only",
        }
    }

    /// Case-insensitive lookup; `None` for anything outside the set.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Action> {
        match raw.trim().to_lowercase().as_str() {
            "broad" => Some(Self::Broad),
            "legal_only" => Some(Self::LegalOnly),
            "financial_only" => Some(Self::FinancialOnly),
            "company_only" => Some(Self::CompanyOnly),
            _ => None,
        }
    }

    /// Maps this action to the metadata filter handed to retrieval.
    ///
    /// Pure: the same action and company always yield the same filter.
    /// [`Action::CompanyOnly`] keys on the company name when one is
    /// supplied and otherwise falls back to the generic `doc_type:
    /// "company"` category filter.
    #[must_use]
    pub fn filter(self, company_name: Option<&str>) -> Option<RetrievalFilter> {
        match self {
            Self::Broad => None,
            Self::LegalOnly => Some(RetrievalFilter::doc_type("legal")),
            Self::FinancialOnly => Some(RetrievalFilter::doc_type("financial")),
            Self::CompanyOnly => Some(match company_name {
                Some(name) => RetrievalFilter::company(name),
                None => RetrievalFilter::doc_type("company"),
            }),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-schema metadata constraint for the retrieval collaborator.
///
/// Assumes chunk metadata carries a `doc_type` field (e.g. "legal",
/// "financial", "company") and optionally a `company` name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl RetrievalFilter {
    #[must_use]
    pub fn doc_type(value: &str) -> Self {
        Self {
            doc_type: Some(value.to_string()),
            company: None,
        }
    }

    #[must_use]
    pub fn company(name: &str) -> Self {
        Self {
            doc_type: None,
            company: Some(name.to_string()),
        }
    }
}

/// String-level variant of [`Action::filter`] for callers holding a raw
/// action identifier. Total over all inputs: unknown or empty actions
/// fail open to "no constraint".
#[must_use]
pub fn action_to_filter(action: &str, company_name: Option<&str>) -> Option<RetrievalFilter> {
    Action::parse(action).and_then(|a| a.filter(company_name))
}
