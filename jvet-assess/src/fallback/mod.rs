//! Fallback Resolution
//!
//! Resolves one query against one backend by trying resolution strategies in
//! priority order (cheapest/most specific first) until one matches.
//!
//! # Components
//! - **ledger** - append-only record of every attempt, for audit
//! - **executor** - the sequential strategy loop with abort-vs-continue rules
//!
//! # Error Classification
//! Handlers return a tagged [`StrategyError`]. A [`ErrorKind::SoftMiss`] moves
//! on to the next strategy; every other kind is a system fault that aborts the
//! chain.

pub mod executor;
pub mod ledger;

pub use executor::{
    resolve_with_fallback, FallbackResolution, FallbackState, MatchConfidenceFn,
    ResolutionOutcome, StrategyHandler, StrategyTable,
};
pub use ledger::{FallbackAttempt, FallbackLedger};

use crate::query::QueryDescriptor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One named way of resolving a query to a record
///
/// Variant order is the default priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// ISSN / eISSN / DOI lookup
    ById,
    ByExactName,
    ByAlias,
    ByAcronymExpansion,
    ByFuzzyName,
}

impl ResolutionStrategy {
    /// Every strategy, cheapest first
    pub const ALL: [ResolutionStrategy; 5] = [
        ResolutionStrategy::ById,
        ResolutionStrategy::ByExactName,
        ResolutionStrategy::ByAlias,
        ResolutionStrategy::ByAcronymExpansion,
        ResolutionStrategy::ByFuzzyName,
    ];

    /// The query value this strategy works from, recorded in the ledger
    pub fn attempted_value(&self, query: &QueryDescriptor) -> Option<String> {
        let value = match self {
            ResolutionStrategy::ById => query
                .identifiers
                .iter()
                .map(|(kind, value)| format!("{}:{}", kind, value))
                .collect::<Vec<_>>()
                .join(", "),
            ResolutionStrategy::ByExactName | ResolutionStrategy::ByFuzzyName => {
                query.normalized_name.clone()
            }
            ResolutionStrategy::ByAlias => {
                query.aliases.iter().cloned().collect::<Vec<_>>().join(", ")
            }
            ResolutionStrategy::ByAcronymExpansion => query
                .acronym_expansion
                .as_ref()
                .map(|e| e.expansion.clone())
                .unwrap_or_default(),
        };
        (!value.is_empty()).then_some(value)
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolutionStrategy::ById => "by_id",
            ResolutionStrategy::ByExactName => "by_exact_name",
            ResolutionStrategy::ByAlias => "by_alias",
            ResolutionStrategy::ByAcronymExpansion => "by_acronym_expansion",
            ResolutionStrategy::ByFuzzyName => "by_fuzzy_name",
        };
        write!(f, "{}", s)
    }
}

/// Failure classification for a strategy attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Nothing found for this strategy; the channel is healthy
    SoftMiss,
    Timeout,
    Connection,
    Auth,
    RateLimit,
    /// Unclassified fault
    Unknown,
}

impl ErrorKind {
    /// Every kind except `SoftMiss` aborts the fallback chain
    pub fn is_system_fault(&self) -> bool {
        !matches!(self, ErrorKind::SoftMiss)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::SoftMiss => "soft miss",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection failure",
            ErrorKind::Auth => "authentication failure",
            ErrorKind::RateLimit => "rate limited",
            ErrorKind::Unknown => "unclassified fault",
        };
        write!(f, "{}", s)
    }
}

/// Tagged strategy failure
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StrategyError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StrategyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn soft_miss(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SoftMiss, message)
    }
}

/// Handler result: `Ok(Some(_))` match, `Ok(None)` soft miss, `Err(_)` tagged failure
pub type StrategyResult<M> = Result<Option<M>, StrategyError>;
