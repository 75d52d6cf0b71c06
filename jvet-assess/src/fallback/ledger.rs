//! Fallback Ledger
//!
//! Ordered, append-only log of the strategies tried for one query against one
//! backend. Entries are never removed or reordered.

use super::{ErrorKind, ResolutionStrategy};
use serde::{Deserialize, Serialize};

/// One strategy attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackAttempt {
    pub strategy: ResolutionStrategy,
    pub succeeded: bool,
    /// Query value the strategy worked from
    pub attempted_value: Option<String>,
    /// Match quality, when the backend supplies one
    pub match_confidence: Option<f64>,
    /// Failure classification for unsuccessful attempts
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
}

/// Audit record of a fallback resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackLedger {
    planned: Vec<ResolutionStrategy>,
    attempts: Vec<FallbackAttempt>,
}

impl FallbackLedger {
    pub fn new(planned: &[ResolutionStrategy]) -> Self {
        Self {
            planned: planned.to_vec(),
            attempts: Vec::new(),
        }
    }

    /// Append one attempt
    pub fn record(
        &mut self,
        strategy: ResolutionStrategy,
        succeeded: bool,
        attempted_value: Option<String>,
        match_confidence: Option<f64>,
    ) {
        self.attempts.push(FallbackAttempt {
            strategy,
            succeeded,
            attempted_value,
            match_confidence,
            error_kind: None,
            error_detail: None,
        });
    }

    /// Append a failed attempt with its failure classification
    pub fn record_failure(
        &mut self,
        strategy: ResolutionStrategy,
        attempted_value: Option<String>,
        kind: ErrorKind,
        detail: Option<String>,
    ) {
        self.attempts.push(FallbackAttempt {
            strategy,
            succeeded: false,
            attempted_value,
            match_confidence: None,
            error_kind: Some(kind),
            error_detail: detail,
        });
    }

    /// Strategy of the first successful attempt
    pub fn successful_strategy(&self) -> Option<ResolutionStrategy> {
        self.attempts
            .iter()
            .find(|a| a.succeeded)
            .map(|a| a.strategy)
    }

    /// Full ordered attempt log
    pub fn attempts(&self) -> &[FallbackAttempt] {
        &self.attempts
    }

    /// Strategy order the executor was asked to follow
    pub fn planned(&self) -> &[ResolutionStrategy] {
        &self.planned
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// One-line audit summary, e.g. `by_id:miss -> by_exact_name:hit`
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| {
                let result = match (a.succeeded, a.error_kind) {
                    (true, _) => "hit".to_string(),
                    (false, None) | (false, Some(ErrorKind::SoftMiss)) => "miss".to_string(),
                    (false, Some(kind)) => format!("abort({})", kind),
                };
                format!("{}:{}", a.strategy, result)
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
