//! Fallback Strategy Executor
//!
//! Tries a backend's strategy handlers one at a time in the caller's order.
//!
//! # State Machine
//! ```text
//! NotStarted → Trying(i) → Succeeded(i)
//!                        → Trying(i+1)        (soft miss)
//!                        → Aborted(kind)      (system fault)
//!                        → ExhaustedNotFound  (last strategy missed)
//! ```
//!
//! Strategies never run concurrently: later strategies are only worth their
//! cost when every earlier one missed.

use super::{ErrorKind, FallbackLedger, ResolutionStrategy, StrategyError, StrategyResult};
use crate::query::QueryDescriptor;
use crate::types::{BackendOutcome, Classification, EvidenceCategory};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Handler for one strategy of backend `B` producing raw matches of type `M`
pub type StrategyHandler<B, M> =
    for<'a> fn(&'a B, &'a QueryDescriptor) -> BoxFuture<'a, StrategyResult<M>>;

/// Backend-supplied match quality function
pub type MatchConfidenceFn<M> = fn(&QueryDescriptor, &M) -> f64;

/// Dispatch table from strategy tag to handler
///
/// Strategies without a registered handler behave as an always-soft-miss
/// handler.
pub struct StrategyTable<B, M> {
    handlers: HashMap<ResolutionStrategy, StrategyHandler<B, M>>,
    match_confidence: Option<MatchConfidenceFn<M>>,
}

impl<B, M> StrategyTable<B, M> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            match_confidence: None,
        }
    }

    /// Register the handler for `strategy`, replacing any previous one
    pub fn register(
        mut self,
        strategy: ResolutionStrategy,
        handler: StrategyHandler<B, M>,
    ) -> Self {
        self.handlers.insert(strategy, handler);
        self
    }

    pub fn with_match_confidence(mut self, f: MatchConfidenceFn<M>) -> Self {
        self.match_confidence = Some(f);
        self
    }

    pub fn supports(&self, strategy: ResolutionStrategy) -> bool {
        self.handlers.contains_key(&strategy)
    }

    /// Registered strategies in priority order
    pub fn supported(&self) -> Vec<ResolutionStrategy> {
        let mut strategies: Vec<_> = self.handlers.keys().copied().collect();
        strategies.sort();
        strategies
    }
}

impl<B, M> Default for StrategyTable<B, M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Executor state; the last three variants are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    NotStarted,
    Trying(usize),
    Succeeded(usize),
    Aborted(ErrorKind),
    ExhaustedNotFound,
}

/// Terminal result of a fallback resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome<M> {
    Matched {
        strategy: ResolutionStrategy,
        record: M,
        /// Unset when the backend supplies no match quality function
        confidence: Option<f64>,
    },
    NotFound,
    Aborted(StrategyError),
}

/// Resolution outcome plus its audit ledger
#[derive(Debug, Clone)]
pub struct FallbackResolution<M> {
    pub outcome: ResolutionOutcome<M>,
    pub ledger: FallbackLedger,
    pub state: FallbackState,
}

impl<M> FallbackResolution<M> {
    pub fn is_match(&self) -> bool {
        matches!(self.outcome, ResolutionOutcome::Matched { .. })
    }

    /// Convert into a [`BackendOutcome`] carrying the ledger
    ///
    /// `classify` turns the matched record and its optional match confidence
    /// into (classification, confidence, raw payload). Faults map to
    /// Timeout / RateLimited / Error statuses.
    pub fn into_backend_outcome<F>(
        self,
        backend_name: &str,
        evidence_category: EvidenceCategory,
        elapsed: Duration,
        classify: F,
    ) -> BackendOutcome
    where
        F: FnOnce(&M, Option<f64>) -> (Classification, f64, serde_json::Value),
    {
        let outcome = match self.outcome {
            ResolutionOutcome::Matched {
                record, confidence, ..
            } => {
                let (classification, confidence, raw) = classify(&record, confidence);
                BackendOutcome::found(
                    backend_name,
                    evidence_category,
                    classification,
                    confidence,
                    raw,
                )
            }
            ResolutionOutcome::NotFound => {
                BackendOutcome::not_found(backend_name, evidence_category)
            }
            ResolutionOutcome::Aborted(err) => match err.kind {
                ErrorKind::Timeout => BackendOutcome {
                    error_message: Some(err.to_string()),
                    ..BackendOutcome::timeout(backend_name, evidence_category, elapsed)
                },
                ErrorKind::RateLimit => {
                    BackendOutcome::rate_limited(backend_name, evidence_category, err.to_string())
                }
                _ => BackendOutcome::error(backend_name, evidence_category, err.to_string()),
            },
        };

        outcome.with_elapsed(elapsed).with_ledger(self.ledger)
    }
}

/// Resolve `query` against `backend` trying `strategies` in order
///
/// Stops at the first match or the first system fault. Every attempt is
/// recorded in the returned ledger.
pub async fn resolve_with_fallback<B, M>(
    backend: &B,
    table: &StrategyTable<B, M>,
    query: &QueryDescriptor,
    strategies: &[ResolutionStrategy],
) -> FallbackResolution<M>
where
    B: Sync,
    M: Send,
{
    let mut ledger = FallbackLedger::new(strategies);

    for (index, &strategy) in strategies.iter().enumerate() {
        let attempted_value = strategy.attempted_value(query);
        debug!(
            strategy = %strategy,
            state = ?FallbackState::Trying(index),
            attempted_value = ?attempted_value,
            "Trying resolution strategy"
        );

        let result = match table.handlers.get(&strategy) {
            Some(handler) => handler(backend, query).await,
            None => Ok(None),
        };

        match result {
            Ok(Some(record)) => {
                let confidence = table
                    .match_confidence
                    .map(|f| f(query, &record).clamp(0.0, 1.0));
                ledger.record(strategy, true, attempted_value, confidence);

                debug!(
                    strategy = %strategy,
                    attempts = ledger.len(),
                    confidence = ?confidence,
                    "Strategy matched"
                );

                return FallbackResolution {
                    outcome: ResolutionOutcome::Matched {
                        strategy,
                        record,
                        confidence,
                    },
                    ledger,
                    state: FallbackState::Succeeded(index),
                };
            }
            Ok(None) => {
                ledger.record_failure(strategy, attempted_value, ErrorKind::SoftMiss, None);
            }
            Err(err) if !err.kind.is_system_fault() => {
                ledger.record_failure(
                    strategy,
                    attempted_value,
                    ErrorKind::SoftMiss,
                    Some(err.message),
                );
            }
            Err(err) => {
                ledger.record_failure(
                    strategy,
                    attempted_value,
                    err.kind,
                    Some(err.message.clone()),
                );

                warn!(
                    strategy = %strategy,
                    error_kind = %err.kind,
                    error = %err.message,
                    skipped = strategies.len() - index - 1,
                    "System fault, aborting fallback chain"
                );

                let kind = err.kind;
                return FallbackResolution {
                    outcome: ResolutionOutcome::Aborted(err),
                    ledger,
                    state: FallbackState::Aborted(kind),
                };
            }
        }
    }

    debug!(
        attempts = ledger.len(),
        "All strategies exhausted without a match"
    );

    FallbackResolution {
        outcome: ResolutionOutcome::NotFound,
        ledger,
        state: FallbackState::ExhaustedNotFound,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BackendStatus;
    use futures::FutureExt;
    use std::sync::Mutex;

    /// Scripted backend: each strategy's reply is fixed, every call is logged
    struct Scripted {
        calls: Mutex<Vec<ResolutionStrategy>>,
        by_id: StrategyResult<String>,
        by_exact: StrategyResult<String>,
        by_alias: StrategyResult<String>,
    }

    impl Scripted {
        fn new(
            by_id: StrategyResult<String>,
            by_exact: StrategyResult<String>,
            by_alias: StrategyResult<String>,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                by_id,
                by_exact,
                by_alias,
            }
        }

        fn reply(
            &self,
            strategy: ResolutionStrategy,
            result: &StrategyResult<String>,
        ) -> StrategyResult<String> {
            self.calls.lock().unwrap().push(strategy);
            result.clone()
        }

        fn calls(&self) -> Vec<ResolutionStrategy> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn by_id<'a>(
        b: &'a Scripted,
        _q: &'a QueryDescriptor,
    ) -> BoxFuture<'a, StrategyResult<String>> {
        futures::future::ready(b.reply(ResolutionStrategy::ById, &b.by_id)).boxed()
    }

    fn by_exact<'a>(
        b: &'a Scripted,
        _q: &'a QueryDescriptor,
    ) -> BoxFuture<'a, StrategyResult<String>> {
        futures::future::ready(b.reply(ResolutionStrategy::ByExactName, &b.by_exact)).boxed()
    }

    fn by_alias<'a>(
        b: &'a Scripted,
        _q: &'a QueryDescriptor,
    ) -> BoxFuture<'a, StrategyResult<String>> {
        async move { b.reply(ResolutionStrategy::ByAlias, &b.by_alias) }.boxed()
    }

    fn table() -> StrategyTable<Scripted, String> {
        StrategyTable::new()
            .register(ResolutionStrategy::ById, by_id)
            .register(ResolutionStrategy::ByExactName, by_exact)
            .register(ResolutionStrategy::ByAlias, by_alias)
    }

    const ABC: [ResolutionStrategy; 3] = [
        ResolutionStrategy::ById,
        ResolutionStrategy::ByExactName,
        ResolutionStrategy::ByAlias,
    ];

    fn query() -> QueryDescriptor {
        QueryDescriptor::from_input("Journal of Testing")
    }

    #[tokio::test]
    async fn test_soft_miss_then_match_stops_early() {
        let backend = Scripted::new(
            Ok(None),
            Ok(Some("record-b".into())),
            Ok(Some("record-c".into())),
        );

        let resolution = resolve_with_fallback(&backend, &table(), &query(), &ABC).await;

        assert_eq!(
            backend.calls(),
            vec![ResolutionStrategy::ById, ResolutionStrategy::ByExactName]
        );
        assert_eq!(resolution.ledger.len(), 2);
        assert!(!resolution.ledger.attempts()[0].succeeded);
        assert!(resolution.ledger.attempts()[1].succeeded);
        assert_eq!(resolution.ledger.successful_strategy(), Some(ResolutionStrategy::ByExactName));
        assert_eq!(resolution.state, FallbackState::Succeeded(1));
        assert_eq!(
            resolution.outcome,
            ResolutionOutcome::Matched {
                strategy: ResolutionStrategy::ByExactName,
                record: "record-b".into(),
                confidence: None,
            }
        );
    }

    #[tokio::test]
    async fn test_system_fault_aborts_chain() {
        let backend = Scripted::new(
            Err(StrategyError::new(ErrorKind::Connection, "connection refused")),
            Ok(Some("record-b".into())),
            Ok(Some("record-c".into())),
        );

        let resolution = resolve_with_fallback(&backend, &table(), &query(), &ABC).await;

        assert_eq!(backend.calls(), vec![ResolutionStrategy::ById]);
        assert_eq!(resolution.ledger.len(), 1);
        let attempt = &resolution.ledger.attempts()[0];
        assert!(!attempt.succeeded);
        assert_eq!(attempt.error_kind, Some(ErrorKind::Connection));
        assert_eq!(attempt.error_detail.as_deref(), Some("connection refused"));
        assert_eq!(resolution.state, FallbackState::Aborted(ErrorKind::Connection));
        assert!(matches!(resolution.outcome, ResolutionOutcome::Aborted(_)));
    }

    #[tokio::test]
    async fn test_explicit_soft_miss_error_continues() {
        let backend = Scripted::new(
            Err(StrategyError::soft_miss("no ISSN on record")),
            Ok(None),
            Ok(None),
        );

        let resolution = resolve_with_fallback(&backend, &table(), &query(), &ABC).await;

        assert_eq!(backend.calls().len(), 3);
        assert_eq!(resolution.state, FallbackState::ExhaustedNotFound);
        assert_eq!(resolution.outcome, ResolutionOutcome::NotFound);
        assert_eq!(resolution.ledger.len(), 3);
        assert_eq!(
            resolution.ledger.attempts()[0].error_detail.as_deref(),
            Some("no ISSN on record")
        );
        assert_eq!(resolution.ledger.successful_strategy(), None);
    }

    #[tokio::test]
    async fn test_unregistered_strategy_soft_misses() {
        let backend = Scripted::new(Ok(None), Ok(None), Ok(Some("alias-hit".into())));
        let plan = [ResolutionStrategy::ByFuzzyName, ResolutionStrategy::ByAlias];

        let resolution = resolve_with_fallback(&backend, &table(), &query(), &plan).await;

        assert_eq!(backend.calls(), vec![ResolutionStrategy::ByAlias]);
        assert_eq!(resolution.ledger.len(), 2);
        assert_eq!(resolution.ledger.attempts()[0].strategy, ResolutionStrategy::ByFuzzyName);
        assert_eq!(resolution.ledger.attempts()[0].error_kind, Some(ErrorKind::SoftMiss));
        assert!(resolution.is_match());
    }

    #[test]
    fn test_supported_strategies_in_priority_order() {
        let table = table();
        assert!(table.supports(ResolutionStrategy::ByAlias));
        assert!(!table.supports(ResolutionStrategy::ByFuzzyName));
        assert_eq!(table.supported(), ABC.to_vec());
    }

    #[tokio::test]
    async fn test_match_confidence_function() {
        fn quality(_q: &QueryDescriptor, record: &String) -> f64 {
            if record == "exact" { 1.7 } else { 0.5 }
        }

        let backend = Scripted::new(Ok(Some("exact".into())), Ok(None), Ok(None));
        let table = table().with_match_confidence(quality);

        let resolution = resolve_with_fallback(&backend, &table, &query(), &ABC).await;

        assert_eq!(resolution.ledger.attempts()[0].match_confidence, Some(1.0));
        match resolution.outcome {
            ResolutionOutcome::Matched { confidence, .. } => assert_eq!(confidence, Some(1.0)),
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_plan_is_not_found() {
        let backend = Scripted::new(Ok(Some("x".into())), Ok(None), Ok(None));
        let resolution = resolve_with_fallback(&backend, &table(), &query(), &[]).await;

        assert!(backend.calls().is_empty());
        assert!(resolution.ledger.is_empty());
        assert_eq!(resolution.state, FallbackState::ExhaustedNotFound);
    }

    #[tokio::test]
    async fn test_into_backend_outcome_maps_faults() {
        let backend = Scripted::new(
            Err(StrategyError::new(ErrorKind::RateLimit, "HTTP 429")),
            Ok(None),
            Ok(None),
        );
        let resolution = resolve_with_fallback(&backend, &table(), &query(), &ABC).await;
        let outcome = resolution.into_backend_outcome(
            "scripted",
            EvidenceCategory::Heuristic,
            Duration::from_millis(12),
            |_, _| unreachable!("no match"),
        );

        assert_eq!(outcome.status, BackendStatus::RateLimited);
        assert_eq!(outcome.elapsed_ms, 12);
        assert_eq!(outcome.fallback_ledger.as_ref().map(|l| l.len()), Some(1));
        assert_eq!(outcome.error_message.as_deref(), Some("rate limited: HTTP 429"));
    }

    #[tokio::test]
    async fn test_into_backend_outcome_found() {
        let backend = Scripted::new(Ok(Some("hit".into())), Ok(None), Ok(None));
        let resolution = resolve_with_fallback(&backend, &table(), &query(), &ABC).await;
        let outcome = resolution.into_backend_outcome(
            "scripted",
            EvidenceCategory::PredatoryList,
            Duration::from_millis(3),
            |record, confidence| {
                assert_eq!(record, "hit");
                (
                    Classification::Predatory,
                    confidence.unwrap_or(0.9),
                    serde_json::json!({ "record": record }),
                )
            },
        );

        assert_eq!(outcome.status, BackendStatus::Found);
        assert_eq!(outcome.classification, Some(Classification::Predatory));
        assert_eq!(outcome.confidence, 0.9);
        assert_eq!(outcome.raw_data["record"], "hit");
    }
}
