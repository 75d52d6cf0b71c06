//! Query Dispatcher
//!
//! Fans one query out to every enabled backend, waits for all of them and
//! aggregates the outcomes into exactly one [`AssessmentVerdict`].
//!
//! # Isolation
//! Each backend call runs in its own tokio task, bounded by its own timeout.
//! A slow, blocking, failing or panicking backend turns into a Timeout / Error
//! outcome and never affects its siblings. There is no global deadline.

use crate::aggregator::aggregate;
use crate::backends::{BackendResolver, EnabledBackend};
use crate::query::QueryDescriptor;
use crate::types::{duration_ms, AssessmentVerdict, BackendOutcome, Classification};
use chrono::Utc;
use futures::future::join_all;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct QueryDispatcher {
    resolver: Arc<dyn BackendResolver>,
}

impl QueryDispatcher {
    pub fn new(resolver: Arc<dyn BackendResolver>) -> Self {
        Self { resolver }
    }

    /// Assess one venue query
    ///
    /// Never fails; backend faults are reported inside the verdict.
    pub async fn assess(&self, query: &QueryDescriptor) -> AssessmentVerdict {
        let start = Instant::now();
        let assessment_id = Uuid::new_v4();
        let backends = self.resolver.enabled_backends();

        if backends.is_empty() {
            warn!(%assessment_id, input = %query.raw_input, "No backends available");
            return AssessmentVerdict {
                assessment_id,
                input: query.raw_input.clone(),
                classification: Classification::Unknown,
                confidence: 0.0,
                overall_score: 0.0,
                backend_results: Vec::new(),
                reasoning: vec!["no backends available".to_string()],
                elapsed_ms: duration_ms(start.elapsed()),
                assessed_at: Utc::now(),
            };
        }

        debug!(
            %assessment_id,
            input = %query.raw_input,
            backends = backends.len(),
            "Dispatching query"
        );

        // Tasks need an owned descriptor; it stays read-only
        let shared = Arc::new(query.clone());

        // join_all keeps resolver order regardless of completion order
        let results: Vec<(BackendOutcome, f64)> = join_all(backends.iter().map(|entry| {
            let shared = Arc::clone(&shared);
            async move { (run_backend(entry, shared).await, entry.weight) }
        }))
        .await;

        for (outcome, _) in results.iter().filter(|(o, _)| o.status.is_failure()) {
            warn!(
                %assessment_id,
                backend = %outcome.backend_name,
                status = %outcome.status,
                error = outcome.error_message.as_deref().unwrap_or(""),
                "Backend failed (isolated)"
            );
        }

        let aggregation = aggregate(&results);
        let elapsed_ms = duration_ms(start.elapsed());

        info!(
            %assessment_id,
            input = %query.raw_input,
            classification = %aggregation.classification,
            confidence = aggregation.confidence,
            elapsed_ms,
            "Assessment complete"
        );

        let verdict = AssessmentVerdict {
            assessment_id,
            input: query.raw_input.clone(),
            classification: aggregation.classification,
            confidence: aggregation.confidence,
            overall_score: aggregation.overall_score,
            backend_results: results.into_iter().map(|(outcome, _)| outcome).collect(),
            reasoning: aggregation.reasoning,
            elapsed_ms,
            assessed_at: Utc::now(),
        };
        debug!(
            %assessment_id,
            found = verdict.found_results().count(),
            failed = verdict.failed_results().count(),
            "Backend tally"
        );
        verdict
    }
}

/// Run one backend in its own task under its timeout
///
/// Panics surface as a `JoinError` and become Error outcomes. On timeout the
/// task is aborted.
async fn run_backend(entry: &EnabledBackend, query: Arc<QueryDescriptor>) -> BackendOutcome {
    let start = Instant::now();
    let backend = Arc::clone(&entry.backend);
    let limit = entry.timeout;
    let name = backend.name().to_string();
    let category = backend.evidence_category();

    let mut handle = tokio::spawn(async move { backend.query(&query, limit).await });

    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(outcome)) => {
            debug!(
                backend = %name,
                status = %outcome.status,
                elapsed_ms = outcome.elapsed_ms,
                cached = outcome.cached,
                "Backend finished"
            );
            outcome
        }
        Ok(Err(join_err)) => {
            let detail = if join_err.is_panic() {
                format!("backend panicked: {}", panic_message(join_err.into_panic().as_ref()))
            } else {
                format!("backend task failed: {}", join_err)
            };
            BackendOutcome::error(name, category, detail).with_elapsed(start.elapsed())
        }
        Err(_) => {
            handle.abort();
            BackendOutcome::timeout(name, category, limit)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
