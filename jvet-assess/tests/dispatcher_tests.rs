//! Integration tests for the query dispatcher
//!
//! Stub backends stand in for real sources so every aggregation path and
//! every isolation guarantee can be exercised without network access.

use async_trait::async_trait;
use jvet_assess::backends::{Backend, BackendResolver, EnabledBackend};
use jvet_assess::{
    AssessmentVerdict, BackendOutcome, BackendStatus, Classification, EvidenceCategory,
    QueryDescriptor, QueryDispatcher,
};
use std::sync::Arc;
use std::time::Duration;

const EPS: f64 = 1e-9;

// ============================================================================
// Stub backends
// ============================================================================

enum Behavior {
    Return(BackendOutcome),
    Sleep(Duration),
    /// Holds the worker thread without yielding
    Block(Duration),
    Panic(&'static str),
}

struct Stub {
    name: String,
    category: EvidenceCategory,
    behavior: Behavior,
}

#[async_trait]
impl Backend for Stub {
    fn name(&self) -> &str {
        &self.name
    }

    fn evidence_category(&self) -> EvidenceCategory {
        self.category
    }

    async fn query(&self, _query: &QueryDescriptor, _timeout: Duration) -> BackendOutcome {
        match &self.behavior {
            Behavior::Return(outcome) => outcome.clone(),
            Behavior::Sleep(d) => {
                tokio::time::sleep(*d).await;
                BackendOutcome::not_found(&self.name, self.category)
            }
            Behavior::Block(d) => {
                std::thread::sleep(*d);
                BackendOutcome::not_found(&self.name, self.category)
            }
            Behavior::Panic(msg) => panic!("{}", msg),
        }
    }
}

/// Fixed list of backends with weights
struct StaticResolver(Vec<EnabledBackend>);

impl BackendResolver for StaticResolver {
    fn enabled_backends(&self) -> Vec<EnabledBackend> {
        self.0.clone()
    }
}

fn entry(
    name: &str,
    category: EvidenceCategory,
    behavior: Behavior,
    weight: f64,
) -> EnabledBackend {
    EnabledBackend {
        backend: Arc::new(Stub {
            name: name.to_string(),
            category,
            behavior,
        }),
        weight,
        timeout: Duration::from_secs(2),
    }
}

fn found(
    name: &str,
    category: EvidenceCategory,
    label: Classification,
    confidence: f64,
) -> EnabledBackend {
    entry(
        name,
        category,
        Behavior::Return(BackendOutcome::found(
            name,
            category,
            label,
            confidence,
            serde_json::Value::Null,
        )),
        1.0,
    )
}

fn with_weight(mut e: EnabledBackend, weight: f64) -> EnabledBackend {
    e.weight = weight;
    e
}

async fn assess(backends: Vec<EnabledBackend>) -> AssessmentVerdict {
    QueryDispatcher::new(Arc::new(StaticResolver(backends)))
        .assess(&QueryDescriptor::from_input(
            "International Journal of Advanced Things (IJAT)",
        ))
        .await
}

// ============================================================================
// Vacuum cases
// ============================================================================

#[tokio::test]
async fn test_no_backends() {
    let verdict = assess(vec![]).await;
    assert_eq!(verdict.classification, Classification::Unknown);
    assert_eq!(verdict.confidence, 0.0);
    assert_eq!(verdict.reasoning, vec!["no backends available"]);
}

#[tokio::test]
async fn test_all_errors_is_unknown_zero() {
    let verdict = assess(vec![
        entry(
            "a",
            EvidenceCategory::PredatoryList,
            Behavior::Return(BackendOutcome::error("a", EvidenceCategory::PredatoryList, "io")),
            1.0,
        ),
        entry(
            "b",
            EvidenceCategory::Heuristic,
            Behavior::Return(BackendOutcome::error("b", EvidenceCategory::Heuristic, "dns")),
            1.0,
        ),
    ])
    .await;

    assert_eq!(verdict.classification, Classification::Unknown);
    assert_eq!(verdict.confidence, 0.0);
    assert_eq!(verdict.backend_results.len(), 2);
    assert_eq!(verdict.failed_results().count(), 2);
}

#[tokio::test]
async fn test_all_not_found_is_unknown_point_two() {
    let verdict = assess(vec![
        entry(
            "a",
            EvidenceCategory::PredatoryList,
            Behavior::Return(BackendOutcome::not_found("a", EvidenceCategory::PredatoryList)),
            1.0,
        ),
        entry(
            "b",
            EvidenceCategory::LegitimateList,
            Behavior::Return(BackendOutcome::not_found("b", EvidenceCategory::LegitimateList)),
            1.0,
        ),
    ])
    .await;

    assert_eq!(verdict.classification, Classification::Unknown);
    assert!((verdict.confidence - 0.2).abs() < EPS);
}

// ============================================================================
// Decision rule
// ============================================================================

#[tokio::test]
async fn test_single_predatory_list_hit() {
    let verdict = assess(vec![found(
        "bealls",
        EvidenceCategory::PredatoryList,
        Classification::Predatory,
        0.9,
    )])
    .await;

    assert_eq!(verdict.classification, Classification::Predatory);
    assert!((verdict.confidence - 0.9).abs() < EPS);
}

#[tokio::test]
async fn test_list_hit_against_weighted_heuristic() {
    let verdict = assess(vec![
        found("bealls", EvidenceCategory::PredatoryList, Classification::Predatory, 0.9),
        with_weight(
            found("openalex", EvidenceCategory::Heuristic, Classification::Legitimate, 0.6),
            0.8,
        ),
    ])
    .await;

    assert_eq!(verdict.classification, Classification::Predatory);
    assert!((verdict.overall_score - 0.5).abs() < EPS);
    assert!((verdict.confidence - 0.5).abs() < EPS);
    assert!(verdict
        .reasoning
        .iter()
        .any(|r| r == "backends disagree: 1 predatory vs 1 legitimate"));
    assert!(!verdict.reasoning.iter().any(|r| r.contains("agree on")));
}

#[tokio::test]
async fn test_list_and_heuristic_agree_on_predatory() {
    let verdict = assess(vec![
        found("bealls", EvidenceCategory::PredatoryList, Classification::Predatory, 0.9),
        found("openalex", EvidenceCategory::Heuristic, Classification::Predatory, 0.6),
    ])
    .await;

    assert_eq!(verdict.classification, Classification::Predatory);
    assert!((verdict.overall_score - 0.75).abs() < EPS);
    assert!((verdict.confidence - 0.81).abs() < EPS);
    assert_eq!(
        verdict.reasoning.last().map(String::as_str),
        Some("2 backends agree on predatory")
    );
}

#[tokio::test]
async fn test_heuristics_never_yield_predatory() {
    let verdict = assess(vec![
        found("openalex", EvidenceCategory::Heuristic, Classification::Predatory, 0.7),
        found("crossref", EvidenceCategory::Heuristic, Classification::Predatory, 0.9),
    ])
    .await;

    assert_eq!(verdict.classification, Classification::Suspicious);
    assert!(verdict.confidence <= 0.85);
}

// ============================================================================
// Isolation
// ============================================================================

#[tokio::test]
async fn test_timeout_is_isolated() {
    let mut slow = entry(
        "slow",
        EvidenceCategory::Heuristic,
        Behavior::Sleep(Duration::from_secs(30)),
        1.0,
    );
    slow.timeout = Duration::from_millis(50);

    let verdict = assess(vec![
        slow,
        found("bealls", EvidenceCategory::PredatoryList, Classification::Predatory, 0.9),
    ])
    .await;

    assert_eq!(verdict.backend_results[0].status, BackendStatus::Timeout);
    assert_eq!(verdict.backend_results[0].backend_name, "slow");
    assert_eq!(verdict.backend_results[1].status, BackendStatus::Found);
    assert_eq!(verdict.classification, Classification::Predatory);
    assert!(verdict.elapsed_ms < 30_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_backend_does_not_stall_siblings() {
    let mut stuck = entry(
        "stuck",
        EvidenceCategory::Heuristic,
        Behavior::Block(Duration::from_millis(1500)),
        1.0,
    );
    stuck.timeout = Duration::from_millis(50);
    let mut quick = found(
        "bealls",
        EvidenceCategory::PredatoryList,
        Classification::Predatory,
        0.9,
    );
    quick.timeout = Duration::from_millis(500);

    let started = std::time::Instant::now();
    let verdict = assess(vec![stuck, quick]).await;

    assert_eq!(verdict.backend_results[0].status, BackendStatus::Timeout);
    assert_eq!(verdict.backend_results[1].status, BackendStatus::Found);
    assert_eq!(verdict.classification, Classification::Predatory);
    assert!(started.elapsed() < Duration::from_millis(1000));
}

#[tokio::test]
async fn test_panic_is_isolated() {
    let verdict = assess(vec![
        entry(
            "broken",
            EvidenceCategory::Heuristic,
            Behavior::Panic("index out of range"),
            1.0,
        ),
        found("doaj", EvidenceCategory::LegitimateList, Classification::Legitimate, 0.95),
    ])
    .await;

    let broken = &verdict.backend_results[0];
    assert_eq!(broken.status, BackendStatus::Error);
    assert_eq!(
        broken.error_message.as_deref(),
        Some("backend panicked: index out of range")
    );
    assert_eq!(verdict.classification, Classification::Legitimate);
}

#[tokio::test]
async fn test_results_keep_resolver_order() {
    let mut first = entry(
        "first",
        EvidenceCategory::Heuristic,
        Behavior::Sleep(Duration::from_millis(40)),
        1.0,
    );
    first.timeout = Duration::from_secs(1);

    let verdict = assess(vec![
        first,
        found("second", EvidenceCategory::LegitimateList, Classification::Legitimate, 0.8),
    ])
    .await;

    let names: Vec<_> = verdict
        .backend_results
        .iter()
        .map(|o| o.backend_name.as_str())
        .collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(verdict.backend_results[0].status, BackendStatus::NotFound);
}

// ============================================================================
// Determinism
// ============================================================================

#[tokio::test]
async fn test_repeated_assessments_are_identical() {
    let backends = || {
        vec![
            found("bealls", EvidenceCategory::PredatoryList, Classification::Predatory, 0.85),
            found("hijacked", EvidenceCategory::PredatoryList, Classification::Predatory, 0.9),
            entry(
                "down",
                EvidenceCategory::Heuristic,
                Behavior::Return(BackendOutcome::error("down", EvidenceCategory::Heuristic, "503")),
                1.0,
            ),
        ]
    };

    let first = assess(backends()).await;
    for _ in 0..5 {
        let again = assess(backends()).await;
        assert_eq!(again.classification, first.classification);
        assert_eq!(again.confidence, first.confidence);
        assert_eq!(again.overall_score, first.overall_score);
        assert_eq!(again.reasoning, first.reasoning);
    }
    assert_ne!(first.assessment_id, assess(backends()).await.assessment_id);
}

#[tokio::test]
async fn test_verdict_serializes_to_json() {
    let verdict = assess(vec![found(
        "bealls",
        EvidenceCategory::PredatoryList,
        Classification::Predatory,
        0.9,
    )])
    .await;

    let json = serde_json::to_value(&verdict).unwrap();
    assert_eq!(json["classification"], "predatory");
    assert_eq!(json["backend_results"][0]["status"], "found");
    assert_eq!(json["backend_results"][0]["evidence_category"], "predatory_list");
}
