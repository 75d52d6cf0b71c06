//! Core Types for jvet-assess
//!
//! Value types shared by the fallback executor, the backends and the
//! dispatcher:
//! - **BackendOutcome:** what one backend reports for one query
//! - **AssessmentVerdict:** the single aggregated result returned to callers
//!
//! `QueryDescriptor` lives in [`crate::query`] next to its normalization rules.

use crate::fallback::FallbackLedger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Classification Vocabulary
// ============================================================================

/// Venue classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Predatory,
    Legitimate,
    Suspicious,
    Unknown,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Predatory => write!(f, "predatory"),
            Classification::Legitimate => write!(f, "legitimate"),
            Classification::Suspicious => write!(f, "suspicious"),
            Classification::Unknown => write!(f, "unknown"),
        }
    }
}

/// How authoritative a backend's signal is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCategory {
    /// Membership in a curated list of predatory venues
    PredatoryList,
    /// Membership in a curated list or index of legitimate venues
    LegitimateList,
    /// Derived from bibliometric or textual heuristics
    Heuristic,
    /// Corroborating quality/risk signal; never votes
    QualitySignal,
}

impl std::fmt::Display for EvidenceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceCategory::PredatoryList => write!(f, "predatory list"),
            EvidenceCategory::LegitimateList => write!(f, "legitimate list"),
            EvidenceCategory::Heuristic => write!(f, "heuristic"),
            EvidenceCategory::QualitySignal => write!(f, "quality signal"),
        }
    }
}

/// Result status of one backend query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Found,
    NotFound,
    Error,
    Timeout,
    RateLimited,
}

impl BackendStatus {
    /// Whether the backend could not answer at all
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            BackendStatus::Error | BackendStatus::Timeout | BackendStatus::RateLimited
        )
    }
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackendStatus::Found => "found",
            BackendStatus::NotFound => "not found",
            BackendStatus::Error => "error",
            BackendStatus::Timeout => "timeout",
            BackendStatus::RateLimited => "rate limited",
        };
        write!(f, "{}", s)
    }
}

/// Risk level reported by quality-signal backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    /// High and critical risk levels feed the corroboration pass
    pub fn is_elevated(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Backend Outcome
// ============================================================================

/// Outcome of one backend query
///
/// Produced by exactly one backend and moved to the dispatcher.
/// `status == Found` implies `classification` is set; the dispatcher skips
/// outcomes that violate this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendOutcome {
    pub backend_name: String,
    pub status: BackendStatus,
    /// Match/classification confidence (0.0-1.0)
    pub confidence: f64,
    pub classification: Option<Classification>,
    pub evidence_category: EvidenceCategory,
    /// Backend-specific evidence (matched record, metrics, risk level)
    pub raw_data: serde_json::Value,
    pub elapsed_ms: u64,
    pub cached: bool,
    pub fallback_ledger: Option<FallbackLedger>,
    pub error_message: Option<String>,
}

impl BackendOutcome {
    fn base(
        backend_name: impl Into<String>,
        status: BackendStatus,
        evidence_category: EvidenceCategory,
    ) -> Self {
        Self {
            backend_name: backend_name.into(),
            status,
            confidence: 0.0,
            classification: None,
            evidence_category,
            raw_data: serde_json::Value::Null,
            elapsed_ms: 0,
            cached: false,
            fallback_ledger: None,
            error_message: None,
        }
    }

    /// Venue found with a classification
    pub fn found(
        backend_name: impl Into<String>,
        evidence_category: EvidenceCategory,
        classification: Classification,
        confidence: f64,
        raw_data: serde_json::Value,
    ) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
            classification: Some(classification),
            raw_data,
            ..Self::base(backend_name, BackendStatus::Found, evidence_category)
        }
    }

    /// Backend searched and did not find the venue
    pub fn not_found(backend_name: impl Into<String>, evidence_category: EvidenceCategory) -> Self {
        Self::base(backend_name, BackendStatus::NotFound, evidence_category)
    }

    /// Backend failed with a system fault
    pub fn error(
        backend_name: impl Into<String>,
        evidence_category: EvidenceCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::base(backend_name, BackendStatus::Error, evidence_category)
        }
    }

    /// Backend exceeded its time budget
    pub fn timeout(
        backend_name: impl Into<String>,
        evidence_category: EvidenceCategory,
        limit: Duration,
    ) -> Self {
        Self {
            error_message: Some(format!("timed out after {}ms", limit.as_millis())),
            elapsed_ms: duration_ms(limit),
            ..Self::base(backend_name, BackendStatus::Timeout, evidence_category)
        }
    }

    /// Backend was throttled by its upstream
    pub fn rate_limited(
        backend_name: impl Into<String>,
        evidence_category: EvidenceCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::base(backend_name, BackendStatus::RateLimited, evidence_category)
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = duration_ms(elapsed);
        self
    }

    pub fn with_ledger(mut self, ledger: FallbackLedger) -> Self {
        self.fallback_ledger = Some(ledger);
        self
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn is_found(&self) -> bool {
        self.status == BackendStatus::Found
    }

    /// Risk level carried in `raw_data["risk_level"]`, if any
    pub fn risk_level(&self) -> Option<RiskLevel> {
        self.raw_data
            .get("risk_level")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Assessment Verdict
// ============================================================================

/// Final aggregated assessment for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentVerdict {
    /// Correlates log lines for one assessment
    pub assessment_id: Uuid,
    /// Raw input echo
    pub input: String,
    pub classification: Classification,
    /// Final confidence (0.0-1.0), bonuses included
    pub confidence: f64,
    /// Dominant vote weight over total weight, before bonuses
    pub overall_score: f64,
    /// Every backend outcome, failures included, in resolver order
    pub backend_results: Vec<BackendOutcome>,
    /// Ordered human-readable reasoning trace
    pub reasoning: Vec<String>,
    pub elapsed_ms: u64,
    pub assessed_at: DateTime<Utc>,
}

impl AssessmentVerdict {
    /// Outcomes that reported a match
    pub fn found_results(&self) -> impl Iterator<Item = &BackendOutcome> {
        self.backend_results.iter().filter(|r| r.is_found())
    }

    /// Outcomes that could not answer (error, timeout, rate limit)
    pub fn failed_results(&self) -> impl Iterator<Item = &BackendOutcome> {
        self.backend_results.iter().filter(|r| r.status.is_failure())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found_clamps_confidence() {
        let outcome = BackendOutcome::found(
            "bealls",
            EvidenceCategory::PredatoryList,
            Classification::Predatory,
            1.4,
            serde_json::Value::Null,
        );
        assert_eq!(outcome.confidence, 1.0);
        assert!(outcome.is_found());
        assert_eq!(outcome.classification, Some(Classification::Predatory));
    }

    #[test]
    fn test_timeout_outcome_carries_detail() {
        let outcome = BackendOutcome::timeout(
            "openalex",
            EvidenceCategory::Heuristic,
            Duration::from_millis(250),
        );
        assert_eq!(outcome.status, BackendStatus::Timeout);
        assert!(outcome.status.is_failure());
        assert_eq!(outcome.elapsed_ms, 250);
        assert_eq!(outcome.error_message.as_deref(), Some("timed out after 250ms"));
    }

    #[test]
    fn test_risk_level_from_raw_data() {
        let outcome = BackendOutcome::found(
            "retractions",
            EvidenceCategory::QualitySignal,
            Classification::Suspicious,
            0.8,
            serde_json::json!({ "risk_level": "critical", "retractions": 41 }),
        );
        assert_eq!(outcome.risk_level(), Some(RiskLevel::Critical));
        assert!(RiskLevel::Critical.is_elevated());
        assert!(!RiskLevel::Moderate.is_elevated());

        let plain = BackendOutcome::not_found("doaj", EvidenceCategory::LegitimateList);
        assert_eq!(plain.risk_level(), None);
    }

    #[test]
    fn test_classification_serializes_snake_case() {
        let json = serde_json::to_string(&Classification::Predatory).unwrap();
        assert_eq!(json, "\"predatory\"");
        let json = serde_json::to_string(&EvidenceCategory::QualitySignal).unwrap();
        assert_eq!(json, "\"quality_signal\"");
    }
}
