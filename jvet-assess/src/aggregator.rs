//! Evidence Aggregation
//!
//! Reduces the per-backend outcomes of one assessment to a single
//! classification, confidence and reasoning trace.
//!
//! # Voting
//! Each found, non-quality outcome votes with `weight × confidence` into the
//! predatory or legitimate bucket; its configured weight always counts toward
//! the total. Suspicious and Unknown labels are neutral: they add to the total
//! but to neither bucket.
//!
//! # Decision (first match wins)
//! | Condition | Verdict | Confidence |
//! |-----------|---------|------------|
//! | total = 0 | Unknown | 0.1 |
//! | list hit, predatory > legitimate | Predatory | min(0.95, p/t) |
//! | list hit, legitimate ≥ predatory | Legitimate | min(0.90, l/t) |
//! | no list hit, legitimate > 0 | Legitimate | min(0.90, l/t) |
//! | no list hit, predatory > 0 | Suspicious | min(0.85, p/t) |
//! | otherwise | Unknown | 0.3 |
//!
//! Quality-signal corroboration and label agreement then add bounded bonuses.

use crate::types::{BackendOutcome, BackendStatus, Classification, EvidenceCategory};
use tracing::{debug, warn};

/// Confidence when nothing was found and nothing reported NotFound
pub const NO_EVIDENCE_CONFIDENCE: f64 = 0.0;
/// Confidence when at least one backend searched and reported NotFound
pub const NOT_FOUND_CONFIDENCE: f64 = 0.2;
/// Confidence when no outcome contributed any vote weight
pub const ZERO_WEIGHT_CONFIDENCE: f64 = 0.1;
/// Confidence when votes exist but no decision branch applied
pub const UNDECIDED_CONFIDENCE: f64 = 0.3;

const PREDATORY_CAP: f64 = 0.95;
const LEGITIMATE_CAP: f64 = 0.90;
const SUSPICIOUS_CAP: f64 = 0.85;

/// Bonus for an elevated-risk quality signal agreeing with the verdict
pub const QUALITY_BONUS: f64 = 0.05;
/// Agreement bonus per agreeing outcome
pub const AGREEMENT_BONUS_PER_OUTCOME: f64 = 0.03;
pub const AGREEMENT_BONUS_MAX: f64 = 0.10;
/// No bonus lifts confidence above this
pub const BONUS_CEILING: f64 = 0.98;

/// Aggregated result, before it is wrapped into a verdict
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub classification: Classification,
    pub confidence: f64,
    /// Dominant bucket weight over total weight, before bonuses
    pub overall_score: f64,
    pub reasoning: Vec<String>,
}

impl Aggregation {
    fn unknown(confidence: f64, reasoning: Vec<String>) -> Self {
        Self {
            classification: Classification::Unknown,
            confidence,
            overall_score: 0.0,
            reasoning,
        }
    }
}

/// Vote totals over the considered outcomes
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Tally {
    predatory: f64,
    legitimate: f64,
    total: f64,
    has_predatory_list: bool,
    predatory_labels: usize,
    legitimate_labels: usize,
}

/// Aggregate `(outcome, configured weight)` pairs
///
/// Reasoning lines follow the input order, so a stable input order gives a
/// stable trace.
pub fn aggregate(results: &[(BackendOutcome, f64)]) -> Aggregation {
    let mut reasoning = Vec::new();

    for (outcome, _) in results.iter().filter(|(o, _)| o.status.is_failure()) {
        reasoning.push(format!(
            "{} unavailable: {}{}",
            outcome.backend_name,
            outcome.status,
            outcome
                .error_message
                .as_deref()
                .map(|m| format!(" ({})", m))
                .unwrap_or_default()
        ));
    }

    let successful: Vec<&(BackendOutcome, f64)> =
        results.iter().filter(|(o, _)| o.is_found()).collect();

    if successful.is_empty() {
        let not_found = results
            .iter()
            .filter(|(o, _)| o.status == BackendStatus::NotFound)
            .count();
        return if not_found > 0 {
            reasoning.push(format!(
                "{} backend(s) searched and did not find the venue",
                not_found
            ));
            Aggregation::unknown(NOT_FOUND_CONFIDENCE, reasoning)
        } else {
            reasoning.push("no backend could search for the venue".to_string());
            Aggregation::unknown(NO_EVIDENCE_CONFIDENCE, reasoning)
        };
    }

    let tally = tally_votes(&successful, &mut reasoning);
    let (classification, base_confidence, dominant) = decide(&tally, &mut reasoning);

    let overall_score = if tally.total > 0.0 && classification != Classification::Unknown {
        dominant / tally.total
    } else {
        0.0
    };

    let ceiling = match classification {
        Classification::Suspicious => SUSPICIOUS_CAP,
        _ => BONUS_CEILING,
    };
    let mut confidence = base_confidence;

    // Quality signals never vote; they only corroborate
    for (outcome, _) in successful
        .iter()
        .filter(|(o, _)| o.evidence_category == EvidenceCategory::QualitySignal)
    {
        let Some(risk) = outcome.risk_level().filter(|r| r.is_elevated()) else {
            continue;
        };
        let agrees = matches!(
            classification,
            Classification::Predatory | Classification::Suspicious
        );
        if agrees {
            confidence = apply_bonus(confidence, QUALITY_BONUS, ceiling);
            reasoning.push(format!(
                "{} reports {} risk, corroborating the {} verdict",
                outcome.backend_name, risk, classification
            ));
        } else {
            reasoning.push(format!(
                "{} reports {} risk, contradicting the {} verdict",
                outcome.backend_name, risk, classification
            ));
        }
    }

    match (tally.predatory_labels, tally.legitimate_labels) {
        (0, n) | (n, 0) if n >= 2 => {
            let label = if tally.predatory_labels > 0 {
                Classification::Predatory
            } else {
                Classification::Legitimate
            };
            let bonus = (AGREEMENT_BONUS_PER_OUTCOME * n as f64).min(AGREEMENT_BONUS_MAX);
            confidence = apply_bonus(confidence, bonus, ceiling);
            reasoning.push(format!("{} backends agree on {}", n, label));
        }
        (p, l) if p > 0 && l > 0 => {
            reasoning.push(format!(
                "backends disagree: {} predatory vs {} legitimate",
                p, l
            ));
        }
        _ => {}
    }

    let confidence = confidence.clamp(0.0, 1.0);

    debug!(
        classification = %classification,
        confidence,
        overall_score,
        predatory_weight = tally.predatory,
        legitimate_weight = tally.legitimate,
        total_weight = tally.total,
        "Aggregated backend evidence"
    );

    Aggregation {
        classification,
        confidence,
        overall_score,
        reasoning,
    }
}

fn tally_votes(successful: &[&(BackendOutcome, f64)], reasoning: &mut Vec<String>) -> Tally {
    let mut tally = Tally::default();

    for (outcome, weight) in successful.iter().map(|pair| (&pair.0, pair.1)) {
        if outcome.evidence_category == EvidenceCategory::QualitySignal {
            continue;
        }
        let Some(label) = outcome.classification else {
            warn!(
                backend = %outcome.backend_name,
                "Found outcome without classification; ignoring"
            );
            reasoning.push(format!(
                "{} reported a match without a classification; ignored",
                outcome.backend_name
            ));
            continue;
        };

        let vote = weight * outcome.confidence;
        tally.total += weight;
        if outcome.evidence_category == EvidenceCategory::PredatoryList {
            tally.has_predatory_list = true;
        }
        match label {
            Classification::Predatory => {
                tally.predatory += vote;
                tally.predatory_labels += 1;
            }
            Classification::Legitimate => {
                tally.legitimate += vote;
                tally.legitimate_labels += 1;
            }
            Classification::Suspicious | Classification::Unknown => {}
        }

        reasoning.push(format!(
            "{}: {} ({}, confidence {:.2}, weight {:.2})",
            outcome.backend_name, label, outcome.evidence_category, outcome.confidence, weight
        ));
    }

    tally
}

/// Returns (classification, base confidence, dominant bucket weight)
fn decide(tally: &Tally, reasoning: &mut Vec<String>) -> (Classification, f64, f64) {
    let Tally {
        predatory: p,
        legitimate: l,
        total: t,
        has_predatory_list,
        ..
    } = *tally;

    if t <= 0.0 {
        reasoning.push("no weighted evidence".to_string());
        return (Classification::Unknown, ZERO_WEIGHT_CONFIDENCE, 0.0);
    }

    if has_predatory_list {
        if p > l {
            reasoning.push(format!(
                "predatory list evidence outweighs legitimate evidence ({:.2} vs {:.2})",
                p, l
            ));
            return (Classification::Predatory, (p / t).min(PREDATORY_CAP), p);
        }
        reasoning.push(format!(
            "legitimate evidence overrides predatory list hit ({:.2} vs {:.2})",
            l, p
        ));
        return (Classification::Legitimate, (l / t).min(LEGITIMATE_CAP), l);
    }

    if l > 0.0 {
        reasoning.push(format!("legitimate evidence ({:.2})", l));
        return (Classification::Legitimate, (l / t).min(LEGITIMATE_CAP), l);
    }

    if p > 0.0 {
        reasoning.push(format!(
            "heuristic predatory signals only ({:.2}); not on any predatory list",
            p
        ));
        return (Classification::Suspicious, (p / t).min(SUSPICIOUS_CAP), p);
    }

    reasoning.push("evidence is inconclusive".to_string());
    (Classification::Unknown, UNDECIDED_CONFIDENCE, 0.0)
}

/// Add `bonus` without crossing `ceiling`; never lowers confidence
fn apply_bonus(confidence: f64, bonus: f64, ceiling: f64) -> f64 {
    if confidence >= ceiling {
        confidence
    } else {
        (confidence + bonus).min(ceiling)
    }
}

// ============================================================================
// Tests
// ============================================================================
