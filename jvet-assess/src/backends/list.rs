//! Local Venue List Backend
//!
//! Looks venues up in a locally stored list (predatory list, curated
//! whitelist, or quality/risk annotations) using the fallback executor:
//!
//! | Strategy            | Index                 | Match confidence |
//! |---------------------|-----------------------|------------------|
//! | ById                | ISSN / eISSN          | 0.95             |
//! | ByExactName         | normalized name       | 0.90             |
//! | ByAlias             | aliases ↔ names       | 0.85             |
//! | ByAcronymExpansion  | expansion → name      | 0.80             |
//! | ByFuzzyName         | Jaro-Winkler ≥ 0.92   | 0.85 × similarity|
//!
//! # File Format
//! TOML (`[[venues]]` tables) or JSON (`{"venues": [...]}` or a bare array):
//! ```toml
//! [[venues]]
//! name = "International Journal of Advanced Things"
//! issn = "0378-5955"
//! aliases = ["IJAT"]
//! ```

use super::Backend;
use crate::fallback::{
    resolve_with_fallback, ResolutionStrategy, StrategyError, StrategyResult, StrategyTable,
};
use crate::query::{normalize_name, parse_issn, QueryDescriptor};
use crate::types::{BackendOutcome, Classification, EvidenceCategory, RiskLevel};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use jvet_common::config::{ListKind, ListSource};
use jvet_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Minimum Jaro-Winkler similarity accepted by fuzzy matching
const FUZZY_THRESHOLD: f64 = 0.92;

/// One venue in a list file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueEntry {
    pub name: String,
    #[serde(default)]
    pub issn: Option<String>,
    #[serde(default)]
    pub eissn: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Quality lists only
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl VenueEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            issn: None,
            eissn: None,
            aliases: Vec::new(),
            risk_level: None,
            notes: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListFile {
    Wrapped { venues: Vec<VenueEntry> },
    Bare(Vec<VenueEntry>),
}

/// Raw match produced by the list strategies
#[derive(Debug, Clone, PartialEq)]
pub struct ListMatch {
    pub entry_index: usize,
    pub strategy: ResolutionStrategy,
    /// Name similarity (1.0 for index hits)
    pub similarity: f64,
}

pub struct ListBackend {
    name: String,
    kind: ListKind,
    entries: Vec<VenueEntry>,
    normalized_names: Vec<String>,
    by_issn: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    by_alias: HashMap<String, usize>,
    strategies: Vec<ResolutionStrategy>,
    table: StrategyTable<ListBackend, ListMatch>,
}

impl ListBackend {
    /// Build a backend over in-memory entries
    pub fn new(name: impl Into<String>, kind: ListKind, entries: Vec<VenueEntry>) -> Self {
        let mut by_issn = HashMap::new();
        let mut by_name = HashMap::new();
        let mut by_alias = HashMap::new();
        let mut normalized_names = Vec::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let normalized = normalize_name(&entry.name);
            // First entry wins on duplicate keys
            by_name.entry(normalized.clone()).or_insert(index);
            normalized_names.push(normalized);

            for issn in [&entry.issn, &entry.eissn].into_iter().flatten() {
                if let Some(issn) = parse_issn(issn) {
                    by_issn.entry(issn).or_insert(index);
                }
            }
            for alias in &entry.aliases {
                let alias = normalize_name(alias);
                if !alias.is_empty() {
                    by_alias.entry(alias).or_insert(index);
                }
            }
        }

        let table = StrategyTable::new()
            .register(ResolutionStrategy::ById, by_id)
            .register(ResolutionStrategy::ByExactName, by_exact_name)
            .register(ResolutionStrategy::ByAlias, by_alias_name)
            .register(ResolutionStrategy::ByAcronymExpansion, by_acronym_expansion)
            .register(ResolutionStrategy::ByFuzzyName, by_fuzzy_name)
            .with_match_confidence(match_confidence);

        Self {
            name: name.into(),
            kind,
            entries,
            normalized_names,
            by_issn,
            by_name,
            by_alias,
            strategies: table.supported(),
            table,
        }
    }

    /// Load the list file named by a config entry
    pub fn from_source(source: &ListSource) -> Result<Self> {
        let entries = load_entries(&source.path)?;
        Ok(Self::new(source.name.clone(), source.kind, entries))
    }

    /// Restrict or reorder the strategies tried; unsupported ones are dropped
    pub fn with_strategies(mut self, strategies: Vec<ResolutionStrategy>) -> Self {
        let (supported, unsupported): (Vec<_>, Vec<_>) = strategies
            .into_iter()
            .partition(|s| self.table.supports(*s));
        if !unsupported.is_empty() {
            warn!(
                backend = %self.name,
                unsupported = ?unsupported,
                "Ignoring strategies without a handler"
            );
        }
        self.strategies = supported;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn hit(&self, index: usize, strategy: ResolutionStrategy) -> StrategyResult<ListMatch> {
        Ok(Some(ListMatch {
            entry_index: index,
            strategy,
            similarity: 1.0,
        }))
    }

    fn classify(
        &self,
        m: &ListMatch,
        confidence: Option<f64>,
    ) -> (Classification, f64, serde_json::Value) {
        let entry = &self.entries[m.entry_index];
        let confidence = confidence.unwrap_or(0.8);

        let (classification, risk) = match self.kind {
            ListKind::Predatory => (Classification::Predatory, None),
            ListKind::Legitimate => (Classification::Legitimate, None),
            ListKind::Quality => {
                let risk = entry.risk_level.unwrap_or(RiskLevel::Low);
                let classification = if risk.is_elevated() {
                    Classification::Suspicious
                } else {
                    Classification::Legitimate
                };
                (classification, Some(risk))
            }
        };

        let mut raw = serde_json::json!({
            "matched_name": entry.name,
            "issn": entry.issn,
            "eissn": entry.eissn,
            "strategy": m.strategy,
            "similarity": m.similarity,
        });
        if let Some(risk) = risk {
            raw["risk_level"] = serde_json::json!(risk);
        }
        if let Some(notes) = &entry.notes {
            raw["notes"] = serde_json::json!(notes);
        }

        (classification, confidence, raw)
    }
}

fn category_for(kind: ListKind) -> EvidenceCategory {
    match kind {
        ListKind::Predatory => EvidenceCategory::PredatoryList,
        ListKind::Legitimate => EvidenceCategory::LegitimateList,
        ListKind::Quality => EvidenceCategory::QualitySignal,
    }
}

/// Read a TOML or JSON list (by file extension)
pub fn load_entries(path: &Path) -> Result<Vec<VenueEntry>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read list {}: {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let file: ListFile = if is_json {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content)?
    };

    let entries = match file {
        ListFile::Wrapped { venues } => venues,
        ListFile::Bare(venues) => venues,
    };
    debug!(path = %path.display(), entries = entries.len(), "Venue list parsed");
    Ok(entries)
}

// ============================================================================
// Strategy Handlers
// ============================================================================

fn by_id<'a>(
    b: &'a ListBackend,
    q: &'a QueryDescriptor,
) -> BoxFuture<'a, StrategyResult<ListMatch>> {
    let result = if q.issns().next().is_none() {
        Err(StrategyError::soft_miss("query has no ISSN"))
    } else {
        match q.issns().find_map(|issn| b.by_issn.get(issn)) {
            Some(&index) => b.hit(index, ResolutionStrategy::ById),
            None => Ok(None),
        }
    };
    futures::future::ready(result).boxed()
}

fn by_exact_name<'a>(
    b: &'a ListBackend,
    q: &'a QueryDescriptor,
) -> BoxFuture<'a, StrategyResult<ListMatch>> {
    let result = match b.by_name.get(&q.normalized_name) {
        Some(&index) => b.hit(index, ResolutionStrategy::ByExactName),
        None => Ok(None),
    };
    futures::future::ready(result).boxed()
}

fn by_alias_name<'a>(
    b: &'a ListBackend,
    q: &'a QueryDescriptor,
) -> BoxFuture<'a, StrategyResult<ListMatch>> {
    // Query aliases against entry names and aliases, then the query name
    // against entry aliases
    let found = q
        .aliases
        .iter()
        .find_map(|alias| b.by_name.get(alias).or_else(|| b.by_alias.get(alias)))
        .or_else(|| b.by_alias.get(&q.normalized_name));

    let result = match found {
        Some(&index) => b.hit(index, ResolutionStrategy::ByAlias),
        None => Ok(None),
    };
    futures::future::ready(result).boxed()
}

fn by_acronym_expansion<'a>(
    b: &'a ListBackend,
    q: &'a QueryDescriptor,
) -> BoxFuture<'a, StrategyResult<ListMatch>> {
    let result = match &q.acronym_expansion {
        None => Err(StrategyError::soft_miss("no acronym expansion available")),
        Some(expansion) => match b.by_name.get(&expansion.expansion) {
            Some(&index) => b.hit(index, ResolutionStrategy::ByAcronymExpansion),
            None => Ok(None),
        },
    };
    futures::future::ready(result).boxed()
}

fn by_fuzzy_name<'a>(
    b: &'a ListBackend,
    q: &'a QueryDescriptor,
) -> BoxFuture<'a, StrategyResult<ListMatch>> {
    let result = if q.normalized_name.is_empty() {
        Ok(None)
    } else {
        let best = b
            .normalized_names
            .iter()
            .enumerate()
            .map(|(index, name)| (index, strsim::jaro_winkler(&q.normalized_name, name)))
            .filter(|(_, similarity)| *similarity >= FUZZY_THRESHOLD)
            .max_by(|x, y| x.1.partial_cmp(&y.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(best.map(|(entry_index, similarity)| ListMatch {
            entry_index,
            strategy: ResolutionStrategy::ByFuzzyName,
            similarity,
        }))
    };
    futures::future::ready(result).boxed()
}

fn match_confidence(_q: &QueryDescriptor, m: &ListMatch) -> f64 {
    match m.strategy {
        ResolutionStrategy::ById => 0.95,
        ResolutionStrategy::ByExactName => 0.90,
        ResolutionStrategy::ByAlias => 0.85,
        ResolutionStrategy::ByAcronymExpansion => 0.80,
        ResolutionStrategy::ByFuzzyName => 0.85 * m.similarity,
    }
}

#[async_trait]
impl Backend for ListBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn evidence_category(&self) -> EvidenceCategory {
        category_for(self.kind)
    }

    async fn query(&self, query: &QueryDescriptor, _timeout: Duration) -> BackendOutcome {
        let start = Instant::now();
        let resolution = resolve_with_fallback(self, &self.table, query, &self.strategies).await;

        debug!(
            backend = %self.name,
            ledger = %resolution.ledger.summary(),
            "List lookup finished"
        );

        resolution.into_backend_outcome(
            &self.name,
            self.evidence_category(),
            start.elapsed(),
            |m, confidence| self.classify(m, confidence),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
