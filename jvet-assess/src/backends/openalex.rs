//! OpenAlex Heuristic Backend
//!
//! Resolves a venue against the OpenAlex `sources` API and classifies it from
//! bibliometric signals (h-index, citations per work, DOAJ membership).
//!
//! # Strategies
//! 1. **ById** - `filter=issn:<issn>` for each query ISSN
//! 2. **ByExactName** - `search=<name>`, exact normalized title match
//! 3. **ByAlias** - `search=<alias>` for each alias, exact normalized match
//!
//! # Error Classification
//! - 404 → soft miss
//! - 401 / 403 → Auth
//! - 429 → RateLimit
//! - 408 / 504 or transport timeout → Timeout
//! - connect failure → Connection
//! - anything else → Unknown
//!
//! # Rate Limiting
//! Token bucket (`governor`) shared by all strategies of this backend.
//!
//! # API Reference
//! - Documentation: https://docs.openalex.org/api-entities/sources

use super::Backend;
use crate::fallback::{
    resolve_with_fallback, ErrorKind, ResolutionStrategy, StrategyError, StrategyResult,
    StrategyTable,
};
use crate::query::{normalize_name, QueryDescriptor};
use crate::types::{BackendOutcome, Classification, EvidenceCategory};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use jvet_common::config::OpenAlexConfig;
use jvet_common::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tracing::debug;

/// Backend name used for settings and cache keys
pub const OPENALEX_BACKEND_NAME: &str = "openalex";

/// Results requested per name search
const SEARCH_PAGE_SIZE: &str = "10";

/// OpenAlex `sources` list response
#[derive(Debug, Deserialize)]
struct SourcesPage {
    #[serde(default)]
    results: Vec<OpenAlexSource>,
}

/// One OpenAlex source (journal, conference series, repository)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAlexSource {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub issn_l: Option<String>,
    #[serde(default)]
    pub issn: Option<Vec<String>>,
    #[serde(default)]
    pub works_count: u64,
    #[serde(default)]
    pub cited_by_count: u64,
    #[serde(default)]
    pub is_in_doaj: Option<bool>,
    #[serde(default)]
    pub summary_stats: Option<SummaryStats>,
    #[serde(default)]
    pub alternate_titles: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    #[serde(default)]
    pub h_index: Option<u32>,
    #[serde(rename = "2yr_mean_citedness", default)]
    pub two_year_mean_citedness: Option<f64>,
}

impl OpenAlexSource {
    pub fn citations_per_work(&self) -> f64 {
        if self.works_count == 0 {
            0.0
        } else {
            self.cited_by_count as f64 / self.works_count as f64
        }
    }

    pub fn h_index(&self) -> u32 {
        self.summary_stats
            .as_ref()
            .and_then(|s| s.h_index)
            .unwrap_or(0)
    }

    /// Whether the display name or an alternate title normalizes to `name`
    fn has_title(&self, name: &str) -> bool {
        normalize_name(&self.display_name) == name
            || self
                .alternate_titles
                .iter()
                .flatten()
                .any(|t| normalize_name(t) == name)
    }
}

/// Raw match: the source plus the strategy that found it
#[derive(Debug, Clone)]
pub struct OpenAlexMatch {
    pub source: OpenAlexSource,
    pub strategy: ResolutionStrategy,
}

/// Heuristic judgement of one source
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsAssessment {
    pub classification: Classification,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// Classify a source from its bibliometrics
///
/// - h-index ≥ 20, or DOAJ-listed with ≥ 2 citations/work → Legitimate
/// - ≥ 500 works with < 1 citation/work → Predatory (heuristic only)
/// - otherwise → Unknown
pub fn assess_metrics(source: &OpenAlexSource) -> MetricsAssessment {
    let h_index = source.h_index();
    let cpw = source.citations_per_work();
    let in_doaj = source.is_in_doaj.unwrap_or(false);
    let mut reasons = Vec::new();

    if h_index >= 20 || (in_doaj && cpw >= 2.0) {
        if h_index >= 20 {
            reasons.push(format!("h-index {}", h_index));
        }
        if in_doaj {
            reasons.push("listed in DOAJ".to_string());
        }
        reasons.push(format!("{:.1} citations per work", cpw));
        let confidence = if h_index >= 50 { 0.8 } else { 0.7 };
        return MetricsAssessment {
            classification: Classification::Legitimate,
            confidence,
            reasons,
        };
    }

    if source.works_count >= 500 && cpw < 1.0 {
        reasons.push(format!(
            "{} works with only {:.2} citations per work",
            source.works_count, cpw
        ));
        return MetricsAssessment {
            classification: Classification::Predatory,
            confidence: 0.6,
            reasons,
        };
    }

    reasons.push(format!(
        "inconclusive metrics ({} works, h-index {})",
        source.works_count, h_index
    ));
    MetricsAssessment {
        classification: Classification::Unknown,
        confidence: if source.works_count < 20 { 0.3 } else { 0.4 },
        reasons,
    }
}

/// Map a non-success HTTP status to a failure kind (`None` on success)
pub fn classify_status(status: StatusCode) -> Option<ErrorKind> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::NOT_FOUND => ErrorKind::SoftMiss,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimit,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
        _ => ErrorKind::Unknown,
    })
}

/// Map a transport error to a failure kind
pub fn classify_transport_error(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() {
        ErrorKind::Connection
    } else {
        ErrorKind::Unknown
    }
}

pub struct OpenAlexBackend {
    client: Client,
    base_url: String,
    mailto: Option<String>,
    rate_limiter: DefaultDirectRateLimiter,
    strategies: Vec<ResolutionStrategy>,
    table: StrategyTable<OpenAlexBackend, OpenAlexMatch>,
}

impl OpenAlexBackend {
    /// Create a client against `base_url`
    ///
    /// `request_timeout` bounds each HTTP request; the dispatcher applies its
    /// own per-backend timeout on top.
    pub fn new(
        base_url: impl Into<String>,
        mailto: Option<String>,
        requests_per_second: u32,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(format!("jvet/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(requests_per_second).ok_or_else(|| {
            Error::Config("openalex.requests_per_second must be greater than zero".to_string())
        })?;

        let table = StrategyTable::new()
            .register(ResolutionStrategy::ById, by_issn)
            .register(ResolutionStrategy::ByExactName, by_exact_name)
            .register(ResolutionStrategy::ByAlias, by_alias)
            .with_match_confidence(match_confidence);

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mailto,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
            strategies: table.supported(),
            table,
        })
    }

    pub fn from_config(config: &OpenAlexConfig, request_timeout: Duration) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            config.mailto.clone(),
            config.requests_per_second,
            request_timeout,
        )
    }

    /// GET `/sources` with the given query parameters
    async fn fetch_sources(
        &self,
        params: &[(&str, &str)],
    ) -> std::result::Result<Vec<OpenAlexSource>, StrategyError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/sources", self.base_url);
        let mut request = self.client.get(&url).query(params);
        if let Some(mailto) = &self.mailto {
            request = request.query(&[("mailto", mailto.as_str())]);
        }

        debug!(url = %url, params = ?params, "Querying OpenAlex");

        let response = request
            .send()
            .await
            .map_err(|e| StrategyError::new(classify_transport_error(&e), e.to_string()))?;

        let status = response.status();
        if let Some(kind) = classify_status(status) {
            return Err(StrategyError::new(
                kind,
                format!("OpenAlex returned {}", status),
            ));
        }

        let page: SourcesPage = response.json().await.map_err(|e| {
            StrategyError::new(
                classify_transport_error(&e),
                format!("Failed to parse OpenAlex response: {}", e),
            )
        })?;
        Ok(page.results)
    }

    /// Search by title and keep the first exact normalized match
    async fn search_exact(
        &self,
        title: &str,
    ) -> std::result::Result<Option<OpenAlexSource>, StrategyError> {
        let results = self
            .fetch_sources(&[("search", title), ("per-page", SEARCH_PAGE_SIZE)])
            .await?;
        Ok(results.into_iter().find(|s| s.has_title(title)))
    }
}

// ============================================================================
// Strategy Handlers
// ============================================================================

fn by_issn<'a>(
    b: &'a OpenAlexBackend,
    q: &'a QueryDescriptor,
) -> BoxFuture<'a, StrategyResult<OpenAlexMatch>> {
    async move {
        if q.issns().next().is_none() {
            return Err(StrategyError::soft_miss("query has no ISSN"));
        }
        for issn in q.issns() {
            let filter = format!("issn:{}", issn);
            let results = b.fetch_sources(&[("filter", filter.as_str())]).await?;
            if let Some(source) = results.into_iter().next() {
                return Ok(Some(OpenAlexMatch {
                    source,
                    strategy: ResolutionStrategy::ById,
                }));
            }
        }
        Ok(None)
    }
    .boxed()
}

fn by_exact_name<'a>(
    b: &'a OpenAlexBackend,
    q: &'a QueryDescriptor,
) -> BoxFuture<'a, StrategyResult<OpenAlexMatch>> {
    async move {
        if q.normalized_name.is_empty() {
            return Ok(None);
        }
        Ok(b.search_exact(&q.normalized_name)
            .await?
            .map(|source| OpenAlexMatch {
                source,
                strategy: ResolutionStrategy::ByExactName,
            }))
    }
    .boxed()
}

fn by_alias<'a>(
    b: &'a OpenAlexBackend,
    q: &'a QueryDescriptor,
) -> BoxFuture<'a, StrategyResult<OpenAlexMatch>> {
    async move {
        for alias in &q.aliases {
            if let Some(source) = b.search_exact(alias).await? {
                return Ok(Some(OpenAlexMatch {
                    source,
                    strategy: ResolutionStrategy::ByAlias,
                }));
            }
        }
        Ok(None)
    }
    .boxed()
}

fn match_confidence(_q: &QueryDescriptor, m: &OpenAlexMatch) -> f64 {
    match m.strategy {
        ResolutionStrategy::ById => 1.0,
        ResolutionStrategy::ByExactName => 0.95,
        _ => 0.85,
    }
}

#[async_trait]
impl Backend for OpenAlexBackend {
    fn name(&self) -> &str {
        OPENALEX_BACKEND_NAME
    }

    fn evidence_category(&self) -> EvidenceCategory {
        EvidenceCategory::Heuristic
    }

    async fn query(&self, query: &QueryDescriptor, _timeout: Duration) -> BackendOutcome {
        let start = Instant::now();
        let resolution = resolve_with_fallback(self, &self.table, query, &self.strategies).await;

        debug!(
            backend = OPENALEX_BACKEND_NAME,
            ledger = %resolution.ledger.summary(),
            "OpenAlex lookup finished"
        );

        resolution.into_backend_outcome(
            OPENALEX_BACKEND_NAME,
            EvidenceCategory::Heuristic,
            start.elapsed(),
            |m, match_confidence| {
                let assessment = assess_metrics(&m.source);
                let confidence = assessment.confidence * match_confidence.unwrap_or(1.0);
                let raw = serde_json::json!({
                    "source": m.source,
                    "strategy": m.strategy,
                    "citations_per_work": m.source.citations_per_work(),
                    "reasons": assessment.reasons,
                });
                (assessment.classification, confidence, raw)
            },
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BackendStatus;

    fn source(works: u64, citations: u64, h_index: u32, in_doaj: bool) -> OpenAlexSource {
        OpenAlexSource {
            id: "https://openalex.org/S1".to_string(),
            display_name: "Journal of Things".to_string(),
            issn_l: None,
            issn: None,
            works_count: works,
            cited_by_count: citations,
            is_in_doaj: Some(in_doaj),
            summary_stats: Some(SummaryStats {
                h_index: Some(h_index),
                two_year_mean_citedness: None,
            }),
            alternate_titles: Some(vec!["J. Things".to_string()]),
        }
    }

    #[test]
    fn test_high_impact_is_legitimate() {
        let assessment = assess_metrics(&source(12_000, 480_000, 85, false));
        assert_eq!(assessment.classification, Classification::Legitimate);
        assert_eq!(assessment.confidence, 0.8);
    }

    #[test]
    fn test_doaj_with_citations_is_legitimate() {
        let assessment = assess_metrics(&source(300, 900, 12, true));
        assert_eq!(assessment.classification, Classification::Legitimate);
        assert_eq!(assessment.confidence, 0.7);
        assert!(assessment.reasons.iter().any(|r| r == "listed in DOAJ"));
    }

    #[test]
    fn test_high_volume_low_citation_is_predatory_heuristic() {
        let assessment = assess_metrics(&source(8_000, 2_000, 6, false));
        assert_eq!(assessment.classification, Classification::Predatory);
        assert_eq!(assessment.confidence, 0.6);
    }

    #[test]
    fn test_small_venue_is_inconclusive() {
        let assessment = assess_metrics(&source(10, 4, 1, false));
        assert_eq!(assessment.classification, Classification::Unknown);
        assert_eq!(assessment.confidence, 0.3);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::OK), None);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), Some(ErrorKind::SoftMiss));
        assert_eq!(classify_status(StatusCode::FORBIDDEN), Some(ErrorKind::Auth));
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), Some(ErrorKind::RateLimit));
        assert_eq!(classify_status(StatusCode::GATEWAY_TIMEOUT), Some(ErrorKind::Timeout));
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), Some(ErrorKind::Unknown));
    }

    #[test]
    fn test_title_matching_uses_alternates() {
        let s = source(1, 1, 1, false);
        assert!(s.has_title("journal of things"));
        assert!(s.has_title("j things"));
        assert!(!s.has_title("journal of other things"));
    }

    #[test]
    fn test_source_deserializes_with_nulls() {
        let json = r#"{
            "id": "https://openalex.org/S123",
            "display_name": "Nature",
            "issn_l": "0028-0836",
            "issn": ["0028-0836", "1476-4687"],
            "works_count": 400000,
            "cited_by_count": 26000000,
            "is_in_doaj": false,
            "summary_stats": {"h_index": 1200, "2yr_mean_citedness": 21.3},
            "alternate_titles": null
        }"#;
        let s: OpenAlexSource = serde_json::from_str(json).unwrap();
        assert_eq!(s.h_index(), 1200);
        assert_eq!(s.alternate_titles, None);
        assert!(s.has_title("nature"));
    }

    #[tokio::test]
    async fn test_connection_failure_aborts_after_first_strategy() {
        // Nothing listens on port 1; the connect fails immediately
        let backend = OpenAlexBackend::new("http://127.0.0.1:1", None, 50, Duration::from_secs(2))
            .unwrap();
        let query = QueryDescriptor::from_input("Journal of Things ISSN 0378-5955");

        let outcome = backend.query(&query, Duration::from_secs(2)).await;

        assert_eq!(outcome.status, BackendStatus::Error);
        assert!(outcome.error_message.is_some());
        let ledger = outcome.fallback_ledger.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.attempts()[0].strategy, ResolutionStrategy::ById);
        assert_eq!(ledger.attempts()[0].error_kind, Some(ErrorKind::Connection));
    }

    #[tokio::test]
    async fn test_missing_issn_soft_misses_to_name_search() {
        let backend = OpenAlexBackend::new("http://127.0.0.1:1", None, 50, Duration::from_secs(2))
            .unwrap();
        let query = QueryDescriptor::from_input("Journal of Things");

        let outcome = backend.query(&query, Duration::from_secs(2)).await;

        let ledger = outcome.fallback_ledger.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.attempts()[0].error_kind, Some(ErrorKind::SoftMiss));
        assert_eq!(ledger.attempts()[1].strategy, ResolutionStrategy::ByExactName);
        assert_eq!(ledger.attempts()[1].error_kind, Some(ErrorKind::Connection));
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        let result = OpenAlexBackend::new("http://localhost", None, 0, Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
