//! Cache-first backend wrapper
//!
//! Answers from the result cache when it can, otherwise queries the inner
//! backend and stores the outcome. Only Found / NotFound outcomes are stored;
//! faults are always retried on the next query.

use super::Backend;
use crate::cache::{cache_key, ResultCache};
use crate::query::QueryDescriptor;
use crate::types::{BackendOutcome, BackendStatus, EvidenceCategory};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct CachedBackend {
    inner: Arc<dyn Backend>,
    cache: Arc<dyn ResultCache>,
    ttl: Duration,
}

impl CachedBackend {
    pub fn new(inner: Arc<dyn Backend>, cache: Arc<dyn ResultCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }
}

#[async_trait]
impl Backend for CachedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn evidence_category(&self) -> EvidenceCategory {
        self.inner.evidence_category()
    }

    async fn query(&self, query: &QueryDescriptor, timeout: Duration) -> BackendOutcome {
        let start = Instant::now();
        let key = cache_key(self.name(), query);

        if let Some(hit) = self.cache.get(&key).await {
            debug!(backend = self.name(), "Cache hit");
            return hit.with_cached(true).with_elapsed(start.elapsed());
        }

        let outcome = self.inner.query(query, timeout).await;
        if matches!(outcome.status, BackendStatus::Found | BackendStatus::NotFound) {
            self.cache.put(&key, &outcome, self.ttl).await;
        }
        outcome
    }
}
