//! Backend Result Cache
//!
//! Optional cache of backend outcomes, read before and written after each
//! backend call. Keys are a SHA-256 over the backend name, the normalized
//! venue name, the sorted identifiers, the sorted aliases and any acronym
//! expansion, so equivalent queries share entries and nothing a backend may
//! match on is left out.
//!
//! Concurrent callers racing on one key may both miss and both write; the
//! last write wins. Cached values are recomputable, so no locking beyond the
//! map itself is needed.

use crate::query::QueryDescriptor;
use crate::types::BackendOutcome;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Get/put store for backend outcomes
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<BackendOutcome>;

    async fn put(&self, key: &str, outcome: &BackendOutcome, ttl: Duration);
}

/// Deterministic cache key for `backend_name` + `query`
pub fn cache_key(backend_name: &str, query: &QueryDescriptor) -> String {
    let mut hasher = Sha256::new();
    hasher.update(backend_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(query.normalized_name.as_bytes());
    // BTreeMap / BTreeSet iteration is sorted
    for (kind, value) in &query.identifiers {
        hasher.update([0u8]);
        hasher.update(kind.to_string().as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    for alias in &query.aliases {
        hasher.update([0u8]);
        hasher.update(b"alias=");
        hasher.update(alias.as_bytes());
    }
    if let Some(expansion) = &query.acronym_expansion {
        hasher.update([0u8]);
        hasher.update(b"acronym=");
        hasher.update(expansion.acronym.as_bytes());
        hasher.update([0u8]);
        hasher.update(expansion.expansion.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Process-local cache with per-entry expiry
#[derive(Default)]
pub struct InMemoryResultCache {
    entries: RwLock<HashMap<String, (Instant, BackendOutcome)>>,
}

impl InMemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop expired entries
    pub async fn purge_expired(&self) -> usize {
        purge(&mut *self.entries.write().await)
    }
}

fn purge(entries: &mut HashMap<String, (Instant, BackendOutcome)>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, (expires, _)| *expires > now);
    before - entries.len()
}

#[async_trait]
impl ResultCache for InMemoryResultCache {
    async fn get(&self, key: &str) -> Option<BackendOutcome> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((expires, outcome)) if *expires > Instant::now() => Some(outcome.clone()),
            Some(_) => {
                debug!(key, "Cache entry expired");
                None
            }
            None => None,
        }
    }

    async fn put(&self, key: &str, outcome: &BackendOutcome, ttl: Duration) {
        let mut entries = self.entries.write().await;
        let purged = purge(&mut entries);
        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
        }
        entries.insert(key.to_string(), (Instant::now() + ttl, outcome.clone()));
    }
}
