//! Assessment Backends
//!
//! Each backend is one independent data source consulted during assessment.
//! All of them implement [`Backend`] for uniform concurrent dispatch.
//!
//! # Backends
//! 1. **list** - local predatory / legitimate / quality venue lists
//! 2. **openalex** - bibliometric heuristics from the OpenAlex API
//! 3. **cached** - cache-first wrapper around any other backend
//!
//! # Error Isolation
//! `Backend::query` never fails: faults come back as Error / Timeout /
//! RateLimited outcomes. The dispatcher still guards against panics.

pub mod cached;
pub mod list;
pub mod openalex;

pub use cached::CachedBackend;
pub use list::ListBackend;
pub use openalex::OpenAlexBackend;

use crate::cache::ResultCache;
use crate::query::QueryDescriptor;
use crate::types::{BackendOutcome, EvidenceCategory};
use async_trait::async_trait;
use jvet_common::config::{BackendSettings, TomlConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Capability every data source exposes to the dispatcher
///
/// # Example
/// ```rust,ignore
/// use jvet_assess::backends::Backend;
///
/// pub struct StaticBackend;
///
/// #[async_trait::async_trait]
/// impl Backend for StaticBackend {
///     fn name(&self) -> &str { "static" }
///     fn evidence_category(&self) -> EvidenceCategory { EvidenceCategory::Heuristic }
///
///     async fn query(&self, query: &QueryDescriptor, _timeout: Duration) -> BackendOutcome {
///         BackendOutcome::not_found(self.name(), self.evidence_category())
///     }
/// }
/// ```
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend name; also the key for settings and cache entries
    fn name(&self) -> &str;

    fn evidence_category(&self) -> EvidenceCategory;

    /// Assess one query
    ///
    /// Must not fail: internal faults are returned as outcomes with a
    /// populated `error_message`. `timeout` is the dispatcher's budget for
    /// this call. The dispatcher enforces it regardless of what the backend
    /// does with it.
    async fn query(&self, query: &QueryDescriptor, timeout: Duration) -> BackendOutcome;
}

/// An enabled backend with its dispatch settings
#[derive(Clone)]
pub struct EnabledBackend {
    pub backend: Arc<dyn Backend>,
    pub weight: f64,
    pub timeout: Duration,
}

impl std::fmt::Debug for EnabledBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnabledBackend")
            .field("backend", &self.backend.name())
            .field("weight", &self.weight)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Supplies the backends to consult, in a stable order
pub trait BackendResolver: Send + Sync {
    fn enabled_backends(&self) -> Vec<EnabledBackend>;
}

/// Explicitly constructed backend registry
///
/// Registration order is preserved and becomes the dispatch/report order.
#[derive(Default)]
pub struct BackendRegistry {
    entries: Vec<(Arc<dyn Backend>, BackendSettings, Duration)>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend; a later registration under the same name replaces it
    pub fn register(
        &mut self,
        backend: Arc<dyn Backend>,
        settings: BackendSettings,
        timeout: Duration,
    ) {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|(b, _, _)| b.name() == backend.name())
        {
            warn!(backend = backend.name(), "Replacing previously registered backend");
            self.entries.remove(pos);
        }
        self.entries.push((backend, settings, timeout));
    }

    /// Names of all registered backends, enabled or not
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(b, _, _)| b.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BackendResolver for BackendRegistry {
    fn enabled_backends(&self) -> Vec<EnabledBackend> {
        self.entries
            .iter()
            .filter(|(_, settings, _)| settings.enabled)
            .map(|(backend, settings, timeout)| EnabledBackend {
                backend: Arc::clone(backend),
                weight: settings.weight,
                timeout: *timeout,
            })
            .collect()
    }
}

/// Build the registry described by `config`
///
/// List backends are registered in config order, then OpenAlex. When `cache`
/// is given every backend is wrapped in a [`CachedBackend`].
pub fn build_registry(
    config: &TomlConfig,
    cache: Option<Arc<dyn ResultCache>>,
) -> jvet_common::Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();

    let mut backends: Vec<Arc<dyn Backend>> = Vec::new();
    for source in &config.lists {
        let backend = ListBackend::from_source(source)?;
        info!(
            backend = %source.name,
            kind = ?source.kind,
            entries = backend.len(),
            "Loaded venue list"
        );
        backends.push(Arc::new(backend));
    }

    if config.openalex.enabled {
        backends.push(Arc::new(OpenAlexBackend::from_config(
            &config.openalex,
            config.backend_timeout(openalex::OPENALEX_BACKEND_NAME),
        )?));
    }

    for backend in backends {
        let name = backend.name().to_string();
        let backend: Arc<dyn Backend> = match &cache {
            Some(cache) => Arc::new(CachedBackend::new(
                backend,
                Arc::clone(cache),
                config.cache.ttl(),
            )),
            None => backend,
        };
        registry.register(
            backend,
            config.backend_settings(&name),
            config.backend_timeout(&name),
        );
    }

    Ok(registry)
}

// ============================================================================
// Mock Backend for Testing
// ============================================================================


// ============================================================================
// Tests
// ============================================================================
