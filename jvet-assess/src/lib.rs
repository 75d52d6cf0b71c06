//! jvet-assess library interface
//!
//! Venue assessment engine: resolves a journal or conference query against
//! independent backends and aggregates their evidence into one verdict.
//!
//! Exposes public APIs for the binary and for integration testing.

pub mod aggregator;
pub mod backends;
pub mod cache;
pub mod dispatcher;
pub mod fallback;
pub mod query;
pub mod types;

pub use backends::{build_registry, Backend, BackendRegistry, BackendResolver, EnabledBackend};
pub use cache::{InMemoryResultCache, ResultCache};
pub use dispatcher::QueryDispatcher;
pub use query::QueryDescriptor;
pub use types::{
    AssessmentVerdict, BackendOutcome, BackendStatus, Classification, EvidenceCategory, RiskLevel,
};
