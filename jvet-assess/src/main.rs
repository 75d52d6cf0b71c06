//! jvet-assess - Main entry point
//!
//! Assesses one journal or conference and prints the verdict.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jvet_assess::query::{parse_issn, IdentifierKind};
use jvet_assess::{
    build_registry, AssessmentVerdict, InMemoryResultCache, QueryDescriptor, QueryDispatcher,
    ResultCache,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Level used until the config file has been read
const BOOTSTRAP_LEVEL: &str = "info";

/// Command-line arguments for jvet-assess
#[derive(Parser, Debug)]
#[command(name = "jvet-assess")]
#[command(about = "Assess whether a journal or conference is predatory")]
#[command(version)]
struct Args {
    /// Venue name, optionally with ISSN/DOI and a trailing (ACRONYM)
    venue: String,

    /// Additional ISSN (repeatable)
    #[arg(long)]
    issn: Vec<String>,

    /// Additional alias or acronym (repeatable)
    #[arg(long)]
    alias: Vec<String>,

    /// Full name the venue acronym stands for (only used for bare acronyms)
    #[arg(long, value_name = "NAME")]
    expand: Option<String>,

    /// Path to TOML config file
    #[arg(short, long, env = "JVET_CONFIG")]
    config: Option<PathBuf>,

    /// Print the verdict as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Install logging before anything else so config loading is visible.
    // RUST_LOG wins over the configured level.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(BOOTSTRAP_LEVEL)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = jvet_common::config::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    if !from_env {
        filter_handle
            .reload(configured_filter(&config.logging.level)?)
            .context("Failed to apply configured log level")?;
    }

    let cache: Option<Arc<dyn ResultCache>> = if config.cache.enabled {
        Some(Arc::new(InMemoryResultCache::new()))
    } else {
        None
    };

    let registry = build_registry(&config, cache).context("Failed to build backend registry")?;
    info!(backends = ?registry.names(), "Backend registry ready");

    let query = build_query(&args);
    let dispatcher = QueryDispatcher::new(Arc::new(registry));
    let verdict = dispatcher.assess(&query).await;

    if args.json {
        let json = serde_json::to_string_pretty(&verdict).context("Failed to serialize verdict")?;
        println!("{}", json);
    } else {
        print_verdict(&verdict);
    }

    Ok(())
}

fn configured_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).with_context(|| format!("Invalid logging.level '{}'", level))
}

/// Descriptor for the venue plus the extra ISSNs, aliases and expansion
fn build_query(args: &Args) -> QueryDescriptor {
    let mut query = QueryDescriptor::from_input(&args.venue);
    for raw in &args.issn {
        match parse_issn(raw) {
            Some(issn) => {
                let kind = if query.identifier(IdentifierKind::Issn).is_none() {
                    IdentifierKind::Issn
                } else {
                    IdentifierKind::Eissn
                };
                query = query.with_identifier(kind, &issn);
            }
            None => warn!(issn = %raw, "Ignoring invalid ISSN"),
        }
    }
    for alias in &args.alias {
        query = query.with_alias(alias);
    }
    if let Some(expansion) = &args.expand {
        query = query.expand_acronym(expansion, "command line");
        if query.acronym_expansion.is_none() {
            warn!(venue = %args.venue, "--expand ignored; venue is not a bare acronym");
        }
    }
    query
}

fn print_verdict(verdict: &AssessmentVerdict) {
    println!("Venue:          {}", verdict.input);
    println!("Classification: {}", verdict.classification);
    println!("Confidence:     {:.2}", verdict.confidence);
    println!("Score:          {:.2}", verdict.overall_score);
    println!();
    println!(
        "Backends:       {} found, {} failed",
        verdict.found_results().count(),
        verdict.failed_results().count()
    );
    for outcome in &verdict.backend_results {
        let label = outcome
            .classification
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<24} {:<12} {:<12} {:.2}{}",
            outcome.backend_name,
            outcome.status.to_string(),
            label,
            outcome.confidence,
            if outcome.cached { " (cached)" } else { "" }
        );
        if let Some(ledger) = &outcome.fallback_ledger {
            println!("  {:<24} {}", "", ledger.summary());
        }
    }
    println!();
    println!("Reasoning:");
    for line in &verdict.reasoning {
        println!("  - {}", line);
    }
}
