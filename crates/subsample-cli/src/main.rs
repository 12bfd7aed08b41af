//! Subsample CLI
//!
//! The `subsample` command copies a bounded, relationship-preserving sample
//! of records from a source store into a target store.
//!
//! ```text
//! subsample [ENTITY] [LIMIT] [MAX_DEPTH]
//! ```
//!
//! Store connections are configured through `SOURCE_*` and `TARGET_*`
//! environment variables, optionally loaded from a `.env` file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use subsample_core::{Coordinator, ReplicationOptions, RunPlan, RunSummary};
use subsample_state::{ModelRegistry, StoreConfig, SOURCE_PREFIX, TARGET_PREFIX};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "subsample")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Copy a bounded sample of related records between two stores", long_about = None)]
struct Cli {
    /// Root entity type to sample
    #[arg(default_value = "User")]
    entity: String,

    /// Number of root records to copy
    #[arg(default_value_t = 2)]
    limit: usize,

    /// Relation edges followed from each root record
    #[arg(default_value_t = 3)]
    max_depth: usize,

    /// JSON model file describing entity types and relations
    /// (default: built-in User/Role models)
    #[arg(long, env = "SUBSAMPLE_SCHEMA")]
    schema: Option<PathBuf>,

    /// Children of one collection replicated at the same time
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn plan(&self) -> RunPlan {
        RunPlan::new(self.entity.clone(), self.limit, self.max_depth)
    }

    fn options(&self) -> ReplicationOptions {
        ReplicationOptions {
            child_concurrency: self.concurrency.max(1),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    subsample_core::init_tracing(cli.json, level);

    let source = StoreConfig::from_env(SOURCE_PREFIX)
        .context("Invalid source store configuration")?;
    let target = StoreConfig::from_env(TARGET_PREFIX)
        .context("Invalid target store configuration")?;

    sample(&cli, &source, &target).await?;
    Ok(())
}

/// Load the model registry from `path`, or fall back to the built-in models.
fn load_models(path: Option<&Path>) -> Result<ModelRegistry> {
    match path {
        Some(path) => ModelRegistry::from_json_file(path)
            .with_context(|| format!("Failed to load models from {}", path.display())),
        None => {
            let models = ModelRegistry::sample();
            models.validate().context("Built-in models are invalid")?;
            Ok(models)
        }
    }
}

/// Connect both stores and run one sampling pass.
async fn sample(cli: &Cli, source: &StoreConfig, target: &StoreConfig) -> Result<RunSummary> {
    let models = Arc::new(load_models(cli.schema.as_deref())?);

    let source = subsample_core::connect(source)
        .await
        .context("Failed to connect to source store")?;
    let target = subsample_core::connect(target)
        .await
        .context("Failed to connect to target store")?;

    let summary = Coordinator::new(Arc::new(source), Arc::new(target), models)
        .with_options(cli.options())
        .run(&cli.plan())
        .await
        .context("Sampling run aborted")?;

    for root in summary.failed() {
        warn!(root = %root, "Root record was not migrated");
    }
    info!(
        created = summary.metrics.records_created,
        updated = summary.metrics.records_updated,
        failures = summary.metrics.write_failures,
        "Sampling finished in {} ms",
        summary.duration_ms
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("subsample").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn positional_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.plan(), RunPlan::new("User", 2, 3));
        assert_eq!(cli.options(), ReplicationOptions::default());
        assert!(!cli.verbose);
    }

    #[test]
    fn positional_overrides() {
        let cli = parse(&["Role", "5", "1", "--concurrency", "0", "-v"]);
        assert_eq!(cli.plan(), RunPlan::new("Role", 5, 1));
        assert_eq!(cli.options().child_concurrency, 1);
        assert!(cli.verbose);
    }

    #[test]
    fn non_numeric_limit_is_rejected() {
        assert!(Cli::try_parse_from(["subsample", "User", "many"]).is_err());
    }

    #[test]
    fn schema_file_replaces_builtin_models() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"entities": [{"name": "Shop", "table": "shops"}]}"#)
            .unwrap();

        let models = load_models(Some(file.path())).unwrap();
        assert_eq!(models.entities().len(), 1);
        assert_eq!(load_models(None).unwrap().entities().len(), 2);
    }

    #[tokio::test]
    async fn empty_source_completes() {
        let cli = parse(&[]);
        let summary = sample(
            &cli,
            &StoreConfig::in_memory(SOURCE_PREFIX),
            &StoreConfig::in_memory(TARGET_PREFIX),
        )
        .await
        .unwrap();

        assert!(summary.roots.is_empty());
        assert_eq!(summary.migrated(), 0);
    }

    #[tokio::test]
    async fn unknown_entity_aborts() {
        let cli = parse(&["Invoice"]);
        let err = sample(
            &cli,
            &StoreConfig::in_memory(SOURCE_PREFIX),
            &StoreConfig::in_memory(TARGET_PREFIX),
        )
        .await
        .unwrap_err();

        assert!(format!("{err:#}").contains("unknown entity type: Invoice"));
    }

    #[tokio::test]
    async fn unreachable_store_fails_to_connect() {
        let cli = parse(&[]);
        let source = StoreConfig {
            endpoint: subsample_state::StoreEndpoint::Url("bogus://nowhere".into()),
            ..StoreConfig::in_memory(SOURCE_PREFIX)
        };
        let err = sample(&cli, &source, &StoreConfig::in_memory(TARGET_PREFIX))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Failed to connect to source store"));
    }
}
