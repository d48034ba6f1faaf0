//! Lucent Seed - database seeding tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lucent_common::logging::{init_logging, LogConfig, LogLevel};
use lucent_common::{LogSink, MemoryLogSink, SinkLayer};
use lucent_seed::config::SeedConfig;
use lucent_seed::db::{self, ConnectionProvider};
use lucent_seed::extract::Extractor;
use lucent_seed::manifest::Manifest;
use lucent_seed::models::{ExtractionSummary, TransformSummary};
use lucent_seed::pipeline::{self, Pipeline};
use lucent_seed::transform::Transformer;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "lucent-seed")]
#[command(author, version, about = "Lucent database seed pipeline")]
struct Cli {
    /// Stage to run; defaults to the full pipeline
    #[command(subcommand)]
    command: Option<Command>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Provision the schema, load raw data and build the clean schema
    Run,
    /// Load the download directory into the raw schema
    Extract,
    /// Build the clean schema from the existing raw tables
    Transform,
    /// Apply database migrations only
    Migrate,
}

impl Command {
    fn name(self) -> &'static str {
        match self {
            Command::Run => "run",
            Command::Extract => "extract",
            Command::Transform => "transform",
            Command::Migrate => "migrate",
        }
    }

    fn extracts(self) -> bool {
        matches!(self, Command::Run | Command::Extract)
    }

    fn transforms(self) -> bool {
        matches!(self, Command::Run | Command::Transform)
    }
}

/// Value threaded through the pipeline steps
#[derive(Debug, Default)]
struct SeedRun {
    provider: Option<ConnectionProvider>,
    extraction: Option<ExtractionSummary>,
    transform: Option<TransformSummary>,
}

impl SeedRun {
    fn provider(&self) -> Result<ConnectionProvider> {
        self.provider
            .clone()
            .context("Database connection has not been established")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("lucent-seed")
        .filter_directives("sqlx=warn")
        .build()
        .merge_env()?;

    let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::new());
    let _guard = init_logging(
        &log_config,
        Some(SinkLayer::new(sink.clone()).exclude_target(pipeline::TARGET)),
    )?;

    let config = SeedConfig::load().context("Failed to load configuration")?;

    let manifest = if command.extracts() {
        let manifest = Manifest::load(&config.manifest_path)
            .with_context(|| format!("Failed to read manifest {}", config.manifest_path.display()))?;
        let summary = manifest.summary();
        info!(
            local_files = summary.local_files,
            remote_files = summary.remote_files,
            apis = summary.apis,
            databases = summary.databases,
            scripts = summary.scripts,
            "Manifest configuration"
        );
        Some(Arc::new(manifest))
    } else {
        None
    };

    let registry = if command.transforms() {
        Some(Arc::new(config.registry().context("Failed to load column mappings")?))
    } else {
        None
    };

    let mut seed = Pipeline::new(format!("lucent-seed {}", command.name())).with_sink(sink.clone());
    let run_id = seed.run_id();
    info!(run_id = %run_id, command = command.name(), "Starting seed");

    let database = config.database.clone();
    seed = seed
        .add_step("Check DB connection", move |mut run: SeedRun| async move {
            let pool = db::create_pool(&database).await?;
            db::health_check(&pool).await?;
            run.provider = Some(ConnectionProvider::new(pool));
            Ok(run)
        })
        .add_step("Provision schema", |run: SeedRun| async move {
            db::run_migrations(run.provider()?.pool()).await?;
            Ok(run)
        });

    if command == Command::Run {
        if let Some(script) = config.pre_seed_sql.clone() {
            seed = seed.add_step("Run pre-seed SQL", move |run: SeedRun| async move {
                db::execute_script(run.provider()?.pool(), &script).await?;
                Ok(run)
            });
        }
    }

    if let Some(manifest) = manifest {
        let download_dir = config.download_dir.clone();
        let workers = config.max_workers;
        seed = seed.add_step("Extract raw data", move |mut run: SeedRun| async move {
            let summary = Extractor::new(run.provider()?, manifest)
                .with_workers(workers)
                .ingest(&download_dir)
                .await?;
            run.extraction = Some(summary);
            Ok(run)
        });
    }

    if let Some(registry) = registry {
        let workers = config.max_workers;
        seed = seed.add_step("Transform to clean schema", move |mut run: SeedRun| async move {
            let summary = Transformer::new(run.provider()?, registry)
                .with_workers(workers)
                .transform_all()
                .await?;
            run.transform = Some(summary);
            Ok(run)
        });
    }

    if command == Command::Run {
        if let Some(script) = config.post_seed_sql.clone() {
            seed = seed.add_step("Run post-seed SQL", move |run: SeedRun| async move {
                db::execute_script(run.provider()?.pool(), &script).await?;
                Ok(run)
            });
        }
    }

    let flush_sink = sink.clone();
    seed = seed.add_step("Commit logs to database", move |run: SeedRun| async move {
        let written = db::flush_logs(run.provider()?.pool(), flush_sink.as_ref(), run_id).await?;
        info!(entries = written, "Logs committed to database");
        Ok(run)
    });

    let run = seed.run(SeedRun::default()).await?;

    if let Some(summary) = &run.extraction {
        info!(
            files = summary.files_found,
            file_errors = summary.file_errors.len(),
            tables = summary.loaded_tables(),
            failed_tables = summary.failed_tables().len(),
            rows = summary.total_rows(),
            "Extraction summary"
        );
    }
    if let Some(summary) = &run.transform {
        info!(
            tables = summary.tables.len(),
            failed_tables = summary.failed_tables().len(),
            rows = summary.total_rows(),
            excluded = summary.total_excluded(),
            duplicates = summary.total_duplicates(),
            failed_rows = summary.total_failed_rows(),
            "Transformation summary"
        );
    }

    // Lines logged after the commit step
    if let Some(provider) = &run.provider {
        if let Err(e) = db::flush_logs(provider.pool(), sink.as_ref(), run_id).await {
            warn!(error = %e, "Failed to commit trailing log entries");
        }
    }

    info!("Seed complete");
    Ok(())
}
