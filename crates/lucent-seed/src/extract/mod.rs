//! Raw extraction
//!
//! Loads every supported file in the download directory into the `data_raw`
//! schema. Files are parsed in name order on the blocking pool; the resulting
//! tables are then loaded concurrently, one worker per table and one
//! transaction per dataset. A failing file or table is recorded in the [`ExtractionSummary`] and
//! never stops the others.

pub mod loader;
pub mod reader;

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::worker_count;
use crate::db::ConnectionProvider;
use crate::error::{Result, SeedError};
use crate::ident::raw_table_name;
use crate::manifest::{Manifest, SourceType};
use crate::models::{ExtractionSummary, TableLoadResult};
use reader::{read_file, Dataset, SourceFormat};

/// A dataset ready to load, with its resolved raw table name
#[derive(Debug)]
struct LoadTask {
    file_name: String,
    table_name: String,
    dataset: Dataset,
}

pub struct Extractor {
    provider: ConnectionProvider,
    manifest: Arc<Manifest>,
    workers: Option<usize>,
}

impl Extractor {
    pub fn new(provider: ConnectionProvider, manifest: Arc<Manifest>) -> Self {
        Self {
            provider,
            manifest,
            workers: None,
        }
    }

    /// Cap concurrent table loads; defaults to available parallelism
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    /// Load every supported file under `dir` into the raw schema
    ///
    /// A missing directory yields an empty summary. Only an unreadable
    /// directory is an error.
    pub async fn ingest(&self, dir: &Path) -> Result<ExtractionSummary> {
        let start = Instant::now();
        let mut summary = ExtractionSummary::default();

        if !dir.exists() {
            warn!(dir = %dir.display(), "Downloads directory does not exist");
            return Ok(summary);
        }

        let files = discover_files(dir)?;
        summary.files_found = files.len();
        if files.is_empty() {
            info!(dir = %dir.display(), "No files found to process");
            return Ok(summary);
        }
        info!(dir = %dir.display(), files = files.len(), "Found files to process");

        // Datasets whose names collide share one worker so the table is
        // created once
        let mut tables: BTreeMap<String, Vec<LoadTask>> = BTreeMap::new();
        for path in files {
            let file_name = display_name(&path);
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            let datasets = match parse_file(path.clone()).await {
                Ok(datasets) => datasets,
                Err(e) => {
                    error!(file = %file_name, error = %e, "Failed to load file");
                    summary.file_errors.push((file_name, e.to_string()));
                    continue;
                },
            };
            debug!(file = %file_name, datasets = datasets.len(), "Parsed file");

            let tier = self.manifest.tier_for(&stem);
            for dataset in datasets {
                match self.plan(&file_name, &stem, tier, dataset) {
                    Planned::Load(task) => tables.entry(task.table_name.clone()).or_default().push(task),
                    Planned::Skipped => summary.datasets_skipped += 1,
                    Planned::Failed(result) => summary.tables.push(result),
                }
            }
        }

        info!(tables = tables.len(), "Found tables to process across all files");

        let workers = worker_count(self.workers, tables.len());
        let results: Vec<Vec<TableLoadResult>> = stream::iter(tables.into_values())
            .map(|group| self.load_group(group))
            .buffer_unordered(workers)
            .collect()
            .await;
        summary.tables.extend(results.into_iter().flatten());

        let failed = summary.failed_tables();
        if !failed.is_empty() {
            warn!(count = failed.len(), tables = %failed.join(", "), "Failed to load raw tables");
        }
        info!(
            tables = summary.loaded_tables(),
            rows = summary.total_rows(),
            duration_secs = start.elapsed().as_secs_f64(),
            "All files processed"
        );

        Ok(summary)
    }

    fn plan(&self, file_name: &str, stem: &str, tier: SourceType, dataset: Dataset) -> Planned {
        let candidate = dataset.table_candidate(stem);

        let Some(prefix) = tier.table_prefix() else {
            info!(file = %file_name, table = %candidate, "Skipping embeddings source");
            return Planned::Skipped;
        };

        if dataset.is_empty() {
            info!(file = %file_name, table = %candidate, "Skipping empty dataset");
            return Planned::Skipped;
        }

        match raw_table_name(prefix, &candidate) {
            Ok(table_name) => Planned::Load(LoadTask {
                file_name: file_name.to_string(),
                table_name,
                dataset,
            }),
            Err(e) => {
                error!(
                    file = %file_name,
                    table = %candidate,
                    error = %e,
                    configuration = e.is_configuration(),
                    "Invalid raw table name"
                );
                Planned::Failed(TableLoadResult {
                    table_name: candidate,
                    file_name: file_name.to_string(),
                    rows_loaded: 0,
                    error: Some(e.to_string()),
                })
            },
        }
    }

    /// Load datasets bound for the same raw table one after another
    async fn load_group(&self, group: Vec<LoadTask>) -> Vec<TableLoadResult> {
        let mut results = Vec::with_capacity(group.len());
        for task in group {
            results.push(self.load_table(task).await);
        }
        results
    }

    async fn load_table(&self, task: LoadTask) -> TableLoadResult {
        let LoadTask {
            file_name,
            table_name,
            dataset,
        } = task;

        info!(
            file = %file_name,
            table = %table_name,
            rows = dataset.rows.len(),
            sheet = dataset.sheet.as_deref().unwrap_or("-"),
            "Processing table"
        );

        match self.load_in_transaction(&table_name, &dataset).await {
            Ok(rows_loaded) => {
                info!(file = %file_name, table = %table_name, rows = rows_loaded, "Completed table");
                TableLoadResult {
                    table_name,
                    file_name,
                    rows_loaded,
                    error: None,
                }
            },
            Err(e) => {
                error!(
                    file = %file_name,
                    table = %table_name,
                    error = %e,
                    configuration = e.is_configuration(),
                    "Error processing table"
                );
                TableLoadResult {
                    table_name,
                    file_name,
                    rows_loaded: 0,
                    error: Some(e.to_string()),
                }
            },
        }
    }

    async fn load_in_transaction(&self, table_name: &str, dataset: &Dataset) -> Result<usize> {
        // Rolled back on drop if anything below fails
        let mut tx = self.provider.begin().await?;
        let rows = loader::load_dataset(&mut tx, table_name, dataset).await?;
        tx.commit().await?;
        Ok(rows)
    }
}

enum Planned {
    Load(LoadTask),
    Skipped,
    Failed(TableLoadResult),
}

/// Supported files directly under `dir`, sorted by path
pub fn discover_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && SourceFormat::from_path(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn parse_file(path: PathBuf) -> Result<Vec<Dataset>> {
    tokio::task::spawn_blocking(move || read_file(&path))
        .await
        .map_err(|e| SeedError::Io(std::io::Error::other(e)))?
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
