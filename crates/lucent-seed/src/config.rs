//! Seed configuration
//!
//! Everything is read from the environment (optionally through a `.env` file).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` or `DB_HOST`/`DB_PORT`/`DB_NAME`/`DB_USER`/`DB_PASSWORD` | required |
//! | `DB_MAX_CONNECTIONS` / `DB_MIN_CONNECTIONS` / `DB_CONNECT_TIMEOUT` | 20 / 1 / 30 |
//! | `DOWNLOAD_DIR` | `src/downloads` |
//! | `MANIFEST_PATH` | `manifest.yaml` |
//! | `COLUMN_MAPPINGS_PATH` / `VALUE_OVERRIDES_PATH` | embedded defaults |
//! | `SEED_MAX_WORKERS` | available parallelism |
//! | `PRE_SEED_SQL` / `POST_SEED_SQL` | not run |

use std::path::PathBuf;

use crate::db::{parse_or, DbConfig};
use crate::error::{Result, SeedError};
use crate::mapping::ColumnMappingRegistry;

/// Default directory the downloaders populate.
pub const DEFAULT_DOWNLOAD_DIR: &str = "src/downloads";

/// Default manifest location.
pub const DEFAULT_MANIFEST_PATH: &str = "manifest.yaml";

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub database: DbConfig,
    pub download_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub column_mappings_path: Option<PathBuf>,
    pub value_overrides_path: Option<PathBuf>,
    /// Worker cap for both stages; `None` means available parallelism
    pub max_workers: Option<usize>,
    pub pre_seed_sql: Option<PathBuf>,
    pub post_seed_sql: Option<PathBuf>,
}

impl SeedConfig {
    /// Load `.env` if present, then read the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        Ok(Self {
            database: DbConfig::from_lookup(&lookup)?,
            download_dir: path("DOWNLOAD_DIR").unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            manifest_path: path("MANIFEST_PATH").unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH)),
            column_mappings_path: path("COLUMN_MAPPINGS_PATH"),
            value_overrides_path: path("VALUE_OVERRIDES_PATH"),
            max_workers: parse_or(&lookup, "SEED_MAX_WORKERS", 0usize).map(|w| (w > 0).then_some(w))?,
            pre_seed_sql: path("PRE_SEED_SQL"),
            post_seed_sql: path("POST_SEED_SQL"),
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;

        for (name, script) in [("PRE_SEED_SQL", &self.pre_seed_sql), ("POST_SEED_SQL", &self.post_seed_sql)] {
            if let Some(script) = script {
                if !script.is_file() {
                    return Err(SeedError::config(format!(
                        "{} points at a missing file: {}",
                        name,
                        script.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Column-mapping registry from the configured files or the embedded defaults
    pub fn registry(&self) -> Result<ColumnMappingRegistry> {
        ColumnMappingRegistry::load(
            self.column_mappings_path.as_deref(),
            self.value_overrides_path.as_deref(),
        )
    }
}

/// Workers for `units` units of work: the cap or available parallelism,
/// never more than the units and never zero
pub fn worker_count(cap: Option<usize>, units: usize) -> usize {
    let cap = cap.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    });
    cap.min(units).max(1)
}
