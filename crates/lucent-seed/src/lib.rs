//! Lucent Seed Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Seeds the Lucent PostgreSQL database from downloaded mine datasets.
//!
//! # Stages
//!
//! - **Extract**: every CSV, JSON/GeoJSON and workbook file in the download
//!   directory becomes one or more all-`TEXT` tables in `data_raw`
//! - **Transform**: rows of the primary raw tables are keyed by a
//!   coordinate-derived [`identity::MineId`] and fanned out into the
//!   `data_clean` dimension and fact tables
//!
//! Both stages run one worker and one transaction per table. Failures are
//! scoped: a bad row never stops its table and a bad table never stops the
//! stage.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lucent_seed::config::SeedConfig;
//! use lucent_seed::db::{create_pool, ConnectionProvider};
//! use lucent_seed::extract::Extractor;
//! use lucent_seed::manifest::Manifest;
//! use lucent_seed::transform::Transformer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SeedConfig::load()?;
//!     let provider = ConnectionProvider::new(create_pool(&config.database).await?);
//!     let manifest = Arc::new(Manifest::load(&config.manifest_path)?);
//!
//!     Extractor::new(provider.clone(), manifest)
//!         .ingest(&config.download_dir)
//!         .await?;
//!     Transformer::new(provider, Arc::new(config.registry()?))
//!         .transform_all()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod ident;
pub mod identity;
pub mod manifest;
pub mod mapping;
pub mod models;
pub mod pipeline;
pub mod transform;

pub use error::{Result, SeedError};
