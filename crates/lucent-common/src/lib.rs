//! Lucent Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the Lucent workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`LucentError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber configuration from the environment
//! - **Log sinks**: in-process capture of log events so a pipeline run can
//!   persist its own log trail explicitly
//!
//! # Example
//!
//! ```no_run
//! use lucent_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> lucent_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config, None)?;
//!     tracing::info!("seed starting");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod sink;

// Re-export commonly used types
pub use error::{LucentError, Result};
pub use sink::{LogEntry, LogSink, MemoryLogSink, SinkLayer};
