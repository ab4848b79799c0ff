//! Logviewer Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared pieces used by every Logviewer workspace member:
//!
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//! - **Types**: the log record vocabulary (`Severity`) shared by writers and
//!   readers of the record store
//!
//! # Example
//!
//! ```no_run
//! use logviewer_common::logging::{init_logging, LogConfig};
//! use logviewer_common::Severity;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let severity: Severity = "WARNING".parse()?;
//!     tracing::info!(%severity, "parsed severity");
//!     Ok(())
//! }
//! ```

pub mod logging;
pub mod types;

// Re-export commonly used types
pub use types::{ParseSeverityError, Severity};
