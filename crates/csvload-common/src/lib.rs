//! csvload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the csvload workspace:
//!
//! - **Error Handling**: `CsvloadError` and the `Result` alias
//! - **Environment**: strict parsing of optional environment variables
//! - **Logging**: tracing subscriber setup used by every binary
//! - **Naming**: timestamped names for stored uploads
//!
//! # Example
//!
//! ```no_run
//! use csvload_common::naming::timestamped_file_name;
//!
//! let stored = timestamped_file_name("majestic_million.csv", &chrono::Local::now());
//! assert!(stored.starts_with("majestic_million-"));
//! ```

pub mod env;
pub mod error;
pub mod logging;
pub mod naming;

pub use error::{CsvloadError, Result};
