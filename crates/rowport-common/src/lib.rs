//! Rowport Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Rowport workspace.
//!
//! # Overview
//!
//! This crate provides functionality used across all Rowport workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Digests**: Payload fingerprints used for duplicate suppression
//! - **Logging**: Centralized `tracing` setup
//! - **Types**: File statuses and per-row outcomes shared by the pipeline
//!
//! # Example
//!
//! ```no_run
//! use rowport_common::digest::payload_digest;
//!
//! let digest = payload_digest("https://api.example.org/students", r#"{"id":1}"#);
//! assert_eq!(digest.len(), 64);
//! ```

pub mod digest;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, RowportError};
pub use types::{FileStatus, IngestionResult, RowOutcome};
