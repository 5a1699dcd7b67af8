//! Rowport Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Moves uploaded tabular files into a target API.
//!
//! # Components
//!
//! - **Catalog**: agents, data maps, files, lookups and bootstrap payloads
//! - **Client**: authenticated publishing with retry on expired tokens
//! - **Sources**: CSV reading, external preprocessors and row processors
//! - **Bootstrap**: seed payloads published before regular ingestion
//! - **Pipeline**: ordered agents, sequential files, concurrent rows
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rowport_ingest::catalog::JsonCatalog;
//! use rowport_ingest::client::ApiClient;
//! use rowport_ingest::config::Config;
//! use rowport_ingest::ingestion_log::TracingIngestionLog;
//! use rowport_ingest::pipeline::FileProcessor;
//! use rowport_ingest::store::LocalFileStore;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let processor = FileProcessor::new(
//!         Arc::new(JsonCatalog::load(&config.storage.catalog_path)?),
//!         Arc::new(ApiClient::new(config.connection.clone())?),
//!         Arc::new(LocalFileStore::new(&config.storage.file_root)),
//!         Arc::new(TracingIngestionLog::new(config.pipeline.ingestion_log_level)),
//!     );
//!     let report = processor.process(&CancellationToken::new()).await?;
//!     println!("{} files processed", report.files.len());
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod ingestion_log;
pub mod pipeline;
pub mod source;
pub mod store;

pub use cli::Cli;
