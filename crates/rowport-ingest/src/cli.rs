//! Command-line interface
//!
//! Argument definitions live here so documentation tooling can render them;
//! every command returns its output text and `main` prints it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rowport_map::{
    check_compatibility, parse_schema, swagger, AuthoredNode, CompatibilityLevel,
    DeleteByIdSerializer, LookupCollection, LookupEntry, MapSerializer, RowMapper, SchemaNode,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bootstrap::BootstrapPublisher;
use crate::catalog::{JsonCatalog, MapOperation};
use crate::client::ApiClient;
use crate::config::Config;
use crate::ingestion_log::TracingIngestionLog;
use crate::pipeline::{FileProcessor, PipelineOptions};
use crate::source::{CsvSource, TabularSource};
use crate::store::LocalFileStore;

/// Rowport: map tabular rows onto API resources and publish them
#[derive(Parser, Debug)]
#[command(name = "rowport")]
#[command(author, version, about = "Map tabular rows onto API resources and publish them")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Map flavor for offline commands
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    Upsert,
    DeleteById,
    DeleteByNaturalKey,
}

impl From<MapKind> for MapOperation {
    fn from(kind: MapKind) -> Self {
        match kind {
            MapKind::Upsert => MapOperation::Upsert,
            MapKind::DeleteById => MapOperation::DeleteById,
            MapKind::DeleteByNaturalKey => MapOperation::DeleteByNaturalKey,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish bootstrap data, then ingest every pending file of a connection
    Run {
        /// Connection whose agents are processed
        #[arg(long, env = "ROWPORT_CONNECTION_NAME")]
        connection: Option<String>,

        /// Catalog file
        #[arg(long, env = "ROWPORT_CATALOG")]
        catalog: Option<PathBuf>,

        /// Root directory of uploaded files
        #[arg(long, env = "ROWPORT_FILE_ROOT")]
        file_root: Option<PathBuf>,

        /// Rows of one file published concurrently
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Skip comparing maps with the target's current schemas
        #[arg(long)]
        skip_metadata_check: bool,

        /// Only run agents with a weekly schedule slot due since their last run
        #[arg(long)]
        scheduled: bool,
    },

    /// Check a wire map against a schema and print its canonical form
    ValidateMap {
        /// Schema JSON (list of Name/DataType/Required/Children records)
        #[arg(long)]
        schema: PathBuf,

        /// Wire map JSON
        #[arg(long)]
        map: PathBuf,

        /// Resource path used in messages
        #[arg(long, default_value = "/resource")]
        resource_path: String,

        #[arg(long, value_enum, default_value = "upsert")]
        kind: MapKind,
    },

    /// Map every row of a CSV file and print one document per line
    ApplyMap {
        #[arg(long)]
        schema: PathBuf,

        #[arg(long)]
        map: PathBuf,

        /// CSV input with a header line
        #[arg(long)]
        csv: PathBuf,

        /// Lookup entries JSON (list of SourceTable/Key/Value records)
        #[arg(long)]
        lookups: Option<PathBuf>,

        #[arg(long, default_value = "/resource")]
        resource_path: String,

        #[arg(long, value_enum, default_value = "upsert")]
        kind: MapKind,
    },

    /// Build a schema from a Swagger 2.0 resource description
    ParseSwagger {
        /// Resource description JSON
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "/resource")]
        resource_path: String,
    },

    /// Turn authored mapping nodes into a wire map
    ComposeMap {
        #[arg(long)]
        schema: PathBuf,

        /// Authored nodes JSON (Name/SourceColumn/SourceTable/Default/Value/Children)
        #[arg(long)]
        authored: PathBuf,

        #[arg(long, default_value = "/resource")]
        resource_path: String,
    },
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_schema(path: &Path) -> Result<Vec<SchemaNode>> {
    parse_schema(&read(path)?).with_context(|| format!("Invalid schema in {}", path.display()))
}

fn load_json(path: &Path) -> Result<Value> {
    serde_json::from_str(&read(path)?).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Execute a parsed command line
pub async fn execute(command: Commands) -> Result<String> {
    match command {
        Commands::Run {
            connection,
            catalog,
            file_root,
            max_concurrency,
            skip_metadata_check,
            scheduled,
        } => {
            let mut config = Config::load()?;
            if let Some(connection) = connection {
                config.connection.name = connection;
            }
            if let Some(catalog) = catalog {
                config.storage.catalog_path = catalog;
            }
            if let Some(root) = file_root {
                config.storage.file_root = root;
            }
            if let Some(limit) = max_concurrency {
                config.pipeline.limit_concurrent_posts = true;
                config.pipeline.max_concurrent_posts = limit;
            }
            if skip_metadata_check {
                config.pipeline.check_metadata = false;
            }
            if scheduled {
                config.pipeline.scheduled_only = true;
            }
            config.validate()?;
            run(config).await
        },
        Commands::ValidateMap {
            schema,
            map,
            resource_path,
            kind,
        } => validate_map(&load_schema(&schema)?, &load_json(&map)?, &resource_path, kind.into()),
        Commands::ApplyMap {
            schema,
            map,
            csv,
            lookups,
            resource_path,
            kind,
        } => {
            let lookups: Vec<LookupEntry> = match lookups {
                Some(path) => serde_json::from_value(load_json(&path)?)
                    .with_context(|| format!("Invalid lookups in {}", path.display()))?,
                None => Vec::new(),
            };
            apply_map(
                load_schema(&schema)?,
                &load_json(&map)?,
                Box::new(CsvSource::from_path(&csv)?),
                &lookups,
                &resource_path,
                kind.into(),
            )
        },
        Commands::ParseSwagger {
            input,
            resource_path,
        } => {
            let schema = swagger::parse(&resource_path, &read(&input)?)?;
            Ok(rowport_map::schema::schema_to_string(&schema)?)
        },
        Commands::ComposeMap {
            schema,
            authored,
            resource_path,
        } => {
            let nodes: Vec<AuthoredNode> = serde_json::from_value(load_json(&authored)?)
                .with_context(|| format!("Invalid authored nodes in {}", authored.display()))?;
            let serializer = MapSerializer::new(resource_path, load_schema(&schema)?);
            Ok(serde_json::to_string_pretty(&serializer.serialize_authored(&nodes)?)?)
        },
    }
}

/// Bootstrap, then the ingestion pipeline; returns the JSON run report
pub async fn run(config: Config) -> Result<String> {
    let catalog = Arc::new(
        JsonCatalog::load(&config.storage.catalog_path).with_context(|| {
            format!(
                "Failed to load catalog from {}",
                config.storage.catalog_path.display()
            )
        })?,
    );
    let publisher = Arc::new(ApiClient::new(config.connection.clone())?);
    let log = Arc::new(TracingIngestionLog::new(config.pipeline.ingestion_log_level));
    let store = Arc::new(LocalFileStore::new(&config.storage.file_root));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current rows");
            on_signal.cancel();
        }
    });

    // Step 1: bootstrap data
    let bootstrap = BootstrapPublisher::new(
        catalog.as_ref(),
        publisher.as_ref(),
        log.as_ref(),
        config.pipeline.check_metadata,
    );
    if !bootstrap.run(&cancel).await {
        catalog.save()?;
        anyhow::bail!("Bootstrap failed for connection '{}'", config.connection.name);
    }

    // Step 2: pending files
    let processor = FileProcessor::new(catalog.clone(), publisher, store, log).with_options(
        PipelineOptions {
            row_concurrency: config.pipeline.row_concurrency(),
            check_metadata: config.pipeline.check_metadata,
            scheduled_only: config.pipeline.scheduled_only,
        },
    );
    let result = processor.process(&cancel).await;

    // Status changes are kept even when the run stops early
    catalog.save()?;
    let report = result?;

    info!(files = report.files.len(), "Run finished");
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Canonical wire form of `map`, after checking it against `schema`
pub fn validate_map(
    schema: &[SchemaNode],
    map: &Value,
    resource_path: &str,
    operation: MapOperation,
) -> Result<String> {
    let canonical = match operation {
        MapOperation::DeleteById => {
            let serializer = DeleteByIdSerializer::new();
            serializer.serialize_to_string(&serializer.deserialize_value(map)?)?
        },
        MapOperation::DeleteByNaturalKey => {
            let serializer = MapSerializer::for_natural_key(resource_path, schema);
            serializer.serialize_to_string(&serializer.deserialize_value(map)?)?
        },
        MapOperation::Upsert => {
            check_compatibility(resource_path, schema, map, CompatibilityLevel::DataMap)?;
            let serializer = MapSerializer::new(resource_path, schema.to_vec());
            serializer.serialize_to_string(&serializer.deserialize_value(map)?)?
        },
    };
    Ok(canonical)
}

/// One mapped document (or error) per row, newline separated
pub fn apply_map(
    schema: Vec<SchemaNode>,
    map: &Value,
    source: Box<dyn TabularSource>,
    lookups: &[LookupEntry],
    resource_path: &str,
    operation: MapOperation,
) -> Result<String> {
    let lookups = Arc::new(LookupCollection::new(lookups));
    let mapper = match operation {
        MapOperation::DeleteById => RowMapper::new(
            Vec::new(),
            DeleteByIdSerializer::new().deserialize_value(map)?,
            lookups,
        ),
        MapOperation::DeleteByNaturalKey => {
            let serializer = MapSerializer::for_natural_key(resource_path, &schema);
            let mappings = serializer.deserialize_value(map)?;
            RowMapper::new(serializer.schema().to_vec(), mappings, lookups)
        },
        MapOperation::Upsert => {
            let serializer = MapSerializer::new(resource_path, schema);
            let mappings = serializer.deserialize_value(map)?;
            RowMapper::new(serializer.schema().to_vec(), mappings, lookups)
        },
    };

    let rows = source.rows()?;
    let missing = mapper.missing_columns(rows.headers());
    if !missing.is_empty() {
        anyhow::bail!("Input file missing columns: {}.", missing.join(", "));
    }
    let missing = mapper.missing_lookups();
    if !missing.is_empty() {
        anyhow::bail!("Missing lookups: {}.", missing.join(", "));
    }

    let mut lines = Vec::new();
    for row in rows {
        let row = row?;
        let mapped = match operation {
            MapOperation::DeleteById => mapper.apply_delete_by_id(&row),
            _ => mapper.apply(&row),
        };
        lines.push(match mapped {
            Ok(document) => document.to_string(),
            Err(e) => serde_json::json!({"row": row.number, "error": e.to_string()}).to_string(),
        });
    }
    Ok(lines.join("\n"))
}
