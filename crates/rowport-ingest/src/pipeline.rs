//! Ingestion pipeline
//!
//! Agents of one connection run one after another in run order. Each agent
//! applies its data maps in processing order to every pending file, one
//! file at a time. Only the rows of a single file are processed
//! concurrently, bounded by the configured row concurrency.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use rowport_common::digest::payload_digest;
use rowport_common::logging::LogLevel;
use rowport_common::{FileStatus, IngestionResult, RowOutcome};
use rowport_map::{
    check_compatibility, CompatibilityLevel, DeleteByIdSerializer, LookupCollection, MapSerializer,
    Row, RowMapper,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{Agent, Catalog, DataMap, ImportFile, MapOperation};
use crate::client::{PublishResponse, Publisher};
use crate::ingestion_log::{IngestionLog, IngestionRecord, OPERATION_TRANSFORM};
use crate::source::{
    CsvSource, ExternalPreprocessor, ProcessedSource, ProcessorRegistry, RowProcessor,
    ScriptCache, TabularSource,
};
use crate::store::FileStore;

/// Pipeline tuning
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Rows of one file in flight at once; `None` is unbounded
    pub row_concurrency: Option<usize>,
    /// Verify data maps against the target's current schemas first
    pub check_metadata: bool,
    /// Only agents with a weekly schedule slot due since their last run
    pub scheduled_only: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            row_concurrency: None,
            check_metadata: true,
            scheduled_only: false,
        }
    }
}

/// Outcome counts of one (file, data map) pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileResponse {
    pub success: usize,
    pub exists: usize,
    pub errors: usize,
    pub duplicates: usize,
    pub message: String,
}

impl FileResponse {
    fn rejected(message: String) -> Self {
        Self {
            errors: 1,
            message,
            ..Default::default()
        }
    }

    fn tally(outcomes: &[RowOutcome]) -> Self {
        let mut response = Self::default();
        for outcome in outcomes {
            match outcome {
                RowOutcome::Success => response.success += 1,
                RowOutcome::Exist => response.exists += 1,
                RowOutcome::Error => response.errors += 1,
                RowOutcome::Duplicate => response.duplicates += 1,
            }
        }
        response
    }

    fn summarize(mut self, data_map: &str, rows: usize, exception: bool) -> Self {
        let exception_note = if exception {
            "Exception logged during file processing, "
        } else {
            ""
        };
        self.message = format!(
            "Using DataMap: {data_map}, {exception_note}File has {rows} rows, API calls processed:  Success: {}, Exists: {}, Error: {}, Duplicate: {}",
            self.success, self.exists, self.errors, self.duplicates
        );
        self
    }
}

/// Final state of one file after its agent finished
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_id: i64,
    pub file_name: String,
    pub agent: String,
    pub status: FileStatus,
    pub message: String,
}

/// Everything one run touched
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub agents: Vec<String>,
    pub files: Vec<FileReport>,
}

/// A data map ready to apply to rows
struct PreparedMap {
    data_map: DataMap,
    mapper: RowMapper,
    endpoint: String,
}

/// State shared by every file of one agent
struct AgentRun<'a> {
    agent: &'a Agent,
    connection: &'a str,
    row_processor: Option<Arc<dyn RowProcessor>>,
    cache: ScriptCache,
}

/// Transforms pending files and publishes their rows
pub struct FileProcessor {
    catalog: Arc<dyn Catalog>,
    publisher: Arc<dyn Publisher>,
    store: Arc<dyn FileStore>,
    log: Arc<dyn IngestionLog>,
    processors: ProcessorRegistry,
    options: PipelineOptions,
}

impl FileProcessor {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        publisher: Arc<dyn Publisher>,
        store: Arc<dyn FileStore>,
        log: Arc<dyn IngestionLog>,
    ) -> Self {
        Self {
            catalog,
            publisher,
            store,
            log,
            processors: ProcessorRegistry::default(),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_processors(mut self, processors: ProcessorRegistry) -> Self {
        self.processors = processors;
        self
    }

    /// Agents of this connection that have pending files, in run order
    pub fn eligible_agents(&self) -> Result<Vec<Agent>> {
        let connection = self.publisher.connection_name();
        let now = Utc::now();
        let mut agents = Vec::new();
        for agent in self.catalog.agents()? {
            if !agent.is_active_for(connection) {
                continue;
            }
            if self.options.scheduled_only && !agent.should_execute_on_schedule(now) {
                debug!(agent = %agent.name, "No schedule slot due");
                continue;
            }
            let has_pending = self
                .catalog
                .files_for_agent(agent.id)?
                .iter()
                .any(|f| f.status.is_pending());
            if has_pending {
                agents.push(agent);
            }
        }
        agents.sort_by_key(Agent::run_order_key);
        Ok(agents)
    }

    /// Process every pending file of the connection
    pub async fn process(&self, cancel: &CancellationToken) -> Result<RunReport> {
        let connection = self.publisher.connection_name();
        let mut report = RunReport::default();

        // Step 1: select agents
        let agents = self.eligible_agents()?;
        if agents.is_empty() {
            info!(
                "No files found for processing for API Connection '{connection}'. Check that the agent is enabled and has files in Uploaded or Retry status."
            );
            return Ok(report);
        }
        info!(connection, agents = agents.len(), "Found agents with files to process");

        // Step 2: every agent needs at least one data map
        for agent in &agents {
            if agent.data_maps.is_empty() {
                error!(agent = %agent.name, "Agent has no data maps");
                bail!(
                    "Agent '{}' (ID {}) has files to process but no data maps.",
                    agent.name,
                    agent.id
                );
            }
        }

        // Step 3: check maps against the target before touching any file
        if self.options.check_metadata {
            for agent in &agents {
                for link in &agent.data_maps {
                    let data_map = self.catalog.data_map(link.data_map_id)?;
                    self.check_data_map(connection, &data_map)?;
                }
            }
        }

        // Step 4: shared lookups
        let lookups = Arc::new(LookupCollection::new(&self.catalog.lookups()?));

        // Step 5: agents in order
        for agent in &agents {
            if cancel.is_cancelled() {
                warn!(agent = %agent.name, "Canceled before agent started");
                break;
            }
            let files = self.process_agent(connection, agent, &lookups, cancel).await?;
            report.agents.push(agent.name.clone());
            report.files.extend(files);
        }

        info!(
            connection,
            files = report.files.len(),
            loaded = report.files.iter().filter(|f| f.status == FileStatus::Loaded).count(),
            "Ingestion run complete"
        );
        Ok(report)
    }

    fn check_data_map(&self, connection: &str, data_map: &DataMap) -> Result<()> {
        if data_map.operation == MapOperation::DeleteById {
            return Ok(());
        }

        let details = match self
            .catalog
            .resource_schema(connection, &data_map.resource_path)?
        {
            Some(schema) => match check_compatibility(
                &data_map.resource_path,
                &schema,
                &data_map.map,
                CompatibilityLevel::DataMap,
            ) {
                Ok(()) => return Ok(()),
                Err(e) => e.to_string(),
            },
            None => format!("The target API does not describe '{}'.", data_map.resource_path),
        };

        error!(data_map = %data_map.name, resource = %data_map.resource_path, "Data map metadata differs from target");
        bail!(
            "Cannot insert data for Data Map ID {} because its '{}' resource metadata differs from that of the target API. The Data Map may need to be redefined against this API version. {}",
            data_map.id,
            data_map.resource_path,
            details
        )
    }

    async fn process_agent(
        &self,
        connection: &str,
        agent: &Agent,
        lookups: &Arc<LookupCollection>,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileReport>> {
        info!(agent = %agent.name, "Processing agent");

        let row_processor = match agent.row_processor.as_deref() {
            Some(name) => Some(self.processors.get(name)?),
            None => None,
        };
        let run = AgentRun {
            agent,
            connection,
            row_processor,
            cache: ScriptCache::new(),
        };

        let files: Vec<ImportFile> = self
            .catalog
            .files_for_agent(agent.id)?
            .into_iter()
            .filter(|f| f.status.is_pending())
            .collect();

        let mut links = agent.data_maps.clone();
        links.sort_by_key(|l| (l.processing_order, l.data_map_id));

        let mut progress: Vec<FileProgress> = files
            .into_iter()
            .map(|file| FileProgress {
                file,
                responses: Vec::new(),
                started: false,
            })
            .collect();

        let mut canceled = false;
        'maps: for link in &links {
            let data_map = self.catalog.data_map(link.data_map_id)?;
            let prepared = self.prepare_map(data_map.clone(), lookups);

            for entry in progress.iter_mut() {
                let file = &entry.file;
                if cancel.is_cancelled() {
                    warn!(agent = %agent.name, file = %file.file_name, "Canceled between files");
                    canceled = true;
                    break 'maps;
                }

                entry.started = true;
                self.catalog
                    .update_file_status(file.id, FileStatus::Transforming, None)?;

                let response = match &prepared {
                    Ok(map) => self.process_file(&run, map, file, cancel).await,
                    Err(e) => {
                        error!(file = %file.file_name, data_map = %data_map.name, error = %e, "Data map could not be loaded");
                        FileResponse {
                            errors: 1,
                            ..Default::default()
                        }
                        .summarize(&data_map.name, 0, true)
                    },
                };
                if cancel.is_cancelled() {
                    warn!(agent = %agent.name, file = %file.file_name, data_map = %data_map.name, "Canceled during file");
                    canceled = true;
                    break 'maps;
                }
                entry.responses.push(response);
            }
        }

        let mut reports = Vec::new();
        for FileProgress {
            file,
            responses: file_responses,
            started,
        } in progress
        {
            if file_responses.len() < links.len() {
                // Every data map must run before a file gets a final status
                if started {
                    self.catalog
                        .update_file_status(file.id, file.status, file.message.clone())?;
                    info!(file = %file.file_name, status = %file.status.as_str(), "File left pending");
                }
                continue;
            }

            let status = if file_responses.iter().any(|r| r.errors > 0) {
                FileStatus::ErrorLoading
            } else {
                FileStatus::Loaded
            };
            let message = file_responses
                .iter()
                .map(|r| r.message.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");

            self.catalog
                .update_file_status(file.id, status, Some(message.clone()))?;
            if status == FileStatus::Loaded {
                if let Err(e) = self.store.delete(&file).await {
                    warn!(file = %file.file_name, error = %e, "Could not delete loaded file from store");
                }
            }
            info!(file = %file.file_name, status = %status.as_str(), "File finished");

            reports.push(FileReport {
                file_id: file.id,
                file_name: file.file_name,
                agent: agent.name.clone(),
                status,
                message,
            });
        }

        if canceled {
            warn!(agent = %agent.name, "Agent run canceled; execution not recorded");
        } else {
            self.catalog
                .mark_agent_executed(agent.id, Utc::now())
                .context("Failed to record agent execution")?;
        }
        run.cache.clear();

        Ok(reports)
    }

    fn prepare_map(
        &self,
        data_map: DataMap,
        lookups: &Arc<LookupCollection>,
    ) -> rowport_map::Result<PreparedMap> {
        let (schema, mappings) = match data_map.operation {
            MapOperation::Upsert => {
                let serializer =
                    MapSerializer::new(data_map.resource_path.as_str(), data_map.metadata.clone());
                let mappings = serializer.deserialize_value(&data_map.map)?;
                (serializer.schema().to_vec(), mappings)
            },
            MapOperation::DeleteByNaturalKey => {
                let serializer =
                    MapSerializer::for_natural_key(data_map.resource_path.as_str(), &data_map.metadata);
                let mappings = serializer.deserialize_value(&data_map.map)?;
                (serializer.schema().to_vec(), mappings)
            },
            MapOperation::DeleteById => (
                Vec::new(),
                DeleteByIdSerializer::new().deserialize_value(&data_map.map)?,
            ),
        };

        let endpoint = format!(
            "{}{}",
            self.publisher.api_url().trim_end_matches('/'),
            data_map.resource_path
        );

        Ok(PreparedMap {
            mapper: RowMapper::new(schema, mappings, Arc::clone(lookups)),
            endpoint,
            data_map,
        })
    }

    async fn process_file(
        &self,
        run: &AgentRun<'_>,
        map: &PreparedMap,
        file: &ImportFile,
        cancel: &CancellationToken,
    ) -> FileResponse {
        info!(file = %file.file_name, data_map = %map.data_map.name, "Processing file");

        match self.transform_file(run, map, file, cancel).await {
            Ok(FileFlow::Completed(outcomes)) => {
                let rows = outcomes.len();
                if let Err(e) = self.catalog.set_file_rows(file.id, rows) {
                    warn!(file = %file.file_name, error = %e, "Could not record row count");
                }
                FileResponse::tally(&outcomes).summarize(&map.data_map.name, rows, false)
            },
            Ok(FileFlow::Rejected(message)) => {
                error!(file = %file.file_name, data_map = %map.data_map.name, "{message}");
                FileResponse::rejected(message)
            },
            Err(e) => {
                error!(
                    file = %file.file_name,
                    data_map = %map.data_map.name,
                    error = %format!("{e:#}"),
                    "Error processing file"
                );
                FileResponse {
                    errors: 1,
                    ..Default::default()
                }
                .summarize(&map.data_map.name, file.rows.unwrap_or_default(), true)
            },
        }
    }

    async fn transform_file(
        &self,
        run: &AgentRun<'_>,
        map: &PreparedMap,
        file: &ImportFile,
        cancel: &CancellationToken,
    ) -> Result<FileFlow> {
        // The temporary copy is removed when `local` drops
        let local = self.store.download(file).await?;

        let mut source: Box<dyn TabularSource> = match &map.data_map.preprocessor {
            Some(spec) => {
                let bytes = ExternalPreprocessor::new(spec.clone()).run(&local).await?;
                Box::new(CsvSource::from_bytes(bytes))
            },
            None => Box::new(CsvSource::from_path(&local)?),
        };
        if let Some(processor) = &run.row_processor {
            source = Box::new(ProcessedSource::new(
                source,
                Arc::clone(processor),
                run.cache.clone(),
            ));
        }

        let rows = source.rows()?;
        if let Some(message) = header_problems(map, file, rows.headers()) {
            return Ok(FileFlow::Rejected(message));
        }

        let seen = Mutex::new(HashSet::new());
        let limit = self.options.row_concurrency.unwrap_or(usize::MAX).max(1);
        let outcomes: Vec<RowOutcome> = stream::iter(rows)
            .map(|row| self.process_row(run, map, file, row, &seen, cancel))
            .buffer_unordered(limit)
            .collect()
            .await;

        drop(local);
        Ok(FileFlow::Completed(outcomes))
    }

    async fn process_row(
        &self,
        run: &AgentRun<'_>,
        map: &PreparedMap,
        file: &ImportFile,
        row: rowport_common::Result<Row>,
        seen: &Mutex<HashSet<String>>,
        cancel: &CancellationToken,
    ) -> RowOutcome {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                error!(file = %file.file_name, error = %e, "Unreadable row");
                self.log.write(
                    self.record(run, map, file, IngestionResult::Error, LogLevel::Error)
                        .response(e.to_string()),
                );
                return RowOutcome::Error;
            },
        };

        let document = match map.data_map.operation {
            MapOperation::DeleteById => map.mapper.apply_delete_by_id(&row),
            MapOperation::Upsert | MapOperation::DeleteByNaturalKey => map.mapper.apply(&row),
        };
        let document = match document {
            Ok(document) => document,
            Err(e) => {
                error!(
                    file = %file.file_name,
                    data_map = %map.data_map.name,
                    row = row.number,
                    error = %e,
                    "Row could not be transformed"
                );
                self.log.write(
                    self.record(run, map, file, IngestionResult::Error, LogLevel::Error)
                        .row(row.number)
                        .response(e.to_string()),
                );
                return RowOutcome::Error;
            },
        };

        let body = document.to_string();
        let digest = payload_digest(&map.endpoint, &body);
        let first_time = seen
            .lock()
            .map(|mut seen| seen.insert(digest))
            .unwrap_or(true);
        if !first_time {
            debug!(file = %file.file_name, row = row.number, "Duplicate payload skipped");
            return RowOutcome::Duplicate;
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(file = %file.file_name, row = row.number, "Publish canceled");
                return RowOutcome::Error;
            },
            response = self.publish(map, &document, &body) => response,
        };

        let record = self.record(run, map, file, IngestionResult::Error, LogLevel::Error)
            .row(row.number)
            .endpoint(&map.endpoint)
            .data(&body);

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!(
                    endpoint = %map.endpoint,
                    row = row.number,
                    error = %e,
                    "Publish failed"
                );
                self.log.write(record.response(e.to_string()));
                return RowOutcome::Error;
            },
        };

        let outcome = classify(map.data_map.operation, &response);
        let record = record.status(response.status.as_u16());
        match outcome {
            RowOutcome::Error => {
                error!(
                    endpoint = %map.endpoint,
                    row = row.number,
                    status = response.status.as_u16(),
                    response = %response.body,
                    "Target returned unexpected HTTP status"
                );
                self.log.write(record.response(response.body));
            },
            _ => {
                let mut record = record;
                record.result = IngestionResult::Success;
                record.level = LogLevel::Info;
                self.log.write(record);
            },
        }
        outcome
    }

    async fn publish(
        &self,
        map: &PreparedMap,
        document: &Value,
        body: &str,
    ) -> rowport_common::Result<PublishResponse> {
        match map.data_map.operation {
            MapOperation::Upsert => self.publisher.post(&map.endpoint, body).await,
            MapOperation::DeleteByNaturalKey => {
                self.publisher
                    .post_then_delete_by_location(&map.endpoint, body)
                    .await
            },
            MapOperation::DeleteById => {
                let id = match document.get(rowport_map::serializer::ID_KEY) {
                    Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
                    _ => {
                        return Err(rowport_common::RowportError::validation(
                            "Row does not carry an Id value to delete",
                        ))
                    },
                };
                self.publisher.delete(&map.endpoint, &id).await
            },
        }
    }

    fn record(
        &self,
        run: &AgentRun<'_>,
        map: &PreparedMap,
        file: &ImportFile,
        result: IngestionResult,
        level: LogLevel,
    ) -> IngestionRecord {
        IngestionRecord::new(result, level, OPERATION_TRANSFORM)
            .endpoint(&map.endpoint)
            .file(&file.file_name)
            .agent(&run.agent.name)
            .connection(run.connection)
    }
}

/// A pending file and the passes applied to it so far
struct FileProgress {
    file: ImportFile,
    responses: Vec<FileResponse>,
    started: bool,
}

enum FileFlow {
    Completed(Vec<RowOutcome>),
    Rejected(String),
}

/// Header check of referenced columns and lookup tables
fn header_problems(map: &PreparedMap, file: &ImportFile, headers: &[String]) -> Option<String> {
    let mut problems = Vec::new();

    let missing_columns = map.mapper.missing_columns(headers);
    if !missing_columns.is_empty() {
        problems.push(format!(
            "File '{}' can not be processed using data map '{}', input file missing columns: {}.",
            file.file_name,
            map.data_map.name,
            missing_columns.join(", ")
        ));
    }

    let missing_lookups = map.mapper.missing_lookups();
    if !missing_lookups.is_empty() {
        problems.push(format!(
            "File '{}' can not be processed using data map '{}', missing lookups: {}.",
            file.file_name,
            map.data_map.name,
            missing_lookups.join(", ")
        ));
    }

    (!problems.is_empty()).then(|| problems.join("\n"))
}

/// Row outcome from the target's answer
pub fn classify(operation: MapOperation, response: &PublishResponse) -> RowOutcome {
    use reqwest::StatusCode;

    match (operation, response.status) {
        (MapOperation::Upsert, StatusCode::OK) => RowOutcome::Exist,
        (MapOperation::Upsert, StatusCode::CREATED) => RowOutcome::Success,
        (MapOperation::DeleteById | MapOperation::DeleteByNaturalKey, StatusCode::NO_CONTENT) => {
            RowOutcome::Success
        },
        _ => RowOutcome::Error,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_classify_upsert() {
        let ok = PublishResponse::new(StatusCode::OK, "");
        let created = PublishResponse::new(StatusCode::CREATED, "");
        let bad = PublishResponse::new(StatusCode::BAD_REQUEST, "{}");
        assert_eq!(classify(MapOperation::Upsert, &ok), RowOutcome::Exist);
        assert_eq!(classify(MapOperation::Upsert, &created), RowOutcome::Success);
        assert_eq!(classify(MapOperation::Upsert, &bad), RowOutcome::Error);
    }

    #[test]
    fn test_classify_deletes() {
        let gone = PublishResponse::new(StatusCode::NO_CONTENT, "");
        let missing = PublishResponse::new(StatusCode::NOT_FOUND, "");
        assert_eq!(classify(MapOperation::DeleteById, &gone), RowOutcome::Success);
        assert_eq!(classify(MapOperation::DeleteByNaturalKey, &gone), RowOutcome::Success);
        assert_eq!(classify(MapOperation::DeleteById, &missing), RowOutcome::Error);
    }

    #[test]
    fn test_summary_message() {
        let response = FileResponse::tally(&[
            RowOutcome::Success,
            RowOutcome::Success,
            RowOutcome::Exist,
            RowOutcome::Duplicate,
            RowOutcome::Error,
        ])
        .summarize("Students", 5, false);

        assert_eq!(
            response.message,
            "Using DataMap: Students, File has 5 rows, API calls processed:  Success: 2, Exists: 1, Error: 1, Duplicate: 1"
        );
    }

    #[test]
    fn test_summary_message_after_exception() {
        let response = FileResponse {
            errors: 1,
            ..Default::default()
        }
        .summarize("Students", 0, true);

        assert_eq!(
            response.message,
            "Using DataMap: Students, Exception logged during file processing, File has 0 rows, API calls processed:  Success: 0, Exists: 0, Error: 1, Duplicate: 0"
        );
    }
}
