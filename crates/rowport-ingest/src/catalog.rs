//! Catalog of agents, data maps, files and bootstrap payloads
//!
//! The catalog is the configuration store the pipeline reads from and
//! writes status back to. [`JsonCatalog`] keeps a whole catalog document in
//! memory and can persist it to disk.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use rowport_common::{FileStatus, Result, RowportError};
use rowport_map::{LookupEntry, SchemaNode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

use crate::source::PreprocessorSpec;

/// A weekly slot: `day` counts from Sunday (0) to Saturday (6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentSchedule {
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl AgentSchedule {
    pub fn new(day: u32, hour: u32, minute: u32) -> Self {
        Self { day, hour, minute }
    }

    /// This week's occurrence of the slot, weeks starting on Sunday
    fn occurrence_in_week_of(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.weekday().num_days_from_sunday() as i64;
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0)?;
        let date = now.date_naive() - Duration::days(today - self.day as i64);
        Some(date.and_time(time).and_utc())
    }
}

/// Link from an agent to one of its data maps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMapLink {
    pub data_map_id: i64,
    pub processing_order: i32,
}

/// Link from an agent to a bootstrap payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapLink {
    pub bootstrap_id: i64,
    pub processing_order: i32,
}

/// A configured source of files for one target connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub connection: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub run_order: Option<i32>,
    /// Name of a registered row processor applied to every row
    #[serde(default)]
    pub row_processor: Option<String>,
    #[serde(default)]
    pub schedules: Vec<AgentSchedule>,
    #[serde(default)]
    pub last_executed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data_maps: Vec<DataMapLink>,
    #[serde(default)]
    pub bootstrap: Vec<BootstrapLink>,
}

fn default_true() -> bool {
    true
}

impl Agent {
    /// Enabled, not archived and bound to `connection`
    pub fn is_active_for(&self, connection: &str) -> bool {
        self.enabled && !self.archived && self.connection == connection
    }

    /// Sort key: explicit run orders ascending, unordered agents last, then id
    pub fn run_order_key(&self) -> (bool, Option<i32>, i64) {
        (self.run_order.is_none(), self.run_order, self.id)
    }

    /// Whether a weekly slot has come due since the last execution
    pub fn should_execute_on_schedule(&self, now: DateTime<Utc>) -> bool {
        let mut schedules = self.schedules.clone();
        schedules.sort();

        schedules.iter().any(|schedule| {
            let Some(occurrence) = schedule.occurrence_in_week_of(now) else {
                return false;
            };
            occurrence <= now && self.last_executed.is_none_or(|last| occurrence > last)
        })
    }
}

/// What a data map does with each mapped row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapOperation {
    /// POST the mapped document
    #[default]
    Upsert,
    /// DELETE `{endpoint}/{id}` with the id read from one column
    DeleteById,
    /// POST the key document, then DELETE the created location
    DeleteByNaturalKey,
}

/// A persisted wire map bound to a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataMap {
    pub id: i64,
    pub name: String,
    pub resource_path: String,
    /// Resource schema the map was authored against
    pub metadata: Vec<SchemaNode>,
    pub map: Value,
    #[serde(default)]
    pub operation: MapOperation,
    #[serde(default)]
    pub preprocessor: Option<PreprocessorSpec>,
}

/// An uploaded file waiting for, or done with, ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportFile {
    pub id: i64,
    pub agent_id: i64,
    pub file_name: String,
    /// Store-relative location of the content
    pub url: String,
    pub status: FileStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub rows: Option<usize>,
    #[serde(default)]
    pub update_date: Option<DateTime<Utc>>,
}

/// When a bootstrap payload last reached a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapStamp {
    pub connection: String,
    pub processed_date: DateTime<Utc>,
}

/// Literal seed data published before regular ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapData {
    pub id: i64,
    pub name: String,
    pub resource_path: String,
    pub metadata: Vec<SchemaNode>,
    pub data: Value,
    #[serde(default)]
    pub update_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed: Vec<BootstrapStamp>,
}

impl BootstrapData {
    /// Never sent to `connection`, or changed since it was
    pub fn needs_processing_for(&self, connection: &str) -> bool {
        match self.processed.iter().find(|p| p.connection == connection) {
            None => true,
            Some(stamp) => self
                .update_date
                .is_some_and(|updated| updated > stamp.processed_date),
        }
    }
}

/// Current schema of one resource at a target connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub connection: String,
    pub path: String,
    pub metadata: Vec<SchemaNode>,
}

/// Everything the catalog holds, as stored on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub data_maps: Vec<DataMap>,
    #[serde(default)]
    pub files: Vec<ImportFile>,
    #[serde(default)]
    pub lookups: Vec<LookupEntry>,
    #[serde(default)]
    pub bootstrap_data: Vec<BootstrapData>,
    #[serde(default)]
    pub resources: Vec<ResourceSchema>,
}

/// Configuration store read and updated by the pipeline
pub trait Catalog: Send + Sync {
    fn agents(&self) -> Result<Vec<Agent>>;

    fn data_map(&self, id: i64) -> Result<DataMap>;

    fn files_for_agent(&self, agent_id: i64) -> Result<Vec<ImportFile>>;

    fn lookups(&self) -> Result<Vec<LookupEntry>>;

    fn bootstrap_data(&self) -> Result<Vec<BootstrapData>>;

    /// The target's current schema for `path`, if known
    fn resource_schema(&self, connection: &str, path: &str) -> Result<Option<Vec<SchemaNode>>>;

    fn update_file_status(
        &self,
        file_id: i64,
        status: FileStatus,
        message: Option<String>,
    ) -> Result<()>;

    fn set_file_rows(&self, file_id: i64, rows: usize) -> Result<()>;

    fn mark_agent_executed(&self, agent_id: i64, at: DateTime<Utc>) -> Result<()>;

    fn mark_bootstrap_processed(
        &self,
        bootstrap_id: i64,
        connection: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// In-memory catalog backed by a JSON document
#[derive(Debug, Default)]
pub struct JsonCatalog {
    document: RwLock<CatalogDocument>,
    path: Option<PathBuf>,
}

fn poisoned<T>(_: T) -> RowportError {
    RowportError::config("catalog lock poisoned")
}

impl JsonCatalog {
    pub fn new(document: CatalogDocument) -> Self {
        Self {
            document: RwLock::new(document),
            path: None,
        }
    }

    /// Load a catalog file; [`save`](Self::save) writes back to the same path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let document: CatalogDocument = serde_json::from_str(&text)?;
        debug!(
            path = %path.display(),
            agents = document.agents.len(),
            files = document.files.len(),
            "Loaded catalog"
        );

        Ok(Self {
            document: RwLock::new(document),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Err(RowportError::config("catalog was not loaded from a file"));
        };
        let text = serde_json::to_string_pretty(&*self.document.read().map_err(poisoned)?)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> Result<CatalogDocument> {
        Ok(self.document.read().map_err(poisoned)?.clone())
    }

    fn with_file<F>(&self, file_id: i64, update: F) -> Result<()>
    where
        F: FnOnce(&mut ImportFile),
    {
        let mut document = self.document.write().map_err(poisoned)?;
        let file = document
            .files
            .iter_mut()
            .find(|f| f.id == file_id)
            .ok_or_else(|| RowportError::not_found(format!("file {file_id}")))?;
        update(file);
        Ok(())
    }
}

impl Catalog for JsonCatalog {
    fn agents(&self) -> Result<Vec<Agent>> {
        Ok(self.document.read().map_err(poisoned)?.agents.clone())
    }

    fn data_map(&self, id: i64) -> Result<DataMap> {
        self.document
            .read()
            .map_err(poisoned)?
            .data_maps
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| RowportError::not_found(format!("data map {id}")))
    }

    fn files_for_agent(&self, agent_id: i64) -> Result<Vec<ImportFile>> {
        Ok(self
            .document
            .read()
            .map_err(poisoned)?
            .files
            .iter()
            .filter(|f| f.agent_id == agent_id)
            .cloned()
            .collect())
    }

    fn lookups(&self) -> Result<Vec<LookupEntry>> {
        Ok(self.document.read().map_err(poisoned)?.lookups.clone())
    }

    fn bootstrap_data(&self) -> Result<Vec<BootstrapData>> {
        Ok(self.document.read().map_err(poisoned)?.bootstrap_data.clone())
    }

    fn resource_schema(&self, connection: &str, path: &str) -> Result<Option<Vec<SchemaNode>>> {
        Ok(self
            .document
            .read()
            .map_err(poisoned)?
            .resources
            .iter()
            .find(|r| r.connection == connection && r.path == path)
            .map(|r| r.metadata.clone()))
    }

    fn update_file_status(
        &self,
        file_id: i64,
        status: FileStatus,
        message: Option<String>,
    ) -> Result<()> {
        self.with_file(file_id, |file| {
            file.status = status;
            file.update_date = Some(Utc::now());
            if message.is_some() {
                file.message = message;
            }
        })
    }

    fn set_file_rows(&self, file_id: i64, rows: usize) -> Result<()> {
        self.with_file(file_id, |file| file.rows = Some(rows))
    }

    fn mark_agent_executed(&self, agent_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut document = self.document.write().map_err(poisoned)?;
        let agent = document
            .agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| RowportError::not_found(format!("agent {agent_id}")))?;
        agent.last_executed = Some(at);
        Ok(())
    }

    fn mark_bootstrap_processed(
        &self,
        bootstrap_id: i64,
        connection: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut document = self.document.write().map_err(poisoned)?;
        let payload = document
            .bootstrap_data
            .iter_mut()
            .find(|b| b.id == bootstrap_id)
            .ok_or_else(|| RowportError::not_found(format!("bootstrap data {bootstrap_id}")))?;

        match payload.processed.iter_mut().find(|p| p.connection == connection) {
            Some(stamp) => stamp.processed_date = at,
            None => payload.processed.push(BootstrapStamp {
                connection: connection.to_string(),
                processed_date: at,
            }),
        }
        Ok(())
    }
}
