//! Append-only record of per-row publishing results

use chrono::{DateTime, Utc};
use rowport_common::logging::{LogLevel, INGESTION_TARGET};
use rowport_common::IngestionResult;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

/// Process name stamped on every record
pub const PROCESS_NAME: &str = "rowport.transform-load";

/// Operation of a row transform/publish
pub const OPERATION_TRANSFORM: &str = "TransformingData";

/// Operation of a bootstrap publish
pub const OPERATION_BOOTSTRAP: &str = "PostBootstrapData";

/// One ingestion log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub date: DateTime<Utc>,
    pub result: IngestionResult,
    pub level: LogLevel,
    pub row_number: Option<String>,
    pub endpoint_url: Option<String>,
    pub http_status: Option<u16>,
    pub data: Option<String>,
    pub response: Option<String>,
    pub operation: String,
    pub process: String,
    pub file_name: Option<String>,
    pub agent_name: Option<String>,
    pub connection_name: Option<String>,
}

impl IngestionRecord {
    pub fn new(result: IngestionResult, level: LogLevel, operation: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            result,
            level,
            row_number: None,
            endpoint_url: None,
            http_status: None,
            data: None,
            response: None,
            operation: operation.into(),
            process: PROCESS_NAME.to_string(),
            file_name: None,
            agent_name: None,
            connection_name: None,
        }
    }

    pub fn row(mut self, number: impl ToString) -> Self {
        self.row_number = Some(number.to_string());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn file(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn agent(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    pub fn connection(mut self, name: impl Into<String>) -> Self {
        self.connection_name = Some(name.into());
        self
    }
}

/// Sink for ingestion records
pub trait IngestionLog: Send + Sync {
    /// Minimum level recorded
    fn level(&self) -> LogLevel;

    fn append(&self, record: IngestionRecord);

    /// Append unless the record is below [`level`](Self::level)
    fn write(&self, record: IngestionRecord) {
        if self.level().admits(record.level) {
            self.append(record);
        }
    }
}

/// Writes records as structured `tracing` events under the `ingestion` target
#[derive(Debug, Clone, Copy)]
pub struct TracingIngestionLog {
    level: LogLevel,
}

impl TracingIngestionLog {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }
}

impl IngestionLog for TracingIngestionLog {
    fn level(&self) -> LogLevel {
        self.level
    }

    fn append(&self, record: IngestionRecord) {
        let row = record.row_number.as_deref().unwrap_or_default();
        let endpoint = record.endpoint_url.as_deref().unwrap_or_default();
        let file = record.file_name.as_deref().unwrap_or_default();
        let agent = record.agent_name.as_deref().unwrap_or_default();
        let status = record.http_status.unwrap_or_default();
        let response = record.response.as_deref().unwrap_or_default();

        macro_rules! emit {
            ($mac:ident) => {
                $mac!(
                    target: INGESTION_TARGET,
                    result = ?record.result,
                    operation = %record.operation,
                    row,
                    endpoint,
                    file,
                    agent,
                    status,
                    response,
                    "Ingestion record"
                )
            };
        }

        match record.level {
            LogLevel::Trace => emit!(trace),
            LogLevel::Debug => emit!(debug),
            LogLevel::Info => emit!(info),
            LogLevel::Warn => emit!(warn),
            LogLevel::Error => emit!(error),
        }
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryIngestionLog {
    level: LogLevel,
    records: Mutex<Vec<IngestionRecord>>,
}

impl MemoryIngestionLog {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<IngestionRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl IngestionLog for MemoryIngestionLog {
    fn level(&self) -> LogLevel {
        self.level
    }

    fn append(&self, record: IngestionRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_records_below_level_are_dropped() {
        let log = MemoryIngestionLog::new(LogLevel::Warn);
        log.write(IngestionRecord::new(
            IngestionResult::Success,
            LogLevel::Info,
            OPERATION_TRANSFORM,
        ));
        log.write(
            IngestionRecord::new(IngestionResult::Error, LogLevel::Error, OPERATION_TRANSFORM)
                .row(4)
                .endpoint("http://localhost/students")
                .status(400),
        );

        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].row_number.as_deref(), Some("4"));
        assert_eq!(records[0].http_status, Some(400));
        assert_eq!(records[0].process, PROCESS_NAME);
    }

    #[test]
    fn test_tracing_log_accepts_every_level() {
        let log = TracingIngestionLog::new(LogLevel::Trace);
        for level in [LogLevel::Trace, LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            log.write(IngestionRecord::new(IngestionResult::Success, level, OPERATION_BOOTSTRAP));
        }
    }
}
