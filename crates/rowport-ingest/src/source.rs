//! Tabular sources, file preprocessors and row processors
//!
//! A [`TabularSource`] yields rows lazily and can be consumed once. A data
//! map may route the raw file through an [`ExternalPreprocessor`] first,
//! and an agent may rewrite each row with a registered [`RowProcessor`].

use rowport_common::{Result, RowportError};
use rowport_map::Row;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Lazily produced rows of one source
pub type RowIter = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// Header line of a source plus its remaining rows
///
/// The header is known before any record is read, so a file with no data
/// rows or an unreadable first record still exposes its columns.
pub struct Rows {
    headers: Arc<[String]>,
    iter: RowIter,
}

impl Rows {
    pub fn new(headers: Arc<[String]>, iter: RowIter) -> Self {
        Self { headers, iter }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Iterator for Rows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// Finite, non-restartable sequence of rows
pub trait TabularSource: Send {
    /// Consume the source; resources are released when the iterator drops
    fn rows(self: Box<Self>) -> Result<Rows>;
}

fn csv_error(err: csv::Error) -> RowportError {
    RowportError::Parse(format!("CSV: {err}"))
}

/// CSV with a header line
pub struct CsvSource {
    reader: csv::Reader<Box<dyn Read + Send>>,
}

impl CsvSource {
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        let reader: Box<dyn Read + Send> = Box::new(reader);
        Self {
            reader: csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_reader(reader),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::from_reader(file))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::from_reader(std::io::Cursor::new(bytes))
    }
}

impl TabularSource for CsvSource {
    fn rows(self: Box<Self>) -> Result<Rows> {
        let mut reader = self.reader;
        let headers: Arc<[String]> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect::<Vec<_>>()
            .into();

        let row_headers = Arc::clone(&headers);
        let rows = reader.into_records().enumerate().map(move |(idx, record)| {
            let record = record.map_err(csv_error)?;
            let values = record.iter().map(str::to_string).collect();
            Ok(Row::new(idx + 1, Arc::clone(&row_headers), values))
        });
        Ok(Rows::new(headers, Box::new(rows)))
    }
}

/// Key/value scratch space shared by row processors during one agent's run
///
/// The pipeline creates one per agent and clears it when the agent finishes.
#[derive(Debug, Clone, Default)]
pub struct ScriptCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.into(), value.into());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Rewrites one row before it is mapped
pub trait RowProcessor: Send + Sync {
    fn process(&self, row: Row, cache: &ScriptCache) -> Result<Row>;
}

/// Trims surrounding whitespace from every cell
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimProcessor;

impl RowProcessor for TrimProcessor {
    fn process(&self, row: Row, _cache: &ScriptCache) -> Result<Row> {
        let values = row.values().iter().map(|v| v.trim().to_string()).collect();
        Ok(Row::new(row.number, row.headers(), values))
    }
}

/// Fills blank cells with the last non-blank value seen in the same column
///
/// State lives in the [`ScriptCache`], so it carries across the files of one
/// agent run.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillDownProcessor;

impl RowProcessor for FillDownProcessor {
    fn process(&self, row: Row, cache: &ScriptCache) -> Result<Row> {
        let values = row
            .iter()
            .map(|(column, value)| {
                let key = format!("fill-down:{column}");
                if value.trim().is_empty() {
                    cache.get(&key).unwrap_or_default()
                } else {
                    cache.insert(key, value);
                    value.to_string()
                }
            })
            .collect();
        Ok(Row::new(row.number, row.headers(), values))
    }
}

/// Row processors by name
#[derive(Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn RowProcessor>>,
}

impl ProcessorRegistry {
    /// Empty registry
    pub fn empty() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, processor: Arc<dyn RowProcessor>) {
        self.processors.insert(name.into(), processor);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn RowProcessor>> {
        self.processors
            .get(name)
            .cloned()
            .ok_or_else(|| RowportError::not_found(format!("row processor '{name}'")))
    }
}

impl Default for ProcessorRegistry {
    /// Built-ins: `trim` and `fill-down`
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("trim", Arc::new(TrimProcessor));
        registry.register("fill-down", Arc::new(FillDownProcessor));
        registry
    }
}

/// A source whose rows pass through a [`RowProcessor`]
///
/// The processor rewrites cell values; the header line is the inner source's.
pub struct ProcessedSource {
    inner: Box<dyn TabularSource>,
    processor: Arc<dyn RowProcessor>,
    cache: ScriptCache,
}

impl ProcessedSource {
    pub fn new(
        inner: Box<dyn TabularSource>,
        processor: Arc<dyn RowProcessor>,
        cache: ScriptCache,
    ) -> Self {
        Self {
            inner,
            processor,
            cache,
        }
    }
}

impl TabularSource for ProcessedSource {
    fn rows(self: Box<Self>) -> Result<Rows> {
        let rows = self.inner.rows()?;
        let headers: Arc<[String]> = rows.headers().into();
        let processor = self.processor;
        let cache = self.cache;
        Ok(Rows::new(
            headers,
            Box::new(rows.map(move |row| row.and_then(|row| processor.process(row, &cache)))),
        ))
    }
}

/// External program that turns a raw upload into CSV
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessorSpec {
    pub name: String,
    pub executable: PathBuf,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Runs a [`PreprocessorSpec`]: file on stdin, CSV on stdout
#[derive(Debug, Clone)]
pub struct ExternalPreprocessor {
    spec: PreprocessorSpec,
}

impl ExternalPreprocessor {
    pub fn new(spec: PreprocessorSpec) -> Self {
        Self { spec }
    }

    pub async fn run(&self, input: &Path) -> Result<Vec<u8>> {
        let content = tokio::fs::read(input).await?;
        debug!(
            preprocessor = %self.spec.name,
            input = %input.display(),
            bytes = content.len(),
            "Running preprocessor"
        );

        let mut child = Command::new(&self.spec.executable)
            .args(&self.spec.arguments)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RowportError::Preprocess(format!(
                    "cannot start '{}' ({}): {e}",
                    self.spec.name,
                    self.spec.executable.display()
                ))
            })?;

        let stdin = child.stdin.take();
        let feeder = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&content).await?;
            }
            Ok::<_, std::io::Error>(())
        });

        let output = child.wait_with_output().await?;

        match feeder.await {
            Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
            Err(e) => return Err(RowportError::Preprocess(e.to_string())),
            _ => {},
        }

        if !output.status.success() {
            return Err(RowportError::Preprocess(format!(
                "'{}' exited with {}: {}",
                self.spec.name,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(output.stdout)
    }
}
