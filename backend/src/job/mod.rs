//! Background jobs: one import or export run.
//!
//! A job is performed on a blocking thread with a [`CancellationToken`]
//! polled between batches and a [`JobLogger`] keyed by the run id. The
//! outcome is only ever one of [`JobStatus`]; details live in the log.

pub mod logs;

use crate::error::ProcessError;
use crate::mapping::{Automap, AutomapDictionary, AutomapOptions, FieldMapping};
use crate::processor::{ImportOptions, ImportSummary, ProcessState, Processor};
use crate::reader::{Reader, ReaderOptions, ReaderRegistry};
use crate::store::ResourceStore;
use crate::writer::{ExportConfig, Exporter, FormatterRegistry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use logs::{JobLogger, LogEntry, LogLevel};

// =============================================================================
// Cancellation
// =============================================================================

/// Shared stop flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop; the job notices at its next check.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Status
// =============================================================================

/// Final status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        }
    }
}

impl From<ProcessState> for JobStatus {
    fn from(state: ProcessState) -> Self {
        match state {
            ProcessState::Completed => JobStatus::Completed,
            ProcessState::Stopped => JobStatus::Stopped,
            _ => JobStatus::Failed,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of background work.
pub trait Job: Send {
    /// Job kind, for logs.
    fn kind(&self) -> &'static str;

    /// Run to completion, failure or a stop request.
    fn perform(&mut self, cancel: &CancellationToken, logger: &JobLogger) -> JobStatus;
}

// =============================================================================
// Import
// =============================================================================

/// Import of one source file into a store.
pub struct ImportJob {
    store: Arc<dyn ResourceStore>,
    source: PathBuf,
    format: Option<String>,
    reader_options: ReaderOptions,
    mapping: Option<FieldMapping>,
    options: ImportOptions,
    summary: Option<ImportSummary>,
}

impl ImportJob {
    /// Without a mapping, source fields are automapped with the built-in
    /// dictionary.
    pub fn new(store: Arc<dyn ResourceStore>, source: impl Into<PathBuf>, options: ImportOptions) -> Self {
        Self {
            store,
            source: source.into(),
            format: None,
            reader_options: ReaderOptions::default(),
            mapping: None,
            options,
            summary: None,
        }
    }

    /// Force a reader format instead of the file extension.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_reader_options(mut self, options: ReaderOptions) -> Self {
        self.reader_options = options;
        self
    }

    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Summary of the last run, when it got past validation.
    pub fn summary(&self) -> Option<&ImportSummary> {
        self.summary.as_ref()
    }

    fn open(&self) -> Result<Box<dyn Reader>, ProcessError> {
        let registry = ReaderRegistry::default();
        let reader = match self.format {
            Some(ref format) => registry.open(format, &self.source, &self.reader_options)?,
            None => registry.open_path(&self.source, &self.reader_options)?,
        };
        Ok(reader)
    }

    fn mapping_for(&self, fields: &[String], logger: &JobLogger) -> Result<FieldMapping, ProcessError> {
        if let Some(ref mapping) = self.mapping {
            return Ok(mapping.clone());
        }
        let vocabulary = self.store.vocabulary()?;
        let automap = Automap::new(&vocabulary, AutomapDictionary::builtin(), AutomapOptions::default())?;
        let mapping = FieldMapping::from_automap(&automap, fields);
        logger.info(
            "Automapped {mapped} of {total} fields",
            json!({ "mapped": mapping.fields.len(), "total": fields.len() }),
        );
        if !mapping.unmapped.is_empty() {
            logger.warning(
                "Unmapped fields ignored: {fields}",
                json!({ "fields": mapping.unmapped.join(", ") }),
            );
        }
        Ok(mapping)
    }

    fn run(&self, cancel: &CancellationToken, logger: &JobLogger) -> Result<ImportSummary, ProcessError> {
        let prepared = self.open().and_then(|reader| {
            let mapping = self.mapping_for(reader.fields(), logger)?;
            Ok((reader, mapping))
        });
        let (mut reader, mapping) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                logger.error("Import cannot start: {error}", json!({ "error": e.to_string() }));
                return Err(e);
            }
        };
        // From here on the processor logs its own failures.
        let mut processor = Processor::new(self.store.as_ref(), mapping, self.options.clone());
        processor.run(reader.as_mut(), cancel, logger)
    }
}

impl Job for ImportJob {
    fn kind(&self) -> &'static str {
        "import"
    }

    fn perform(&mut self, cancel: &CancellationToken, logger: &JobLogger) -> JobStatus {
        logger.info(
            "Import of {source}",
            json!({ "source": self.source.display().to_string() }),
        );
        match self.run(cancel, logger) {
            Ok(summary) => {
                let status = JobStatus::from(summary.state);
                self.summary = Some(summary);
                status
            }
            Err(e) => {
                tracing::error!(error = %e, "import job failed");
                JobStatus::Failed
            }
        }
    }
}

// =============================================================================
// Export
// =============================================================================

/// Fails writes once the token is cancelled.
struct CancellableWriter<'c, W: Write> {
    inner: W,
    cancel: &'c CancellationToken,
}

impl<W: Write> Write for CancellableWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Other, "export cancelled"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Export of a store selection to one file.
pub struct ExportJob {
    store: Arc<dyn ResourceStore>,
    config: ExportConfig,
    destination: PathBuf,
    written: usize,
    /// Set while the destination holds output of an unfinished run.
    partial: bool,
}

impl ExportJob {
    pub fn new(store: Arc<dyn ResourceStore>, config: ExportConfig, destination: impl Into<PathBuf>) -> Self {
        Self {
            store,
            config,
            destination: destination.into(),
            written: 0,
            partial: false,
        }
    }

    /// Resources written by the last run.
    pub fn written(&self) -> usize {
        self.written
    }

    fn remove_partial(&mut self) {
        if std::mem::take(&mut self.partial) {
            if let Err(e) = std::fs::remove_file(&self.destination) {
                tracing::warn!(path = %self.destination.display(), error = %e, "cannot remove partial export");
            }
        }
    }

    fn run(&mut self, cancel: &CancellationToken, logger: &JobLogger) -> Result<usize, ProcessError> {
        let registry = FormatterRegistry::default();
        let formatter = registry.get(&self.config.format)?;
        let exporter = Exporter::new(self.store.as_ref(), self.config.clone())?;
        exporter.ensure_valid()?;
        logger.info(
            "Export of {count} resources as {format}, {fields} fields",
            json!({
                "count": exporter.count(),
                "format": formatter.format(),
                "fields": exporter.fields().len(),
            }),
        );

        let file = File::create(&self.destination).map_err(crate::error::WriterError::from)?;
        self.partial = true;
        let mut out = CancellableWriter {
            inner: BufWriter::new(file),
            cancel,
        };
        let count = formatter.write(&exporter, &mut out)?;
        out.flush().map_err(crate::error::WriterError::from)?;
        self.partial = false;
        Ok(count)
    }
}

impl Job for ExportJob {
    fn kind(&self) -> &'static str {
        "export"
    }

    fn perform(&mut self, cancel: &CancellationToken, logger: &JobLogger) -> JobStatus {
        if cancel.is_cancelled() {
            logger.notice("Export stopped before start", json!({}));
            return JobStatus::Stopped;
        }
        match self.run(cancel, logger) {
            Ok(count) => {
                self.written = count;
                logger.notice(
                    "Export completed: {count} resources written to {destination}",
                    json!({ "count": count, "destination": self.destination.display().to_string() }),
                );
                JobStatus::Completed
            }
            Err(_) if cancel.is_cancelled() => {
                self.remove_partial();
                logger.notice("Export stopped, partial output removed", json!({}));
                JobStatus::Stopped
            }
            Err(e) => {
                self.remove_partial();
                logger.error("Export failed: {error}", json!({ "error": e.to_string() }));
                tracing::error!(error = %e, "export job failed");
                JobStatus::Failed
            }
        }
    }
}
