//! Structured job logs.
//!
//! Each run owns a [`JobLogger`] keyed by a run id. Entries carry a message
//! template with `{name}` placeholders and the parameters to fill them, so
//! they can be stored, re-rendered or translated later. Every entry is:
//!
//! - kept in memory for [`JobLogger::entries`]
//! - broadcast to live subscribers over a tokio channel
//! - forwarded to `tracing`

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("valid placeholder regex"));

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Run this entry belongs to.
    pub run_id: Uuid,
    /// Log level
    pub level: LogLevel,
    /// Message template with `{name}` placeholders.
    pub template: String,
    /// Placeholder values.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Rendered message.
    pub message: String,
    /// Source row, for row-level entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

/// Fill `{name}` placeholders; unknown names are left as they are.
pub fn render(template: &str, params: &Map<String, Value>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| match params.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn into_params(params: Value) -> Map<String, Value> {
    match params {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Log sink of one run.
pub struct JobLogger {
    run_id: Uuid,
    entries: Mutex<Vec<LogEntry>>,
    sender: broadcast::Sender<LogEntry>,
}

impl JobLogger {
    /// Logger for a new run.
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4())
    }

    pub fn with_run_id(run_id: Uuid) -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            run_id,
            entries: Mutex::new(Vec::new()),
            sender,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Record an entry.
    ///
    /// `params` should be a JSON object; anything else is ignored.
    pub fn log(&self, level: LogLevel, template: &str, params: Value) {
        self.push(level, template, into_params(params), None);
    }

    /// Record an entry about one source row.
    pub fn log_row(&self, row: usize, level: LogLevel, template: &str, params: Value) {
        self.push(level, template, into_params(params), Some(row));
    }

    pub fn info(&self, template: &str, params: Value) {
        self.log(LogLevel::Info, template, params);
    }

    pub fn notice(&self, template: &str, params: Value) {
        self.log(LogLevel::Notice, template, params);
    }

    pub fn warning(&self, template: &str, params: Value) {
        self.log(LogLevel::Warning, template, params);
    }

    pub fn error(&self, template: &str, params: Value) {
        self.log(LogLevel::Error, template, params);
    }

    fn push(&self, level: LogLevel, template: &str, params: Map<String, Value>, row: Option<usize>) {
        let entry = LogEntry {
            run_id: self.run_id,
            level,
            template: template.to_string(),
            message: render(template, &params),
            params,
            row,
            timestamp: Utc::now(),
        };

        let run_id = self.run_id.to_string();
        match level {
            LogLevel::Debug => tracing::debug!(run_id, ?row, "{}", entry.message),
            LogLevel::Info | LogLevel::Notice => {
                tracing::info!(run_id, ?row, "{}", entry.message)
            }
            LogLevel::Warning => tracing::warn!(run_id, ?row, "{}", entry.message),
            LogLevel::Error => tracing::error!(run_id, ?row, "{}", entry.message),
        }

        // Broadcast to live subscribers (ignore if none)
        let _ = self.sender.send(entry.clone());
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Get a receiver for live entries
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    /// All entries recorded so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries at or above a level.
    pub fn entries_at_least(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.level >= level)
            .collect()
    }

    /// Number of entries per level.
    pub fn counts(&self) -> BTreeMap<LogLevel, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.lock().unwrap_or_else(PoisonError::into_inner).iter() {
            *counts.entry(entry.level).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for JobLogger {
    fn default() -> Self {
        Self::new()
    }
}
