use crate::{config::ErrorLogFormat, util::{ensure_parent, now_rfc3339}};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Corpus,
    Open,
    Table,
    Image,
    Text,
    FallbackOpen,
    Render,
    Recognition,
    SaveText,
    Structure,
    Document,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Corpus => "corpus",
            Stage::Open => "open",
            Stage::Table => "table",
            Stage::Image => "image",
            Stage::Text => "text",
            Stage::FallbackOpen => "fallback_open",
            Stage::Render => "render",
            Stage::Recognition => "recognition",
            Stage::SaveText => "save_text",
            Stage::Structure => "structure",
            Stage::Document => "document",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: String,
    pub doc_id: String,
    pub page: Option<u32>,
    pub stage: Stage,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(doc_id: &str, page: Option<u32>, stage: Stage, err: impl fmt::Display) -> Self {
        Self {
            timestamp: now_rfc3339(),
            doc_id: doc_id.to_string(),
            page,
            stage,
            message: format!("{err:#}"),
        }
    }

    pub fn page(doc_id: &str, page: u32, stage: Stage, err: impl fmt::Display) -> Self {
        Self::new(doc_id, Some(page), stage, err)
    }

    pub fn document(doc_id: &str, stage: Stage, err: impl fmt::Display) -> Self {
        Self::new(doc_id, None, stage, err)
    }

    /// One line, no trailing newline. Embedded line breaks are escaped.
    pub fn to_line(&self, format: ErrorLogFormat) -> String {
        match format {
            ErrorLogFormat::Json => serde_json::to_string(self).unwrap_or_else(|_| self.to_string()),
            ErrorLogFormat::Text => self.to_string(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] [{}] {}", self.timestamp, self.stage, self.doc_id)?;
        if let Some(page) = self.page {
            write!(f, " page {page}")?;
        }
        write!(f, ": {}", escape_newlines(&self.message))
    }
}

fn escape_newlines(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\r', "\\r").replace('\n', "\\n")
}

pub struct ErrorSink {
    out: Mutex<Box<dyn Write + Send>>,
    format: ErrorLogFormat,
    written: AtomicUsize,
}

impl ErrorSink {
    pub fn open(path: &Path, format: ErrorLogFormat) -> Result<Self> {
        ensure_parent(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open error log: {}", path.display()))?;
        Ok(Self::from_writer(Box::new(file), format))
    }

    fn from_writer(out: Box<dyn Write + Send>, format: ErrorLogFormat) -> Self {
        Self {
            out: Mutex::new(out),
            format,
            written: AtomicUsize::new(0),
        }
    }

    pub fn record(&self, rec: &ErrorRecord) {
        warn!(
            doc = %rec.doc_id,
            page = ?rec.page,
            stage = %rec.stage,
            "{}",
            rec.message
        );

        let mut line = rec.to_line(self.format);
        line.push('\n');

        // A poisoned lock only means another writer panicked mid-call; the
        // file handle itself is still usable.
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let res = out.write_all(line.as_bytes()).and_then(|_| out.flush());
        drop(out);

        match res {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => warn!("failed to append error record: {err}"),
        }
    }

    pub fn records_written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }
}
