use crate::{
    corpus::{Corpus, Document},
    error_sink::{ErrorRecord, ErrorSink, Stage},
    report::{BatchSummary, DocumentReport, DocumentState},
    util::now_rfc3339,
};
use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// A unit of per-document work the orchestrator can resume and isolate.
pub trait DocumentJob: Sync {
    fn name(&self) -> &'static str;
    fn is_complete(&self, doc: &Document) -> bool;
    fn run_document(&self, doc: &Document) -> Result<DocumentReport>;
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct BatchOrchestrator<'a> {
    corpus: Corpus,
    sink: &'a ErrorSink,
    workers: usize,
    config_hash: String,
    cancel: CancelToken,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(corpus: Corpus, sink: &'a ErrorSink, workers: usize) -> Self {
        Self {
            corpus,
            sink,
            workers: workers.max(1),
            config_hash: String::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(&self, job: &dyn DocumentJob) -> Result<BatchSummary> {
        let started = now_rfc3339();
        let errors_before = self.sink.records_written();
        let listed = self.corpus.documents()?;

        info!(
            job = job.name(),
            corpus = %self.corpus.root().display(),
            workers = self.workers,
            "batch start"
        );

        let mut reports: Vec<DocumentReport> = if self.workers == 1 {
            listed
                .take_while(|_| !self.cancel.is_cancelled())
                .map(|entry| self.one(entry, job))
                .collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .thread_name(|i| format!("doc-worker-{i}"))
                .build()
                .context("building document worker pool")?;
            pool.install(|| {
                listed
                    .par_bridge()
                    .filter_map(|entry| {
                        if self.cancel.is_cancelled() {
                            return None;
                        }
                        Some(self.one(entry, job))
                    })
                    .collect()
            })
        };

        let mut summary = BatchSummary {
            job: job.name().to_string(),
            config_hash: self.config_hash.clone(),
            started,
            cancelled: self.cancel.is_cancelled(),
            ..Default::default()
        };
        reports.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        for report in reports {
            summary.tally(report);
        }
        summary.error_records = self.sink.records_written().saturating_sub(errors_before);
        summary.finished = now_rfc3339();

        info!(
            job = job.name(),
            processed = summary.processed,
            partial = summary.partial,
            skipped = summary.skipped,
            failed = summary.failed,
            fallback = summary.fallback,
            cancelled = summary.cancelled,
            "batch done"
        );
        Ok(summary)
    }

    fn one(&self, entry: Result<Document, ErrorRecord>, job: &dyn DocumentJob) -> DocumentReport {
        match entry {
            Err(rec) => {
                self.sink.record(&rec);
                let mut report = DocumentReport::with_state(&rec.doc_id, DocumentState::Failed);
                report.errors = 1;
                report
            }
            Ok(doc) => self.attempt(&doc, job),
        }
    }

    fn attempt(&self, doc: &Document, job: &dyn DocumentJob) -> DocumentReport {
        if job.is_complete(doc) {
            info!(doc = %doc.id, "already complete; skipping");
            return DocumentReport::with_state(&doc.id, DocumentState::Skipped);
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| job.run_document(doc)))
            .unwrap_or_else(|panic| Err(anyhow!("panicked: {}", panic_message(&*panic))));

        match outcome {
            Ok(report) => report,
            Err(err) => {
                self.sink
                    .record(&ErrorRecord::document(&doc.id, Stage::Document, err));
                let mut report = DocumentReport::with_state(&doc.id, DocumentState::Failed);
                report.errors = 1;
                report
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
