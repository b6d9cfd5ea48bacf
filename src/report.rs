use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    NotStarted,
    InProgress,
    Completed,
    PartiallyCompleted,
    Skipped,
    Failed,
}

impl DocumentState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DocumentState::NotStarted | DocumentState::InProgress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub doc_id: String,
    pub state: DocumentState,
    pub page_count: Option<u32>,
    pub fallback: bool,
    pub structured_pages: u32,
    pub recognized_pages: u32,
    pub tables_written: u32,
    pub tables_skipped: u32,
    pub images_written: u32,
    pub images_skipped: u32,
    pub rasters_rendered: u32,
    pub rasters_reused: u32,
    pub errors: u32,
    pub output: Option<String>,
    pub output_bytes: u64,
}

impl DocumentReport {
    pub fn new(doc_id: &str) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            state: DocumentState::NotStarted,
            page_count: None,
            fallback: false,
            structured_pages: 0,
            recognized_pages: 0,
            tables_written: 0,
            tables_skipped: 0,
            images_written: 0,
            images_skipped: 0,
            rasters_rendered: 0,
            rasters_reused: 0,
            errors: 0,
            output: None,
            output_bytes: 0,
        }
    }

    pub fn with_state(doc_id: &str, state: DocumentState) -> Self {
        let mut r = Self::new(doc_id);
        r.state = state;
        r
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub job: String,
    pub config_hash: String,
    pub started: String,
    pub finished: String,
    pub processed: usize,
    pub partial: usize,
    pub skipped: usize,
    pub failed: usize,
    pub fallback: usize,
    pub error_records: usize,
    pub cancelled: bool,
    pub documents: Vec<DocumentReport>,
}

impl BatchSummary {
    pub fn tally(&mut self, report: DocumentReport) {
        match report.state {
            DocumentState::Completed => self.processed += 1,
            DocumentState::PartiallyCompleted => {
                self.processed += 1;
                self.partial += 1;
            }
            DocumentState::Skipped => self.skipped += 1,
            DocumentState::Failed | DocumentState::NotStarted | DocumentState::InProgress => {
                self.failed += 1
            }
        }
        if report.fallback {
            self.fallback += 1;
        }
        self.documents.push(report);
    }

    pub fn find(&self, doc_id: &str) -> Option<&DocumentReport> {
        self.documents.iter().find(|d| d.doc_id == doc_id)
    }
}
