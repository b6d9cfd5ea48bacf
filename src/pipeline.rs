use crate::{
    artifacts::{ArtifactLayout, Publish},
    batch::DocumentJob,
    config::{Config, FallbackScope, PipelineMode},
    corpus::Document,
    engine::{LayoutBackend, Rasterizer, Recognizer},
    error_sink::{ErrorRecord, ErrorSink, Stage},
    extractor::{ExtractorSettings, PageExtractor, PageResult, TextVerdict},
    recognition::{RecognitionEngine, lines_to_text},
    renderer::FallbackRenderer,
    report::{DocumentReport, DocumentState},
    text::{ExtractedText, FragmentSource},
};
use anyhow::Result;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub mode: PipelineMode,
    pub fallback_scope: FallbackScope,
    pub page_delimiter: String,
    pub resume: bool,
    pub render_dpi: u32,
    pub extractor: ExtractorSettings,
}

impl PipelineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            mode: cfg.pipeline.mode,
            fallback_scope: cfg.pipeline.fallback_scope,
            page_delimiter: cfg.pipeline.page_delimiter.clone(),
            resume: cfg.resume.enabled,
            render_dpi: cfg.render.dpi,
            extractor: ExtractorSettings {
                min_text_chars: cfg.extraction.min_text_chars,
                image_dpi: cfg.extraction.image_dpi,
                table_header: cfg.extraction.table_header,
            },
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Clone, Copy)]
pub struct Backends<'a> {
    pub layout: &'a dyn LayoutBackend,
    pub raster: &'a dyn Rasterizer,
    pub recognizer: &'a dyn Recognizer,
}

pub struct DocumentPipeline<'a> {
    backends: Backends<'a>,
    artifacts: &'a ArtifactLayout,
    sink: &'a ErrorSink,
    settings: PipelineSettings,
}

struct DocRun<'s> {
    doc_id: String,
    sink: &'s ErrorSink,
    state: DocumentState,
    text: ExtractedText,
    fallback: bool,
    report: DocumentReport,
}

impl<'s> DocRun<'s> {
    fn new(doc: &Document, sink: &'s ErrorSink) -> Self {
        Self {
            doc_id: doc.id.clone(),
            sink,
            state: DocumentState::NotStarted,
            text: ExtractedText::new(),
            fallback: false,
            report: DocumentReport::new(&doc.id),
        }
    }

    fn transition(&mut self, next: DocumentState) {
        debug!(doc = %self.doc_id, from = ?self.state, to = ?next, "state");
        self.state = next;
    }

    fn error(&mut self, rec: ErrorRecord) {
        self.sink.record(&rec);
        self.report.errors += 1;
    }

    fn raise_fallback(&mut self) {
        self.fallback = true;
    }

    fn finish(mut self, state: DocumentState) -> DocumentReport {
        debug_assert!(state.is_terminal());
        self.transition(state);
        self.report.state = state;
        self.report.fallback = self.fallback;
        self.report.structured_pages = self.text.count(FragmentSource::Structured) as u32;
        self.report.recognized_pages = self.text.count(FragmentSource::Recognized) as u32;
        self.report
    }
}

impl<'a> DocumentPipeline<'a> {
    pub fn new(
        backends: Backends<'a>,
        artifacts: &'a ArtifactLayout,
        sink: &'a ErrorSink,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            backends,
            artifacts,
            sink,
            settings,
        }
    }

    pub fn is_completed(&self, doc: &Document) -> bool {
        self.settings.resume && self.artifacts.text_done(&doc.id)
    }

    pub fn run(&self, doc: &Document) -> DocumentReport {
        if self.is_completed(doc) {
            debug!(doc = %doc.id, "text artifact present; skipping");
            return DocumentReport::with_state(&doc.id, DocumentState::Skipped);
        }
        self.process(doc)
    }

    pub fn process(&self, doc: &Document) -> DocumentReport {
        let mut run = DocRun::new(doc, self.sink);
        run.transition(DocumentState::InProgress);
        info!(doc = %doc.id, mode = ?self.settings.mode, "processing");

        let page_count = match self.backends.layout.open(&doc.path) {
            Ok(n) => Some(n),
            Err(err) => {
                run.error(ErrorRecord::document(&doc.id, Stage::Open, err));
                if self.settings.mode == PipelineMode::Hybrid {
                    run.raise_fallback();
                }
                None
            }
        };
        run.report.page_count = page_count;

        if let Some(pages) = page_count {
            self.structured_pass(doc, pages, &mut run);
        }

        match self.settings.mode {
            PipelineMode::StructuredOnly => {
                if page_count.is_none() {
                    // Leave no marker so the next run retries the document.
                    return run.finish(DocumentState::Failed);
                }
            }
            PipelineMode::Hybrid => {
                if run.fallback || run.text.is_empty() {
                    run.raise_fallback();
                    self.fallback_pass(doc, page_count, &mut run);
                }
            }
        }

        let text = run.text.render(&self.settings.page_delimiter);
        match self.artifacts.write_text(&doc.id, &text) {
            Ok(path) => {
                run.report.output = Some(path.display().to_string());
                run.report.output_bytes = text.len() as u64;
                let state = if run.report.errors == 0 {
                    DocumentState::Completed
                } else {
                    DocumentState::PartiallyCompleted
                };
                info!(
                    doc = %doc.id,
                    ?state,
                    fallback = run.fallback,
                    bytes = text.len(),
                    "text saved"
                );
                run.finish(state)
            }
            Err(err) => {
                run.error(ErrorRecord::document(&doc.id, Stage::SaveText, err));
                run.finish(DocumentState::Failed)
            }
        }
    }

    fn structured_pass(&self, doc: &Document, pages: u32, run: &mut DocRun<'_>) {
        let extractor = PageExtractor::new(
            self.backends.layout,
            self.artifacts,
            self.settings.extractor,
        );
        for page in 1..=pages {
            let result = extractor.extract(doc, page);
            self.absorb_page(result, run);
        }
    }

    fn absorb_page(&self, result: PageResult, run: &mut DocRun<'_>) {
        for publish in &result.tables {
            match publish {
                Publish::Written => run.report.tables_written += 1,
                Publish::Skipped => run.report.tables_skipped += 1,
            }
        }
        for publish in &result.images {
            match publish {
                Publish::Written => run.report.images_written += 1,
                Publish::Skipped => run.report.images_skipped += 1,
            }
        }
        for rec in result.errors {
            run.error(rec);
        }

        match self.settings.mode {
            PipelineMode::Hybrid => {
                if result.verdict == TextVerdict::Sufficient {
                    if let Some(text) = result.text {
                        run.text.insert(result.page, FragmentSource::Structured, text);
                    }
                }
                if result.verdict.needs_fallback() {
                    run.raise_fallback();
                }
            }
            PipelineMode::StructuredOnly => {
                if let Some(text) = result.text.filter(|t| !t.is_empty()) {
                    run.text.insert(result.page, FragmentSource::Structured, text);
                }
            }
        }
    }

    fn fallback_pass(&self, doc: &Document, known_pages: Option<u32>, run: &mut DocRun<'_>) {
        let renderer = FallbackRenderer::new(
            self.backends.raster,
            self.artifacts,
            self.settings.render_dpi,
        );
        let recognition = RecognitionEngine::new(self.backends.recognizer);

        let pages = match known_pages {
            Some(n) => n,
            None => match renderer.page_count(doc) {
                Ok(n) => n,
                Err(rec) => {
                    run.error(rec);
                    return;
                }
            },
        };
        info!(doc = %doc.id, pages, scope = ?self.settings.fallback_scope, "fallback");

        for page in 1..=pages {
            if self.settings.fallback_scope == FallbackScope::MissingPages && run.text.has_page(page)
            {
                continue;
            }

            let image = match renderer.render(doc, page) {
                Ok(image) => image,
                Err(rec) => {
                    run.error(rec);
                    continue;
                }
            };
            if image.rendered {
                run.report.rasters_rendered += 1;
            } else {
                run.report.rasters_reused += 1;
            }

            let lines = match recognition.recognize(doc, &image) {
                Ok(lines) => lines,
                Err(rec) => {
                    run.error(rec);
                    continue;
                }
            };
            let text = lines_to_text(&lines);
            if text.trim().is_empty() {
                debug!(doc = %doc.id, page, "recognition returned no text");
                continue;
            }

            match self.settings.fallback_scope {
                FallbackScope::MissingPages => {
                    run.text.insert(page, FragmentSource::Recognized, text);
                }
                FallbackScope::AllPages => {
                    run.text.replace(page, FragmentSource::Recognized, text);
                }
            }
        }
    }
}

impl DocumentJob for DocumentPipeline<'_> {
    fn name(&self) -> &'static str {
        match self.settings.mode {
            PipelineMode::Hybrid => "hybrid",
            PipelineMode::StructuredOnly => "structured_only",
        }
    }

    fn is_complete(&self, doc: &Document) -> bool {
        self.is_completed(doc)
    }

    fn run_document(&self, doc: &Document) -> Result<DocumentReport> {
        Ok(self.process(doc))
    }
}
