#![allow(dead_code)]

use anyhow::{Result, anyhow, bail};
use hybrid_extract::{
    artifacts::ArtifactLayout,
    batch::BatchOrchestrator,
    config::ErrorLogFormat,
    corpus::{Corpus, Document},
    engine::{ImageRegion, LayoutBackend, Rasterizer, RecognizedLine, Recognizer, TableGrid},
    error_sink::ErrorSink,
    pipeline::{Backends, DocumentPipeline, PipelineSettings},
    report::{BatchSummary, DocumentReport},
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Fixture documents are JSON files describing each page:
/// `{"pages": [{"text": "...", "tables": [[["a"]]], "images": 1, "ocr": ["line"]}]}`.
/// Flags `text_error`, `table_error`, `image_error`, `render_error`,
/// `ocr_error` make that call fail; a top-level `"panic": true` panics on open.
/// Anything that is not valid JSON fails to open.
fn load(doc: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(doc)?;
    let v: Value = serde_json::from_str(&raw).map_err(|e| anyhow!("not a document: {e}"))?;
    if v.get("pages").and_then(Value::as_array).is_none() {
        bail!("not a document: no pages");
    }
    Ok(v)
}

fn page(doc: &Path, page: u32) -> Result<Value> {
    let v = load(doc)?;
    v["pages"]
        .get(page as usize - 1)
        .cloned()
        .ok_or_else(|| anyhow!("page {page} out of range"))
}

fn flag(p: &Value, name: &str) -> bool {
    p.get(name).and_then(Value::as_bool).unwrap_or(false)
}

#[derive(Default)]
pub struct Calls {
    pub opens: AtomicUsize,
    pub texts: AtomicUsize,
    pub tables: AtomicUsize,
    pub image_lists: AtomicUsize,
    pub image_saves: AtomicUsize,
    pub renders: AtomicUsize,
    pub recognitions: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn structured(&self) -> usize {
        Self::get(&self.opens)
            + Self::get(&self.texts)
            + Self::get(&self.tables)
            + Self::get(&self.image_lists)
            + Self::get(&self.image_saves)
    }
}

#[derive(Default)]
pub struct FakeEngines {
    pub calls: Calls,
}

impl LayoutBackend for FakeEngines {
    fn open(&self, doc: &Path) -> Result<u32> {
        self.calls.opens.fetch_add(1, Ordering::SeqCst);
        let v = load(doc)?;
        if flag(&v, "panic") {
            panic!("layout engine crashed on {}", doc.display());
        }
        Ok(v["pages"].as_array().map(|a| a.len()).unwrap_or(0) as u32)
    }

    fn page_text(&self, doc: &Path, n: u32) -> Result<Option<String>> {
        self.calls.texts.fetch_add(1, Ordering::SeqCst);
        let p = page(doc, n)?;
        if flag(&p, "text_error") {
            bail!("text layer is corrupt");
        }
        Ok(p.get("text").and_then(Value::as_str).map(str::to_string))
    }

    fn page_tables(&self, doc: &Path, n: u32) -> Result<Vec<TableGrid>> {
        self.calls.tables.fetch_add(1, Ordering::SeqCst);
        let p = page(doc, n)?;
        if flag(&p, "table_error") {
            bail!("table finder failed");
        }
        match p.get("tables") {
            Some(t) => Ok(serde_json::from_value(t.clone())?),
            None => Ok(Vec::new()),
        }
    }

    fn page_images(&self, doc: &Path, n: u32) -> Result<Vec<ImageRegion>> {
        self.calls.image_lists.fetch_add(1, Ordering::SeqCst);
        let p = page(doc, n)?;
        if flag(&p, "image_error") {
            bail!("image listing failed");
        }
        let count = p.get("images").and_then(Value::as_u64).unwrap_or(0);
        Ok((0..count)
            .map(|i| ImageRegion {
                x0: 10.0 * i as f64,
                top: 0.0,
                x1: 10.0 * i as f64 + 5.0,
                bottom: 5.0,
            })
            .collect())
    }

    fn save_image(
        &self,
        _doc: &Path,
        page: u32,
        region: &ImageRegion,
        dpi: u32,
        dest: &Path,
    ) -> Result<()> {
        self.calls.image_saves.fetch_add(1, Ordering::SeqCst);
        std::fs::write(dest, format!("png page={page} x0={} dpi={dpi}", region.x0))?;
        Ok(())
    }
}

impl Rasterizer for FakeEngines {
    fn page_count(&self, doc: &Path) -> Result<u32> {
        let v = load(doc)?;
        Ok(v["pages"].as_array().map(|a| a.len()).unwrap_or(0) as u32)
    }

    fn render_page(&self, doc: &Path, n: u32, _dpi: u32, dest: &Path) -> Result<()> {
        self.calls.renders.fetch_add(1, Ordering::SeqCst);
        let p = page(doc, n)?;
        if flag(&p, "render_error") {
            bail!("rasterizer crashed");
        }
        // The "image" carries the text the recognizer will read back.
        let body = if flag(&p, "ocr_error") {
            "!ERR".to_string()
        } else {
            p.get("ocr")
                .and_then(Value::as_array)
                .map(|lines| {
                    lines
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default()
        };
        std::fs::write(dest, body)?;
        Ok(())
    }
}

impl Recognizer for FakeEngines {
    fn recognize(&self, image: &Path) -> Result<Vec<RecognizedLine>> {
        self.calls.recognitions.fetch_add(1, Ordering::SeqCst);
        let body = std::fs::read_to_string(image)?;
        if body == "!ERR" {
            bail!("recognizer out of memory");
        }
        Ok(body
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| RecognizedLine {
                text: l.to_string(),
                confidence: Some(0.5),
            })
            .collect())
    }
}

/// A scratch corpus and output tree.
pub struct Fixture {
    pub dir: TempDir,
    pub corpus: PathBuf,
    pub artifacts: ArtifactLayout,
    pub error_log: PathBuf,
    pub engines: FakeEngines,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let corpus = dir.path().join("pdfs");
        std::fs::create_dir_all(&corpus).unwrap();
        let out = dir.path().join("out");
        Self {
            artifacts: ArtifactLayout::under(&out),
            error_log: out.join("logs").join("errors.log"),
            corpus,
            dir,
            engines: FakeEngines::default(),
        }
    }

    pub fn add(&self, id: &str, doc: Value) -> Document {
        self.add_raw(id, &doc.to_string())
    }

    pub fn add_raw(&self, id: &str, body: &str) -> Document {
        let path = self.corpus.join(format!("{id}.pdf"));
        std::fs::write(&path, body).unwrap();
        Document::from_path(&path).unwrap()
    }

    pub fn sink(&self) -> ErrorSink {
        ErrorSink::open(&self.error_log, ErrorLogFormat::Text).unwrap()
    }

    pub fn backends(&self) -> Backends<'_> {
        Backends {
            layout: &self.engines,
            raster: &self.engines,
            recognizer: &self.engines,
        }
    }

    pub fn run_one(&self, doc: &Document, settings: PipelineSettings) -> DocumentReport {
        let sink = self.sink();
        let pipeline = DocumentPipeline::new(self.backends(), &self.artifacts, &sink, settings);
        pipeline.run(doc)
    }

    pub fn run_batch(&self, settings: PipelineSettings, workers: usize) -> BatchSummary {
        let sink = self.sink();
        let pipeline = DocumentPipeline::new(self.backends(), &self.artifacts, &sink, settings);
        let corpus = Corpus::new(&self.corpus, &["pdf".to_string()]);
        BatchOrchestrator::new(corpus, &sink, workers)
            .run(&pipeline)
            .expect("batch run")
    }

    pub fn text(&self, id: &str) -> Option<String> {
        std::fs::read_to_string(self.artifacts.text_path(id)).ok()
    }

    pub fn log_lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.error_log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}
