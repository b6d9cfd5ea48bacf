use super::{
    LayoutBackend, Rasterizer, Recognizer,
    pool::Pool,
    types::*,
    worker::{JsonLineWorker, WorkerSpec},
};
use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LAYOUT_SCRIPT: &str = "layout_worker.py";
const RENDER_SCRIPT: &str = "render_worker.py";
const OCR_SCRIPT: &str = "ocr_worker.py";

pub struct PythonEngines {
    pub layout: PythonLayout,
    pub raster: PythonRasterizer,
    pub recognizer: PythonRecognizer,
}

impl PythonEngines {
    pub fn new(cfg: &Config) -> Result<Self> {
        let scripts_dir = PathBuf::from(&cfg.paths.scripts_dir);
        if cfg.security.pin_scripts_dir {
            let cwd = std::env::current_dir().with_context(|| "current_dir")?;
            let canon = scripts_dir
                .canonicalize()
                .with_context(|| format!("canonicalize scripts_dir: {}", scripts_dir.display()))?;
            if !canon.starts_with(&cwd) {
                return Err(anyhow!(
                    "scripts_dir is outside cwd while pin_scripts_dir=true: {}",
                    canon.display()
                ));
            }
        }
        for script in [LAYOUT_SCRIPT, RENDER_SCRIPT, OCR_SCRIPT] {
            let path = scripts_dir.join(script);
            if !path.exists() {
                return Err(anyhow!("missing script: {}", path.display()));
            }
        }

        let python_exe = resolve_python_exe(&cfg.engine.python_exe);
        let base_env: Vec<(String, String)> = cfg
            .engine
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let spec = |label, script: &str, extra: &[(&str, &str)]| {
            let mut env = base_env.clone();
            env.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
            WorkerSpec {
                label,
                python_exe: python_exe.clone(),
                script: scripts_dir.join(script),
                env,
            }
        };

        let workers = cfg.global.workers.max(1);
        Ok(Self {
            layout: PythonLayout {
                pool: WorkerPool::new(
                    spec("layout", LAYOUT_SCRIPT, &[]),
                    workers,
                    cfg.engine.call_timeout_seconds,
                ),
            },
            raster: PythonRasterizer {
                pool: WorkerPool::new(
                    spec("render", RENDER_SCRIPT, &[]),
                    workers,
                    cfg.render.timeout_seconds,
                ),
            },
            recognizer: PythonRecognizer {
                pool: WorkerPool::new(
                    spec(
                        "ocr",
                        OCR_SCRIPT,
                        &[
                            ("OCR_LANG", cfg.recognition.lang.as_str()),
                            ("OCR_DEVICE", cfg.recognition.device.as_str()),
                        ],
                    ),
                    cfg.recognition.concurrency,
                    cfg.recognition.timeout_seconds,
                ),
            },
        })
    }

    pub fn doctor(&self) -> Vec<WorkerDiag> {
        [
            &self.layout.pool,
            &self.raster.pool,
            &self.recognizer.pool,
        ]
        .into_iter()
        .map(|pool| {
            pool.call::<_, WorkerDiag>(&json!({"cmd": "doctor"}))
                .unwrap_or_else(|err| WorkerDiag {
                    worker: pool.label.to_string(),
                    python_version: String::new(),
                    library: None,
                    library_version: None,
                    ok: false,
                    error: Some(format!("{err:#}")),
                })
        })
        .collect()
    }
}

struct WorkerPool {
    label: &'static str,
    pool: Pool<JsonLineWorker>,
    timeout: Duration,
}

impl WorkerPool {
    fn new(spec: WorkerSpec, size: usize, timeout_seconds: u64) -> Self {
        let label = spec.label;
        Self {
            label,
            pool: Pool::new(size, move || Ok(JsonLineWorker::new(spec.clone()))),
            timeout: Duration::from_secs(timeout_seconds.max(1)),
        }
    }

    fn call<I: Serialize, O: DeserializeOwned>(&self, req: &I) -> Result<O> {
        let mut worker = self.pool.get()?;
        worker.call(req, self.timeout)
    }
}

pub struct PythonLayout {
    pool: WorkerPool,
}

impl LayoutBackend for PythonLayout {
    fn open(&self, doc: &Path) -> Result<u32> {
        let out: OpenOut = self.pool.call(&json!({"cmd": "open", "path": doc}))?;
        Ok(out.page_count)
    }

    fn page_text(&self, doc: &Path, page: u32) -> Result<Option<String>> {
        let out: TextOut = self
            .pool
            .call(&json!({"cmd": "text", "path": doc, "page": page}))?;
        Ok(out.text)
    }

    fn page_tables(&self, doc: &Path, page: u32) -> Result<Vec<TableGrid>> {
        let out: TablesOut = self
            .pool
            .call(&json!({"cmd": "tables", "path": doc, "page": page}))?;
        Ok(out.tables)
    }

    fn page_images(&self, doc: &Path, page: u32) -> Result<Vec<ImageRegion>> {
        let out: ImagesOut = self
            .pool
            .call(&json!({"cmd": "images", "path": doc, "page": page}))?;
        Ok(out.images)
    }

    fn save_image(
        &self,
        doc: &Path,
        page: u32,
        region: &ImageRegion,
        dpi: u32,
        dest: &Path,
    ) -> Result<()> {
        let _: Empty = self.pool.call(&json!({
            "cmd": "crop",
            "path": doc,
            "page": page,
            "bbox": region,
            "dpi": dpi,
            "dest": dest,
        }))?;
        Ok(())
    }
}

pub struct PythonRasterizer {
    pool: WorkerPool,
}

impl Rasterizer for PythonRasterizer {
    fn page_count(&self, doc: &Path) -> Result<u32> {
        let out: OpenOut = self
            .pool
            .call(&json!({"cmd": "page_count", "path": doc}))?;
        Ok(out.page_count)
    }

    fn render_page(&self, doc: &Path, page: u32, dpi: u32, dest: &Path) -> Result<()> {
        let _: Empty = self.pool.call(&json!({
            "cmd": "render",
            "path": doc,
            "page": page,
            "dpi": dpi,
            "dest": dest,
        }))?;
        Ok(())
    }
}

pub struct PythonRecognizer {
    pool: WorkerPool,
}

impl PythonRecognizer {
    pub fn concurrency(&self) -> usize {
        self.pool.pool.capacity()
    }
}

impl Recognizer for PythonRecognizer {
    fn recognize(&self, image: &Path) -> Result<Vec<RecognizedLine>> {
        let out: LinesOut = self
            .pool
            .call(&json!({"cmd": "recognize", "image": image}))?;
        Ok(out.lines)
    }
}

fn resolve_python_exe(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("HYBRID_EXTRACT_PYTHON") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return p;
            }
        }
        return PathBuf::from("python3");
    }
    expand_tilde(raw)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
