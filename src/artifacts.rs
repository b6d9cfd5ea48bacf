use crate::{config::Config, util::ensure_parent};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Publish {
    Written,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub text_dir: PathBuf,
    pub table_dir: PathBuf,
    pub image_dir: PathBuf,
    pub raster_dir: PathBuf,
    pub tei_dir: PathBuf,
    pub min_text_bytes: u64,
}

impl ArtifactLayout {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            text_dir: PathBuf::from(&cfg.paths.text_dir),
            table_dir: PathBuf::from(&cfg.paths.table_dir),
            image_dir: PathBuf::from(&cfg.paths.image_dir),
            raster_dir: PathBuf::from(&cfg.paths.raster_dir),
            tei_dir: PathBuf::from(&cfg.paths.tei_dir),
            min_text_bytes: cfg.resume.min_text_bytes,
        }
    }

    pub fn under(root: &Path) -> Self {
        Self {
            text_dir: root.join("texts"),
            table_dir: root.join("tables"),
            image_dir: root.join("images"),
            raster_dir: root.join("page_images"),
            tei_dir: root.join("tei"),
            min_text_bytes: 0,
        }
    }

    pub fn text_path(&self, doc_id: &str) -> PathBuf {
        self.text_dir.join(format!("{doc_id}.txt"))
    }

    pub fn table_path(&self, doc_id: &str, page: u32, table: usize) -> PathBuf {
        self.table_dir
            .join(format!("{doc_id}_page{page}_table{table}.csv"))
    }

    pub fn image_path(&self, doc_id: &str, page: u32, image: usize) -> PathBuf {
        self.image_dir.join(format!("{doc_id}_page{page}_img{image}.png"))
    }

    pub fn raster_path(&self, doc_id: &str, page: u32) -> PathBuf {
        self.raster_dir.join(format!("{doc_id}_page{page}.png"))
    }

    pub fn tei_path(&self, doc_id: &str) -> PathBuf {
        self.tei_dir.join(format!("{doc_id}.tei.xml"))
    }

    pub fn text_done(&self, doc_id: &str) -> bool {
        match std::fs::metadata(self.text_path(doc_id)) {
            Ok(meta) => meta.is_file() && meta.len() >= self.min_text_bytes,
            Err(_) => false,
        }
    }

    pub fn write_text(&self, doc_id: &str, text: &str) -> Result<PathBuf> {
        let path = self.text_path(doc_id);
        replace_file(&path, text.as_bytes())?;
        Ok(path)
    }

    pub fn write_tei(&self, doc_id: &str, xml: &str) -> Result<PathBuf> {
        let path = self.tei_path(doc_id);
        replace_file(&path, xml.as_bytes())?;
        Ok(path)
    }
}

pub fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = temp_beside(path)?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .with_context(|| format!("write {}", tmp.path().display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

/// Write-once publication: `produce` fills a private temp file, which is then
/// moved into place only if nothing exists at `target`.
pub fn publish_new<F>(target: &Path, produce: F) -> Result<Publish>
where
    F: FnOnce(&Path) -> Result<()>,
{
    if target.exists() {
        return Ok(Publish::Skipped);
    }
    let tmp = temp_beside(target)?;
    produce(tmp.path())?;
    match tmp.persist_noclobber(target) {
        Ok(_) => Ok(Publish::Written),
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => Ok(Publish::Skipped),
        Err(err) => Err(err.error).with_context(|| format!("publish {}", target.display())),
    }
}

fn temp_beside(target: &Path) -> Result<NamedTempFile> {
    ensure_parent(target)?;
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".part")
        .tempfile_in(dir)
        .with_context(|| format!("temp file in {}", dir.display()))
}

pub fn table_to_csv(rows: &[Vec<Option<String>>], header: bool) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = String::new();
    if header && width > 0 {
        let cols: Vec<String> = (0..width).map(|i| i.to_string()).collect();
        out.push_str(&cols.join(","));
        out.push('\n');
    }
    for row in rows {
        let cells: Vec<String> = (0..width)
            .map(|i| csv_cell(row.get(i).and_then(|c| c.as_deref()).unwrap_or("")))
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

fn csv_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
