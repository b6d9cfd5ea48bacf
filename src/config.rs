use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub corpus: Corpus,
    #[serde(default)]
    pub pipeline: Pipeline,
    #[serde(default)]
    pub resume: Resume,
    #[serde(default)]
    pub extraction: Extraction,
    #[serde(default)]
    pub render: Render,
    #[serde(default)]
    pub recognition: Recognition,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub structure: Structure,
    #[serde(default)]
    pub error_log: ErrorLog,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    /// Documents processed concurrently. 1 keeps the sequential reference behavior.
    pub workers: usize,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            workers: 1,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub corpus_dir: String,
    pub text_dir: String,
    pub table_dir: String,
    pub image_dir: String,
    pub raster_dir: String,
    pub tei_dir: String,
    pub error_log: String,
    pub summary_file: String,
    pub scripts_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            corpus_dir: "data/pdfs".into(),
            text_dir: "out/texts".into(),
            table_dir: "out/tables".into(),
            image_dir: "out/images".into(),
            raster_dir: "out/page_images".into(),
            tei_dir: "out/tei".into(),
            error_log: "out/logs/extractor_errors.log".into(),
            summary_file: "out/summary.json".into(),
            scripts_dir: "scripts".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Corpus {
    pub extensions: Vec<String>,
}
impl Default for Corpus {
    fn default() -> Self {
        Self {
            extensions: vec!["pdf".into()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    Hybrid,
    StructuredOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackScope {
    MissingPages,
    AllPages,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pipeline {
    pub mode: PipelineMode,
    pub fallback_scope: FallbackScope,
    pub page_delimiter: String,
}
impl Default for Pipeline {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Hybrid,
            fallback_scope: FallbackScope::MissingPages,
            page_delimiter: "\n--- Page {page} ---\n".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Resume {
    pub enabled: bool,
    /// A text artifact at least this large counts as done. 0 means existence is enough.
    pub min_text_bytes: u64,
}
impl Default for Resume {
    fn default() -> Self {
        Self {
            enabled: true,
            min_text_bytes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Extraction {
    /// Trimmed page text must be strictly longer than this to skip the fallback.
    pub min_text_chars: usize,
    pub image_dpi: u32,
    pub table_header: bool,
}
impl Default for Extraction {
    fn default() -> Self {
        Self {
            min_text_chars: 10,
            image_dpi: 300,
            table_header: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Render {
    pub dpi: u32,
    pub timeout_seconds: u64,
}
impl Default for Render {
    fn default() -> Self {
        Self {
            dpi: 300,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Recognition {
    /// Recognition workers alive at once; match it to accelerator capacity.
    pub concurrency: usize,
    pub lang: String,
    pub device: String,
    pub timeout_seconds: u64,
}
impl Default for Recognition {
    fn default() -> Self {
        Self {
            concurrency: 1,
            lang: "en".into(),
            device: "gpu:0".into(),
            timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    pub python_exe: String,
    pub call_timeout_seconds: u64,
    pub env: BTreeMap<String, String>,
}
impl Default for Engine {
    fn default() -> Self {
        Self {
            python_exe: "python3".into(),
            call_timeout_seconds: 120,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Structure {
    pub url: String,
    pub timeout_seconds: u64,
}
impl Default for Structure {
    fn default() -> Self {
        Self {
            url: "http://localhost:8070/api/processFulltextDocument".into(),
            timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorLogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorLog {
    pub format: ErrorLogFormat,
}
impl Default for ErrorLog {
    fn default() -> Self {
        Self {
            format: ErrorLogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    pub pin_scripts_dir: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            pin_scripts_dir: true,
        }
    }
}
