use serde::{Deserialize, Serialize};

pub type TableGrid = Vec<Vec<Option<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageRegion {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedLine {
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDiag {
    pub worker: String,
    pub python_version: String,
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub library_version: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct OpenOut {
    pub page_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TextOut {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TablesOut {
    #[serde(default)]
    pub tables: Vec<TableGrid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ImagesOut {
    #[serde(default)]
    pub images: Vec<ImageRegion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LinesOut {
    #[serde(default)]
    pub lines: Vec<RecognizedLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Empty {}
