pub mod pool;
pub mod python;
pub mod types;
pub mod worker;

use anyhow::Result;
use std::path::Path;

pub use types::{ImageRegion, RecognizedLine, TableGrid, WorkerDiag};

/// Structured extraction from a document's own layout model. Pages are 1-based.
pub trait LayoutBackend: Send + Sync {
    fn open(&self, doc: &Path) -> Result<u32>;
    fn page_text(&self, doc: &Path, page: u32) -> Result<Option<String>>;
    fn page_tables(&self, doc: &Path, page: u32) -> Result<Vec<TableGrid>>;
    fn page_images(&self, doc: &Path, page: u32) -> Result<Vec<ImageRegion>>;
    fn save_image(&self, doc: &Path, page: u32, region: &ImageRegion, dpi: u32, dest: &Path)
        -> Result<()>;
}

pub trait Rasterizer: Send + Sync {
    fn page_count(&self, doc: &Path) -> Result<u32>;
    fn render_page(&self, doc: &Path, page: u32, dpi: u32, dest: &Path) -> Result<()>;
}

pub trait Recognizer: Send + Sync {
    fn recognize(&self, image: &Path) -> Result<Vec<RecognizedLine>>;
}

pub trait StructureService: Send + Sync {
    fn process_fulltext(&self, doc: &Path) -> Result<String>;
}
