use crate::{
    artifacts::{ArtifactLayout, Publish, publish_new},
    corpus::Document,
    engine::Rasterizer,
    error_sink::{ErrorRecord, Stage},
};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub page: u32,
    pub path: PathBuf,
    pub rendered: bool,
}

pub struct FallbackRenderer<'a> {
    raster: &'a dyn Rasterizer,
    artifacts: &'a ArtifactLayout,
    dpi: u32,
}

impl<'a> FallbackRenderer<'a> {
    pub fn new(raster: &'a dyn Rasterizer, artifacts: &'a ArtifactLayout, dpi: u32) -> Self {
        Self {
            raster,
            artifacts,
            dpi,
        }
    }

    pub fn page_count(&self, doc: &Document) -> Result<u32, ErrorRecord> {
        self.raster
            .page_count(&doc.path)
            .map_err(|err| ErrorRecord::document(&doc.id, Stage::FallbackOpen, err))
    }

    pub fn render(&self, doc: &Document, page: u32) -> Result<RasterImage, ErrorRecord> {
        let path = self.artifacts.raster_path(&doc.id, page);
        let publish = publish_new(&path, |tmp| {
            self.raster.render_page(&doc.path, page, self.dpi, tmp)
        })
        .map_err(|err| ErrorRecord::page(&doc.id, page, Stage::Render, err))?;

        debug!(doc = %doc.id, page, ?publish, "raster");
        Ok(RasterImage {
            page,
            path,
            rendered: publish == Publish::Written,
        })
    }
}
