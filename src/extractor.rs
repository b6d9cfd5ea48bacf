use crate::{
    artifacts::{ArtifactLayout, Publish, table_to_csv},
    corpus::Document,
    engine::LayoutBackend,
    error_sink::{ErrorRecord, Stage},
};
use anyhow::Context;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextVerdict {
    Sufficient,
    Insufficient,
    Failed,
}

impl TextVerdict {
    pub fn needs_fallback(self) -> bool {
        !matches!(self, TextVerdict::Sufficient)
    }
}

#[derive(Debug, Clone)]
pub struct PageResult {
    pub page: u32,
    pub text: Option<String>,
    pub verdict: TextVerdict,
    pub tables: Vec<Publish>,
    pub images: Vec<Publish>,
    pub errors: Vec<ErrorRecord>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractorSettings {
    pub min_text_chars: usize,
    pub image_dpi: u32,
    pub table_header: bool,
}

pub struct PageExtractor<'a> {
    layout: &'a dyn LayoutBackend,
    artifacts: &'a ArtifactLayout,
    settings: ExtractorSettings,
}

impl<'a> PageExtractor<'a> {
    pub fn new(
        layout: &'a dyn LayoutBackend,
        artifacts: &'a ArtifactLayout,
        settings: ExtractorSettings,
    ) -> Self {
        Self {
            layout,
            artifacts,
            settings,
        }
    }

    pub fn extract(&self, doc: &Document, page: u32) -> PageResult {
        let mut errors = Vec::new();

        let tables = self.extract_tables(doc, page, &mut errors);
        let images = self.extract_images(doc, page, &mut errors);

        let (text, verdict) = match self.layout.page_text(&doc.path, page) {
            Ok(text) => {
                let verdict = if is_sufficient(text.as_deref(), self.settings.min_text_chars) {
                    TextVerdict::Sufficient
                } else {
                    TextVerdict::Insufficient
                };
                (text, verdict)
            }
            Err(err) => {
                errors.push(ErrorRecord::page(&doc.id, page, Stage::Text, err));
                (None, TextVerdict::Failed)
            }
        };

        debug!(
            doc = %doc.id,
            page,
            ?verdict,
            tables = tables.len(),
            images = images.len(),
            "page extracted"
        );

        PageResult {
            page,
            text,
            verdict,
            tables,
            images,
            errors,
        }
    }

    fn extract_tables(
        &self,
        doc: &Document,
        page: u32,
        errors: &mut Vec<ErrorRecord>,
    ) -> Vec<Publish> {
        let grids = match self.layout.page_tables(&doc.path, page) {
            Ok(grids) => grids,
            Err(err) => {
                errors.push(ErrorRecord::page(&doc.id, page, Stage::Table, err));
                return Vec::new();
            }
        };

        let mut saved = Vec::with_capacity(grids.len());
        for (i, grid) in grids.iter().enumerate() {
            let index = i + 1;
            let path = self.artifacts.table_path(&doc.id, page, index);
            let csv = table_to_csv(grid, self.settings.table_header);
            let res = crate::artifacts::publish_new(&path, |tmp| {
                std::fs::write(tmp, csv.as_bytes())
                    .with_context(|| format!("write table {}", tmp.display()))
            });
            match res {
                Ok(publish) => {
                    debug!(doc = %doc.id, page, table = index, ?publish, "table");
                    saved.push(publish);
                }
                Err(err) => errors.push(ErrorRecord::page(
                    &doc.id,
                    page,
                    Stage::Table,
                    err.context(format!("table {index}")),
                )),
            }
        }
        saved
    }

    fn extract_images(
        &self,
        doc: &Document,
        page: u32,
        errors: &mut Vec<ErrorRecord>,
    ) -> Vec<Publish> {
        let regions = match self.layout.page_images(&doc.path, page) {
            Ok(regions) => regions,
            Err(err) => {
                errors.push(ErrorRecord::page(&doc.id, page, Stage::Image, err));
                return Vec::new();
            }
        };

        let mut saved = Vec::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            let index = i + 1;
            let path = self.artifacts.image_path(&doc.id, page, index);
            let res = crate::artifacts::publish_new(&path, |tmp| {
                self.layout
                    .save_image(&doc.path, page, region, self.settings.image_dpi, tmp)
            });
            match res {
                Ok(publish) => {
                    debug!(doc = %doc.id, page, image = index, ?publish, "image");
                    saved.push(publish);
                }
                Err(err) => errors.push(ErrorRecord::page(
                    &doc.id,
                    page,
                    Stage::Image,
                    err.context(format!("image {index}")),
                )),
            }
        }
        saved
    }
}

/// Trimmed text must be strictly longer than `min_chars` characters.
pub fn is_sufficient(text: Option<&str>, min_chars: usize) -> bool {
    text.map(|t| t.trim().chars().count() > min_chars)
        .unwrap_or(false)
}
