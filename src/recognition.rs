use crate::{
    corpus::Document,
    engine::{RecognizedLine, Recognizer},
    error_sink::{ErrorRecord, Stage},
    renderer::RasterImage,
};

pub struct RecognitionEngine<'a> {
    recognizer: &'a dyn Recognizer,
}

impl<'a> RecognitionEngine<'a> {
    pub fn new(recognizer: &'a dyn Recognizer) -> Self {
        Self { recognizer }
    }

    pub fn recognize(
        &self,
        doc: &Document,
        image: &RasterImage,
    ) -> Result<Vec<RecognizedLine>, ErrorRecord> {
        self.recognizer
            .recognize(&image.path)
            .map_err(|err| ErrorRecord::page(&doc.id, image.page, Stage::Recognition, err))
    }
}

pub fn lines_to_text(lines: &[RecognizedLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
