use crate::{
    artifacts::ArtifactLayout,
    batch::DocumentJob,
    config::Config,
    corpus::Document,
    engine::StructureService,
    error_sink::{ErrorRecord, ErrorSink, Stage},
    report::{DocumentReport, DocumentState},
};
use anyhow::{Context, Result, anyhow};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub struct GrobidClient {
    url: String,
    agent: ureq::Agent,
}

impl GrobidClient {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(timeout)
            .build();
        Self {
            url: url.to_string(),
            agent,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            &cfg.structure.url,
            Duration::from_secs(cfg.structure.timeout_seconds.max(1)),
        )
    }
}

impl StructureService for GrobidClient {
    fn process_fulltext(&self, doc: &Path) -> Result<String> {
        let bytes =
            std::fs::read(doc).with_context(|| format!("reading {}", doc.display()))?;
        let filename = doc
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.pdf".to_string());
        let (content_type, body) = multipart_file("input", &filename, "application/pdf", &bytes);

        let response = match self
            .agent
            .post(&self.url)
            .set("Content-Type", &content_type)
            .send_bytes(&body)
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, _)) => {
                return Err(anyhow!("structure service returned status {code}"));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("POST {}", self.url));
            }
        };

        let mut xml = String::new();
        response
            .into_reader()
            .read_to_string(&mut xml)
            .with_context(|| "reading structure service response")?;
        Ok(xml)
    }
}

pub fn multipart_file(field: &str, filename: &str, mime: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = format!("----hybrid-extract-{:016x}", boundary_seed(bytes));
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{}\"\r\n",
            filename.replace('"', "_")
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {mime}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

fn boundary_seed(bytes: &[u8]) -> u64 {
    let digest = crate::util::sha256_hex(bytes);
    u64::from_str_radix(&digest[..16], 16).unwrap_or(0x5eed)
}

/// Saves a TEI XML rendition of each document; the TEI file is its marker.
pub struct StructureJob<'a> {
    service: &'a dyn StructureService,
    artifacts: &'a ArtifactLayout,
    sink: &'a ErrorSink,
    resume: bool,
}

impl<'a> StructureJob<'a> {
    pub fn new(
        service: &'a dyn StructureService,
        artifacts: &'a ArtifactLayout,
        sink: &'a ErrorSink,
        resume: bool,
    ) -> Self {
        Self {
            service,
            artifacts,
            sink,
            resume,
        }
    }
}

impl DocumentJob for StructureJob<'_> {
    fn name(&self) -> &'static str {
        "structure"
    }

    fn is_complete(&self, doc: &Document) -> bool {
        self.resume && self.artifacts.tei_path(&doc.id).is_file()
    }

    fn run_document(&self, doc: &Document) -> Result<DocumentReport> {
        let result = self
            .service
            .process_fulltext(&doc.path)
            .and_then(|xml| self.artifacts.write_tei(&doc.id, &xml).map(|p| (p, xml.len())));

        match result {
            Ok((path, bytes)) => {
                info!(doc = %doc.id, path = %path.display(), "tei saved");
                let mut report = DocumentReport::with_state(&doc.id, DocumentState::Completed);
                report.output = Some(path.display().to_string());
                report.output_bytes = bytes as u64;
                Ok(report)
            }
            Err(err) => {
                self.sink
                    .record(&ErrorRecord::document(&doc.id, Stage::Structure, err));
                let mut report = DocumentReport::with_state(&doc.id, DocumentState::Failed);
                report.errors = 1;
                Ok(report)
            }
        }
    }
}
