mod common;

use anyhow::{Result, bail};
use common::Fixture;
use hybrid_extract::{
    batch::BatchOrchestrator,
    corpus::Corpus,
    engine::StructureService,
    report::DocumentState,
    structure::StructureJob,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct FakeStructure {
    calls: AtomicUsize,
}

impl StructureService for FakeStructure {
    fn process_fulltext(&self, doc: &Path) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stem = doc.file_stem().unwrap().to_string_lossy();
        if stem == "refused" {
            bail!("structure service returned status 503");
        }
        Ok(format!("<TEI><title>{stem}</title></TEI>"))
    }
}

fn run(fx: &Fixture, service: &FakeStructure, resume: bool) -> hybrid_extract::report::BatchSummary {
    let sink = fx.sink();
    let job = StructureJob::new(service, &fx.artifacts, &sink, resume);
    BatchOrchestrator::new(Corpus::new(&fx.corpus, &["pdf".to_string()]), &sink, 1)
        .run(&job)
        .unwrap()
}

#[test]
fn saves_tei_and_records_service_failures() {
    let fx = Fixture::new();
    fx.add_raw("paper", "%PDF");
    fx.add_raw("refused", "%PDF");
    let service = FakeStructure::default();

    let summary = run(&fx, &service, true);

    assert_eq!(summary.job, "structure");
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.find("refused").unwrap().state, DocumentState::Failed);
    assert_eq!(
        std::fs::read_to_string(fx.artifacts.tei_path("paper")).unwrap(),
        "<TEI><title>paper</title></TEI>"
    );
    assert!(!fx.artifacts.tei_path("refused").exists());

    let lines = fx.log_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("[structure] refused: structure service returned status 503"));
}

#[test]
fn existing_tei_is_skipped_unless_resume_is_off() {
    let fx = Fixture::new();
    fx.add_raw("paper", "%PDF");
    let service = FakeStructure::default();

    run(&fx, &service, true);
    let again = run(&fx, &service, true);
    assert_eq!(again.skipped, 1);
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);

    let forced = run(&fx, &service, false);
    assert_eq!(forced.processed, 1);
    assert_eq!(service.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn multipart_body_wraps_file_field() {
    let (ct, body) =
        hybrid_extract::structure::multipart_file("input", "a.pdf", "application/pdf", b"%PDF-1.4");
    let boundary = ct.strip_prefix("multipart/form-data; boundary=").unwrap();
    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with(&format!("--{boundary}\r\n")));
    assert!(text.contains("name=\"input\"; filename=\"a.pdf\""));
    assert!(text.contains("\r\n\r\n%PDF-1.4\r\n"));
    assert!(text.ends_with(&format!("--{boundary}--\r\n")));
}
