use hybrid_extract::{
    config::ErrorLogFormat,
    error_sink::{ErrorRecord, ErrorSink, Stage},
};

fn fixed(page: Option<u32>, message: &str) -> ErrorRecord {
    ErrorRecord {
        timestamp: "2024-01-01T00:00:00Z".into(),
        doc_id: "paper".into(),
        page,
        stage: Stage::Render,
        message: message.into(),
    }
}

#[test]
fn text_line_names_stage_document_and_page() {
    assert_eq!(
        fixed(Some(3), "boom").to_line(ErrorLogFormat::Text),
        "[2024-01-01T00:00:00Z] [render] paper page 3: boom"
    );
    assert_eq!(
        fixed(None, "boom").to_line(ErrorLogFormat::Text),
        "[2024-01-01T00:00:00Z] [render] paper: boom"
    );
}

#[test]
fn multi_line_messages_stay_on_one_line() {
    let line = fixed(None, "Traceback:\n  File x\r\n").to_line(ErrorLogFormat::Text);
    assert!(!line.contains('\n'));
    assert!(line.ends_with("Traceback:\\n  File x\\r\\n"));
}

#[test]
fn json_lines_parse_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("errors.jsonl");
    let sink = ErrorSink::open(&path, ErrorLogFormat::Json).unwrap();

    sink.record(&fixed(Some(1), "first\nsecond"));
    sink.record(&ErrorRecord::document("other", Stage::Open, "cannot open"));

    assert_eq!(sink.records_written(), 2);
    let raw = std::fs::read_to_string(&path).unwrap();
    let parsed: Vec<ErrorRecord> = raw
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(parsed[0], fixed(Some(1), "first\nsecond"));
    assert_eq!(parsed[1].stage, Stage::Open);
    assert_eq!(parsed[1].page, None);
}

#[test]
fn concurrent_records_are_never_interleaved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("errors.log");
    let sink = ErrorSink::open(&path, ErrorLogFormat::Text).unwrap();

    std::thread::scope(|s| {
        for t in 0..4 {
            let sink = &sink;
            s.spawn(move || {
                for i in 0..50 {
                    sink.record(&ErrorRecord::page("doc", i, Stage::Table, format!("t{t}")));
                }
            });
        }
    });

    let raw = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = raw.lines().collect();
    assert_eq!(lines.len(), 200);
    assert!(lines.iter().all(|l| l.contains("[table] doc page ")));
}
