use hybrid_extract::config::{Config, ErrorLogFormat, FallbackScope, PipelineMode};

#[test]
fn parse_example_config() {
    let raw = include_str!("../hybrid-extract.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert!(cfg.global.workers >= 1);
    assert!(!cfg.paths.corpus_dir.is_empty());
    assert!(!cfg.paths.text_dir.is_empty());
    assert_eq!(cfg.pipeline.mode, PipelineMode::Hybrid);
    assert_eq!(cfg.pipeline.fallback_scope, FallbackScope::MissingPages);
    assert_eq!(cfg.extraction.min_text_chars, 10);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str(
        r#"
[pipeline]
mode = "structured_only"
fallback_scope = "all_pages"

[error_log]
format = "json"
"#,
    )
    .expect("parse TOML");

    assert_eq!(cfg.pipeline.mode, PipelineMode::StructuredOnly);
    assert_eq!(cfg.pipeline.fallback_scope, FallbackScope::AllPages);
    assert_eq!(cfg.pipeline.page_delimiter, "\n--- Page {page} ---\n");
    assert_eq!(cfg.error_log.format, ErrorLogFormat::Json);
    assert!(cfg.resume.enabled);
    assert_eq!(cfg.resume.min_text_bytes, 0);
    assert_eq!(cfg.recognition.concurrency, 1);
    assert_eq!(cfg.render.dpi, 300);
}

#[test]
fn unknown_mode_is_rejected() {
    let res: Result<Config, _> = toml::from_str("[pipeline]\nmode = \"ocr_only\"\n");
    assert!(res.is_err());
}
