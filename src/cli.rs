use crate::{
    artifacts::ArtifactLayout,
    batch::BatchOrchestrator,
    config::{Config, PipelineMode},
    corpus::Corpus,
    engine::python::PythonEngines,
    error_sink::ErrorSink,
    pipeline::{Backends, DocumentPipeline, PipelineSettings},
    report::BatchSummary,
    structure::{GrobidClient, StructureJob},
    util::{ensure_dir, ensure_parent, sha256_hex},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hybrid-extract")]
#[command(about = "Resumable batch PDF extractor (structured layout pass + raster/OCR fallback)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./hybrid-extract.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that every Python collaborator starts and imports its library.
    Doctor {},
    /// Extract text, tables and images for every pending document.
    Run {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Reprocess documents even if their text artifact exists.
        #[arg(long)]
        no_resume: bool,
    },
    /// Count completed and pending documents without processing anything.
    Status {
        #[command(flatten)]
        target: Target,
    },
    /// Save a TEI XML rendition of each document via the structure service.
    Structure {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        url: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub struct Target {
    /// Directory of source documents.
    #[arg(long)]
    pub corpus: Option<PathBuf>,
    /// Root for every output directory and the error log.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ModeArg {
    Hybrid,
    StructuredOnly,
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref());
    let mut cfg = match cfg_path {
        Some(p) => Config::load(&p)?,
        None => Config::default(),
    };

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;
            doctor(&cfg)
        }
        Command::Run {
            target,
            workers,
            mode,
            no_resume,
        } => {
            apply_target(&mut cfg, target);
            if let Some(w) = workers {
                cfg.global.workers = *w;
            }
            if let Some(m) = mode {
                cfg.pipeline.mode = match m {
                    ModeArg::Hybrid => PipelineMode::Hybrid,
                    ModeArg::StructuredOnly => PipelineMode::StructuredOnly,
                };
            }
            if *no_resume {
                cfg.resume.enabled = false;
            }
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;
            run(&cfg)
        }
        Command::Status { target } => {
            apply_target(&mut cfg, target);
            status(&cfg)
        }
        Command::Structure { target, url } => {
            apply_target(&mut cfg, target);
            if let Some(u) = url {
                cfg.structure.url = u.clone();
            }
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;
            structure(&cfg)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["hybrid-extract.toml", "hybrid-extract.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Re-roots the output tree and points the corpus at the command-line values.
pub fn apply_target(cfg: &mut Config, target: &Target) {
    if let Some(corpus) = &target.corpus {
        cfg.paths.corpus_dir = corpus.display().to_string();
    }
    if let Some(out) = &target.out_dir {
        let sub = |name: &str| out.join(name).display().to_string();
        cfg.paths.text_dir = sub("texts");
        cfg.paths.table_dir = sub("tables");
        cfg.paths.image_dir = sub("images");
        cfg.paths.raster_dir = sub("page_images");
        cfg.paths.tei_dir = sub("tei");
        cfg.paths.error_log = out
            .join("logs")
            .join("extractor_errors.log")
            .display()
            .to_string();
        cfg.paths.summary_file = sub("summary.json");
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        ensure_parent(path)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    let dir = Path::new(&cfg.paths.error_log)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Some(dir.join("hybrid-extract.log"))
}

fn doctor(cfg: &Config) -> Result<()> {
    let engines = PythonEngines::new(cfg)?;
    let diag = engines.doctor();
    println!("{}", serde_json::to_string_pretty(&diag)?);
    if diag.iter().all(|d| d.ok) {
        Ok(())
    } else {
        Err(anyhow!("one or more collaborators are unavailable"))
    }
}

fn prepare_outputs(cfg: &Config, artifacts: &ArtifactLayout) -> Result<ErrorSink> {
    for dir in [
        &artifacts.text_dir,
        &artifacts.table_dir,
        &artifacts.image_dir,
        &artifacts.raster_dir,
    ] {
        ensure_dir(dir)?;
    }
    ErrorSink::open(Path::new(&cfg.paths.error_log), cfg.error_log.format)
}

fn orchestrator<'a>(cfg: &Config, sink: &'a ErrorSink) -> BatchOrchestrator<'a> {
    let corpus = Corpus::new(&cfg.paths.corpus_dir, &cfg.corpus.extensions);
    BatchOrchestrator::new(corpus, sink, cfg.global.workers)
        .with_config_hash(sha256_hex(cfg.normalized_for_hash().as_bytes()))
}

fn run(cfg: &Config) -> Result<()> {
    let artifacts = ArtifactLayout::from_config(cfg);
    let sink = prepare_outputs(cfg, &artifacts)?;
    let engines = PythonEngines::new(cfg)?;
    info!(
        workers = cfg.global.workers,
        recognition_concurrency = engines.recognizer.concurrency(),
        "engines ready"
    );

    let pipeline = DocumentPipeline::new(
        Backends {
            layout: &engines.layout,
            raster: &engines.raster,
            recognizer: &engines.recognizer,
        },
        &artifacts,
        &sink,
        PipelineSettings::from_config(cfg),
    );
    let summary = orchestrator(cfg, &sink).run(&pipeline)?;
    publish_summary(cfg, &summary)
}

fn structure(cfg: &Config) -> Result<()> {
    let artifacts = ArtifactLayout::from_config(cfg);
    ensure_dir(&artifacts.tei_dir)?;
    let sink = ErrorSink::open(Path::new(&cfg.paths.error_log), cfg.error_log.format)?;
    let client = GrobidClient::from_config(cfg);
    let job = StructureJob::new(&client, &artifacts, &sink, cfg.resume.enabled);
    let summary = orchestrator(cfg, &sink).run(&job)?;
    publish_summary(cfg, &summary)
}

fn status(cfg: &Config) -> Result<()> {
    let artifacts = ArtifactLayout::from_config(cfg);
    let corpus = Corpus::new(&cfg.paths.corpus_dir, &cfg.corpus.extensions);
    let mut completed = 0usize;
    let mut pending = Vec::new();
    let mut conflicts = Vec::new();
    for entry in corpus.documents()? {
        match entry {
            Ok(doc) if artifacts.text_done(&doc.id) => completed += 1,
            Ok(doc) => pending.push(doc.id),
            Err(rec) => conflicts.push(rec.message),
        }
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "corpus": cfg.paths.corpus_dir,
            "total": completed + pending.len(),
            "completed": completed,
            "pending": pending.len(),
            "pending_ids": pending,
            "conflicts": conflicts,
        }))?
    );
    Ok(())
}

fn publish_summary(cfg: &Config, summary: &BatchSummary) -> Result<()> {
    if !cfg.paths.summary_file.is_empty() {
        let path = Path::new(&cfg.paths.summary_file);
        crate::artifacts::replace_file(path, serde_json::to_string_pretty(summary)?.as_bytes())?;
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job": summary.job,
                "processed": summary.processed,
                "partial": summary.partial,
                "skipped": summary.skipped,
                "failed": summary.failed,
                "fallback": summary.fallback,
                "error_records": summary.error_records,
                "error_log": cfg.paths.error_log,
            }))?
        );
    }
    Ok(())
}
