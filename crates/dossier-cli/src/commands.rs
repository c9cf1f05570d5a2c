use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use dossier::broadcast::JobProgressEvent;
use dossier::{
    load_config, AnalysisMode, Config, CreateJob, HistoryPage, HistoryQuery, JobConfig,
    JobReader, Orchestrator, StatusView, UploadedDocument,
};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::{AnalyzeArgs, Cli, Commands, HistoryArgs, OutputArgs, RetryArgs};

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load(cli.config.as_deref())?;
    match cli.command {
        Commands::Analyze(args) => analyze(&config, args, cli.json),
        Commands::Status { job_id } => status(&config, &job_id, cli.json),
        Commands::Retry(args) => retry(&config, args, cli.json),
        Commands::History(args) => history(&config, &args, cli.json),
    }
}

fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Mode for a run without `--mode`: no files is topic research, one file a
/// single-document analysis, several a comparison.
pub fn infer_mode(file_count: usize) -> AnalysisMode {
    match file_count {
        0 => AnalysisMode::FreeForm,
        1 => AnalysisMode::Document,
        _ => AnalysisMode::MultiDocument,
    }
}

fn read_documents(files: &[PathBuf]) -> anyhow::Result<Vec<UploadedDocument>> {
    files
        .iter()
        .map(|path| {
            let content =
                std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "document".to_string());
            Ok(UploadedDocument::new(filename, content))
        })
        .collect()
}

fn analyze(config: &Config, args: AnalyzeArgs, json: bool) -> anyhow::Result<()> {
    let mode = args
        .mode
        .map(AnalysisMode::from)
        .unwrap_or_else(|| infer_mode(args.files.len()));
    let documents = read_documents(&args.files)?;
    let job_config = JobConfig {
        objective: args.objective,
        domain: args.domain,
        domain_detail: args.domain_detail,
        geography: args.geography,
        locale: args.locale,
        report_style: args.style,
        source_count: args.sources,
        include_images: args.images,
        include_search: !args.no_search,
        search_scope: args.search_scope,
    };

    let orchestrator = start(config)?;
    let job_id = orchestrator.create_job(CreateJob {
        mode,
        documents,
        config: job_config,
    })?;
    if !json {
        eprintln!("Job {} queued ({})", job_id, mode);
    }

    finish(orchestrator, &job_id, &args.output, json)
}

fn retry(config: &Config, args: RetryArgs, json: bool) -> anyhow::Result<()> {
    let revised = match &args.job_config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: JobConfig = serde_json::from_str(&raw)
                .with_context(|| format!("invalid job configuration in {}", path.display()))?;
            Some(config)
        }
        None => None,
    };

    let orchestrator = start(config)?;
    orchestrator.retry(&args.job_id, revised)?;
    if !json {
        eprintln!("Job {} queued for retry", args.job_id);
    }

    finish(orchestrator, &args.job_id, &args.output, json)
}

fn status(config: &Config, job_id: &str, json: bool) -> anyhow::Result<()> {
    let reader = JobReader::open(config)?;
    let view = reader.status(job_id)?;
    print_status(&view, json)
}

fn history(config: &Config, args: &HistoryArgs, json: bool) -> anyhow::Result<()> {
    let reader = JobReader::open(config)?;
    let query = HistoryQuery {
        status: args.status,
        mode: args.mode.map(AnalysisMode::from),
        from_date: args
            .from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc()),
        to_date: args
            .to
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
            .map(|dt| dt.and_utc()),
        limit: Some(args.limit),
        offset: Some(args.offset),
    };
    let page = reader.history(&query)?;
    print_history(&page, json)
}

/// Starts the orchestrator and routes Ctrl-C to a pool shutdown.
fn start(config: &Config) -> anyhow::Result<Arc<Orchestrator>> {
    let orchestrator = Arc::new(Orchestrator::open(config)?);

    let handle = Arc::downgrade(&orchestrator);
    ctrlc::set_handler(move || {
        eprintln!("Interrupted, waiting for running jobs to stop...");
        if let Some(orchestrator) = handle.upgrade() {
            orchestrator.request_shutdown();
        }
    })
    .context("failed to install Ctrl-C handler")?;

    Ok(orchestrator)
}

/// Waits for the job, prints its status, writes the exports and stops the
/// pool. Fails when the job did not complete.
fn finish(
    orchestrator: Arc<Orchestrator>,
    job_id: &str,
    output: &OutputArgs,
    json: bool,
) -> anyhow::Result<()> {
    if !json {
        follow_progress(&orchestrator, job_id);
    }

    let view = orchestrator.wait_for(job_id, Duration::from_secs(output.wait))?;
    let written = if view.completed {
        write_exports(&orchestrator, job_id, &output.out)?
    } else {
        Vec::new()
    };

    print_status(&view, json)?;
    if !json {
        for path in &written {
            println!("Wrote {}", path.display());
        }
    }

    match Arc::try_unwrap(orchestrator) {
        Ok(orchestrator) => orchestrator.shutdown(),
        Err(orchestrator) => orchestrator.request_shutdown(),
    }

    if view.completed {
        Ok(())
    } else if view.error {
        bail!(
            "job {} failed: {}",
            job_id,
            view.error_message.as_deref().unwrap_or("unknown error")
        )
    } else {
        bail!("job {} is still {} ({})", job_id, view.status, view.label)
    }
}

/// Prints live transitions of one job on stderr until it settles.
fn follow_progress(orchestrator: &Orchestrator, job_id: &str) {
    let mut events = orchestrator.subscribe();
    let job_id = job_id.to_string();
    let spawned = std::thread::Builder::new()
        .name("dossier-progress".to_string())
        .spawn(move || loop {
            match events.blocking_recv() {
                Ok(event) if event.job_id == job_id => {
                    eprintln!("  {}", describe(&event));
                    if event.is_final() {
                        break;
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        });
    if let Err(e) = spawned {
        log::warn!("Progress display unavailable: {}", e);
    }
}

fn describe(event: &JobProgressEvent) -> String {
    match (&event.error, event.elapsed_ms) {
        (Some(error), _) => format!("{}: {}", event.status.label(), error),
        (None, Some(ms)) => format!("{} ({:.1}s)", event.status.label(), ms as f64 / 1000.0),
        (None, None) => format!("{}: {}", event.status.label(), event.message),
    }
}

fn write_exports(
    orchestrator: &Orchestrator,
    job_id: &str,
    out: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    let Some(report) = orchestrator.report(job_id)? else {
        return Ok(Vec::new());
    };
    std::fs::create_dir_all(out)
        .with_context(|| format!("failed to create {}", out.display()))?;

    let mut written = Vec::with_capacity(report.formats.len());
    for format in report.formats {
        let download = orchestrator.download(job_id, format)?;
        let path = out.join(&download.filename);
        std::fs::write(&path, &download.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

fn print_status(view: &StatusView, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }

    println!("Job       {}", view.job_id);
    println!("Mode      {}", view.mode);
    println!("Status    {} ({})", view.label, view.status);
    println!("Elapsed   {:.1}s", view.elapsed_seconds);
    println!("Attempts  {}", view.attempts);
    if let Some(message) = &view.error_message {
        match view.error_kind {
            Some(kind) => println!("Error     [{}] {}", kind, message),
            None => println!("Error     {}", message),
        }
    }
    for warning in &view.warnings {
        println!("Warning   {}", warning);
    }
    println!(
        "Report    {}",
        if view.report_available {
            "available"
        } else {
            "not available"
        }
    );
    if !view.processing_log.is_empty() {
        println!();
        print!("{}", view.processing_log);
    }
    Ok(())
}

fn print_history(page: &HistoryPage, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(page)?);
        return Ok(());
    }

    if page.jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }
    for job in &page.jobs {
        println!(
            "{}  {:<10}  {:<14}  {}  {}",
            job.job_id,
            job.status.as_str(),
            job.mode,
            job.created_at,
            dossier::sanitize::truncate_chars(&job.objective, 48)
        );
    }
    println!(
        "{}-{} of {}",
        page.offset + 1,
        page.offset + page.jobs.len() as u64,
        page.total
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_mode() {
        assert_eq!(infer_mode(0), AnalysisMode::FreeForm);
        assert_eq!(infer_mode(1), AnalysisMode::Document);
        assert_eq!(infer_mode(3), AnalysisMode::MultiDocument);
    }

    #[test]
    fn test_read_documents_keeps_basename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Quarterly notes").unwrap();

        let documents = read_documents(&[path]).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].filename, "notes.txt");
        assert_eq!(documents[0].content, b"Quarterly notes");

        assert!(read_documents(&[dir.path().join("missing.pdf")]).is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config.version, "1.0");
    }

    #[test]
    fn test_describe_event() {
        let event = JobProgressEvent::completed("j1", 4200);
        assert_eq!(describe(&event), "Report ready (4.2s)");
    }
}
