//! Saison Backup - Command-line interface for the backup engine.
//!
//! This is a simple CLI for manual exports and restores of a Saison data
//! directory. It provides argument parsing and progress reporting to stderr.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use saison_engine::{
    archive, check_source, cross_check,
    worker::{self, BackupTask, TaskOutcome},
    BackupFacade, BackupProgress, BackupSelection, CompatibilityReport, EngineConfig,
    ExportSummary, ImportPreview, JsonFlagStore, Operation, RecordType, RestoreSummary, StoreSet,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Saison Backup - export and restore scheduling data
#[derive(Parser, Debug)]
#[command(name = "saison-backup")]
#[command(version = "0.1.0")]
#[command(about = "Export, preview and restore Saison backups")]
struct Args {
    /// Directory holding the record stores
    #[arg(long, value_name = "PATH", global = true, default_value = "saison-data")]
    data: PathBuf,

    /// Engine configuration file (TOML)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export one record type to a JSON file
    Export {
        /// Record type: tasks, courses, events, routines, subscriptions,
        /// pomodoro_sessions, semesters or preferences
        #[arg(long = "type", value_name = "TYPE")]
        record_type: String,

        /// Destination file or directory
        #[arg(long, value_name = "PATH")]
        dst: PathBuf,
    },

    /// Export several record types to a zip archive
    ExportAll {
        /// Destination file or directory
        #[arg(long, value_name = "PATH")]
        dst: PathBuf,

        /// Comma-separated record types (defaults to the last-used selection)
        #[arg(long, value_name = "TYPES", value_delimiter = ',')]
        types: Vec<String>,
    },

    /// Import a JSON file or zip archive
    Import {
        /// Backup file to restore
        #[arg(long, value_name = "PATH")]
        src: PathBuf,

        /// Record type of a JSON file (detected when omitted; ignored for
        /// archives and with --dry-run)
        #[arg(long = "type", value_name = "TYPE")]
        record_type: Option<String>,

        /// Only show what would be imported
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what importing a backup would do
    Preview {
        /// Backup file to inspect
        #[arg(long, value_name = "PATH")]
        src: PathBuf,
    },

    /// Check that backups follow the interchange format
    Check {
        /// Backup file to check
        #[arg(long, value_name = "PATH")]
        src: PathBuf,

        /// A second producer's backup to cross-check against
        #[arg(long, value_name = "PATH")]
        against: Option<PathBuf>,
    },

    /// Show or change the remembered export selection
    Selection {
        /// Comma-separated record types to select
        #[arg(long, value_name = "TYPES", value_delimiter = ',')]
        set: Vec<String>,
    },
}

/// CLI implementation of BackupProgress for displaying operation progress
struct CliProgress {
    verbose: bool,
    start_time: Instant,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let millis = elapsed.as_millis();
        if millis < 1000 {
            return format!("{}ms", millis);
        }
        let secs = elapsed.as_secs();
        let mins = secs / 60;
        let secs = secs % 60;

        if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }
}

impl BackupProgress for CliProgress {
    fn on_started(&self, operation: Operation) {
        eprintln!("Starting {}...", operation);
    }

    fn on_type_processed(&self, _operation: Operation, record_type: RecordType, count: usize) {
        if self.verbose {
            eprintln!("  {:<18} {:>6}", record_type.slug(), count);
        }
    }

    fn on_completed(&self, operation: Operation) {
        eprintln!(
            "Finished {} in {}",
            operation,
            Self::format_duration(self.start_time.elapsed())
        );
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Exit code tracking
    let exit_code = match run_cli(&args).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
async fn run_cli(args: &Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let facade = Arc::new(open_facade(&args.data, config, args.verbose));

    match &args.command {
        Command::Export { record_type, dst } => {
            let record_type = parse_record_type(record_type)?;
            let task = BackupTask::ExportSingle {
                record_type,
                destination: dst.clone(),
            };
            report_outcome(run_task(facade, task).await?)
        }
        Command::ExportAll { dst, types } => {
            let selection = if types.is_empty() {
                facade.selection()?
            } else {
                parse_selection(types)?
            };
            let task = BackupTask::ExportSelected {
                selection,
                destination: dst.clone(),
            };
            report_outcome(run_task(facade, task).await?)
        }
        Command::Import {
            src,
            record_type,
            dry_run,
        } => {
            if !src.exists() {
                bail!("Backup file does not exist: {}", src.display());
            }
            let is_archive = archive::is_archive(src).await;
            if record_type.is_some() {
                if let Some(reason) = ignored_type_reason(*dry_run, is_archive) {
                    warn!("--type is ignored {}", reason);
                }
            }
            let task = if *dry_run {
                BackupTask::Preview { source: src.clone() }
            } else if is_archive {
                BackupTask::ImportArchive { source: src.clone() }
            } else {
                BackupTask::ImportSingle {
                    source: src.clone(),
                    declared_type: record_type.as_deref().map(parse_record_type).transpose()?,
                }
            };
            report_outcome(run_task(facade, task).await?)
        }
        Command::Preview { src } => {
            let task = BackupTask::Preview { source: src.clone() };
            report_outcome(run_task(facade, task).await?)
        }
        Command::Check { src, against } => {
            let report = match against {
                Some(other) => cross_check(src, other, facade.config()).await?,
                None => check_source(src, facade.config()).await?,
            };
            print_compatibility(&report);
            if report.compatible {
                Ok(())
            } else {
                Err(anyhow!("Backup is not compatible"))
            }
        }
        Command::Selection { set } => {
            if !set.is_empty() {
                facade.set_selection(&parse_selection(set)?)?;
            }
            let selection = facade.selection()?;
            for ty in RecordType::ALL {
                let mark = if selection.is_enabled(ty) { "x" } else { " " };
                println!("[{}] {}", mark, ty.slug());
            }
            Ok(())
        }
    }
}

fn open_facade(data_dir: &Path, config: EngineConfig, verbose: bool) -> BackupFacade {
    BackupFacade::new(
        StoreSet::json_dir(data_dir),
        Arc::new(JsonFlagStore::new(data_dir.join("flags.json"))),
    )
    .with_config(config)
    .with_progress(Arc::new(CliProgress::new(verbose)))
}

/// Run a task in the background, cancelling it on Ctrl-C.
async fn run_task(facade: Arc<BackupFacade>, task: BackupTask) -> anyhow::Result<TaskOutcome> {
    let handle = worker::spawn(facade, task);
    let abort = handle.abort_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling...");
            abort.abort();
        }
    });

    let result = handle.wait().await;
    interrupt.abort();
    Ok(result?)
}

/// Why an import would not use a declared `--type`, if it would not.
fn ignored_type_reason(dry_run: bool, is_archive: bool) -> Option<&'static str> {
    if dry_run {
        Some("with --dry-run; the preview detects the type from content")
    } else if is_archive {
        Some("for archives")
    } else {
        None
    }
}

fn parse_record_type(name: &str) -> anyhow::Result<RecordType> {
    name.parse::<RecordType>().map_err(|e| {
        anyhow!(
            "{}. Must be one of: {}",
            e,
            RecordType::ALL.map(|ty| ty.slug()).join(", ")
        )
    })
}

fn parse_selection(names: &[String]) -> anyhow::Result<BackupSelection> {
    let mut selection = BackupSelection::none();
    for name in names {
        selection.set(parse_record_type(name.trim())?, true);
    }
    Ok(selection)
}

fn report_outcome(outcome: TaskOutcome) -> anyhow::Result<()> {
    match outcome {
        TaskOutcome::Exported(summary) => print_export(&summary),
        TaskOutcome::Restored(summary) => print_restore(&summary),
        TaskOutcome::Previewed(preview) => print_preview(&preview),
    }
    Ok(())
}

fn print_export(summary: &ExportSummary) {
    let types: Vec<&str> = summary.exported_types.iter().map(|ty| ty.slug()).collect();
    info!(destination = %summary.destination.display(), "export written");
    eprintln!();
    eprintln!("Export complete!");
    eprintln!("  Records: {} ({})", summary.total_items, types.join(", "));
    eprintln!("  File: {}", summary.destination.display());
    eprintln!("  Size: {}", CliProgress::format_bytes(summary.size_bytes));
    eprintln!("  Checksum: {}", summary.checksum.to_string_with_algo());
}

fn print_restore(summary: &RestoreSummary) {
    eprintln!();
    eprintln!("Import complete!");
    for (ty, count) in summary.per_type() {
        eprintln!("  {:<18} {:>6} imported", ty.slug(), count);
    }
    eprintln!(
        "Summary: {} imported, {} skipped as duplicates",
        summary.total_imported(),
        summary.skipped_duplicates
    );

    if !summary.degraded_types.is_empty() {
        eprintln!();
        eprintln!("Unreadable entries (nothing imported):");
        for ty in &summary.degraded_types {
            eprintln!("  {}", ty.entry_name());
        }
    }
}

fn print_preview(preview: &ImportPreview) {
    let kind = if preview.is_zip_file { "archive" } else { "single file" };
    eprintln!();
    eprintln!("Preview of {}:", kind);
    for (ty, count) in &preview.counts {
        eprintln!("  {:<18} {:>6}", ty.slug(), count);
    }
    eprintln!(
        "Summary: {} records, {} new, {} duplicates",
        preview.total_items(),
        preview.new_items,
        preview.duplicate_items
    );
}

fn print_compatibility(report: &CompatibilityReport) {
    let verdict = |ok: bool| if ok { "OK" } else { "FAILED" };
    eprintln!("File names:   {}", verdict(report.file_names));
    eprintln!("Entry names:  {}", verdict(report.entry_names));
    eprintln!("Contents:     {}", verdict(report.contents));
    eprintln!("Compatible:   {}", verdict(report.compatible));

    if !report.problems.is_empty() {
        eprintln!();
        eprintln!("Problems:");
        for problem in &report.problems {
            eprintln!("  {}", problem);
        }
    }
}
