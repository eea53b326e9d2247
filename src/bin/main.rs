use clap::{Parser, Subcommand};
use squeeze::processor::{self, DATA_DIR, LOG_FILE};
use squeeze::{ChangeKind, ChangeMask, ChangeRecord, RunOutcome};
use std::cell::RefCell;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Mutex;
use tracing::{debug, error, level_filters::LevelFilter};
use tracing_subscriber::{fmt, EnvFilter};

const FAILURE: u8 = 1;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(global = true, short, long, default_value = "info")]
    log: LevelFilter,

    /// Log file (defaults to .squeeze/current.log in the project)
    #[arg(global = true, long)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Create a .squeeze directory with an empty config
    Init {
        /// Project root
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },
    /// Run handlers for every change since the last run
    Run {
        /// Directory inside the project
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Print the processed changes as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> squeeze::Result<()> {
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        fmt()
            .with_env_filter(env_filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
            .pretty()
            .init();
    }
    Ok(())
}

/// Where `run` logs: an explicit `--log-file`, else the project's log file.
/// Outside a project there is no data dir, so `None` selects stderr.
fn log_target(explicit: Option<PathBuf>, base_dir: Option<&Path>) -> Option<PathBuf> {
    explicit.or_else(|| base_dir.map(|dir| dir.join(DATA_DIR).join(LOG_FILE)))
}

fn print_changes_summary(changes: &[ChangeRecord]) {
    println!("\n📊 Changes Summary:");
    println!("==================");
    println!("Total changes: {}", changes.len());
    for kind in ChangeKind::ALL {
        let count = changes.iter().filter(|c| c.kind() == kind).count();
        println!("  {:<9} {count}", format!("{kind}:"));
    }

    for kind in ChangeKind::ALL {
        let mut matching = changes.iter().filter(|c| c.kind() == kind).peekable();
        if matching.peek().is_none() {
            continue;
        }
        let (title, marker) = match kind {
            ChangeKind::Added => ("✨ Added Files", "+"),
            ChangeKind::Modified => ("🔄 Modified Files", "~"),
            ChangeKind::Deleted => ("❌ Deleted Files", "-"),
            ChangeKind::Copied => ("📄 Copied Files", "="),
            ChangeKind::Renamed => ("🚚 Renamed Files", ">"),
        };
        println!("\n{title}:");
        for change in matching {
            println!("  {marker} {}", change.paths().join(" -> "));
        }
    }
}

fn run(path: &Path, json: bool, log: LevelFilter, log_file: Option<PathBuf>) -> squeeze::Result<()> {
    let base_dir = processor::find_base_dir(path);
    let log_file = log_target(log_file, base_dir.as_deref().ok());
    init_logging(log, log_file.as_deref())?;
    let base_dir = base_dir?;

    let mut squeeze = squeeze::open(&base_dir)?;

    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&changes);
    squeeze.add_handler(ChangeMask::ALL, move |kind, paths: &[String]| {
        sink.borrow_mut().push(ChangeRecord::new(kind, paths.to_vec())?);
        Ok(())
    });

    let outcome = squeeze.run()?;
    squeeze.release()?;
    debug!(outcome = ?outcome, "Run finished");

    let changes = changes.borrow();
    if json {
        println!("{}", serde_json::to_string_pretty(&*changes)?);
        return Ok(());
    }
    match outcome {
        RunOutcome::NoCommits => println!("There are currently no commits in repo"),
        RunOutcome::UpToDate { revision } => println!("Already up to date at {revision}"),
        RunOutcome::Processed { to, .. } => {
            print_changes_summary(&changes);
            println!("\nProcessed up to {to}");
        }
    }
    Ok(())
}

fn execute(cli: Cli) -> squeeze::Result<()> {
    match cli.command {
        Command::Init { path } => {
            init_logging(cli.log, cli.log_file.as_deref())?;
            let data_dir = processor::init(&path)?;
            println!("Initialized squeeze project in {}", data_dir.display());
            Ok(())
        }
        Command::Run { path, json } => run(&path, json, cli.log, cli.log_file),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Aborting");
            eprintln!("ERROR {e}");
            ExitCode::from(FAILURE)
        }
    }
}
