//! AutoHeal CLI - launch healing runs and follow them to their result
//!
//! Usage:
//!   autoheal start --repo <URL> --team <NAME> --lead <NAME> [--mode manual]
//!   autoheal watch <RUN_ID>
//!   autoheal result <RUN_ID> --export healing_result.json

use anyhow::{Context, Result};
use autoheal::board::{StepBoard, StepStatus};
use autoheal::launcher::{LaunchRequest, RunLauncher};
use autoheal::model::{FixMode, HealingResult, ResultExport, Run};
use autoheal::session::{SessionContext, SessionObserver, SessionOutcome, SessionState};
use autoheal::{ConsoleConfig, HealingBackend, HttpBackend, SessionRegistry};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::{ColoredString, Colorize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// AutoHeal - operator console for the CI healing agent
#[derive(Debug, Parser)]
#[command(name = "autoheal", version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config and AUTOHEAL_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a healing run and follow it to the end
    Start {
        /// Repository URL to heal
        #[arg(long)]
        repo: String,

        /// Team name
        #[arg(long)]
        team: String,

        /// Team lead name
        #[arg(long)]
        lead: String,

        /// Base branch
        #[arg(long, default_value = "main")]
        branch: String,

        /// Fix mode
        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Follow an existing run
    Watch {
        run_id: String,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Fetch and print the result of a finished run
    Result {
        run_id: String,

        #[command(flatten)]
        export: ExportArgs,
    },
}

#[derive(Debug, Args)]
struct ExportArgs {
    /// Export the result as JSON (to the configured export path if no PATH is given)
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    export: Option<Option<PathBuf>>,
}

impl ExportArgs {
    fn resolve(self, default: &Path) -> Option<PathBuf> {
        self.export
            .map(|path| path.unwrap_or_else(|| default.to_path_buf()))
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Auto,
    Manual,
}

impl From<ModeArg> for FixMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => FixMode::Auto,
            ModeArg::Manual => FixMode::Manual,
        }
    }
}

/// Prints the transcript as it arrives and the board when it changes
struct TerminalObserver;

impl SessionObserver for TerminalObserver {
    fn state_changed(&self, state: SessionState) {
        if state == SessionState::Draining {
            eprintln!("{}", "Log stream closed, fetching result...".dimmed());
        }
    }

    fn message_observed(&self, _index: usize, message: &str) {
        eprintln!("  {}", color_line(message));
        let _ = std::io::stderr().flush();
    }

    fn board_updated(&self, board: &StepBoard) {
        print_board(board);
    }
}

fn color_line(line: &str) -> ColoredString {
    if line.starts_with("[ERROR") {
        line.red()
    } else if line.starts_with("[FIX") {
        line.yellow()
    } else if line.starts_with("[GIT]") {
        line.cyan()
    } else if line.starts_with("[RESULT]") {
        line.green().bold()
    } else if line.starts_with("[CLONE]") || line.starts_with("[ANALYSIS]") {
        line.blue()
    } else {
        line.dimmed()
    }
}

fn status_marker(status: StepStatus) -> ColoredString {
    match status {
        StepStatus::Pending => "○".dimmed(),
        StepStatus::Running => "◐".yellow(),
        StepStatus::Done => "●".green(),
        StepStatus::Failed => "✗".red(),
    }
}

fn print_board(board: &StepBoard) {
    eprintln!("{}", "┌─ Pipeline ─────────────────────────────────".cyan());
    for step in board.steps() {
        eprintln!(
            "{} {} {:<26} {}",
            "│".cyan(),
            status_marker(step.status),
            step.name,
            step.status.to_string().dimmed()
        );
    }
    eprintln!("{}", "└────────────────────────────────────────────".cyan());
}

fn print_run_header(run: &Run) {
    eprintln!();
    eprintln!("{}", "╭──────────────────────────────────────────────╮".blue());
    eprintln!("{}  {}", "│".blue(), "AutoHeal CI - healing run".bold());
    eprintln!("{}  {}   {}", "│".blue(), "Run:".dimmed(), run.run_id);
    eprintln!("{}  {}  {}", "│".blue(), "Repo:".dimmed(), run.repo_url);
    eprintln!(
        "{}  {}  {} (lead: {})",
        "│".blue(),
        "Team:".dimmed(),
        run.team_name,
        run.team_lead
    );
    eprintln!(
        "{}  {}  {} -> {} ({} mode)",
        "│".blue(),
        "Branch:".dimmed(),
        run.branch,
        run.fix_branch(),
        run.fix_mode
    );
    eprintln!("{}", "╰──────────────────────────────────────────────╯".blue());
    eprintln!();
}

fn print_result(result: &HealingResult) {
    let success = result.is_success();
    let title = if success { "Healing Successful" } else { "Healing Failed" };
    let paint = |s: &str| if success { s.green() } else { s.red() };

    eprintln!();
    eprintln!("{}", paint("╭──────────────────────────────────────────────╮"));
    eprintln!("{}  {}", paint("│"), title.bold());
    eprintln!("{}  {}  {}", paint("│"), "Repository:".dimmed(), result.repo);
    eprintln!(
        "{}  {}      {}",
        paint("│"),
        "Branch:".dimmed(),
        result.branch.as_deref().unwrap_or("-")
    );
    eprintln!(
        "{}  {}    {}   {} {}",
        paint("│"),
        "Attempts:".dimmed(),
        result.attempts,
        "Commits:".dimmed(),
        result.commits
    );
    if let Some(total) = result.total_time {
        eprintln!("{}  {}        {}s", paint("│"), "Time:".dimmed(), total);
    }
    if result.files_changed.is_empty() {
        eprintln!("{}  {} none", paint("│"), "Files changed:".dimmed());
    } else {
        eprintln!("{}  {}", paint("│"), "Files changed:".dimmed());
        for file in &result.files_changed {
            eprintln!("{}    - {}", paint("│"), file);
        }
    }
    if !result.is_success() {
        eprintln!(
            "{}  {}  {}",
            paint("│"),
            "Error:".dimmed(),
            result.last_error.as_deref().unwrap_or("Unknown error").red()
        );
    }
    if let Some(fix) = &result.primary_fix {
        eprintln!("{}  {}  {}", paint("│"), "Primary fix:".dimmed(), fix);
    }
    if let Some(fix) = &result.alternative_fix {
        eprintln!("{}  {}  {}", paint("│"), "Alternative:".dimmed(), fix);
    }
    eprintln!("{}", paint("╰──────────────────────────────────────────────╯"));
    println!("{}", result.summary);
}

fn export_result(result: &HealingResult, path: &Path) -> Result<()> {
    ResultExport::new(result, Utc::now())
        .write_to(path)
        .with_context(|| format!("Failed to export result to {}", path.display()))?;
    eprintln!("{} {}", "Exported result to".dimmed(), path.display());
    Ok(())
}

fn init_logging(config: &ConsoleConfig, verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => config.log_level.parse().unwrap_or(Level::INFO),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Follow a run to its end. Returns true on a retrieved result.
async fn watch(
    backend: Arc<dyn HealingBackend>,
    run_id: &str,
    export: Option<PathBuf>,
) -> Result<bool> {
    let registry = SessionRegistry::new();
    let observer = Arc::new(TerminalObserver);
    let session = registry.open(backend, SessionContext::new(run_id, observer))?;

    let (cancel, task) = session.spawn();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, closing log stream");
            cancel.cancel();
        }
    });

    let outcome = task.await.context("Session task panicked")?;
    ctrl_c.abort();

    match outcome {
        SessionOutcome::Completed { result, progress } => {
            info!(messages = progress.transcript.len(), "Run finished");
            print_result(&result);
            if let Some(path) = export {
                export_result(&result, &path)?;
            }
            Ok(true)
        }
        SessionOutcome::FetchFailed { error, progress } => {
            eprintln!(
                "{} {} ({} log lines received)",
                "Failed to fetch result:".red().bold(),
                error,
                progress.transcript.len()
            );
            if let Some(context) = &progress.error_context {
                eprintln!("{} {}", "Last error:".dimmed(), context);
            }
            Ok(false)
        }
        SessionOutcome::Rejected { error, .. } => {
            eprintln!("{} {}", "Cannot follow run:".red().bold(), error);
            Ok(false)
        }
        SessionOutcome::Cancelled { progress } => {
            eprintln!(
                "{} ({} log lines received)",
                "Run watch cancelled".yellow(),
                progress.transcript.len()
            );
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConsoleConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_process_env();
    if let Some(base) = &cli.api_base {
        config = config.with_api_base(base);
    }

    init_logging(&config, cli.verbose)?;
    info!(api_base = %config.api_base, "AutoHeal console v{}", env!("CARGO_PKG_VERSION"));

    let backend: Arc<dyn HealingBackend> =
        Arc::new(HttpBackend::new(&config).context("Failed to create HTTP client")?);
    let default_export = config.export_path.clone();

    let succeeded = match cli.command {
        Command::Start {
            repo,
            team,
            lead,
            branch,
            mode,
            export,
        } => {
            let launcher = RunLauncher::new(Arc::clone(&backend));
            let request = LaunchRequest::new(repo, team, lead)
                .with_branch(branch)
                .with_fix_mode(mode.into());
            let run = launcher.launch(request).await?;
            print_run_header(&run);
            watch(backend, &run.run_id, export.resolve(&default_export)).await?
        }
        Command::Watch { run_id, export } => {
            watch(backend, &run_id, export.resolve(&default_export)).await?
        }
        Command::Result { run_id, export } => {
            let result = backend
                .fetch_result(&run_id)
                .await
                .with_context(|| format!("Failed to fetch result for run {run_id}"))?;
            print_result(&result);
            if let Some(path) = export.resolve(&default_export) {
                export_result(&result, &path)?;
            }
            true
        }
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
