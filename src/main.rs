mod error;
mod history;
mod lock;
mod metadata;
mod preferences;
mod repo;
mod status;
mod substrate;
mod trace;
mod tracked;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use error::MemError;
use history::Snapshot;
use metadata::{Operation, Source};
use repo::{Amended, Jump, Repo, Staged, Turn};
use status::FileState;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mem", version, about = "Prompt-aware snapshots of a project's files")]
struct Cli {
    /// Project root
    #[arg(long, global = true, default_value = ".")]
    loc: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

/// What the change was for.
#[derive(Args)]
struct TurnArgs {
    /// Prompt that led to the change
    #[arg(short, long)]
    prompt: Option<String>,
    /// Response that accompanied the change
    #[arg(short, long)]
    response: Option<String>,
    /// Mark the change as made by the user rather than the assistant
    #[arg(long)]
    by_user: bool,
}

impl TurnArgs {
    fn turn(self) -> Turn {
        Turn::new(self.prompt, self.response, Source::from_by_user(self.by_user))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create .mem/ in the project root
    Init,
    /// Start tracking files or directories
    Track {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        turn: TurnArgs,
    },
    /// Record the tracked files as a new snapshot
    Snap {
        /// Skip the snapshot when no tracked file changed
        #[arg(long)]
        skip_empty: bool,
        #[command(flatten)]
        turn: TurnArgs,
    },
    /// Rename a tracked file
    Rename {
        old: PathBuf,
        new: PathBuf,
        #[command(flatten)]
        turn: TurnArgs,
    },
    /// Stop tracking a file
    Remove {
        path: PathBuf,
        /// Also delete the file from disk
        #[arg(short = 'u', long)]
        unlink: bool,
        #[command(flatten)]
        turn: TurnArgs,
    },
    /// Replace the prompt or response recorded for a snapshot
    Amend {
        /// Prompt id or commit prefix
        reference: String,
        #[arg(short, long)]
        prompt: Option<String>,
        #[arg(short, long)]
        response: Option<String>,
    },
    /// List snapshots, oldest first
    History,
    /// Show one snapshot and its changes
    Show {
        /// Prompt id or commit prefix
        reference: String,
    },
    /// Restore the tracked files to a snapshot
    Jump {
        /// Prompt id or commit prefix
        reference: String,
    },
    /// Compare the working directory with the current snapshot
    Status,
    /// Write the full history with diffs as JSON
    Export {
        /// Destination file (default: <root>/trace.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MEMOV_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        match err.downcast_ref::<MemError>() {
            Some(e) => {
                eprintln!("mem: {}: {e}", e.kind());
                process::exit(e.exit_code());
            }
            None => {
                eprintln!("mem: {err:#}");
                process::exit(2);
            }
        }
    }
}

/// Paths on the command line are relative to where `mem` was run, not to
/// `--loc`.
fn from_cwd(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

fn run(cli: Cli) -> Result<()> {
    let root = cli.loc;
    match cli.cmd {
        Command::Init => {
            let repo = Repo::init(&root)?;
            println!("Initialized memov in {}", repo.root().display());
        }
        Command::Track { paths, turn } => {
            let mut repo = Repo::open(&root)?;
            let paths = paths
                .iter()
                .map(|p| from_cwd(p))
                .collect::<Result<Vec<_>>>()?;
            let staged = repo.track(&paths, &turn.turn())?;
            for path in &staged.paths {
                println!("Tracking {path}");
            }
            print_recorded(&staged);
        }
        Command::Snap { skip_empty, turn } => {
            let mut repo = Repo::open(&root)?;
            let force_empty = repo.prefs.snap_allow_empty && !skip_empty;
            match repo.snapshot(&turn.turn(), Operation::Snap, force_empty)? {
                Some(snapshot) => println!("Recorded {}", label(&snapshot)),
                None => println!("Nothing to snapshot"),
            }
        }
        Command::Rename { old, new, turn } => {
            let mut repo = Repo::open(&root)?;
            let staged = repo.rename(&from_cwd(&old)?, &from_cwd(&new)?, &turn.turn())?;
            println!("Renamed {} -> {}", staged.paths[0], staged.paths[1]);
            print_recorded(&staged);
        }
        Command::Remove { path, unlink, turn } => {
            let mut repo = Repo::open(&root)?;
            let staged = repo.remove(&from_cwd(&path)?, unlink, &turn.turn())?;
            let verb = if unlink { "Deleted" } else { "Untracked" };
            println!("{verb} {}", staged.paths[0]);
            print_recorded(&staged);
        }
        Command::Amend {
            reference,
            prompt,
            response,
        } => {
            let mut repo = Repo::open(&root)?;
            match repo.amend(&reference, prompt, response)? {
                Amended::Updated(s) => println!("Amended {}", label(&s)),
                Amended::Unchanged(s) => println!("{} already says that", label(&s)),
            }
        }
        Command::History => {
            let mut repo = Repo::open(&root)?;
            print_history(&mut repo)?;
        }
        Command::Show { reference } => {
            let mut repo = Repo::open(&root)?;
            print_show(&mut repo, &reference)?;
        }
        Command::Jump { reference } => {
            let mut repo = Repo::open(&root)?;
            match repo.jump(&reference)? {
                Jump::Moved { from, to } => match from {
                    Some(from) => println!("Jumped from {} to {}", label(&from), label(&to)),
                    None => println!("Jumped to {}", label(&to)),
                },
                Jump::AlreadyCurrent(s) => println!("Already at {}", label(&s)),
            }
        }
        Command::Status => {
            let mut repo = Repo::open(&root)?;
            print_status(&mut repo)?;
        }
        Command::Export { output } => {
            let mut repo = Repo::open(&root)?;
            let output = match output {
                Some(path) => from_cwd(&path)?,
                None => repo.root().join(trace::DEFAULT_FILENAME),
            };
            let count = trace::export(&mut repo, &output)?;
            println!("Exported {count} snapshots to {}", output.display());
        }
    }
    Ok(())
}

fn label(snapshot: &Snapshot) -> String {
    format!("snapshot #{} ({})", snapshot.prompt_id, snapshot.short_id())
}

fn print_recorded(staged: &Staged) {
    if let Some(snapshot) = &staged.snapshot {
        println!("Recorded {}", label(snapshot));
    }
}

/// Single-line preview, cut at `width` characters.
fn truncate(text: Option<&str>, width: usize) -> String {
    let Some(text) = text else {
        return "None".to_string();
    };
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        flat
    } else {
        let cut: String = flat.chars().take(width).collect();
        format!("{cut}...")
    }
}

fn print_history(repo: &mut Repo) -> Result<()> {
    let history = repo.history()?;
    if history.is_empty() {
        println!("No snapshots yet");
        return Ok(());
    }
    let current = repo.current_snapshot()?.map(|s| s.commit_id);
    let width = repo.prefs.history_width;
    let col = width + 3;
    println!(
        "  {:<5} {:<7} {:<7}  {:<col$}  {:<col$}  TIME",
        "ID", "OP", "COMMIT", "PROMPT", "RESPONSE"
    );
    for snapshot in history.iter() {
        let marker = if Some(snapshot.commit_id) == current { "*" } else { " " };
        println!(
            "{marker} {:<5} {:<7} {:<7}  {:<col$}  {:<col$}  {}",
            format!("#{}", snapshot.prompt_id),
            snapshot.operation.as_str(),
            snapshot.short_id(),
            truncate(snapshot.prompt.as_deref(), width),
            truncate(snapshot.response.as_deref(), width),
            trace::format_timestamp(snapshot.timestamp),
        );
    }
    Ok(())
}

fn print_show(repo: &mut Repo, reference: &str) -> Result<()> {
    let detail = repo.show(reference)?;
    let s = &detail.snapshot;
    println!("Snapshot #{}", s.prompt_id);
    println!("Commit:    {}", s.commit_id);
    match s.parent_commit_id {
        Some(parent) => println!("Parent:    {parent}"),
        None => println!("Parent:    none"),
    }
    println!("Operation: {}", s.operation);
    println!("Source:    {}", s.source);
    println!("Time:      {}", trace::format_timestamp(s.timestamp));
    println!("Prompt:    {}", s.prompt.as_deref().unwrap_or("None"));
    println!("Response:  {}", s.response.as_deref().unwrap_or("None"));

    println!();
    if detail.changes.is_empty() {
        println!("No file changes");
    }
    for change in &detail.changes {
        match &change.old_path {
            Some(old) => println!("{:?}: {old} -> {}", change.kind, change.path),
            None => println!("{:?}: {}", change.kind, change.path),
        }
        if !change.patch.is_empty() {
            print!("{}", change.patch);
        }
    }

    println!();
    println!("Files:");
    for entry in repo.entries_of(Some(s))? {
        println!("  {}", entry.path);
    }
    Ok(())
}

fn print_status(repo: &mut Repo) -> Result<()> {
    let report = repo.status()?;
    let current = repo.current_snapshot()?;
    match &current {
        Some(s) => println!("On {}", label(s)),
        None => println!("No snapshots yet"),
    }
    for entry in &report.tracked {
        if entry.state != FileState::Unchanged {
            println!("  {:<10} {}", format!("{}:", entry.state.label()), entry.path);
        }
    }
    for path in &report.removed {
        println!("  {:<10} {path}", "removed:");
    }
    for path in &report.untracked {
        println!("  {:<10} {path}", "untracked:");
    }
    if report.is_clean() {
        println!("Working tree clean");
    }
    Ok(())
}
