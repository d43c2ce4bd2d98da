//! tablemath - Computed Markdown Tables
//!
//! Watches a folder of markdown documents and evaluates the formula cells
//! of their pipe tables. Also offers one-shot commands for indexing,
//! rendering a document and evaluating a single formula.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use tablemath::application::{
    App, AppMode, BulkIndexer, CrossDocumentIndex, DocumentSource, Recalculator,
};
use tablemath::domain::FormulaEvaluator;
use tablemath::infrastructure::{IndexFile, SettingsFile, VaultDirectory, data_dir};
use tablemath::presentation::{render_ui, InputHandler};

/// How long the event loop waits for a key before polling the vault.
const TICK: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "tablemath", version, about = "Computed tables for markdown documents")]
struct Cli {
    /// Folder of markdown documents
    #[arg(long, default_value = ".")]
    vault: PathBuf,

    /// Fraction digits for rendered numbers (0-10)
    #[arg(long)]
    precision: Option<u8>,

    /// Locale tag used for number formatting, e.g. de-DE
    #[arg(long)]
    locale: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive watcher (default)
    Watch,
    /// Index every document, then print the variable index as JSON
    Index,
    /// Print a document with its tables computed
    Render {
        /// Document name or path
        document: String,
    },
    /// Evaluate one formula against the stored index
    Eval {
        formula: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Watch);
    let watching = matches!(command, Command::Watch);

    init_logging(&cli.vault, cli.verbose, watching)?;

    let mut settings = SettingsFile::in_vault(&cli.vault).load();
    if let Some(precision) = cli.precision {
        settings.precision = precision;
    }
    if let Some(locale) = cli.locale {
        settings.locale = locale;
    }
    let settings = settings.normalized();

    let mut index = CrossDocumentIndex::new(Box::new(IndexFile::in_vault(&cli.vault)));
    index.load();
    let mut recalc = Recalculator::new(settings, index);
    let vault = VaultDirectory::new(&cli.vault);

    match command {
        Command::Watch => run_watch(recalc, vault),
        Command::Index => {
            let progress = BulkIndexer::new(vault.list()).run(&vault, &mut recalc);
            info!(indexed = progress.indexed, failed = progress.failed, "index complete");
            println!("{}", serde_json::to_string_pretty(recalc.index().entries())?);
            Ok(())
        }
        Command::Render { document } => {
            let (name, text) = read_document(&vault, &document)?;
            print!("{}", recalc.render(&name, &text));
            Ok(())
        }
        Command::Eval { formula } => {
            let formula = if formula.starts_with('=') { formula } else { format!("={formula}") };
            let evaluator = FormulaEvaluator::new(recalc.index());
            match evaluator.try_evaluate(&formula, &[], 0, 0) {
                Ok(value) => {
                    let currency = evaluator.display_currency(&formula);
                    println!("{}", recalc.formatter().format(value, currency.as_deref()));
                    Ok(())
                }
                Err(err) => bail!("{formula}: {err}"),
            }
        }
    }
}

/// Logs to a file under the vault while the terminal UI owns the screen,
/// to stderr otherwise.
fn init_logging(vault: &Path, verbose: bool, watching: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_max_level(level);

    if watching {
        let dir = data_dir(vault);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("tablemath.log"))
            .context("opening log file")?;
        let subscriber = builder.with_ansi(false).with_writer(Mutex::new(log)).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = builder.with_writer(io::stderr).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

/// Resolves a document argument given as a path or as a document name.
fn read_document(vault: &VaultDirectory, document: &str) -> Result<(String, String)> {
    let path = Path::new(document);
    if path.is_file() {
        let text = fs::read_to_string(path).with_context(|| format!("reading {document}"))?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok((name, text));
    }

    let id = vault
        .list()
        .into_iter()
        .find(|id| id.name == document)
        .with_context(|| format!("no document named {document} in {}", vault.root().display()))?;
    let text = vault.read(&id).with_context(|| format!("reading {}", id.path.display()))?;
    Ok((id.name, text))
}

fn run_watch(recalc: Recalculator, mut vault: VaultDirectory) -> Result<()> {
    vault.prime();
    let export_dir = vault.root().to_path_buf();
    let mut app = App::new(recalc, vault).with_export_dir(export_dir);
    info!(documents = app.documents.len(), "watching vault");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

/// Main event loop: draw, handle at most one key, then poll the vault.
fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App<VaultDirectory>) -> io::Result<()> {
    loop {
        terminal.draw(|f| render_ui(f, app))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') if app.mode == AppMode::Normal => return Ok(()),
                        _ => InputHandler::handle_key_event(app, key.code, key.modifiers),
                    }
                }
            }
        }

        let changes = app.source.scan_changes();
        let now = Instant::now();
        app.apply_changes(changes, now);
        app.tick(now);
    }
}
