//! Calltrace CLI - render nested call logs

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

use calltrace::{
    DumpStats, FixSuggestion, Reader, RenderConfig, Resolver, SqliteContainer, TextRenderer,
    TraceError,
};

#[derive(Parser)]
#[command(name = "calltrace")]
#[command(about = "Calltrace - render nested call logs as indented text")]
#[command(version)]
struct Cli {
    /// Show debug logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump a SQLite log as indented text
    Dump {
        /// Path to the SQLite log
        input: PathBuf,

        /// Output file (default: stdout)
        output: Option<PathBuf>,

        /// Indentation unit, repeated once per depth level
        #[arg(short = 't', long = "tab")]
        tab: Option<String>,

        /// Prefix each line with its timestamp
        #[arg(long)]
        timestamps: bool,

        /// YAML file with render settings (indent, timestamps)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check that a log describes a properly nested call tree
    Validate {
        /// Path to the SQLite log
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout only carries the dump
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Commands::Dump {
            input,
            output,
            tab,
            timestamps,
            config,
        } => dump(input, output, tab, timestamps, config),
        Commands::Validate { input } => validate(input),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn dump(
    input: PathBuf,
    output: Option<PathBuf>,
    tab: Option<String>,
    timestamps: bool,
    config: Option<PathBuf>,
) -> Result<(), TraceError> {
    let config = match config {
        Some(path) => RenderConfig::load(&path)?,
        None => RenderConfig::default(),
    }
    .with_overrides(tab, timestamps);

    let container = SqliteContainer::open(&input)?;
    let reader = Reader::new(&container)?;
    let renderer = TextRenderer::new(config);

    let stats = match output {
        Some(path) => dump_to_file(&renderer, &reader, &path)?,
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            renderer.dump(&reader, &mut out)?
        }
    };

    if stats.malformed > 0 {
        eprintln!(
            "{} {} event(s) could not be rendered",
            "Warning:".yellow().bold(),
            stats.malformed
        );
    }
    Ok(())
}

/// Render next to the target and move it into place only once the dump is complete
fn dump_to_file(
    renderer: &TextRenderer,
    reader: &Reader<'_>,
    path: &Path,
) -> Result<DumpStats, TraceError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // Dropped (and deleted) on error, leaving any existing target untouched
    let staged = NamedTempFile::new_in(dir)?;
    let stats = renderer.dump(reader, &mut BufWriter::new(staged.as_file()))?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(stats)
}

/// Resolve every tracer without writing depths back into the log
fn validate(input: PathBuf) -> Result<(), TraceError> {
    let container = SqliteContainer::open(&input)?;
    let summary = Resolver::new(&container).check_all()?;

    let mut out = io::stdout().lock();
    writeln!(out, "{} Log '{}' is valid", "✓".green(), input.display())?;
    writeln!(out, "  Tracers: {}", summary.tracers)?;
    writeln!(out, "  Writers: {}", summary.writers)?;
    match summary.max_depth {
        Some(depth) => writeln!(out, "  Max depth: {}", depth)?,
        None => writeln!(out, "  Max depth: -")?,
    }
    Ok(())
}
