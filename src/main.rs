mod backlink;
mod commands;
mod config;
mod diagnostics;
mod document;
mod engine;
mod error;
mod info;
mod markup;
mod notifier;
mod resolver;
mod scanner;
mod types;
mod watch;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::OutputFormat;
use crate::config::{CONFIG_FILE, Config};

/// Environment variable holding the log filter, e.g. `SIDENOTES_LOG=debug`.
const LOG_ENV: &str = "SIDENOTES_LOG";

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: u8 = 3;

/// Command-line interface.
#[derive(Parser)]
#[command(name = "sidenotes", about = "Place footnotes as margin sidenotes next to their references")]
struct Cli {
    /// Config file to use instead of ./.sidenotes.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Place every page with a snapshot under a directory, writing <page>.sidenotes.json
    Batch {
        /// Directory to walk
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Print conventions, settings, and exit codes
    Info {
        /// Output as JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
    /// Scan, measure, and resolve one page, printing overlay positions
    Place {
        /// Rendered HTML page
        page: PathBuf,
        /// Layout snapshot (defaults to <page>.layout.json)
        #[arg(long)]
        layout: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// List the footnotes a page would produce, without resolving positions
    Scan {
        /// Rendered HTML page
        page: PathBuf,
        /// Layout snapshot (defaults to <page>.layout.json)
        #[arg(long)]
        layout: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Re-place a page whenever it or its snapshot changes
    Watch {
        /// Rendered HTML page
        page: PathBuf,
        /// Layout snapshot (defaults to <page>.layout.json)
        #[arg(long)]
        layout: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

/// Set up logging, run the subcommand, and map errors to the runtime exit code.
fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, "warn"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    return match run(cli) {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        },
    };
}

/// Config file the settings come from: the explicit path, or the working
/// directory's config file when one exists.
fn config_source(explicit: Option<&Path>) -> Option<PathBuf> {
    return explicit.map(Path::to_path_buf).or_else(|| {
        let default = Path::new(CONFIG_FILE);
        return default.exists().then(|| return default.to_path_buf());
    });
}

/// Load config and dispatch to the subcommand.
///
/// # Errors
///
/// Returns config errors and errors from the subcommand.
fn run(cli: Cli) -> Result<ExitCode, error::Error> {
    let config = load_config(cli.config.as_deref())?;

    return match cli.command {
        Commands::Place { page, layout, format } => commands::place(&page, layout.as_deref(), config, format),
        Commands::Scan { page, layout, format } => {
            commands::scan(&page, layout.as_deref(), &config, format)?;
            Ok(ExitCode::SUCCESS)
        },
        Commands::Batch { dir } => commands::batch(&dir, &config),
        Commands::Watch { page, layout, format } => {
            let layout = layout.unwrap_or_else(|| return document::default_layout_path(&page));
            watch::run(&page, &layout, config, format)
        },
        Commands::Info { json } => {
            info::run(&config, config_source(cli.config.as_deref()).as_deref(), json);
            Ok(ExitCode::SUCCESS)
        },
    };
}

/// Config from an explicit path, or from the working directory if present.
///
/// # Errors
///
/// Returns `Error::FileNotFound` for a missing explicit path, or config parse errors.
fn load_config(path: Option<&Path>) -> Result<Config, error::Error> {
    return match path {
        Some(path) => Config::load_from(path),
        None => Config::load(Path::new(".")),
    };
}
