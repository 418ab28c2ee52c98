//! Rescan CLI: maintenance commands for the incremental analysis cache.
//!
//! Provides `rescan cache stats|clear|list|invalidate|optimize` for
//! inspecting, pruning and resetting the per-file result cache that analysis
//! tools share between runs.

#![warn(missing_docs)]

mod cache;
mod logging;
mod project;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use crate::project::Project;

/// Rescan: incremental static analysis.
#[derive(Parser, Debug)]
#[command(name = "rescan", version, about = "Rescan analysis cache tools")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a `rescan.toml` file or the directory containing it.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect and maintain the analysis cache.
    Cache(CacheArgs),
}

/// Arguments for the `rescan cache` subcommand.
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// The cache operation to run.
    #[command(subcommand)]
    pub command: CacheCommand,
}

/// Cache operations.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show hit/miss counters and per-namespace disk usage.
    Stats {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete cached entries.
    Clear {
        /// Which namespace to clear.
        #[arg(long = "type", value_enum, default_value_t = ClearType::All)]
        kind: ClearType,

        /// Clear a single pattern's results (takes precedence over `--type`).
        #[arg(long)]
        pattern: Option<String>,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
    /// List tracked files and their recorded digests.
    List {
        /// Print the list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Drop every cached result for one source file.
    Invalidate {
        /// Source file path.
        path: PathBuf,
    },
    /// Remove entries older than a maximum age.
    Optimize {
        /// Maximum entry age in days (default: `cache.max_age_days` from config).
        #[arg(long)]
        max_age_days: Option<u64>,
    },
}

/// Namespace selection for `rescan cache clear`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClearType {
    /// Parse results.
    Parse,
    /// Pattern-match results of every pattern.
    Patterns,
    /// Analysis summaries.
    Analysis,
    /// Everything, including the index and statistics.
    All,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
    };

    let result = Project::resolve(&global).and_then(|project| {
        logging::init(&global, &project.config.log.level);
        tracing::debug!(
            root = %project.root.display(),
            cache_dir = %project.cache_dir().display(),
            "resolved project"
        );
        match cli.command {
            Command::Cache(ref args) => cache::run(args, &project, &global),
        }
    });

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
