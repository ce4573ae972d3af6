//! Clipforge CLI: batch video editing through the media engine.
//!
//! Usage:
//!   clipforge process <INPUTS>...   Edit files (or every video in a directory)
//!   clipforge probe <PATH>          Show what the engine reports for a file
//!   clipforge graph <PATH>          Print the filter graph and engine arguments
//!   clipforge check                 Check engine availability and encoders
//!   clipforge init [PATH]           Write a default settings file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clipforge_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "clipforge",
    about = "Batch video editing: reframe, grade, overlay, caption, and join clips",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Edit one or more files with a settings document
    Process {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Settings JSON (see `clipforge init`)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Output file (single input only)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory for `<name>_edited.mp4` outputs
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Concurrent jobs (defaults to the configured thread count)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Try the hardware encoder first
        #[arg(long)]
        gpu: bool,

        /// Write a JSON batch report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Probe a media file
    Probe {
        /// Path to the media file
        path: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the filter graph and engine arguments without rendering
    Graph {
        /// Path to the input file
        path: PathBuf,

        /// Settings JSON
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },

    /// Check engine availability and encoders
    Check,

    /// Write a default settings file
    Init {
        /// Settings file to create
        #[arg(default_value = "clipforge.json")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,

        /// Also write the default application config if none exists
        #[arg(long)]
        config: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    clipforge_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Process {
            inputs,
            settings,
            output,
            output_dir,
            threads,
            gpu,
            report,
        } => {
            commands::process::run(
                &config,
                commands::process::ProcessOptions {
                    inputs,
                    settings,
                    output,
                    output_dir,
                    threads,
                    gpu,
                    report,
                },
            )
            .await
        }
        Commands::Probe { path, json } => commands::probe::run(&config, path, json),
        Commands::Graph { path, settings } => commands::graph::run(&config, path, settings),
        Commands::Check => commands::check::run(&config),
        Commands::Init {
            path,
            force,
            config: write_config,
        } => commands::init::run(path, force, write_config),
    }
}
