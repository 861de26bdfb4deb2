use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod utils;

#[derive(Parser)]
#[command(name = "piggy-cmd")]
#[command(about = "Command-line utility for piggy stored-field segments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest newline-delimited JSON documents into a segment directory
    Ingest {
        /// Source file(s) to ingest (can be specified multiple times)
        #[arg(short, long, required = true)]
        file: Vec<String>,

        /// Number of ingesting threads
        #[arg(short, long, default_value_t = 4)]
        threads: usize,

        /// Path to a JSON file with writer configuration overrides
        #[arg(long)]
        config: Option<String>,

        /// Output directory
        dir: String,
    },

    /// Inspect a segment and display summary information
    Inspect {
        /// Increase verbosity (-v prints decoded documents)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,

        /// Directory holding the segment
        dir: String,

        /// Segment name, e.g. `_0`
        segment: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            file,
            threads,
            config,
            dir,
        } => commands::ingest::run(config, file, threads, dir),
        Commands::Inspect {
            verbose,
            dir,
            segment,
        } => commands::inspect::run(verbose, dir, segment),
    }
}
