use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Remedial action optimizer", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Optimize every perimeter of a case
    Run {
        /// Case file (network, catalog and flow model, JSON)
        #[arg(long)]
        case: PathBuf,
        /// Optimizer parameters (TOML or JSON); defaults when omitted
        #[arg(long)]
        params: Option<PathBuf>,
        /// Write perimeter reports to this JSON file
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Leaves explored in parallel ("auto" or a count); overrides the parameters
        #[arg(long)]
        threads: Option<String>,
    },
    /// Show how states are grouped into perimeters
    Perimeters {
        /// Case file (network, catalog and flow model, JSON)
        #[arg(long)]
        case: PathBuf,
    },
}
