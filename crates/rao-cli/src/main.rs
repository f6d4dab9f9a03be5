use anyhow::{Context, Result};
use clap::Parser;
use rao_cli::{Cli, Commands};
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    match &cli.command {
        Commands::Run {
            case,
            params,
            out,
            threads,
        } => commands::run::handle(case, params.as_ref(), out.as_ref(), threads.as_deref()),
        Commands::Perimeters { case } => commands::perimeters::handle(case),
    }
}
