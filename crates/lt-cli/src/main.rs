use std::io::Write;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lt_cli::commands::{index, line, matching, sync, time};
use lt_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so command output stays machine-readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    if let Some(path) = &cli.config
        && !path.exists()
    {
        bail!("config file not found: {}", path.display());
    }
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match &cli.command {
        Some(Commands::Index(args)) => index::run(&mut out, args, &config)?,
        Some(Commands::Time(args)) => time::run(&mut out, args, &config)?,
        Some(Commands::Line(args)) => line::run(&mut out, args, &config)?,
        Some(Commands::Match(args)) => matching::run(&mut out, args, &config)?,
        Some(Commands::Sync(args)) => sync::run(&mut out, args, &config)?,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            writeln!(out)?;
        }
    }

    Ok(())
}
