//! Time command: calculated time of one line.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use lt_core::Document;

use super::util::{open_document, refresh};
use crate::Config;

#[derive(Debug, Args)]
pub struct TimeArgs {
    /// Log file to read.
    pub file: PathBuf,

    /// Zero-based line number.
    #[arg(long)]
    pub line: usize,
}

pub fn run<W: Write>(writer: &mut W, args: &TimeArgs, config: &Config) -> Result<()> {
    let doc = open_document(&args.file)?;
    let mut timeline = config.timeline();
    refresh(&mut timeline, &doc)?;

    let Some(text) = timeline.hover_text(doc.id(), args.line)? else {
        bail!("line {} is past the end of {}", args.line, args.file.display());
    };
    writeln!(writer, "{text}")?;
    Ok(())
}
