//! Line command: which line to reveal for a point in time.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use lt_core::Document;

use super::util::{format_time, open_document, parse_time, refresh};
use crate::Config;

#[derive(Debug, Args)]
pub struct LineArgs {
    /// Log file to read.
    pub file: PathBuf,

    /// Point in time (RFC 3339 or "YYYY-MM-DD HH:MM:SS.fff", UTC).
    #[arg(long)]
    pub at: String,
}

pub fn run<W: Write>(writer: &mut W, args: &LineArgs, config: &Config) -> Result<()> {
    let time = parse_time(&args.at)?;
    let doc = open_document(&args.file)?;
    let mut timeline = config.timeline();
    refresh(&mut timeline, &doc)?;

    match timeline.line_at_or_before(doc.id(), time)? {
        Some(line) => {
            let text = doc.line_at(line).unwrap_or_default();
            writeln!(writer, "{line}: {text}")?;
        }
        None => writeln!(writer, "no line at or before {}", format_time(time))?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, PathBuf, Config) {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("app.log");
        std::fs::write(
            &path,
            "2021-01-01 10:00:00,000 START A\n\
             2021-01-01 10:00:05,000 step\n\
             2021-01-01 10:00:10,000 END A\n",
        )
        .unwrap();
        let mut config = Config::default();
        config.settings.file_configs.push(lt_core::config::FileConfigRecord {
            name: Some("app".to_string()),
            identify_regex: Some("START".to_string()),
            ..Default::default()
        });
        (temp, path, config)
    }

    fn line_for(at: &str) -> String {
        let (_temp, file, config) = setup();
        let args = LineArgs {
            file,
            at: at.to_string(),
        };
        let mut output = Vec::new();
        run(&mut output, &args, &config).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn exact_time_reveals_that_line() {
        assert_eq!(line_for("2021-01-01 10:00:05"), "1: 2021-01-01 10:00:05,000 step\n");
    }

    #[test]
    fn between_lines_reveals_earlier_line() {
        assert_eq!(line_for("2021-01-01T10:00:07Z"), "1: 2021-01-01 10:00:05,000 step\n");
    }

    #[test]
    fn before_first_line_reveals_nothing() {
        assert_eq!(
            line_for("2021-01-01 09:00:00"),
            "no line at or before 2021-01-01 09:00:00.000\n"
        );
    }

    #[test]
    fn invalid_time_is_an_error() {
        let (_temp, file, config) = setup();
        let args = LineArgs {
            file,
            at: "noon".to_string(),
        };
        assert!(run(&mut Vec::new(), &args, &config).is_err());
    }
}
