//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::validation::Strictness;

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse emissions for one state and export the statistics
    Analyze(AnalyzeArgs),
    /// Read and validate every data file in a directory
    Ingest {
        /// Directory holding .csv, .xlsx or .xls files
        #[arg(long)]
        dir: PathBuf,
        /// Shorthand for `--strictness strict`
        #[arg(long)]
        strict: bool,
        /// How validation issues are treated [default: lenient]
        #[arg(long, value_enum, conflicts_with = "strict")]
        strictness: Option<Strictness>,
    },
    /// List the tables exposed by the remote service
    Tables {
        /// JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Two-letter state code, e.g. NJ
    #[arg(long)]
    pub state: String,

    /// Reporting year. Remote runs default to last year
    #[arg(long)]
    pub year: Option<i32>,

    /// Remote table name or alias
    #[arg(long)]
    pub table: Option<String>,

    /// Read local files from this directory instead of the remote service
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Where results are written [default: output/<state>]
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Shorthand for `--strictness strict`
    #[arg(long)]
    pub strict: bool,

    /// How validation issues are treated. Overrides the config file
    #[arg(long, value_enum, conflicts_with = "strict")]
    pub strictness: Option<Strictness>,

    /// Skip validation
    #[arg(long)]
    pub no_validate: bool,

    /// Keep fetched pages on disk until they are combined
    #[arg(long)]
    pub cache_batches: bool,

    /// Rebuild the table from the batch files of the last failed run
    #[arg(long)]
    pub recover: bool,

    /// JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Strictness chosen on the command line, if any.
pub fn strictness_override(strict: bool, strictness: Option<Strictness>) -> Option<Strictness> {
    if strict {
        Some(Strictness::Strict)
    } else {
        strictness
    }
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{pos}/{len}] {bar:40.cyan/blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    )
}

// -- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn should_have_valid_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn should_parse_analyze_flags() {
        let cli = Cli::parse_from([
            "ghg", "analyze", "--state", "nj", "--year", "2022", "--strict", "--cache-batches",
        ]);

        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.state, "nj");
                assert_eq!(args.year, Some(2022));
                assert!(args.strict);
                assert!(args.cache_batches);
                assert!(!args.no_validate);
                assert!(args.input_dir.is_none());
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn should_parse_strictness_choice() {
        let cli = Cli::parse_from(["ghg", "ingest", "--dir", "data", "--strictness", "strict"]);

        match cli.command {
            Commands::Ingest { strict, strictness, .. } => {
                assert!(!strict);
                assert_eq!(strictness_override(strict, strictness), Some(Strictness::Strict));
            }
            _ => panic!("expected ingest"),
        }

        let cli = Cli::parse_from(["ghg", "analyze", "--state", "nj", "--strictness", "lenient"]);
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.strictness, Some(Strictness::Lenient));
                assert_eq!(strictness_override(args.strict, args.strictness), Some(Strictness::Lenient));
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn should_reject_strict_with_strictness() {
        let parsed = Cli::try_parse_from([
            "ghg", "analyze", "--state", "nj", "--strict", "--strictness", "lenient",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn should_leave_strictness_to_config_when_not_given() {
        assert_eq!(strictness_override(false, None), None);
        assert_eq!(strictness_override(true, None), Some(Strictness::Strict));
    }
}
