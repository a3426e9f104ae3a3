//! CLI commands and argument parsing

use crate::config::CursorFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Concurrent stream reader CLI
#[derive(Parser, Debug)]
#[command(name = "concurrent-cdk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// State file (JSON)
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Inline state JSON
    #[arg(long, global = true)]
    pub state_json: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read a stream concurrently
    Read {
        /// Stream definition file (YAML)
        #[arg(long)]
        stream: PathBuf,

        /// Maximum records to read
        #[arg(long)]
        max_records: Option<usize>,

        /// Number of partitions read at once
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Validate a stream definition
    Validate {
        /// Stream definition file (YAML)
        #[arg(long)]
        stream: PathBuf,
    },

    /// Convert stream state between formats
    State {
        #[command(subcommand)]
        action: StateCommand,
    },
}

/// State conversion subcommands
///
/// Both read one stream's state blob from `--state-json` or `--state`.
#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Migrate sequential state to the concurrent format
    ToConcurrent {
        /// Cursor field (dotted path)
        #[arg(long)]
        cursor_field: String,

        /// Cursor value format
        #[arg(long, value_enum, default_value = "epoch")]
        cursor_format: CursorFormat,
    },

    /// Collapse concurrent state to the sequential format
    ToSequential {
        /// Cursor field (dotted path)
        #[arg(long)]
        cursor_field: String,

        /// Cursor value format
        #[arg(long, value_enum, default_value = "epoch")]
        cursor_format: CursorFormat,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_read() {
        let cli = Cli::try_parse_from([
            "concurrent-cdk",
            "read",
            "--stream",
            "events.yaml",
            "--state",
            "state.json",
            "--max-records",
            "10",
            "--workers",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.state, Some(PathBuf::from("state.json")));
        assert_eq!(cli.format, OutputFormat::Json);
        let Commands::Read {
            stream,
            max_records,
            workers,
        } = cli.command
        else {
            panic!("Expected read command");
        };
        assert_eq!(stream, PathBuf::from("events.yaml"));
        assert_eq!(max_records, Some(10));
        assert_eq!(workers, Some(3));
    }

    #[test]
    fn test_parse_state_conversion() {
        let cli = Cli::try_parse_from([
            "concurrent-cdk",
            "state",
            "to-concurrent",
            "--cursor-field",
            "created",
            "--cursor-format",
            "iso_millis",
            "--state-json",
            r#"{"created": "2024-01-01T00:00:00.000Z"}"#,
        ])
        .unwrap();

        let Commands::State {
            action:
                StateCommand::ToConcurrent {
                    cursor_field,
                    cursor_format,
                },
        } = cli.command
        else {
            panic!("Expected state to-concurrent command");
        };
        assert_eq!(cursor_field, "created");
        assert_eq!(cursor_format, CursorFormat::IsoMillis);
        assert!(cli.state_json.is_some());
    }

    #[test]
    fn test_read_requires_stream() {
        assert!(Cli::try_parse_from(["concurrent-cdk", "read"]).is_err());
    }
}
