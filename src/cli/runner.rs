//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat, StateCommand};
use crate::config::{load_stream_config, CursorFormat};
use crate::cursor::CursorField;
use crate::engine::Message;
use crate::error::{Error, Result};
use crate::state::{CursorDomain, EpochValueDomain, IntegerDomain, IsoMillisDomain, StateConverter, StateManager};
use crate::stream::build_stream_reader;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::{error, info};

/// Direction of a state conversion
#[derive(Debug, Clone, Copy)]
enum Conversion {
    ToConcurrent,
    ToSequential,
}

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Read {
                stream,
                max_records,
                workers,
            } => self.read(stream, *max_records, *workers).await,
            Commands::Validate { stream } => self.validate(stream),
            Commands::State { action } => match action {
                StateCommand::ToConcurrent {
                    cursor_field,
                    cursor_format,
                } => self.convert_state(Conversion::ToConcurrent, cursor_field, *cursor_format),
                StateCommand::ToSequential {
                    cursor_field,
                    cursor_format,
                } => self.convert_state(Conversion::ToSequential, cursor_field, *cursor_format),
            },
        }
    }

    /// Load state
    fn load_state(&self) -> Result<StateManager> {
        // Inline state takes precedence
        if let Some(state_json) = &self.cli.state_json {
            StateManager::from_json(state_json)
        } else if let Some(path) = &self.cli.state {
            StateManager::from_file(path)
        } else {
            Ok(StateManager::in_memory())
        }
    }

    /// Load a single stream state blob for conversion
    fn load_stream_state(&self) -> Result<Value> {
        if let Some(state_json) = &self.cli.state_json {
            return serde_json::from_str(state_json)
                .map_err(|e| Error::config(format!("Invalid state JSON: {e}")));
        }

        let path = self
            .cli
            .state
            .as_ref()
            .ok_or_else(|| Error::config("State not specified (use --state-json or --state)"))?;
        let content = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read state file: {e}")))?;
        serde_json::from_str(&content).map_err(|e| Error::config(format!("Invalid state JSON: {e}")))
    }

    /// Read one stream, printing every message and persisting checkpoints
    async fn read(
        &self,
        stream_path: &Path,
        max_records: Option<usize>,
        workers: Option<usize>,
    ) -> Result<()> {
        let mut config = load_stream_config(stream_path)?;
        if let Some(max) = max_records {
            config.read = config.read.with_max_records(max);
        }
        if let Some(workers) = workers {
            config.read = config.read.with_max_workers(workers);
        }

        let state = self.load_state()?;
        let stream_state = state.get_stream_state(&config.name).await;
        let mut reader = build_stream_reader(&config, stream_state.as_ref())?;

        info!(
            stream = %config.name,
            workers = config.read.workers(),
            max_records = config.read.max_records,
            "Starting read"
        );

        let mut latest_state: Option<Value> = None;
        let result = reader
            .read(|message| {
                if let Message::State { data, .. } = &message {
                    latest_state = Some(data.clone());
                }
                self.output_message(&message.to_json());
            })
            .await;

        // Checkpoints only cover closed partitions; keep the last one on failure too
        if let Some(latest) = latest_state {
            state.set_stream_state(&config.name, latest).await?;
        }
        if let Some(path) = &self.cli.state {
            state.save_to_file(path).await?;
        }

        match result {
            Ok(stats) => {
                self.output_message(&json!({
                    "type": "SYNC_SUMMARY",
                    "summary": {
                        "status": "SUCCEEDED",
                        "stream": config.name,
                        "records_synced": stats.records_synced,
                        "partitions_synced": stats.partitions_synced,
                        "partitions_skipped": stats.partitions_skipped,
                        "state_messages": stats.state_messages,
                        "limit_reached": stats.limit_reached,
                        "duration_ms": stats.duration_ms,
                        "state_file": self.cli.state.as_ref().map(|p| p.to_string_lossy().to_string())
                    }
                }));
                Ok(())
            }
            Err(e) => {
                error!(stream = %config.name, error = %e, "Read failed");
                self.output_message(&json!({
                    "type": "SYNC_SUMMARY",
                    "summary": {
                        "status": "FAILED",
                        "stream": config.name,
                        "error": e.to_string(),
                        "failures": e.worker_failures().len()
                    }
                }));
                Err(e)
            }
        }
    }

    /// Validate a stream definition
    fn validate(&self, stream_path: &Path) -> Result<()> {
        let config = load_stream_config(stream_path)?;

        self.output_message(&json!({
            "type": "VALIDATION",
            "validation": {
                "valid": true,
                "stream": config.name,
                "source": config.source.path.to_string_lossy(),
                "sync_mode": config.sync_mode,
                "cursor": config.cursor,
                "partitioning": config.partitioning
            }
        }));

        Ok(())
    }

    /// Convert a stream state blob between formats
    fn convert_state(
        &self,
        conversion: Conversion,
        cursor_field: &str,
        cursor_format: CursorFormat,
    ) -> Result<()> {
        let state = self.load_stream_state()?;
        let field = CursorField::new(cursor_field);

        let converted = match cursor_format {
            CursorFormat::Epoch => convert(EpochValueDomain, conversion, &field, &state)?,
            CursorFormat::IsoMillis => convert(IsoMillisDomain, conversion, &field, &state)?,
            CursorFormat::Integer => convert(IntegerDomain, conversion, &field, &state)?,
        };

        self.output_message(&converted);
        Ok(())
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

fn convert<D: CursorDomain>(
    domain: D,
    conversion: Conversion,
    field: &CursorField,
    state: &Value,
) -> Result<Value> {
    let converter = StateConverter::new("cli", domain);
    match conversion {
        Conversion::ToConcurrent => converter.get_concurrent_stream_state(field, state),
        Conversion::ToSequential => converter.convert_to_sequential_state(field, state),
    }
}
