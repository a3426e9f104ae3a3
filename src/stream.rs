//! Assemble a concurrent reader from a stream definition

use crate::config::{CursorConfig, CursorFormat, DatetimeRangeConfig, PartitioningConfig, StreamConfig};
use crate::cursor::{Cursor, NoOpCursor, RangeCursor, SubstreamResumableFullRefreshCursor};
use crate::engine::ConcurrentStreamReader;
use crate::error::{Error, Result};
use crate::partition::{
    DatetimeRouter, ListRouter, ParentRouter, PartitionRouter, RecordSource,
    RouterPartitionGenerator, SinglePartitionRouter,
};
use crate::source::JsonlRecordSource;
use crate::state::{DatetimeDomain, EpochValueDomain, IsoMillisDomain};
use crate::types::JsonValue;
use std::sync::Arc;
use tracing::debug;

/// Build a reader for a stream, hydrating its cursor from persisted state
///
/// `state` is the stream's own state blob (sequential or concurrent), not the
/// whole `{"streams": ...}` document.
pub fn build_stream_reader(
    config: &StreamConfig,
    state: Option<&JsonValue>,
) -> Result<ConcurrentStreamReader> {
    debug!(
        stream = %config.name,
        source = %config.source.path.display(),
        has_state = state.is_some(),
        "Building stream reader"
    );

    match &config.cursor {
        CursorConfig::DatetimeRange(range) => match range.format {
            CursorFormat::Epoch => build_range(config, range, EpochValueDomain, state),
            CursorFormat::IsoMillis => build_range(config, range, IsoMillisDomain, state),
            CursorFormat::Integer => Err(Error::invalid_value(
                "cursor.format",
                "integer cursors cannot be split into datetime ranges",
            )),
        },
        CursorConfig::SubstreamFullRefresh => {
            let mut cursor = SubstreamResumableFullRefreshCursor::new(&config.name);
            if let Some(state) = state {
                cursor.set_initial_state(state.clone())?;
            }
            Ok(assemble(config, build_router(config), Box::new(cursor)))
        }
        CursorConfig::None => Ok(assemble(config, build_router(config), Box::new(NoOpCursor::new()))),
    }
}

fn build_range<D: DatetimeDomain>(
    config: &StreamConfig,
    range: &DatetimeRangeConfig,
    domain: D,
    state: Option<&JsonValue>,
) -> Result<ConcurrentStreamReader> {
    let start = range.start_datetime()?;

    let mut cursor = RangeCursor::new(&config.name, range.field.as_str(), domain.clone())
        .with_boundary_fields(&range.lower_key, &range.upper_key)
        .with_start(start)
        .with_state_format(range.state_format);
    if let Some(state) = state {
        cursor.set_initial_state(state.clone())?;
    }

    let router = DatetimeRouter::new(domain.clone(), start, range.end_datetime()?, range.step_duration()?)?
        .with_keys(&range.lower_key, &range.upper_key)
        .with_synced_intervals(cursor.synced_intervals().to_vec())
        .with_lookback(range.lookback_duration()?)?;

    let source: Arc<dyn RecordSource> = Arc::new(
        JsonlRecordSource::new(&config.source.path).with_cursor_range(
            range.field.as_str(),
            &range.lower_key,
            &range.upper_key,
            domain,
        ),
    );
    let generator = RouterPartitionGenerator::new(&config.name, Box::new(router), source);

    Ok(ConcurrentStreamReader::new(
        &config.name,
        Arc::new(generator),
        Box::new(cursor),
        config.read.clone(),
    )
    .with_sync_mode(config.sync_mode)
    .with_cursor_field(range.field.clone()))
}

fn build_router(config: &StreamConfig) -> Box<dyn PartitionRouter> {
    match &config.partitioning {
        PartitioningConfig::None => Box::new(SinglePartitionRouter),
        PartitioningConfig::List { field, values } => {
            Box::new(ListRouter::new(values.clone(), field.as_str()))
        }
        PartitioningConfig::Parent {
            path,
            parent_key,
            partition_field,
        } => Box::new(ParentRouter::new(
            Arc::new(JsonlRecordSource::new(path)),
            parent_key.as_str(),
            partition_field.as_str(),
        )),
    }
}

fn assemble(
    config: &StreamConfig,
    router: Box<dyn PartitionRouter>,
    cursor: Box<dyn Cursor>,
) -> ConcurrentStreamReader {
    let source: Arc<dyn RecordSource> = Arc::new(JsonlRecordSource::new(&config.source.path));
    let generator = RouterPartitionGenerator::new(&config.name, router, source);
    ConcurrentStreamReader::new(&config.name, Arc::new(generator), cursor, config.read.clone())
        .with_sync_mode(config.sync_mode)
}
