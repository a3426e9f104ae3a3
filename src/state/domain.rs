//! Cursor value domains
//!
//! A domain knows how to parse cursor values out of records and state,
//! how to write them back, and what "one unit later" means for adjacency.

use super::types::StateType;
use crate::error::{Error, Result};
use crate::types::JsonValue;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::fmt;

/// A totally ordered cursor domain
pub trait CursorDomain: fmt::Debug + Clone + Send + Sync + 'static {
    /// Parsed cursor value
    type Value: Clone + Ord + fmt::Debug + Send + Sync + 'static;

    /// Origin of the domain, used as the lower bound of migrated state
    fn zero_value(&self) -> Self::Value;

    /// The value one unit after `value`, saturating at the domain's maximum
    fn increment(&self, value: &Self::Value) -> Self::Value;

    /// Parse a raw JSON cursor value
    fn parse_value(&self, raw: &JsonValue) -> Result<Self::Value>;

    /// Render a cursor value for state and slices
    fn output_value(&self, value: &Self::Value) -> JsonValue;

    /// Tag written into concurrent state
    fn state_type(&self) -> StateType;
}

/// A date/time domain with a fixed step unit
pub trait DatetimeDomain: CursorDomain<Value = DateTime<Utc>> {
    /// Smallest representable step of the domain
    fn granularity(&self) -> Duration;
}

// ============================================================================
// Epoch seconds
// ============================================================================

/// Cursor values stored as integer epoch seconds
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochValueDomain;

impl CursorDomain for EpochValueDomain {
    type Value = DateTime<Utc>;

    fn zero_value(&self) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    fn increment(&self, value: &DateTime<Utc>) -> DateTime<Utc> {
        saturating_add(value, self.granularity())
    }

    fn parse_value(&self, raw: &JsonValue) -> Result<DateTime<Utc>> {
        let seconds = match raw {
            JsonValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| Error::state(format!("Epoch value out of range: {n}")))?,
            JsonValue::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::state(format!("Invalid epoch value: {s}")))?,
            other => return Err(Error::state(format!("Invalid epoch value: {other}"))),
        };
        Utc.timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| Error::state(format!("Epoch value out of range: {seconds}")))
    }

    fn output_value(&self, value: &DateTime<Utc>) -> JsonValue {
        JsonValue::from(value.timestamp())
    }

    fn state_type(&self) -> StateType {
        StateType::DateRange
    }
}

impl DatetimeDomain for EpochValueDomain {
    fn granularity(&self) -> Duration {
        Duration::seconds(1)
    }
}

// ============================================================================
// ISO 8601 with millisecond precision
// ============================================================================

/// Cursor values stored as `2024-01-01T00:00:00.000Z` strings
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoMillisDomain;

impl CursorDomain for IsoMillisDomain {
    type Value = DateTime<Utc>;

    fn zero_value(&self) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    fn increment(&self, value: &DateTime<Utc>) -> DateTime<Utc> {
        saturating_add(value, self.granularity())
    }

    fn parse_value(&self, raw: &JsonValue) -> Result<DateTime<Utc>> {
        match raw {
            JsonValue::String(s) => parse_datetime(s),
            other => Err(Error::state(format!("Invalid datetime value: {other}"))),
        }
    }

    fn output_value(&self, value: &DateTime<Utc>) -> JsonValue {
        JsonValue::String(value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    fn state_type(&self) -> StateType {
        StateType::DateRange
    }
}

impl DatetimeDomain for IsoMillisDomain {
    fn granularity(&self) -> Duration {
        Duration::milliseconds(1)
    }
}

// ============================================================================
// Plain integers
// ============================================================================

/// Integer cursors (auto-increment ids, sequence numbers)
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerDomain;

impl CursorDomain for IntegerDomain {
    type Value = i64;

    fn zero_value(&self) -> i64 {
        0
    }

    fn increment(&self, value: &i64) -> i64 {
        value.saturating_add(1)
    }

    fn parse_value(&self, raw: &JsonValue) -> Result<i64> {
        match raw {
            JsonValue::Number(n) => n
                .as_i64()
                .ok_or_else(|| Error::state(format!("Invalid integer value: {n}"))),
            JsonValue::String(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::state(format!("Invalid integer value: {s}"))),
            other => Err(Error::state(format!("Invalid integer value: {other}"))),
        }
    }

    fn output_value(&self, value: &i64) -> JsonValue {
        JsonValue::from(*value)
    }

    fn state_type(&self) -> StateType {
        StateType::Integer
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `value + step`, clamped to the representable range
pub(crate) fn saturating_add(value: &DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    value.checked_add_signed(step).unwrap_or(if step < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// `value - step`, clamped to the representable range
pub(crate) fn saturating_sub(value: &DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    value.checked_sub_signed(step).unwrap_or(if step < Duration::zero() {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    })
}

/// Parse a datetime string into UTC DateTime
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    // Try RFC 3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try common formats
    let formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d",
    ];

    for fmt in formats {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
        if let Ok(nd) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(ndt) = nd.and_hms_opt(0, 0, 0) {
                return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
            }
        }
    }

    Err(Error::state(format!("Invalid datetime format: {s}")))
}

/// Parse a duration string like "1d", "2h", "30m"
pub(crate) fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    let (num_str, suffix) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('d') {
        (stripped, "d")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('w') {
        (stripped, "w")
    } else {
        // Assume days if no suffix
        (s, "d")
    };

    let num: i64 = num_str
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("Invalid duration number: {num_str}")))?;

    let duration = match suffix {
        "w" => Duration::weeks(num),
        "d" => Duration::days(num),
        "h" => Duration::hours(num),
        "m" => Duration::minutes(num),
        "s" => Duration::seconds(num),
        _ => Duration::milliseconds(num),
    };

    Ok(duration)
}
