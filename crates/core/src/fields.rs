//! Ordered synonym chains for reading heterogeneously-named upstream fields.
//!
//! The upstream platforms rename fields between endpoints and versions
//! (`total_calls_to_dispatch`, `total_calls`, `total_count`, ...). Each
//! logical field is declared once as a [`FieldChain`]: an ordered list of
//! keys where the first key holding a usable value wins. Keys may be dotted
//! paths into nested objects (`telephony_data.recording_url`).
//!
//! Typed readers never fail: a value of the wrong shape is treated as
//! absent, so one malformed field never invalidates the rest of a record.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::types::Timestamp;

/// An ordered list of synonym keys for one logical field.
#[derive(Debug, Clone, Copy)]
pub struct FieldChain {
    /// Logical field name, used in log messages.
    pub field: &'static str,
    keys: &'static [&'static str],
}

/// Wrapper keys under which list endpoints return their rows.
pub const LIST_WRAPPERS: &[&str] = &["records", "data", "campaigns", "results"];

/// Wrapper keys under which the call-log feed returns its rows.
pub const LOG_WRAPPERS: &[&str] = &["call_log_data", "records", "data", "results", "logs"];

impl FieldChain {
    pub const fn new(field: &'static str, keys: &'static [&'static str]) -> Self {
        Self { field, keys }
    }

    pub fn keys(&self) -> &'static [&'static str] {
        self.keys
    }

    /// First value in the chain that is present, not null and not an
    /// empty string.
    pub fn first<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        self.keys
            .iter()
            .filter_map(|key| lookup(record, key))
            .find(|v| usable(v))
    }

    /// Text value. Numbers are rendered as text (ids are often numeric).
    pub fn text(&self, record: &Value) -> Option<String> {
        self.keys
            .iter()
            .filter_map(|key| lookup(record, key))
            .find_map(as_text)
    }

    /// Integer value. Accepts integers, integral floats and numeric strings.
    pub fn int(&self, record: &Value) -> Option<i64> {
        self.keys
            .iter()
            .filter_map(|key| lookup(record, key))
            .find_map(as_int)
    }

    /// Non-negative counter. Negative values are treated as malformed.
    pub fn count(&self, record: &Value) -> Option<i64> {
        self.keys
            .iter()
            .filter_map(|key| lookup(record, key))
            .filter_map(as_int)
            .find(|n| *n >= 0)
    }

    /// Floating-point value. Accepts numbers and numeric strings.
    pub fn float(&self, record: &Value) -> Option<f64> {
        self.keys
            .iter()
            .filter_map(|key| lookup(record, key))
            .find_map(as_float)
    }

    /// Boolean value. Accepts booleans, `0`/`1` and `"true"`/`"false"`.
    pub fn flag(&self, record: &Value) -> Option<bool> {
        self.keys
            .iter()
            .filter_map(|key| lookup(record, key))
            .find_map(as_flag)
    }

    /// Timestamp value. See [`parse_timestamp`] for accepted shapes.
    pub fn timestamp(&self, record: &Value) -> Option<Timestamp> {
        self.keys
            .iter()
            .filter_map(|key| lookup(record, key))
            .find_map(|v| match v {
                Value::String(s) => parse_timestamp(s),
                Value::Number(_) => as_int(v).and_then(epoch_to_timestamp),
                _ => None,
            })
    }

    /// Array value.
    pub fn array<'a>(&self, record: &'a Value) -> Option<&'a Vec<Value>> {
        self.keys
            .iter()
            .filter_map(|key| lookup(record, key))
            .find_map(Value::as_array)
    }
}

/// Resolve a possibly dotted key against a JSON object.
pub fn lookup<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(record, |current, part| current.get(part))
}

/// Rows of a list response, whatever wrapper the endpoint used.
///
/// Accepts a bare array, `{<wrapper>: [...]}` or one level of nesting such
/// as `{"data": {"records": [...]}}`.
pub fn extract_rows<'a>(payload: &'a Value, wrappers: &[&str]) -> &'a [Value] {
    if let Some(rows) = payload.as_array() {
        return rows;
    }
    for wrapper in wrappers {
        match payload.get(*wrapper) {
            Some(Value::Array(rows)) => return rows,
            Some(nested @ Value::Object(_)) => {
                for inner in wrappers {
                    if let Some(Value::Array(rows)) = nested.get(*inner) {
                        return rows;
                    }
                }
            }
            _ => {}
        }
    }
    &[]
}

/// Parse the timestamp spellings seen upstream: RFC 3339, naive
/// `YYYY-MM-DD HH:MM:SS[.fff]` / `YYYY-MM-DDTHH:MM:SS[.fff]` (taken as UTC)
/// and epoch seconds or milliseconds in a string.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    raw.parse::<i64>().ok().and_then(epoch_to_timestamp)
}

/// Epoch seconds, or milliseconds when the value is too large to be seconds.
fn epoch_to_timestamp(value: i64) -> Option<Timestamp> {
    if value <= 0 {
        return None;
    }
    if value > 100_000_000_000 {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }
}

fn usable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
