//! JSON rendering of decoded values for display.

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value as Json};

use crate::value::{Key, Value};

/// Milliseconds between the Unix epoch and the block timestamp epoch (2000-01-01T00:00:00Z).
const BLOCK_TIMESTAMP_EPOCH_MS: i64 = 946_684_800_000;
const BLOCK_INTERVAL_MS: i64 = 500;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Replace `bytes` payloads with `"..."`.
    pub elide_binary: bool,
}

/// Renders `value` with binary payloads as hex.
pub fn to_json(value: &Value) -> Json {
    to_json_with(value, RenderOptions::default())
}

pub fn to_json_with(value: &Value, options: RenderOptions) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(v) => Json::from(*v),
        Value::UInt(v) => Json::from(*v),
        Value::Int128(v) => Json::String(v.to_string()),
        Value::UInt128(v) => Json::String(v.to_string()),
        Value::Float32(v) => float(f64::from(*v)),
        Value::Float64(v) => float(*v),
        Value::Float128(raw) => Json::String(hex::encode_upper(raw)),
        Value::Name(name) => Json::String(name.to_string()),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(_) if options.elide_binary => Json::String("...".to_string()),
        Value::Bytes(bytes) => Json::String(hex::encode_upper(bytes)),
        Value::Checksum(bytes) => Json::String(hex::encode_upper(bytes)),
        Value::TimePoint(micros) => Json::String(format_time_point(*micros)),
        Value::TimePointSec(secs) => Json::String(format_time_point_sec(*secs)),
        Value::BlockTimestamp(slot) => Json::String(format_block_timestamp(*slot)),
        Value::PublicKey(key) => Json::String(format_key("PUB", key)),
        Value::Signature(key) => Json::String(format_key("SIG", key)),
        Value::Array(items) => Json::Array(
            items
                .iter()
                .map(|item| to_json_with(item, options))
                .collect(),
        ),
        Value::Optional(None) => Json::Null,
        Value::Optional(Some(inner)) => to_json_with(inner, options),
        Value::Struct(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (name, field) in fields {
                map.insert(name.clone(), to_json_with(field, options));
            }
            Json::Object(map)
        }
        Value::Variant(name, inner) => {
            Json::Array(vec![Json::String(name.clone()), to_json_with(inner, options)])
        }
    }
}

fn float(v: f64) -> Json {
    Number::from_f64(v)
        .map(Json::Number)
        .unwrap_or_else(|| Json::String(v.to_string()))
}

fn format_key(kind: &str, key: &Key) -> String {
    format!("{kind}_{}_{}", key.prefix(), hex::encode_upper(&key.data))
}

/// ISO-8601 with millisecond precision, e.g. `2018-06-01T12:00:00.500`.
pub fn format_time_point(micros: i64) -> String {
    match DateTime::<Utc>::from_timestamp_micros(micros) {
        Some(time) => time.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        None => micros.to_string(),
    }
}

pub fn format_time_point_sec(secs: u32) -> String {
    match DateTime::<Utc>::from_timestamp(i64::from(secs), 0) {
        Some(time) => time.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => secs.to_string(),
    }
}

pub fn format_block_timestamp(slot: u32) -> String {
    let millis = i64::from(slot) * BLOCK_INTERVAL_MS + BLOCK_TIMESTAMP_EPOCH_MS;
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(time) => time.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        None => slot.to_string(),
    }
}
