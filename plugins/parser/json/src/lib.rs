use chrono::{DateTime, Utc};
use serde::Deserialize;

use lumber_api::error::{PluginError, parse_plugin_config};
use lumber_api::processor::RecordParser;
use lumber_api::record::{ParsedRecord, Record};

/// Numeric timestamps below this are taken as seconds, not milliseconds.
const SECONDS_CUTOFF: i64 = 1_000_000_000_000;

fn default_partition_prefix() -> String {
    "dt".to_string()
}

#[derive(Debug, Deserialize)]
struct Config {
    /// Top-level field holding the event time: epoch seconds, epoch
    /// milliseconds, or an RFC 3339 string. Unset = use the record timestamp.
    #[serde(default)]
    timestamp_field: Option<String>,
    #[serde(default = "default_partition_prefix")]
    partition_prefix: String,
}

/// Parses JSON object payloads and partitions them by event date (`dt=YYYY-MM-DD`).
pub struct JsonParser {
    timestamp_field: Option<String>,
    partition_prefix: String,
}

impl JsonParser {
    fn event_time_ms(&self, value: &serde_json::Value, record: &Record) -> Result<i64, PluginError> {
        let Some(ref field) = self.timestamp_field else {
            return Ok(record.ts_ms);
        };
        let ts = match value.get(field) {
            Some(serde_json::Value::Number(n)) => match n.as_i64() {
                Some(ts) if ts < SECONDS_CUTOFF => ts
                    .checked_mul(1000)
                    .ok_or_else(|| PluginError::format(format!("timestamp out of range: {ts}")))?,
                Some(ts) => ts,
                None => n.as_f64().map(|f| (f * 1000.0) as i64).unwrap_or(record.ts_ms),
            },
            Some(serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .unwrap_or(record.ts_ms),
            _ => record.ts_ms,
        };
        Ok(ts)
    }
}

impl RecordParser for JsonParser {
    fn parse(&self, record: Record) -> Result<ParsedRecord, PluginError> {
        let value: serde_json::Value = serde_json::from_slice(&record.payload)?;
        if !value.is_object() {
            return Err(PluginError::format(format!(
                "expected a JSON object, got {}",
                json_type(&value)
            )));
        }

        let ts_ms = self.event_time_ms(&value, &record)?;
        let date = DateTime::<Utc>::from_timestamp_millis(ts_ms)
            .ok_or_else(|| PluginError::format(format!("timestamp out of range: {ts_ms}")))?
            .format("%Y-%m-%d");
        let partition = format!("{}={date}", self.partition_prefix);

        Ok(ParsedRecord::new(record, vec![partition]).with_value(value))
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

pub fn create(config: &serde_json::Value) -> Result<Box<dyn RecordParser>, PluginError> {
    let cfg: Config = parse_plugin_config(config)?;
    Ok(Box::new(JsonParser {
        timestamp_field: cfg.timestamp_field,
        partition_prefix: cfg.partition_prefix,
    }))
}
