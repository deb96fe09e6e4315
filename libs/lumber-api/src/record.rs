use std::fmt;

/// Payload bytes kept in truncated diagnostic renderings.
pub const TRUNCATED_PAYLOAD_BYTES: usize = 1000;

/// One unit of input, as delivered by a record source.
///
/// Collaborators only ever see it by reference (or as an owned copy they
/// produced themselves), so the record read from the source is never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    /// Optional message key (e.g. the Kafka key).
    pub key: Option<Vec<u8>>,
    /// Opaque bytes. Only parsers interpret them.
    pub payload: Vec<u8>,
    /// Timestamp in milliseconds, as assigned by the source.
    pub ts_ms: i64,
}

impl Record {
    pub fn new(topic: impl Into<String>, partition: u32, offset: u64, payload: Vec<u8>, ts_ms: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload,
            ts_ms,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Rendering with the payload capped at [`TRUNCATED_PAYLOAD_BYTES`].
    pub fn to_truncated_string(&self) -> String {
        format!(
            "Record{{topic={}, partition={}, offset={}, ts_ms={}, payload={}}}",
            self.topic,
            self.partition,
            self.offset,
            self.ts_ms,
            truncate_payload(&self.payload, TRUNCATED_PAYLOAD_BYTES),
        )
    }
}

impl fmt::Display for Record {
    /// Full rendering, payload included. Only log this at trace level.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Record{{topic={}, partition={}, offset={}, ts_ms={}, payload={}}}",
            self.topic,
            self.partition,
            self.offset,
            self.ts_ms,
            String::from_utf8_lossy(&self.payload),
        )
    }
}

/// Result of parsing a (transformed) record.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub record: Record,
    /// Output partition path segments chosen by the parser (e.g. `["dt=2024-01-01"]`).
    pub partitions: Vec<String>,
    /// Structured view of the payload, if the parser produced one.
    pub value: Option<serde_json::Value>,
}

impl ParsedRecord {
    pub fn new(record: Record, partitions: Vec<String>) -> Self {
        Self {
            record,
            partitions,
            value: None,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Bounded rendering for error messages. The structured value is omitted,
    /// the payload is capped at [`TRUNCATED_PAYLOAD_BYTES`].
    pub fn to_truncated_string(&self) -> String {
        format!(
            "ParsedRecord{{{}, partitions=[{}]}}",
            self.record.to_truncated_string(),
            self.partitions.join(", "),
        )
    }
}

impl fmt::Display for ParsedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParsedRecord{{{}, partitions=[{}]", self.record, self.partitions.join(", "))?;
        if let Some(ref value) = self.value {
            write!(f, ", value={value}")?;
        }
        write!(f, "}}")
    }
}

fn truncate_payload(payload: &[u8], max: usize) -> String {
    if payload.len() <= max {
        return String::from_utf8_lossy(payload).into_owned();
    }
    format!(
        "{}... ({} bytes total)",
        String::from_utf8_lossy(&payload[..max]),
        payload.len()
    )
}
