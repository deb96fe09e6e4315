use crate::error::PluginError;
use crate::record::{ParsedRecord, Record};

/// Record transformer.
///
/// `Ok(None)` means the record was filtered: it is consumed and gets no further processing.
/// Shared between consumer loops, hence `Sync`.
pub trait RecordTransformer: Send + Sync {
    fn transform(&self, record: &Record) -> Result<Option<Record>, PluginError>;
}

/// Record parser. Every error is counted as a parse failure by the consumer loop,
/// regardless of its kind.
pub trait RecordParser: Send + Sync {
    fn parse(&self, record: Record) -> Result<ParsedRecord, PluginError>;
}
