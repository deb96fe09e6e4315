use lumber_api::error::PluginError;
use lumber_api::processor::RecordTransformer;
use lumber_api::record::Record;

/// Passes every record on unchanged.
#[derive(Debug, Default)]
pub struct PassthroughTransformer;

impl RecordTransformer for PassthroughTransformer {
    fn transform(&self, record: &Record) -> Result<Option<Record>, PluginError> {
        Ok(Some(record.clone()))
    }
}

pub fn create(_config: &serde_json::Value) -> Result<Box<dyn RecordTransformer>, PluginError> {
    Ok(Box::new(PassthroughTransformer))
}
