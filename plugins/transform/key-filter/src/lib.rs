use std::collections::HashSet;

use serde::Deserialize;

use lumber_api::error::{PluginError, parse_plugin_config};
use lumber_api::processor::RecordTransformer;
use lumber_api::record::Record;

#[derive(Debug, Default, Deserialize)]
struct Config {
    /// Allowed record keys. Empty = pass everything.
    #[serde(default)]
    keys: Vec<String>,
}

/// Filters records by key against an allow-list.
///
/// With a non-empty list, unkeyed records and records whose key is not
/// listed are filtered out.
pub struct KeyFilter {
    keys: HashSet<Vec<u8>>,
}

impl KeyFilter {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Vec<u8>>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl RecordTransformer for KeyFilter {
    fn transform(&self, record: &Record) -> Result<Option<Record>, PluginError> {
        if self.keys.is_empty() {
            return Ok(Some(record.clone()));
        }
        match record.key {
            Some(ref key) if self.keys.contains(key) => Ok(Some(record.clone())),
            _ => Ok(None),
        }
    }
}

pub fn create(config: &serde_json::Value) -> Result<Box<dyn RecordTransformer>, PluginError> {
    let cfg: Config = parse_plugin_config(config)?;
    Ok(Box::new(KeyFilter::new(cfg.keys)))
}
