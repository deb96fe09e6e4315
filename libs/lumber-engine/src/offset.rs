use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use lumber_api::error::{PluginError, parse_plugin_config};
use lumber_api::record::Record;
use lumber_api::source::{OffsetAdjustment, OffsetTracker};

/// The `local` tracker takes no settings.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocalOffsetConfig {}

/// Tracks the last seen offset of every topic partition a consumer reads.
///
/// A record whose offset is not the successor of the last one (rewind after
/// a rebalance, or a gap) is reported as [`OffsetAdjustment::Discontinuous`],
/// so the consumer drops the stale local data before the replay is written.
/// State lives in memory only.
#[derive(Debug, Default)]
pub struct LocalOffsetTracker {
    last_seen: BTreeMap<(String, u32), u64>,
}

impl LocalOffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self, topic: &str, partition: u32) -> Option<u64> {
        self.last_seen.get(&(topic.to_string(), partition)).copied()
    }

    fn track(&mut self, record: &Record) -> OffsetAdjustment {
        let previous = self
            .last_seen
            .insert((record.topic.clone(), record.partition), record.offset);
        match previous {
            Some(last) if last.checked_add(1) != Some(record.offset) => {
                tracing::warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    last,
                    offset = record.offset,
                    kind = if record.offset <= last { "rewind" } else { "gap" },
                    "non-contiguous offset"
                );
                OffsetAdjustment::Discontinuous { last }
            }
            _ => OffsetAdjustment::Contiguous,
        }
    }
}

impl OffsetTracker for LocalOffsetTracker {
    fn adjust_offset<'a>(
        &'a mut self,
        record: &'a Record,
    ) -> Pin<Box<dyn Future<Output = Result<OffsetAdjustment, PluginError>> + Send + 'a>> {
        let adjustment = self.track(record);
        Box::pin(async move { Ok(adjustment) })
    }
}

pub(crate) fn create_local(
    config: &serde_json::Value,
    instance: &str,
) -> Result<Box<dyn OffsetTracker>, PluginError> {
    let _: LocalOffsetConfig = parse_plugin_config(config)?;
    tracing::debug!(instance, "local offset tracker ready");
    Ok(Box::new(LocalOffsetTracker::new()))
}
