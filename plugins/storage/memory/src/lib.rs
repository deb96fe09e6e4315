use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use lumber_api::error::{PluginError, parse_plugin_config};
use lumber_api::metrics::MetricsSink;
use lumber_api::record::ParsedRecord;
use lumber_api::storage::{RecordWriter, StorageContext, StorageParts, UploadBackend, UploadPolicy};

// ═══════════════════════════════════════════════════════════════
//  MemoryStorageConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_records() -> usize {
    100_000
}

#[derive(Debug, serde::Deserialize)]
struct MemoryStorageConfig {
    /// A batch holding this many records is shipped on the next policy check.
    #[serde(default = "default_max_records")]
    max_records: usize,
    #[serde(default)]
    key_prefix: String,
}

// ═══════════════════════════════════════════════════════════════
//  Batches
// ═══════════════════════════════════════════════════════════════

struct Batch {
    key: String,
    topic: String,
    partition: u32,
    lines: Vec<u8>,
    records: usize,
    opened_at: Instant,
}

type Batches = Arc<Mutex<BTreeMap<String, Batch>>>;

/// Buffers records in memory as JSONL, one batch per (topic, partition, output partition).
///
/// The structured value is written when the parser produced one, the raw
/// payload otherwise. Nothing survives a crash: only use it where the source
/// can replay.
pub struct MemoryWriter {
    batches: Batches,
    key_prefix: String,
}

impl RecordWriter for MemoryWriter {
    fn write<'a>(
        &'a mut self,
        record: &'a ParsedRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let line = match record.value {
                Some(ref value) => serde_json::to_vec(value)?,
                None => record.record.payload.clone(),
            };

            let raw = &record.record;
            let mut logical = raw.topic.clone();
            for segment in &record.partitions {
                logical.push('/');
                logical.push_str(segment);
            }
            let slot = format!("{logical}/{}", raw.partition);

            let mut batches = self.batches.lock().await;
            let batch = batches.entry(slot).or_insert_with(|| Batch {
                key: format!("{}{logical}/{}_{:020}.jsonl", self.key_prefix, raw.partition, raw.offset),
                topic: raw.topic.clone(),
                partition: raw.partition,
                lines: Vec::new(),
                records: 0,
                opened_at: Instant::now(),
            });
            batch.lines.extend_from_slice(&line);
            batch.lines.push(b'\n');
            batch.records += 1;
            Ok(())
        })
    }

    fn discard<'a>(
        &'a mut self,
        topic: &'a str,
        partition: u32,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let mut batches = self.batches.lock().await;
            let mut dropped = 0;
            batches.retain(|_, b| {
                let stale = b.topic == topic && b.partition == partition;
                if stale {
                    dropped += b.records as u64;
                }
                !stale
            });
            Ok(dropped)
        })
    }
}

/// Ships a batch once it holds `max_records` records or is older than the
/// max age. A forced check ships everything.
pub struct CountAgePolicy {
    batches: Batches,
    max_records: usize,
    max_age: Duration,
    backend: Arc<dyn UploadBackend>,
    metrics: Arc<dyn MetricsSink>,
}

impl UploadPolicy for CountAgePolicy {
    fn apply_policy(
        &mut self,
        force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            let due: Vec<Batch> = {
                let mut batches = self.batches.lock().await;
                let slots: Vec<String> = batches
                    .iter()
                    .filter(|(_, b)| {
                        force || b.records >= self.max_records || b.opened_at.elapsed() >= self.max_age
                    })
                    .map(|(slot, _)| slot.clone())
                    .collect();
                slots.iter().filter_map(|slot| batches.remove(slot)).collect()
            };

            for batch in due {
                let bytes = batch.lines.len();
                self.backend
                    .upload(&batch.key, batch.lines)
                    .await
                    .map_err(|e| e.with_context(format!("upload {}", batch.key)))?;
                self.metrics.increment("uploader.file_uploads.count", 1, &batch.topic);
                self.metrics.observe("uploader.file_size_bytes", bytes as f64, &batch.topic);
                tracing::info!(key = %batch.key, records = batch.records, bytes, force, "uploaded batch");
            }
            Ok(())
        })
    }
}

pub fn create(config: &serde_json::Value, ctx: StorageContext) -> Result<StorageParts, PluginError> {
    let cfg: MemoryStorageConfig = parse_plugin_config(config)?;
    if cfg.max_records == 0 {
        return Err(PluginError::config("max_records must be greater than zero"));
    }
    let batches = Batches::default();
    Ok(StorageParts {
        writer: Box::new(MemoryWriter {
            batches: batches.clone(),
            key_prefix: cfg.key_prefix,
        }),
        policy: Box::new(CountAgePolicy {
            batches,
            max_records: cfg.max_records,
            max_age: ctx.max_file_age,
            backend: ctx.backend,
            metrics: ctx.metrics,
        }),
    })
}
