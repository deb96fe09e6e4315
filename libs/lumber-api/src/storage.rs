use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::PluginError;
use crate::metrics::MetricsSink;
use crate::record::ParsedRecord;

/// Durable per-partition writer. Any error is fatal for the consumer loop.
pub trait RecordWriter: Send {
    fn write<'a>(
        &'a mut self,
        record: &'a ParsedRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>>;

    /// Drop everything written for `(topic, partition)` that was not uploaded yet.
    ///
    /// Called when the source rewinds or skips, before the replayed records
    /// are written again. Returns the number of records dropped.
    fn discard<'a>(
        &'a mut self,
        topic: &'a str,
        partition: u32,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PluginError>> + Send + 'a>>;
}

/// Upload/flush policy over whatever the writer has produced.
///
/// Invoked with `force = false` on the consumer's cadence and with `force = true`
/// exactly once when the consumer exits. Any error is fatal.
pub trait UploadPolicy: Send {
    fn apply_policy(
        &mut self,
        force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;
}

/// Remote object store that upload policies ship finished data to.
///
/// Shared by every consumer loop of the process.
pub trait UploadBackend: Send + Sync {
    fn upload<'a>(
        &'a self,
        key: &'a str,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>>;
}

/// Context provided to storage at creation time.
pub struct StorageContext {
    /// Name of the consumer instance the storage belongs to.
    pub instance: String,
    /// Same value the consumer's cadence is derived from.
    pub max_file_age: Duration,
    pub backend: Arc<dyn UploadBackend>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// A storage plugin yields a writer and the policy that flushes what it wrote.
/// The two usually share internal state (open files, buffers).
pub struct StorageParts {
    pub writer: Box<dyn RecordWriter>,
    pub policy: Box<dyn UploadPolicy>,
}
