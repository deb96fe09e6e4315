pub mod error;
pub mod metrics;
pub mod processor;
pub mod record;
pub mod source;
pub mod storage;

pub use error::{ErrorKind, PluginError, parse_plugin_config};
pub use metrics::MetricsSink;
pub use processor::{RecordParser, RecordTransformer};
pub use record::{ParsedRecord, Record};
pub use source::{OffsetAdjustment, OffsetTracker, RecordSource};
pub use storage::{RecordWriter, StorageContext, StorageParts, UploadBackend, UploadPolicy};
