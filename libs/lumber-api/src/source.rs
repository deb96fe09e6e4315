use std::future::Future;
use std::pin::Pin;

use crate::error::PluginError;
use crate::record::Record;

/// Partitioned, offset-addressed record source.
///
/// One source instance feeds exactly one consumer loop and is driven from that
/// loop's task only.
pub trait RecordSource: Send {
    /// `false` means the source is permanently exhausted.
    fn has_next(&mut self) -> Pin<Box<dyn Future<Output = Result<bool, PluginError>> + Send + '_>>;

    /// Read the next record, waiting a bounded amount of time.
    ///
    /// Returns an error of kind [`ErrorKind::Timeout`](crate::error::ErrorKind::Timeout)
    /// when nothing arrived within the bound. Any other error is fatal for the loop.
    fn read(&mut self) -> Pin<Box<dyn Future<Output = Result<Record, PluginError>> + Send + '_>>;
}

/// How a record's offset relates to the last one seen for its topic partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetAdjustment {
    /// First record of the partition, or the successor of the last one.
    Contiguous,
    /// Rewind or gap. Data written locally for the partition is stale and must be discarded.
    Discontinuous { last: u64 },
}

/// Offset bookkeeping. Called for every record before it is transformed or parsed.
pub trait OffsetTracker: Send {
    fn adjust_offset<'a>(
        &'a mut self,
        record: &'a Record,
    ) -> Pin<Box<dyn Future<Output = Result<OffsetAdjustment, PluginError>> + Send + 'a>>;
}
