use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use lumber_api::error::{PluginError, parse_plugin_config};
use lumber_api::record::Record;
use lumber_api::source::RecordSource;

fn default_poll_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize)]
struct LinesConfig {
    path: PathBuf,
    topic: String,
    #[serde(default)]
    partition: u32,
    /// Keep waiting for appended lines at end of file instead of exhausting.
    #[serde(default)]
    follow: bool,
    /// Bounded wait of one read in follow mode.
    #[serde(default = "default_poll_timeout_ms")]
    poll_timeout_ms: u64,
    /// Max line length in bytes (0 = unlimited).
    #[serde(default)]
    max_length: usize,
}

/// Newline-delimited file as a single-partition record source.
///
/// The offset of a record is its zero-based line index, the payload is the
/// line without its `\n` (or `\r\n`) terminator.
pub struct LinesSource {
    reader: BufReader<tokio::fs::File>,
    path: PathBuf,
    topic: String,
    partition: u32,
    follow: bool,
    poll_timeout: Duration,
    max_length: usize,
    next_offset: u64,
    /// Bytes of a line whose terminator has not been written yet.
    partial: Vec<u8>,
    /// Record read ahead by `has_next`.
    pending: Option<Record>,
}

impl LinesSource {
    fn open(cfg: LinesConfig) -> Result<Self, PluginError> {
        let file = std::fs::File::open(&cfg.path)
            .map_err(|e| PluginError::io(format!("open {}: {e}", cfg.path.display())))?;
        tracing::info!(path = %cfg.path.display(), topic = %cfg.topic, partition = cfg.partition, follow = cfg.follow, "opened lines source");
        Ok(Self {
            reader: BufReader::new(tokio::fs::File::from_std(file)),
            path: cfg.path,
            topic: cfg.topic,
            partition: cfg.partition,
            follow: cfg.follow,
            poll_timeout: Duration::from_millis(cfg.poll_timeout_ms),
            max_length: cfg.max_length,
            next_offset: 0,
            partial: Vec::new(),
            pending: None,
        })
    }

    /// Next complete line, or `None` at end of file.
    ///
    /// Without `follow` an unterminated last line counts as complete.
    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, PluginError> {
        self.reader
            .read_until(b'\n', &mut self.partial)
            .await
            .map_err(|e| PluginError::io(format!("read {}: {e}", self.path.display())))?;

        let terminated = self.partial.last() == Some(&b'\n');
        if !terminated && (self.follow || self.partial.is_empty()) {
            if self.max_length > 0 && self.partial.len() > self.max_length {
                return Err(PluginError::format(format!(
                    "line too long: {} bytes (max {}) and no newline found",
                    self.partial.len(),
                    self.max_length
                )));
            }
            return Ok(None);
        }

        let mut line = std::mem::take(&mut self.partial);
        if terminated {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        if self.max_length > 0 && line.len() > self.max_length {
            return Err(PluginError::format(format!(
                "line too long: {} bytes (max {})",
                line.len(),
                self.max_length
            )));
        }
        Ok(Some(line))
    }

    fn to_record(&mut self, line: Vec<u8>) -> Record {
        let record = Record::new(&self.topic, self.partition, self.next_offset, line, now_ms());
        self.next_offset += 1;
        record
    }
}

impl RecordSource for LinesSource {
    fn has_next(&mut self) -> Pin<Box<dyn Future<Output = Result<bool, PluginError>> + Send + '_>> {
        Box::pin(async move {
            if self.follow || self.pending.is_some() {
                return Ok(true);
            }
            match self.next_line().await? {
                Some(line) => {
                    self.pending = Some(self.to_record(line));
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn read(&mut self) -> Pin<Box<dyn Future<Output = Result<Record, PluginError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(record) = self.pending.take() {
                return Ok(record);
            }
            if let Some(line) = self.next_line().await? {
                return Ok(self.to_record(line));
            }
            if !self.follow {
                return Err(PluginError::logic(format!("read past end of {}", self.path.display())));
            }

            tokio::time::sleep(self.poll_timeout).await;
            match self.next_line().await? {
                Some(line) => Ok(self.to_record(line)),
                None => Err(PluginError::timeout(format!(
                    "no new line in {} within {}ms",
                    self.path.display(),
                    self.poll_timeout.as_millis()
                ))),
            }
        })
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn create(config: &serde_json::Value) -> Result<Box<dyn RecordSource>, PluginError> {
    let cfg: LinesConfig = parse_plugin_config(config)?;
    Ok(Box::new(LinesSource::open(cfg)?))
}
