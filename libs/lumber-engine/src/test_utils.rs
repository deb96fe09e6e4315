//! Scripted collaborators that journal every call, for consumer loop tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lumber_api::error::PluginError;
use lumber_api::metrics::MetricsSink;
use lumber_api::processor::{RecordParser, RecordTransformer};
use lumber_api::record::{ParsedRecord, Record};
use lumber_api::source::{OffsetAdjustment, OffsetTracker, RecordSource};
use lumber_api::storage::{RecordWriter, StorageContext, StorageParts, UploadBackend, UploadPolicy};

use crate::config::ConsumerSettings;
use crate::consumer::{Collaborators, Consumer};
use crate::registry::ComponentRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    HasNext,
    Read,
    Adjust(u64),
    Transform(u64),
    Parse(u64),
    Write(u64),
    Discard { partition: u32 },
    Policy { force: bool },
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    /// Events for one record offset, in call order.
    pub fn for_offset(&self, offset: u64) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| match e {
                Event::Adjust(o) | Event::Transform(o) | Event::Parse(o) | Event::Write(o) => *o == offset,
                _ => false,
            })
            .collect()
    }
}

pub fn record(offset: u64, payload: &str) -> Record {
    Record::new("events", 0, offset, payload.as_bytes().to_vec(), 1_700_000_000_000 + offset as i64)
}

pub enum Step {
    Record(Record),
    Timeout,
    Fail,
}

pub struct ScriptedSource {
    journal: Journal,
    steps: VecDeque<Step>,
    endless: bool,
}

impl ScriptedSource {
    pub fn new(journal: Journal, steps: Vec<Step>) -> Self {
        Self {
            journal,
            steps: steps.into(),
            endless: false,
        }
    }

    /// After the script runs out, keep timing out (10ms per read) instead of exhausting.
    pub fn endless(mut self) -> Self {
        self.endless = true;
        self
    }
}

impl RecordSource for ScriptedSource {
    fn has_next(&mut self) -> Pin<Box<dyn Future<Output = Result<bool, PluginError>> + Send + '_>> {
        self.journal.push(Event::HasNext);
        let more = self.endless || !self.steps.is_empty();
        Box::pin(async move { Ok(more) })
    }

    fn read(&mut self) -> Pin<Box<dyn Future<Output = Result<Record, PluginError>> + Send + '_>> {
        self.journal.push(Event::Read);
        let step = self.steps.pop_front();
        let endless = self.endless;
        Box::pin(async move {
            match step {
                Some(Step::Record(record)) => Ok(record),
                Some(Step::Timeout) => Err(PluginError::timeout("scripted timeout")),
                Some(Step::Fail) => Err(PluginError::io("broker connection lost")),
                None if endless => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err(PluginError::timeout("idle"))
                }
                None => Err(PluginError::logic("read past the end of the script")),
            }
        })
    }
}

/// Reports a discontinuity whenever an offset is not the successor of the previous one.
pub struct ScriptedOffsets {
    journal: Journal,
    fail_on: Option<u64>,
    last: Option<u64>,
}

impl OffsetTracker for ScriptedOffsets {
    fn adjust_offset<'a>(
        &'a mut self,
        record: &'a Record,
    ) -> Pin<Box<dyn Future<Output = Result<OffsetAdjustment, PluginError>> + Send + 'a>> {
        self.journal.push(Event::Adjust(record.offset));
        let failed = self.fail_on == Some(record.offset);
        let adjustment = match self.last.replace(record.offset) {
            Some(last) if last + 1 != record.offset => OffsetAdjustment::Discontinuous { last },
            _ => OffsetAdjustment::Contiguous,
        };
        Box::pin(async move {
            if failed {
                Err(PluginError::io("offset store unavailable"))
            } else {
                Ok(adjustment)
            }
        })
    }
}

/// Payload `drop` is filtered out, payload `boom` fails.
pub struct ScriptedTransformer {
    journal: Journal,
}

impl RecordTransformer for ScriptedTransformer {
    fn transform(&self, record: &Record) -> Result<Option<Record>, PluginError> {
        self.journal.push(Event::Transform(record.offset));
        match record.payload.as_slice() {
            b"drop" => Ok(None),
            b"boom" => Err(PluginError::logic("transformer blew up")),
            _ => Ok(Some(record.clone())),
        }
    }
}

/// Payloads starting with `bad` fail to parse.
pub struct ScriptedParser {
    journal: Journal,
}

impl RecordParser for ScriptedParser {
    fn parse(&self, record: Record) -> Result<ParsedRecord, PluginError> {
        self.journal.push(Event::Parse(record.offset));
        if record.payload.starts_with(b"bad") {
            return Err(PluginError::format("not json"));
        }
        Ok(ParsedRecord::new(record, vec!["dt=2023-11-14".to_string()]))
    }
}

pub struct ScriptedWriter {
    journal: Journal,
    fail_on: Option<u64>,
    fail_discard: bool,
}

impl RecordWriter for ScriptedWriter {
    fn write<'a>(
        &'a mut self,
        record: &'a ParsedRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        let offset = record.record.offset;
        self.journal.push(Event::Write(offset));
        let failed = self.fail_on == Some(offset);
        Box::pin(async move {
            if failed {
                Err(PluginError::io("disk full"))
            } else {
                Ok(())
            }
        })
    }

    fn discard<'a>(
        &'a mut self,
        _topic: &'a str,
        partition: u32,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PluginError>> + Send + 'a>> {
        self.journal.push(Event::Discard { partition });
        let fail = self.fail_discard;
        Box::pin(async move {
            if fail {
                Err(PluginError::io("cannot remove local file"))
            } else {
                Ok(0)
            }
        })
    }
}

pub struct ScriptedPolicy {
    journal: Journal,
    fail_unforced: bool,
    fail_forced: bool,
}

impl UploadPolicy for ScriptedPolicy {
    fn apply_policy(
        &mut self,
        force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        self.journal.push(Event::Policy { force });
        let failed = if force { self.fail_forced } else { self.fail_unforced };
        Box::pin(async move {
            if failed {
                Err(PluginError::io("upload rejected"))
            } else {
                Ok(())
            }
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordingMetrics {
    samples: Mutex<Vec<(String, f64)>>,
}

impl RecordingMetrics {
    pub fn total(&self, name: &str) -> f64 {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v)
            .sum()
    }
}

impl MetricsSink for RecordingMetrics {
    fn increment(&self, name: &str, delta: u64, _topic: &str) {
        self.samples.lock().unwrap().push((name.to_string(), delta as f64));
    }

    fn observe(&self, name: &str, value: f64, _topic: &str) {
        self.samples.lock().unwrap().push((name.to_string(), value));
    }
}

/// Builds a [`Consumer`] wired to scripted collaborators sharing one journal.
pub struct TestConsumer {
    journal: Journal,
    source: ScriptedSource,
    settings: ConsumerSettings,
    offset_fail_on: Option<u64>,
    write_fail_on: Option<u64>,
    fail_discard: bool,
    fail_unforced: bool,
    fail_forced: bool,
    metrics: Arc<RecordingMetrics>,
}

impl TestConsumer {
    pub fn new(journal: Journal, steps: Vec<Step>) -> Self {
        Self {
            source: ScriptedSource::new(journal.clone(), steps),
            journal,
            settings: ConsumerSettings {
                max_file_age_seconds: 3600,
                messages_per_second: 1000,
                upload_on_shutdown: false,
            },
            offset_fail_on: None,
            write_fail_on: None,
            fail_discard: false,
            fail_unforced: false,
            fail_forced: false,
            metrics: Arc::default(),
        }
    }

    pub fn endless(journal: Journal) -> Self {
        let mut builder = Self::new(journal, Vec::new());
        builder.source = builder.source.endless();
        builder
    }

    pub fn upload_on_shutdown(mut self, enabled: bool) -> Self {
        self.settings.upload_on_shutdown = enabled;
        self
    }

    pub fn messages_per_second(mut self, n: u64) -> Self {
        self.settings.messages_per_second = n;
        self
    }

    pub fn max_file_age_seconds(mut self, secs: u64) -> Self {
        self.settings.max_file_age_seconds = secs;
        self
    }

    pub fn fail_offset_on(mut self, offset: u64) -> Self {
        self.offset_fail_on = Some(offset);
        self
    }

    pub fn fail_write_on(mut self, offset: u64) -> Self {
        self.write_fail_on = Some(offset);
        self
    }

    pub fn fail_discard(mut self) -> Self {
        self.fail_discard = true;
        self
    }

    pub fn fail_policy(mut self, forced: bool) -> Self {
        if forced {
            self.fail_forced = true;
        } else {
            self.fail_unforced = true;
        }
        self
    }

    pub fn metrics(mut self, metrics: Arc<RecordingMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> Consumer {
        let collaborators = Collaborators {
            source: Box::new(self.source),
            offsets: Box::new(ScriptedOffsets {
                journal: self.journal.clone(),
                fail_on: self.offset_fail_on,
                last: None,
            }),
            transformer: Arc::new(ScriptedTransformer {
                journal: self.journal.clone(),
            }),
            parser: Arc::new(ScriptedParser {
                journal: self.journal.clone(),
            }),
            writer: Box::new(ScriptedWriter {
                journal: self.journal.clone(),
                fail_on: self.write_fail_on,
                fail_discard: self.fail_discard,
            }),
            policy: Box::new(ScriptedPolicy {
                journal: self.journal.clone(),
                fail_unforced: self.fail_unforced,
                fail_forced: self.fail_forced,
            }),
            metrics: self.metrics,
        };
        Consumer::new("events-0", self.settings, collaborators)
    }
}

pub struct NullBackend;

impl UploadBackend for NullBackend {
    fn upload<'a>(
        &'a self,
        _key: &'a str,
        _data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

// Registry factories. Config of the `scripted` source:
// `records` (count of `{}` payloads), `fail` (then a fatal read), `endless`.

fn create_source(config: &serde_json::Value) -> Result<Box<dyn RecordSource>, PluginError> {
    let count = config.get("records").and_then(serde_json::Value::as_u64).unwrap_or(0);
    let mut steps: Vec<Step> = (0..count).map(|i| Step::Record(record(i, "{}"))).collect();
    if config.get("fail").and_then(serde_json::Value::as_bool) == Some(true) {
        steps.push(Step::Fail);
    }
    let source = ScriptedSource::new(Journal::default(), steps);
    if config.get("endless").and_then(serde_json::Value::as_bool) == Some(true) {
        Ok(Box::new(source.endless()))
    } else {
        Ok(Box::new(source))
    }
}

fn create_transformer(_config: &serde_json::Value) -> Result<Box<dyn RecordTransformer>, PluginError> {
    Ok(Box::new(ScriptedTransformer {
        journal: Journal::default(),
    }))
}

fn create_parser(_config: &serde_json::Value) -> Result<Box<dyn RecordParser>, PluginError> {
    Ok(Box::new(ScriptedParser {
        journal: Journal::default(),
    }))
}

fn create_storage(_config: &serde_json::Value, _ctx: StorageContext) -> Result<StorageParts, PluginError> {
    let journal = Journal::default();
    Ok(StorageParts {
        writer: Box::new(ScriptedWriter {
            journal: journal.clone(),
            fail_on: None,
            fail_discard: false,
        }),
        policy: Box::new(ScriptedPolicy {
            journal,
            fail_unforced: false,
            fail_forced: false,
        }),
    })
}

fn create_upload(_config: &serde_json::Value) -> Result<Box<dyn UploadBackend>, PluginError> {
    Ok(Box::new(NullBackend))
}

/// Builtins plus `scripted` for every pluggable kind.
pub fn scripted_registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::with_builtins();
    registry
        .register_source("scripted", create_source)
        .register_transformer("scripted", create_transformer)
        .register_parser("scripted", create_parser)
        .register_storage("scripted", create_storage)
        .register_upload("scripted", create_upload);
    registry
}
