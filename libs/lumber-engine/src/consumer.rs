use std::sync::Arc;

use lumber_api::metrics::MetricsSink;
use lumber_api::processor::{RecordParser, RecordTransformer};
use lumber_api::source::{OffsetAdjustment, OffsetTracker, RecordSource};
use lumber_api::storage::{RecordWriter, UploadPolicy};

use crate::cadence::Cadence;
use crate::config::ConsumerSettings;
use crate::error::EngineError;
use crate::shutdown::ShutdownSignal;
use crate::tolerance::ErrorTolerance;

pub const METRIC_MESSAGE_ERRORS: &str = "consumer.message_errors.count";
pub const METRIC_MESSAGE_SIZE: &str = "consumer.message_size_bytes";
pub const METRIC_THROUGHPUT: &str = "consumer.throughput_bytes";

/// Everything a consumer loop talks to. Built once by the engine (or a test) and
/// moved into the loop.
pub struct Collaborators {
    pub source: Box<dyn RecordSource>,
    pub offsets: Box<dyn OffsetTracker>,
    pub transformer: Arc<dyn RecordTransformer>,
    pub parser: Arc<dyn RecordParser>,
    pub writer: Box<dyn RecordWriter>,
    pub policy: Box<dyn UploadPolicy>,
    pub metrics: Arc<dyn MetricsSink>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitReason {
    /// The source reported it has no more records.
    #[default]
    Exhausted,
    /// Shutdown was requested with `upload_on_shutdown` enabled.
    Shutdown,
}

/// Counters of a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerReport {
    pub ticks: u64,
    pub records: u64,
    pub timeouts: u64,
    pub filtered: u64,
    pub dropped: u64,
    pub written: u64,
    /// Non-forced checks only. The forced one always happens exactly once.
    pub policy_checks: u64,
    /// Decayed unparsable count when the loop stopped.
    pub unparsable: f64,
    pub exit: ExitReason,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Exhausted,
    Timeout,
    Filtered,
    Dropped,
    Written,
}

/// Per-partition ingestion loop.
///
/// Each tick polls the source, adjusts the record's offset (dropping stale
/// local data when the offset is not contiguous), transforms, parses and
/// writes it, then consults the shutdown signal and the policy
/// cadence. Parse failures go through an [`ErrorTolerance`] breaker; offset,
/// write and policy failures end the loop at once.
///
/// However the loop leaves `RUNNING` (source exhausted, or shutdown observed
/// with `upload_on_shutdown`), it applies the upload policy forced exactly
/// once before `run` returns.
pub struct Consumer {
    name: String,
    settings: ConsumerSettings,
    collaborators: Collaborators,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Consumer {
    pub fn new(name: impl Into<String>, settings: ConsumerSettings, collaborators: Collaborators) -> Self {
        Self {
            name: name.into(),
            settings,
            collaborators,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(mut self, signal: ShutdownSignal) -> Result<ConsumerReport, EngineError> {
        let mut tolerance = ErrorTolerance::new();
        let mut cadence = Cadence::new(
            self.settings.max_file_age_seconds,
            self.settings.messages_per_second,
        );
        let mut report = ConsumerReport::default();

        tracing::info!(
            consumer = %self.name,
            state = "RUNNING",
            messages_per_check = self.settings.messages_per_second,
            check_interval_secs = cadence.check_interval().as_secs(),
            upload_on_shutdown = self.settings.upload_on_shutdown,
            "consumer started"
        );

        let exit = loop {
            let tick = match self.consume_next(&mut tolerance).await {
                Ok(tick) => tick,
                Err(err @ EngineError::TooManyParseFailures { .. }) => {
                    // Records already written must still get uploaded.
                    if let Err(e) = self.forced_check().await {
                        tracing::error!(consumer = %self.name, error = %e, "final upload after parse failures failed");
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            };

            match tick {
                Tick::Exhausted => break ExitReason::Exhausted,
                Tick::Timeout => report.timeouts += 1,
                Tick::Filtered => {
                    report.records += 1;
                    report.filtered += 1;
                }
                Tick::Dropped => {
                    report.records += 1;
                    report.dropped += 1;
                }
                Tick::Written => {
                    report.records += 1;
                    report.written += 1;
                }
            }
            cadence.record_tick();

            if self.settings.upload_on_shutdown && signal.is_requested() {
                tracing::info!(consumer = %self.name, state = "DRAINING", "shutdown requested");
                break ExitReason::Shutdown;
            }

            if cadence.is_due() {
                tracing::debug!(consumer = %self.name, iterations = cadence.iterations(), "applying upload policy");
                self.collaborators
                    .policy
                    .apply_policy(false)
                    .await
                    .map_err(|source| EngineError::Policy { forced: false, source })?;
                report.policy_checks += 1;
            }
        };

        self.forced_check().await?;

        report.ticks = cadence.iterations();
        report.unparsable = tolerance.value();
        report.exit = exit;
        tracing::info!(
            consumer = %self.name,
            state = "STOPPED",
            exit = ?exit,
            ticks = report.ticks,
            written = report.written,
            dropped = report.dropped,
            "consumer stopped"
        );
        Ok(report)
    }

    async fn forced_check(&mut self) -> Result<(), EngineError> {
        tracing::info!(consumer = %self.name, "applying forced upload policy");
        self.collaborators
            .policy
            .apply_policy(true)
            .await
            .map_err(|source| EngineError::Policy { forced: true, source })
    }

    async fn consume_next(&mut self, tolerance: &mut ErrorTolerance) -> Result<Tick, EngineError> {
        let c = &mut self.collaborators;

        let more = c
            .source
            .has_next()
            .await
            .map_err(|source| EngineError::Source { source })?;
        if !more {
            return Ok(Tick::Exhausted);
        }

        let record = match c.source.read().await {
            Ok(record) => record,
            Err(e) if e.is_timeout() => {
                tracing::trace!(consumer = %self.name, "consumer timed out");
                return Ok(Tick::Timeout);
            }
            Err(source) => return Err(EngineError::Source { source }),
        };

        let adjustment = c
            .offsets
            .adjust_offset(&record)
            .await
            .map_err(|source| EngineError::Offset {
                record: record.to_truncated_string(),
                source,
            })?;
        if let OffsetAdjustment::Discontinuous { last } = adjustment {
            let discarded = c
                .writer
                .discard(&record.topic, record.partition)
                .await
                .map_err(|source| EngineError::Offset {
                    record: record.to_truncated_string(),
                    source,
                })?;
            tracing::info!(
                consumer = %self.name,
                topic = %record.topic,
                partition = record.partition,
                last,
                offset = record.offset,
                discarded,
                "discarded local data after offset discontinuity"
            );
        }

        // Transformer failures count against the tolerance like parse failures.
        let parsed = match c.transformer.transform(&record) {
            Ok(None) => return Ok(Tick::Filtered),
            Ok(Some(transformed)) => c.parser.parse(transformed),
            Err(e) => Err(e),
        };

        let parsed = match parsed {
            Ok(parsed) => {
                tolerance.record_success();
                parsed
            }
            Err(source) => {
                c.metrics.increment(METRIC_MESSAGE_ERRORS, 1, &record.topic);
                if tolerance.record_failure() {
                    return Err(EngineError::TooManyParseFailures {
                        record: record.to_truncated_string(),
                        count: tolerance.value(),
                        source,
                    });
                }
                tracing::warn!(
                    consumer = %self.name,
                    record = %record.to_truncated_string(),
                    unparsable = tolerance.value(),
                    error = %source,
                    "failed to parse record, dropping it"
                );
                return Ok(Tick::Dropped);
            }
        };

        if let Err(source) = c.writer.write(&parsed).await {
            tracing::trace!(consumer = %self.name, record = %parsed, "write failed");
            return Err(EngineError::Write {
                record: parsed.to_truncated_string(),
                source,
            });
        }

        let size = record.payload.len();
        c.metrics.observe(METRIC_MESSAGE_SIZE, size as f64, &record.topic);
        c.metrics.increment(METRIC_THROUGHPUT, size as u64, &record.topic);
        Ok(Tick::Written)
    }
}
