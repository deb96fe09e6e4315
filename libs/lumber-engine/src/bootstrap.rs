use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use lumber_api::storage::StorageContext;

use crate::config::LumberConfig;
use crate::consumer::{Collaborators, Consumer, ConsumerReport};
use crate::error::EngineError;
use crate::registry::ComponentRegistry;
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal};

/// How a consumer task is stopped when the engine shuts down.
enum Stopper {
    /// `upload_on_shutdown`: signal, then wait for the final upload.
    Coordinated(ShutdownCoordinator),
    /// No drain: the task is aborted at its next await point.
    Abortable(JoinHandle<Result<ConsumerReport, EngineError>>),
}

/// Per-consumer stop handle.
struct ConsumerSlot {
    name: String,
    stopper: Stopper,
}

#[derive(Debug)]
pub enum ConsumerOutcome {
    Finished(ConsumerReport),
    Failed(EngineError),
    /// Stopped without draining.
    Aborted,
}

#[derive(Debug)]
pub struct ConsumerExit {
    pub name: String,
    pub outcome: ConsumerOutcome,
}

impl ConsumerExit {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ConsumerOutcome::Failed(_))
    }
}

/// The running engine: one consumer task per configured partition.
pub struct Engine {
    slots: Vec<ConsumerSlot>,
    /// Each task sends its name when `run` returned. Closed once every task is gone.
    exited_rx: mpsc::UnboundedReceiver<String>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.slots.iter().map(|s| s.name.as_str()).collect();
        f.debug_struct("Engine").field("consumers", &names).finish()
    }
}

impl Engine {
    /// Build every consumer from the configuration, then spawn them.
    ///
    /// Transformer, parser, upload backend and metrics sink are created once
    /// and shared. Source, offset tracker and storage are created per partition.
    /// Nothing is spawned unless every partition could be built.
    pub fn bootstrap(config: &LumberConfig, registry: &ComponentRegistry) -> Result<Self, EngineError> {
        config.validate()?;

        // --- 1. Shared components ---
        let metrics = registry
            .create_metrics(&config.metrics)
            .map_err(|e| e.with_context("metrics"))?;
        let backend = registry
            .create_upload(&config.upload)
            .map_err(|e| e.with_context("upload"))?;
        let transformer = registry
            .create_transformer(&config.transformer)
            .map_err(|e| e.with_context("transformer"))?;
        let parser = registry
            .create_parser(&config.parser)
            .map_err(|e| e.with_context("parser"))?;

        // --- 2. One consumer per partition ---
        let mut consumers = Vec::with_capacity(config.partitions.len());
        for partition in &config.partitions {
            let ctx = format!("partition '{}'", partition.name);

            let source = registry
                .create_source(&partition.source)
                .map_err(|e| e.with_context(&ctx))?;
            let offsets = registry
                .create_offsets(&config.offsets, &partition.name)
                .map_err(|e| e.with_context(&ctx))?;
            let storage = registry
                .create_storage(
                    &config.storage,
                    StorageContext {
                        instance: partition.name.clone(),
                        max_file_age: Duration::from_secs(config.consumer.max_file_age_seconds),
                        backend: backend.clone(),
                        metrics: metrics.clone(),
                    },
                )
                .map_err(|e| e.with_context(&ctx))?;

            consumers.push(Consumer::new(
                partition.name.clone(),
                config.consumer,
                Collaborators {
                    source,
                    offsets,
                    transformer: transformer.clone(),
                    parser: parser.clone(),
                    writer: storage.writer,
                    policy: storage.policy,
                    metrics: metrics.clone(),
                },
            ));
            tracing::info!(
                partition = %partition.name,
                source = %partition.source.kind,
                storage = %config.storage.kind,
                "created consumer"
            );
        }

        // --- 3. Spawn ---
        let (exited_tx, exited_rx) = mpsc::unbounded_channel();
        let slots = consumers
            .into_iter()
            .map(|consumer| spawn_consumer(consumer, config.consumer.upload_on_shutdown, exited_tx.clone()))
            .collect();

        Ok(Engine { slots, exited_rx })
    }

    pub fn consumer_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }

    /// Run until every consumer has exited on its own or `shutdown` resolves,
    /// then shut down.
    pub async fn run_until<F>(mut self, shutdown: F) -> Vec<ConsumerExit>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                exited = self.exited_rx.recv() => match exited {
                    Some(name) => tracing::debug!(consumer = %name, "consumer exited"),
                    None => {
                        tracing::info!("all consumers exited");
                        break;
                    }
                },
            }
        }
        self.shutdown().await
    }

    /// Stop every consumer and collect how each one ended.
    ///
    /// Draining consumers are all signalled first, so their final uploads run
    /// concurrently, then joined one by one.
    pub async fn shutdown(self) -> Vec<ConsumerExit> {
        for slot in &self.slots {
            if let Stopper::Coordinated(ref coordinator) = slot.stopper {
                coordinator.signal();
            }
        }

        let mut exits = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            let outcome = match slot.stopper {
                Stopper::Coordinated(coordinator) => match coordinator.request_shutdown().await {
                    Ok(report) => ConsumerOutcome::Finished(report),
                    Err(e) => ConsumerOutcome::Failed(e),
                },
                Stopper::Abortable(handle) => {
                    handle.abort();
                    match handle.await {
                        Ok(Ok(report)) => ConsumerOutcome::Finished(report),
                        Ok(Err(e)) => ConsumerOutcome::Failed(e),
                        Err(e) if e.is_cancelled() => {
                            tracing::warn!(consumer = %slot.name, "consumer aborted without final upload");
                            ConsumerOutcome::Aborted
                        }
                        Err(e) => ConsumerOutcome::Failed(EngineError::Join {
                            name: slot.name.clone(),
                            message: e.to_string(),
                        }),
                    }
                }
            };
            exits.push(ConsumerExit {
                name: slot.name,
                outcome,
            });
        }

        tracing::info!("engine shut down");
        exits
    }
}

fn spawn_consumer(
    consumer: Consumer,
    upload_on_shutdown: bool,
    exited_tx: mpsc::UnboundedSender<String>,
) -> ConsumerSlot {
    let name = consumer.name().to_string();
    let signal = ShutdownSignal::new();

    let task_name = name.clone();
    let handle = tokio::spawn({
        let signal = signal.clone();
        async move {
            let result = consumer.run(signal).await;
            match result {
                Ok(ref report) => tracing::info!(
                    consumer = %task_name,
                    exit = ?report.exit,
                    records = report.records,
                    "consumer finished"
                ),
                Err(ref e) => tracing::error!(consumer = %task_name, error = %e, "consumer failed"),
            }
            let _ = exited_tx.send(task_name);
            result
        }
    });

    let stopper = if upload_on_shutdown {
        Stopper::Coordinated(ShutdownCoordinator::install(name.clone(), signal, handle))
    } else {
        Stopper::Abortable(handle)
    };
    tracing::info!(consumer = %name, upload_on_shutdown, "spawned consumer");

    ConsumerSlot { name, stopper }
}
