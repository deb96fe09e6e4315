use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::consumer::ConsumerReport;
use crate::error::EngineError;

/// Flag a consumer loop reads once per tick. Flipped at most once, never reset.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn request(&self) {
        self.token.cancel();
    }
}

/// Synchronous, data-safe shutdown of one consumer task.
///
/// Only installed for consumers running with `upload_on_shutdown`: once
/// [`request_shutdown`](Self::request_shutdown) returns, the loop has exited
/// and performed its forced final upload.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    name: String,
    signal: ShutdownSignal,
    handle: JoinHandle<Result<ConsumerReport, EngineError>>,
}

impl ShutdownCoordinator {
    pub fn install(
        name: impl Into<String>,
        signal: ShutdownSignal,
        handle: JoinHandle<Result<ConsumerReport, EngineError>>,
    ) -> Self {
        Self {
            name: name.into(),
            signal,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Set the flag without waiting. Lets a caller signal several loops before joining them.
    pub fn signal(&self) {
        self.signal.request();
    }

    /// Set the flag, then wait until the consumer task has fully exited.
    pub async fn request_shutdown(self) -> Result<ConsumerReport, EngineError> {
        self.signal.request();
        tracing::info!(consumer = %self.name, "shutdown requested, waiting for final upload");
        join_consumer(&self.name, self.handle).await
    }
}

pub(crate) async fn join_consumer(
    name: &str,
    handle: JoinHandle<Result<ConsumerReport, EngineError>>,
) -> Result<ConsumerReport, EngineError> {
    handle.await.map_err(|e| EngineError::Join {
        name: name.to_string(),
        message: e.to_string(),
    })?
}
