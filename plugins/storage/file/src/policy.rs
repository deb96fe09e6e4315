use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use lumber_api::error::PluginError;
use lumber_api::metrics::MetricsSink;
use lumber_api::storage::{UploadBackend, UploadPolicy};

use crate::storage::FileRegistry;

/// Uploads a local file once it is big enough or old enough, then deletes it.
/// A forced check uploads every open file.
pub struct SizeAgePolicy {
    registry: FileRegistry,
    max_size: u64,
    max_age: Duration,
    backend: Arc<dyn UploadBackend>,
    metrics: Arc<dyn MetricsSink>,
}

impl SizeAgePolicy {
    pub fn new(
        registry: FileRegistry,
        max_size: u64,
        max_age: Duration,
        backend: Arc<dyn UploadBackend>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            registry,
            max_size,
            max_age,
            backend,
            metrics,
        }
    }
}

impl UploadPolicy for SizeAgePolicy {
    fn apply_policy(
        &mut self,
        force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            let (max_size, max_age) = (self.max_size, self.max_age);
            let due = self
                .registry
                .take_where(|f| force || f.size >= max_size || f.opened_at.elapsed() >= max_age)?;

            for file in due {
                let data = std::fs::read(&file.path)
                    .map_err(|e| PluginError::io(format!("read {}: {e}", file.path.display())))?;
                let bytes = data.len();
                self.backend
                    .upload(&file.key, data)
                    .await
                    .map_err(|e| e.with_context(format!("upload {}", file.key)))?;
                std::fs::remove_file(&file.path)
                    .map_err(|e| PluginError::io(format!("remove {}: {e}", file.path.display())))?;

                self.metrics.increment("uploader.file_uploads.count", 1, &file.topic);
                self.metrics.observe("uploader.file_size_bytes", bytes as f64, &file.topic);
                tracing::info!(key = %file.key, records = file.records, bytes, force, "uploaded file");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use lumber_api::record::{ParsedRecord, Record};

    #[derive(Default)]
    struct RecordingBackend {
        uploads: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    impl UploadBackend for RecordingBackend {
        fn upload<'a>(
            &'a self,
            key: &'a str,
            data: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
            Box::pin(async move {
                if self.fail {
                    return Err(PluginError::io("bucket unavailable"));
                }
                self.uploads.lock().unwrap().push((key.to_string(), data));
                Ok(())
            })
        }
    }

    struct NoMetrics;

    impl MetricsSink for NoMetrics {
        fn increment(&self, _name: &str, _delta: u64, _topic: &str) {}
        fn observe(&self, _name: &str, _value: f64, _topic: &str) {}
    }

    fn parsed(offset: u64, payload: &str) -> ParsedRecord {
        let record = Record::new("events", 0, offset, payload.as_bytes().to_vec(), 0);
        ParsedRecord::new(record, vec!["dt=2024-01-01".to_string()])
    }

    fn setup(
        dir: &std::path::Path,
        max_size: u64,
        backend: Arc<RecordingBackend>,
    ) -> (FileRegistry, SizeAgePolicy) {
        let registry = FileRegistry::new(dir, "");
        let policy = SizeAgePolicy::new(
            registry.clone(),
            max_size,
            Duration::from_secs(60),
            backend,
            Arc::new(NoMetrics),
        );
        (registry, policy)
    }

    #[tokio::test(start_paused = true)]
    async fn young_small_files_wait_for_a_forced_check() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordingBackend::default());
        let (registry, mut policy) = setup(dir.path(), 1024, backend.clone());

        registry.append(&parsed(5, "{\"a\":1}")).unwrap();
        policy.apply_policy(false).await.unwrap();
        assert!(backend.uploads.lock().unwrap().is_empty());
        assert_eq!(registry.open_files(), 1);

        policy.apply_policy(true).await.unwrap();
        let uploads = backend.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "events/dt=2024-01-01/0_00000000000000000005.jsonl");
        assert_eq!(uploads[0].1, b"{\"a\":1}\n");
        assert_eq!(registry.open_files(), 0);
        // The local copy is gone once uploaded.
        assert!(!dir.path().join("events/dt=2024-01-01/0_00000000000000000005.jsonl").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_file_is_uploaded_on_a_regular_check() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordingBackend::default());
        let (registry, mut policy) = setup(dir.path(), 8, backend.clone());

        registry.append(&parsed(0, "1234")).unwrap();
        policy.apply_policy(false).await.unwrap();
        assert!(backend.uploads.lock().unwrap().is_empty());

        registry.append(&parsed(1, "5678")).unwrap();
        policy.apply_policy(false).await.unwrap();
        assert_eq!(backend.uploads.lock().unwrap().len(), 1);

        // The next record starts a new file named after its own offset.
        registry.append(&parsed(2, "9")).unwrap();
        policy.apply_policy(true).await.unwrap();
        let uploads = backend.uploads.lock().unwrap();
        assert_eq!(uploads[1].0, "events/dt=2024-01-01/0_00000000000000000002.jsonl");
    }

    #[tokio::test(start_paused = true)]
    async fn old_file_is_uploaded_on_a_regular_check() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordingBackend::default());
        let (registry, mut policy) = setup(dir.path(), 1024, backend.clone());

        registry.append(&parsed(0, "{}")).unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        policy.apply_policy(false).await.unwrap();
        assert!(backend.uploads.lock().unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        policy.apply_policy(false).await.unwrap();
        assert_eq!(backend.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_upload_keeps_the_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordingBackend {
            fail: true,
            ..Default::default()
        });
        let (registry, mut policy) = setup(dir.path(), 1024, backend);

        registry.append(&parsed(0, "{}")).unwrap();
        let err = policy.apply_policy(true).await.unwrap_err();
        assert!(err.message.contains("bucket unavailable"), "{err}");
        assert!(dir.path().join("events/dt=2024-01-01/0_00000000000000000000.jsonl").exists());
    }
}
