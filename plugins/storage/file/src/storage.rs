use std::collections::BTreeMap;
use std::future::Future;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::Instant;

use lumber_api::error::PluginError;
use lumber_api::record::ParsedRecord;
use lumber_api::storage::RecordWriter;

// ════════════════════════════════════════════════════════════════
//  FileRegistry
// ════════════════════════════════════════════════════════════════

/// A local file still being written.
pub(crate) struct OpenFile {
    pub path: PathBuf,
    /// Object key the file is uploaded under.
    pub key: String,
    pub topic: String,
    pub partition: u32,
    pub size: u64,
    pub records: u64,
    pub opened_at: Instant,
    writer: BufWriter<std::fs::File>,
}

/// Open files of one consumer, one per (topic, partition, output partition).
///
/// Shared by the writer, which appends, and the upload policy, which takes
/// finished files out.
#[derive(Clone)]
pub struct FileRegistry {
    root: PathBuf,
    key_prefix: String,
    files: Arc<Mutex<BTreeMap<String, OpenFile>>>,
}

impl FileRegistry {
    pub fn new(root: impl Into<PathBuf>, key_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            key_prefix: key_prefix.into(),
            files: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, OpenFile>> {
        match self.files.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("file registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Append the record payload as one line to the file of its output partition.
    /// A new file is named after the offset of its first record.
    pub fn append(&self, record: &ParsedRecord) -> Result<(), PluginError> {
        let raw = &record.record;
        let logical = logical_path(&raw.topic, &record.partitions);
        let slot = format!("{logical}/{}", raw.partition);

        let mut files = self.lock();
        if !files.contains_key(&slot) {
            let name = format!("{}_{:020}.jsonl", raw.partition, raw.offset);
            let path = self.root.join(&logical).join(&name);
            let file = open_file(&path)?;
            tracing::debug!(path = %path.display(), "opened local file");
            files.insert(
                slot.clone(),
                OpenFile {
                    path,
                    key: format!("{}{logical}/{name}", self.key_prefix),
                    topic: raw.topic.clone(),
                    partition: raw.partition,
                    size: 0,
                    records: 0,
                    opened_at: Instant::now(),
                    writer: BufWriter::new(file),
                },
            );
        }
        let Some(open) = files.get_mut(&slot) else {
            return Err(PluginError::logic(format!("file slot '{slot}' vanished")));
        };

        open.writer
            .write_all(&raw.payload)
            .and_then(|()| open.writer.write_all(b"\n"))
            .map_err(|e| PluginError::io(format!("write {}: {e}", open.path.display())))?;
        open.size += raw.payload.len() as u64 + 1;
        open.records += 1;
        Ok(())
    }

    /// Remove and flush every file matching `due`.
    pub(crate) fn take_where(
        &self,
        mut due: impl FnMut(&OpenFile) -> bool,
    ) -> Result<Vec<OpenFile>, PluginError> {
        let mut files = self.lock();
        let slots: Vec<String> = files
            .iter()
            .filter(|(_, f)| due(f))
            .map(|(slot, _)| slot.clone())
            .collect();

        let mut taken = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(mut file) = files.remove(&slot) {
                file.writer
                    .flush()
                    .map_err(|e| PluginError::io(format!("flush {}: {e}", file.path.display())))?;
                taken.push(file);
            }
        }
        Ok(taken)
    }

    /// Close and delete every open file of `(topic, partition)`, across all
    /// output partitions. Returns the number of records dropped.
    pub fn discard(&self, topic: &str, partition: u32) -> Result<u64, PluginError> {
        let mut files = self.lock();
        let slots: Vec<String> = files
            .iter()
            .filter(|(_, f)| f.topic == topic && f.partition == partition)
            .map(|(slot, _)| slot.clone())
            .collect();

        let mut records = 0;
        for slot in slots {
            if let Some(OpenFile { path, writer, records: count, .. }) = files.remove(&slot) {
                drop(writer);
                std::fs::remove_file(&path)
                    .map_err(|e| PluginError::io(format!("remove {}: {e}", path.display())))?;
                tracing::debug!(path = %path.display(), records = count, "discarded local file");
                records += count;
            }
        }
        Ok(records)
    }

    pub fn open_files(&self) -> usize {
        self.lock().len()
    }

    pub fn buffered_bytes(&self) -> u64 {
        self.lock().values().map(|f| f.size).sum()
    }
}

fn logical_path(topic: &str, partitions: &[String]) -> String {
    let mut path = topic.to_string();
    for segment in partitions {
        path.push('/');
        path.push_str(segment);
    }
    path
}

fn open_file(path: &Path) -> Result<std::fs::File, PluginError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| PluginError::io(format!("mkdir {}: {e}", parent.display())))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| PluginError::io(format!("open {}: {e}", path.display())))
}

// ════════════════════════════════════════════════════════════════
//  FileWriter
// ════════════════════════════════════════════════════════════════

pub struct FileWriter {
    registry: FileRegistry,
}

impl FileWriter {
    pub fn new(registry: FileRegistry) -> Self {
        Self { registry }
    }
}

impl RecordWriter for FileWriter {
    fn write<'a>(
        &'a mut self,
        record: &'a ParsedRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        let result = self.registry.append(record);
        Box::pin(async move { result })
    }

    fn discard<'a>(
        &'a mut self,
        topic: &'a str,
        partition: u32,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PluginError>> + Send + 'a>> {
        let result = self.registry.discard(topic, partition);
        Box::pin(async move { result })
    }
}
