use std::collections::HashMap;
use std::sync::Arc;

use lumber_api::error::PluginError;
use lumber_api::metrics::MetricsSink;
use lumber_api::processor::{RecordParser, RecordTransformer};
use lumber_api::source::{OffsetTracker, RecordSource};
use lumber_api::storage::{StorageContext, StorageParts, UploadBackend};

use crate::config::ComponentConfig;
use crate::error::EngineError;
use crate::{metrics, offset};

pub type SourceFactory = fn(&serde_json::Value) -> Result<Box<dyn RecordSource>, PluginError>;
/// Receives the consumer instance name as second argument.
pub type OffsetFactory = fn(&serde_json::Value, &str) -> Result<Box<dyn OffsetTracker>, PluginError>;
pub type TransformerFactory = fn(&serde_json::Value) -> Result<Box<dyn RecordTransformer>, PluginError>;
pub type ParserFactory = fn(&serde_json::Value) -> Result<Box<dyn RecordParser>, PluginError>;
pub type StorageFactory = fn(&serde_json::Value, StorageContext) -> Result<StorageParts, PluginError>;
pub type UploadFactory = fn(&serde_json::Value) -> Result<Box<dyn UploadBackend>, PluginError>;
pub type MetricsFactory = fn(&serde_json::Value) -> Result<Box<dyn MetricsSink>, PluginError>;

/// Maps configuration identifiers (`kind = "..."`) to component constructors.
///
/// Filled once at startup, then only read while the engine bootstraps.
#[derive(Default)]
pub struct ComponentRegistry {
    sources: HashMap<String, SourceFactory>,
    offsets: HashMap<String, OffsetFactory>,
    transformers: HashMap<String, TransformerFactory>,
    parsers: HashMap<String, ParserFactory>,
    storages: HashMap<String, StorageFactory>,
    uploads: HashMap<String, UploadFactory>,
    metrics: HashMap<String, MetricsFactory>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("sources", &sorted_keys(&self.sources))
            .field("offsets", &sorted_keys(&self.offsets))
            .field("transformers", &sorted_keys(&self.transformers))
            .field("parsers", &sorted_keys(&self.parsers))
            .field("storages", &sorted_keys(&self.storages))
            .field("uploads", &sorted_keys(&self.uploads))
            .field("metrics", &sorted_keys(&self.metrics))
            .finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the components the engine ships itself:
    /// `local` offsets, `log` and `noop` metrics.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_offsets("local", offset::create_local);
        registry.register_metrics("log", metrics::create_log);
        registry.register_metrics("noop", metrics::create_noop);
        registry
    }

    pub fn register_source(&mut self, kind: &str, factory: SourceFactory) -> &mut Self {
        self.sources.insert(kind.to_string(), factory);
        self
    }

    pub fn register_offsets(&mut self, kind: &str, factory: OffsetFactory) -> &mut Self {
        self.offsets.insert(kind.to_string(), factory);
        self
    }

    pub fn register_transformer(&mut self, kind: &str, factory: TransformerFactory) -> &mut Self {
        self.transformers.insert(kind.to_string(), factory);
        self
    }

    pub fn register_parser(&mut self, kind: &str, factory: ParserFactory) -> &mut Self {
        self.parsers.insert(kind.to_string(), factory);
        self
    }

    pub fn register_storage(&mut self, kind: &str, factory: StorageFactory) -> &mut Self {
        self.storages.insert(kind.to_string(), factory);
        self
    }

    pub fn register_upload(&mut self, kind: &str, factory: UploadFactory) -> &mut Self {
        self.uploads.insert(kind.to_string(), factory);
        self
    }

    pub fn register_metrics(&mut self, kind: &str, factory: MetricsFactory) -> &mut Self {
        self.metrics.insert(kind.to_string(), factory);
        self
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    pub fn create_source(&self, cfg: &ComponentConfig) -> Result<Box<dyn RecordSource>, EngineError> {
        let factory = lookup(&self.sources, "source", &cfg.kind)?;
        Ok(factory(&cfg.config)?)
    }

    pub fn create_offsets(
        &self,
        cfg: &ComponentConfig,
        instance: &str,
    ) -> Result<Box<dyn OffsetTracker>, EngineError> {
        let factory = lookup(&self.offsets, "offsets", &cfg.kind)?;
        Ok(factory(&cfg.config, instance)?)
    }

    pub fn create_transformer(
        &self,
        cfg: &ComponentConfig,
    ) -> Result<Arc<dyn RecordTransformer>, EngineError> {
        let factory = lookup(&self.transformers, "transformer", &cfg.kind)?;
        Ok(Arc::from(factory(&cfg.config)?))
    }

    pub fn create_parser(&self, cfg: &ComponentConfig) -> Result<Arc<dyn RecordParser>, EngineError> {
        let factory = lookup(&self.parsers, "parser", &cfg.kind)?;
        Ok(Arc::from(factory(&cfg.config)?))
    }

    pub fn create_storage(
        &self,
        cfg: &ComponentConfig,
        ctx: StorageContext,
    ) -> Result<StorageParts, EngineError> {
        let factory = lookup(&self.storages, "storage", &cfg.kind)?;
        Ok(factory(&cfg.config, ctx)?)
    }

    pub fn create_upload(&self, cfg: &ComponentConfig) -> Result<Arc<dyn UploadBackend>, EngineError> {
        let factory = lookup(&self.uploads, "upload", &cfg.kind)?;
        Ok(Arc::from(factory(&cfg.config)?))
    }

    pub fn create_metrics(&self, cfg: &ComponentConfig) -> Result<Arc<dyn MetricsSink>, EngineError> {
        let factory = lookup(&self.metrics, "metrics", &cfg.kind)?;
        Ok(Arc::from(factory(&cfg.config)?))
    }
}

fn lookup<F: Copy>(map: &HashMap<String, F>, kind: &'static str, name: &str) -> Result<F, EngineError> {
    map.get(name).copied().ok_or_else(|| EngineError::UnknownComponent {
        kind,
        name: name.to_string(),
    })
}

fn sorted_keys<F>(map: &HashMap<String, F>) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}
