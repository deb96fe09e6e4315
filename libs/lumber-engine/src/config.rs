use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;

/// Root configuration, parsed from TOML or any registered [`ConfigParser`].
#[derive(Debug, Clone, Deserialize)]
pub struct LumberConfig {
    pub consumer: ConsumerSettings,

    /// Offset tracker, one instance per partition.
    #[serde(default = "default_offsets")]
    pub offsets: ComponentConfig,

    /// Record transformer, shared by all partitions.
    #[serde(default = "default_transformer")]
    pub transformer: ComponentConfig,

    /// Record parser, shared by all partitions.
    pub parser: ComponentConfig,

    /// Writer + upload policy, one instance per partition.
    pub storage: ComponentConfig,

    /// Upload backend, shared by all partitions.
    pub upload: ComponentConfig,

    #[serde(default = "default_metrics")]
    pub metrics: ComponentConfig,

    /// One consumer loop per entry.
    #[serde(default)]
    pub partitions: Vec<PartitionConfig>,
}

/// Settings read by the consumer loop itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ConsumerSettings {
    /// Age limit for local files; the time trigger of the policy cadence is derived from it.
    pub max_file_age_seconds: u64,
    /// Ticks between count-triggered policy checks.
    pub messages_per_second: u64,
    /// Drain (final forced upload) on shutdown instead of being dropped mid-flight.
    #[serde(default)]
    pub upload_on_shutdown: bool,
}

/// Reference to a registered component kind, with its free-form config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentConfig {
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ComponentConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartitionConfig {
    pub name: String,
    pub source: ComponentConfig,
}

fn default_offsets() -> ComponentConfig {
    ComponentConfig::new("local")
}

fn default_transformer() -> ComponentConfig {
    ComponentConfig::new("passthrough")
}

fn default_metrics() -> ComponentConfig {
    ComponentConfig::new("log")
}

impl ConsumerSettings {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_file_age_seconds == 0 {
            return Err(EngineError::Config(
                "consumer.max_file_age_seconds must be greater than zero".into(),
            ));
        }
        if self.messages_per_second == 0 {
            return Err(EngineError::Config(
                "consumer.messages_per_second must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl LumberConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        Self::load_with(path, &[&TomlParser])
    }

    /// Load configuration, picking the parser by file extension.
    pub fn load_with(path: &str, parsers: &[&dyn ConfigParser]) -> Result<Self, EngineError> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("toml");
        let parser = parsers
            .iter()
            .find(|p| p.extensions().contains(&ext))
            .ok_or_else(|| EngineError::Config(format!("{path}: no parser for '.{ext}' files")))?;

        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        let config = parser.parse(&content).map_err(|e| e.with_context(path))?;
        config.validate().map_err(|e| e.with_context(path))?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        let config = TomlParser.parse(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.consumer.validate()?;
        if self.partitions.is_empty() {
            return Err(EngineError::Config("no [[partitions]] configured".into()));
        }
        for (i, partition) in self.partitions.iter().enumerate() {
            if self.partitions[..i].iter().any(|p| p.name == partition.name) {
                return Err(EngineError::Config(format!(
                    "duplicate partition name '{}'",
                    partition.name
                )));
            }
        }
        Ok(())
    }
}

/// Config file format. Selected by file extension.
pub trait ConfigParser: Send + Sync {
    fn extensions(&self) -> &[&str];
    fn parse(&self, content: &str) -> Result<LumberConfig, EngineError>;
}

pub struct TomlParser;

impl ConfigParser for TomlParser {
    fn extensions(&self) -> &[&str] {
        &["toml"]
    }

    fn parse(&self, content: &str) -> Result<LumberConfig, EngineError> {
        toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))
    }
}
