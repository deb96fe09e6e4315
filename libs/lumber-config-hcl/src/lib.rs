use lumber_engine::config::{ConfigParser, LumberConfig};
use lumber_engine::error::EngineError;

/// Loads `.hcl` configuration files.
pub struct HclParser;

impl ConfigParser for HclParser {
    fn extensions(&self) -> &[&str] {
        &["hcl"]
    }

    fn parse(&self, content: &str) -> Result<LumberConfig, EngineError> {
        hcl::from_str(content).map_err(|e| EngineError::Config(e.to_string()))
    }
}
