use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use serde::Deserialize;

use lumber_api::error::{PluginError, parse_plugin_config};
use lumber_api::storage::UploadBackend;

#[derive(Debug, Deserialize)]
struct LocalUploadConfig {
    /// Objects are stored at `{dir}/{key}`.
    dir: PathBuf,
}

/// Object store backed by a local directory. Stands in for a remote bucket.
///
/// Objects are written to a temporary name and renamed into place, so a
/// reader never sees a partial object.
#[derive(Debug)]
pub struct LocalUpload {
    dir: PathBuf,
}

impl LocalUpload {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, PluginError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(PluginError::logic(format!("invalid object key '{key}'")));
        }
        Ok(self.dir.join(relative))
    }
}

impl UploadBackend for LocalUpload {
    fn upload<'a>(
        &'a self,
        key: &'a str,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.object_path(key)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| PluginError::io(format!("mkdir {}: {e}", parent.display())))?;
            }

            let mut tmp = path.clone().into_os_string();
            tmp.push(".part");
            let tmp = PathBuf::from(tmp);
            tokio::fs::write(&tmp, &data)
                .await
                .map_err(|e| PluginError::io(format!("write {}: {e}", tmp.display())))?;
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(|e| PluginError::io(format!("rename {}: {e}", path.display())))?;

            tracing::debug!(key, bytes = data.len(), "stored object");
            Ok(())
        })
    }
}

pub fn create(config: &serde_json::Value) -> Result<Box<dyn UploadBackend>, PluginError> {
    let cfg: LocalUploadConfig = parse_plugin_config(config)?;
    Ok(Box::new(LocalUpload::new(cfg.dir)))
}
