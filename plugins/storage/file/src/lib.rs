mod config;
mod policy;
mod storage;

use std::time::Duration;

use lumber_api::error::{PluginError, parse_plugin_config};
use lumber_api::storage::{StorageContext, StorageParts};

use config::FileStorageConfig;
pub use policy::SizeAgePolicy;
pub use storage::{FileRegistry, FileWriter};

/// Local files under `{data_dir}/{instance}`, shipped by a [`SizeAgePolicy`].
pub fn create(config: &serde_json::Value, ctx: StorageContext) -> Result<StorageParts, PluginError> {
    let cfg: FileStorageConfig = parse_plugin_config(config)?;
    let root = cfg.data_dir.join(&ctx.instance);
    std::fs::create_dir_all(&root)
        .map_err(|e| PluginError::io(format!("mkdir {}: {e}", root.display())))?;

    let max_age = cfg
        .max_file_age_seconds
        .map(Duration::from_secs)
        .unwrap_or(ctx.max_file_age);
    tracing::info!(
        instance = %ctx.instance,
        root = %root.display(),
        max_file_size_bytes = cfg.max_file_size_bytes,
        max_file_age_secs = max_age.as_secs(),
        "file storage ready"
    );

    let registry = FileRegistry::new(root, cfg.key_prefix);
    Ok(StorageParts {
        writer: Box::new(FileWriter::new(registry.clone())),
        policy: Box::new(SizeAgePolicy::new(
            registry,
            cfg.max_file_size_bytes,
            max_age,
            ctx.backend,
            ctx.metrics,
        )),
    })
}
