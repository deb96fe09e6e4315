use std::path::PathBuf;

fn default_max_file_size_bytes() -> u64 {
    200 * 1024 * 1024
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct FileStorageConfig {
    /// Local files go to `{data_dir}/{instance}/...`.
    pub data_dir: PathBuf,
    /// A file reaching this size is uploaded on the next policy check.
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    /// Overrides the consumer's `max_file_age_seconds` for this storage.
    #[serde(default)]
    pub max_file_age_seconds: Option<u64>,
    /// Prepended to every upload key.
    #[serde(default)]
    pub key_prefix: String,
}
