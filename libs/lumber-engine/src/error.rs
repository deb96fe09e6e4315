use lumber_api::error::PluginError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("unknown {kind} component '{name}'")]
    UnknownComponent { kind: &'static str, name: String },

    #[error("failed to read from source: {source}")]
    Source { source: PluginError },

    #[error("failed to adjust offset for {record}: {source}")]
    Offset { record: String, source: PluginError },

    #[error("too many unparsable records (decayed count {count:.3}), last failure on {record}: {source}")]
    TooManyParseFailures {
        record: String,
        count: f64,
        source: PluginError,
    },

    #[error("failed to write {record}: {source}")]
    Write { record: String, source: PluginError },

    #[error("failed to apply upload policy (force={forced}): {source}")]
    Policy { forced: bool, source: PluginError },

    #[error("consumer task '{name}' failed: {message}")]
    Join { name: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// For `Plugin` variant, context is added to the inner `PluginError`.
    /// For `Config`, context is prepended to the message.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Plugin(e) => EngineError::Plugin(e.with_context(ctx)),
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
