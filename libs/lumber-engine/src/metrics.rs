use lumber_api::error::PluginError;
use lumber_api::metrics::MetricsSink;

/// Emits every metric as a `debug` tracing event (`target = "lumber::metrics"`).
pub struct LogMetrics;

impl MetricsSink for LogMetrics {
    fn increment(&self, name: &str, delta: u64, topic: &str) {
        tracing::debug!(target: "lumber::metrics", metric = %name, %topic, delta, "increment");
    }

    fn observe(&self, name: &str, value: f64, topic: &str) {
        tracing::debug!(target: "lumber::metrics", metric = %name, %topic, value, "observe");
    }
}

pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &str, _delta: u64, _topic: &str) {}

    fn observe(&self, _name: &str, _value: f64, _topic: &str) {}
}

pub(crate) fn create_log(_config: &serde_json::Value) -> Result<Box<dyn MetricsSink>, PluginError> {
    Ok(Box::new(LogMetrics))
}

pub(crate) fn create_noop(_config: &serde_json::Value) -> Result<Box<dyn MetricsSink>, PluginError> {
    Ok(Box::new(NoopMetrics))
}
