/// Best-effort metrics sink, keyed by topic.
///
/// Methods return nothing: an implementation that fails must swallow the error,
/// a metric can never abort the caller.
pub trait MetricsSink: Send + Sync {
    /// Add `delta` to the counter `name`.
    fn increment(&self, name: &str, delta: u64, topic: &str);

    /// Record one observation of `name` (histogram / gauge semantics).
    fn observe(&self, name: &str, value: f64, topic: &str);
}
