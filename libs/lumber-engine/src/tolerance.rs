/// Decay applied to the failure estimate on every successful parse.
pub const DECAY: f64 = 0.999;

/// The estimate must stay at or below this value.
pub const MAX_UNPARSABLE: f64 = 1000.0;

/// Circuit breaker for unparsable records.
///
/// Keeps an exponentially decayed count of parse failures instead of a hard
/// count: sporadic bad records amid a healthy stream decay away, a sustained
/// failure rate climbs past [`MAX_UNPARSABLE`].
///
/// Owned by one consumer loop and never shared.
#[derive(Debug, Default)]
pub struct ErrorTolerance {
    unparsable: f64,
}

impl ErrorTolerance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.unparsable *= DECAY;
    }

    /// Returns `true` when the threshold is exceeded.
    pub fn record_failure(&mut self) -> bool {
        self.unparsable += 1.0;
        self.unparsable > MAX_UNPARSABLE
    }

    pub fn value(&self) -> f64 {
        self.unparsable
    }
}
