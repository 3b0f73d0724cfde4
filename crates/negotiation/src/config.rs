//! Tunables for the negotiation service.

use std::time::Duration;

use domain::DEFAULT_COUNTER_WINDOW_HOURS;

/// How long an equivalent notification suppresses a repeat.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(30);

/// Upper bound on a single notification dispatch.
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Hours the buyer has to complete checkout after an accept.
pub const CHECKOUT_WINDOW_HOURS: i64 = 48;

/// Offers expired per sweeper tick.
pub const DEFAULT_SWEEP_BATCH: u32 = 100;

#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Response deadline set by each counter.
    pub counter_window: chrono::Duration,
    pub dedup_window: Duration,
    pub notification_timeout: Duration,

    /// Period of the background expiry sweep; None keeps expiry lazy.
    pub sweep_interval: Option<Duration>,
    pub sweep_batch: u32,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            counter_window: chrono::Duration::hours(DEFAULT_COUNTER_WINDOW_HOURS),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
            sweep_interval: None,
            sweep_batch: DEFAULT_SWEEP_BATCH,
        }
    }
}

impl NegotiationConfig {
    pub fn with_counter_window(mut self, window: chrono::Duration) -> Self {
        self.counter_window = window;
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn with_notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    /// Turns on the background sweep.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }
}
