use std::time::Duration;

/// Per-attempt wait for a correlated reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(3);

/// Sends per request before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Alarm bitmap refresh period.
pub const DEFAULT_ALARM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How long each attempt waits for a reply with the request's id.
    pub reply_timeout: Duration,
    /// Attempts per request (values below 1 are treated as 1).
    pub max_attempts: u32,
    /// Alarm poll period; `None` disables polling.
    pub alarm_poll_interval: Option<Duration>,
    /// Submissions that may wait for the dispatcher.
    pub submit_queue_depth: usize,
    /// Parsed inbound messages buffered between receiver and dispatcher.
    pub inbound_queue_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            alarm_poll_interval: Some(DEFAULT_ALARM_POLL_INTERVAL),
            submit_queue_depth: 32,
            inbound_queue_depth: 16,
        }
    }
}
