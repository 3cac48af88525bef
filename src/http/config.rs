//! HTTP client configuration.

use std::time::Duration;

/// Default number of upstream workers in the pool.
pub const DEFAULT_NUM_WORKERS: usize = 4;

/// Default timeout for a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of connect attempts before giving up.
pub const DEFAULT_CONNECT_RETRIES: u16 = 3;

/// Default request deadline, from session acquisition to end of message.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(50);

/// Configuration for an [`HttpClient`](super::HttpClient).
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// Number of workers (keep-alive upstream sessions) in the pool.
    pub num_workers: usize,
    /// Timeout for a single connect attempt.
    pub connect_timeout: Duration,
    /// Connect attempts per request before failing with
    /// [`ErrorKind::Connection`](crate::error::ErrorKind::Connection).
    pub connect_retries: u16,
    /// Fixed pause between connect attempts. Zero by default.
    pub connect_retry_delay: Duration,
    /// Deadline for send-through-end-of-message on an acquired session.
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_NUM_WORKERS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            connect_retry_delay: Duration::ZERO,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}
