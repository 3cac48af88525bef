//! Error taxonomy shared across the cacher and the HTTP subsystem.
//!
//! Errors never cross component boundaries as panics or aborts; they
//! always arrive at a caller-supplied [`CompletionHandle`] as one of the
//! kinds below.
//!
//! [`CompletionHandle`]: crate::completion::CompletionHandle

use thiserror::Error;

/// Failure kinds surfaced to completion handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// Hostname resolution failed.
    #[error("hostname resolution failed")]
    Resolution,

    /// All connect attempts were exhausted.
    #[error("connect attempts exhausted")]
    Connection,

    /// The request-level deadline expired.
    #[error("request timed out")]
    Timeout,

    /// Transport or protocol error mid-request.
    #[error("transport error")]
    Network,

    /// The request was issued after, or interrupted by, shutdown.
    #[error("client is shut down")]
    Shutdown,

    /// Invariant violation (e.g. a busy worker handed a second request).
    #[error("internal error")]
    Internal,

    /// A producer released its lock without publishing a value.
    #[error("producer cancelled without publishing")]
    Cancelled,

    /// The upstream loader reported a failure.
    #[error("upstream fetch failed")]
    Fetch,
}
