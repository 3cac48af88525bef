//! HTTP fetch subsystem.
//!
//! A fixed pool of upstream workers, each owning at most one keep-alive
//! HTTP/1.1 session and at most one in-flight request. A dispatcher task
//! owns the pool state: requests go to the first idle worker in fixed
//! scan order, or into a FIFO overflow queue when every worker is busy.
//! Results come back through per-request completion handles.
//!
//! ```text
//! request() ──► dispatcher ──► worker 0 ── keep-alive ──► origin
//!                  │    │  └─► worker 1 ── keep-alive ──► origin
//!                  │    └────► worker N ── keep-alive ──► origin
//!                  ▼
//!              pending (FIFO, drained as workers go idle)
//! ```
//!
//! Worker state is owned by the worker's task; the dispatcher owns the
//! busy flags and the queue. Other threads interact only through
//! channels, so no locks guard any of it.

mod client;
mod config;
pub(crate) mod codec;
mod types;
mod worker;

pub use client::{ClientStats, HttpClient};
pub use config::{
    HttpClientConfig, DEFAULT_CONNECT_RETRIES, DEFAULT_CONNECT_TIMEOUT, DEFAULT_NUM_WORKERS,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use types::HttpResponse;
