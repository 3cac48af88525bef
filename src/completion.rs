//! One-shot completion handles.
//!
//! A [`CompletionHandle`] is the producer half of a single-use result
//! channel; the matching [`CompletionFuture`] is the consumer half.
//! Callers create the pair with [`channel`], hand the handle to the
//! cacher or HTTP client, and await (or block on) the future.
//!
//! Settlement consumes the handle, so a handle settles at most once by
//! construction. A handle that is dropped without being settled surfaces
//! as [`ErrorKind::Internal`] at the future.
//!
//! The consumer may [`discard`](CompletionFuture::discard) its interest;
//! settlers observe the flag via
//! [`is_discarded`](CompletionHandle::is_discarded) and skip delivery
//! work. Discarding does not cancel in-flight work, it only abandons the
//! result.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::ErrorKind;

/// Creates a connected handle/future pair.
pub fn channel<T>() -> (CompletionHandle<T>, CompletionFuture<T>) {
    let (tx, rx) = oneshot::channel();
    let discarded = Arc::new(AtomicBool::new(false));
    (
        CompletionHandle {
            tx,
            discarded: Arc::clone(&discarded),
        },
        CompletionFuture { rx, discarded },
    )
}

/// Producer half of a one-shot result channel.
///
/// Settled exactly once with [`resolve`](Self::resolve) or
/// [`fail`](Self::fail); both consume the handle.
#[derive(Debug)]
pub struct CompletionHandle<T> {
    tx: oneshot::Sender<Result<T, ErrorKind>>,
    discarded: Arc<AtomicBool>,
}

impl<T> CompletionHandle<T> {
    /// Returns true if the consumer abandoned interest in the result.
    ///
    /// Settlers may use this to skip building an expensive payload; the
    /// settle call itself stays cheap either way.
    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    /// Settles the handle with a value.
    pub fn resolve(self, value: T) {
        if self.is_discarded() {
            return;
        }
        let _ = self.tx.send(Ok(value));
    }

    /// Settles the handle with a failure.
    pub fn fail(self, kind: ErrorKind) {
        if self.is_discarded() {
            return;
        }
        let _ = self.tx.send(Err(kind));
    }
}

/// Consumer half of a one-shot result channel.
///
/// Await it from async code, or use
/// [`wait_blocking`](Self::wait_blocking) from a thread that is not
/// running inside the async runtime.
#[derive(Debug)]
pub struct CompletionFuture<T> {
    rx: oneshot::Receiver<Result<T, ErrorKind>>,
    discarded: Arc<AtomicBool>,
}

impl<T> CompletionFuture<T> {
    /// Abandons interest in the result.
    ///
    /// The producer side observes the flag and skips delivery. Dropping
    /// the future afterwards is the usual next step.
    pub fn discard(&self) {
        self.discarded.store(true, Ordering::Release);
    }

    /// Blocks the current thread until the handle settles.
    ///
    /// Must not be called from within the async runtime; use `.await`
    /// there instead.
    pub fn wait_blocking(self) -> Result<T, ErrorKind> {
        match self.rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(ErrorKind::Internal),
        }
    }
}

impl<T> Future for CompletionFuture<T> {
    type Output = Result<T, ErrorKind>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            // Handle dropped without settling: an invariant violation
            // upstream, never a normal outcome.
            Err(_) => Err(ErrorKind::Internal),
        })
    }
}
