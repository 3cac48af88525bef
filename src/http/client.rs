//! Pooled HTTP client.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_LENGTH};
use http::{HeaderMap, Method};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use crate::completion::{self, CompletionHandle};
use crate::error::ErrorKind;
use crate::http::config::HttpClientConfig;
use crate::http::types::{HttpResponse, RequestInfo};
use crate::http::worker::{HttpWorker, WorkerDone};

enum Command {
    Submit(RequestInfo),
    Shutdown(oneshot::Sender<()>),
}

/// Pool of keep-alive upstream workers with a FIFO overflow queue.
///
/// Construction spawns the dispatcher and worker tasks, so it must run
/// inside a tokio runtime context; [`request`](Self::request) is then
/// callable from any thread. Call [`shutdown`](Self::shutdown) to drain
/// the pool; afterwards every request fails synchronously with
/// [`ErrorKind::Shutdown`].
#[derive(Debug)]
pub struct HttpClient {
    commands: mpsc::UnboundedSender<Command>,
    stopped: Arc<AtomicBool>,
    counters: Arc<ClientCounters>,
}

impl HttpClient {
    /// Create the pool.
    ///
    /// # Panics
    ///
    /// Panics if `config.num_workers` is zero or when called outside a
    /// tokio runtime context.
    pub fn new(config: HttpClientConfig) -> Self {
        assert!(config.num_workers > 0, "worker pool must be non-empty");

        let stopped = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(ClientCounters::default());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let mut slots = Vec::with_capacity(config.num_workers);
        let mut workers = Vec::with_capacity(config.num_workers);
        for id in 0..config.num_workers {
            let (requests_tx, requests_rx) = mpsc::channel(1);
            let worker = HttpWorker::new(id, config.clone());
            workers.push(tokio::spawn(worker.run(
                requests_rx,
                done_tx.clone(),
                shutdown.clone(),
            )));
            slots.push(WorkerSlot {
                requests: requests_tx,
                busy: false,
            });
        }
        drop(done_tx);

        let dispatcher = Dispatcher {
            slots,
            workers,
            pending: VecDeque::new(),
            shutdown,
            stopped: Arc::clone(&stopped),
            counters: Arc::clone(&counters),
        };
        tokio::spawn(dispatcher.run(commands_rx, done_rx));

        Self {
            commands: commands_tx,
            stopped,
            counters,
        }
    }

    /// Issue a request; the handle settles with the response or an error.
    ///
    /// `Content-Length` is derived from the body. The request goes to
    /// the first idle worker in fixed scan order, or into the overflow
    /// queue when every worker is busy.
    pub fn request(
        &self,
        handle: CompletionHandle<HttpResponse>,
        method: Method,
        url: &str,
        headers: Option<HeaderMap>,
        body: Option<Bytes>,
    ) {
        if self.stopped.load(Ordering::Acquire) {
            ClientCounters::bump(&self.counters.rejected);
            handle.fail(ErrorKind::Shutdown);
            return;
        }
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(err) => {
                warn!(url, error = %err, "request url does not parse");
                ClientCounters::bump(&self.counters.rejected);
                handle.fail(ErrorKind::Resolution);
                return;
            }
        };
        let mut headers = headers.unwrap_or_default();
        if let Some(body) = &body {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        let info = RequestInfo {
            handle,
            method,
            url,
            headers,
            body,
        };
        if let Err(rejected) = self.commands.send(Command::Submit(info)) {
            if let Command::Submit(info) = rejected.0 {
                ClientCounters::bump(&self.counters.rejected);
                info.handle.fail(ErrorKind::Shutdown);
            }
        }
    }

    /// Issue a request and block until it settles.
    ///
    /// Returns `None` after shutdown, on any request failure, or when
    /// called from inside the async runtime (blocking a runtime worker
    /// on pool completion would deadlock the pool).
    pub fn request_and_wait(
        &self,
        method: Method,
        url: &str,
        headers: Option<HeaderMap>,
        body: Option<Bytes>,
    ) -> Option<HttpResponse> {
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            error!("request_and_wait called from inside the async runtime");
            return None;
        }
        let (handle, result) = completion::channel();
        self.request(handle, method, url, headers, body);
        result.wait_blocking().ok()
    }

    /// Stop the pool, failing in-flight and queued requests with
    /// [`ErrorKind::Shutdown`]. Idempotent.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Returns true once shutdown has begun.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Snapshot of the dispatch counters.
    pub fn stats(&self) -> ClientStats {
        self.counters.snapshot()
    }
}

struct WorkerSlot {
    requests: mpsc::Sender<RequestInfo>,
    busy: bool,
}

/// Owns pool state: busy flags and the overflow queue.
struct Dispatcher {
    slots: Vec<WorkerSlot>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    pending: VecDeque<RequestInfo>,
    shutdown: CancellationToken,
    stopped: Arc<AtomicBool>,
    counters: Arc<ClientCounters>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut done_rx: mpsc::UnboundedReceiver<WorkerDone>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Submit(request)) => self.submit(request),
                    Some(Command::Shutdown(ack)) => {
                        self.drain().await;
                        let _ = ack.send(());
                        break;
                    }
                    // Client dropped without an explicit shutdown.
                    None => {
                        self.drain().await;
                        break;
                    }
                },
                Some(done) = done_rx.recv() => self.complete(done),
            }
        }
        debug!("http client dispatcher stopped");
    }

    fn submit(&mut self, request: RequestInfo) {
        match self.slots.iter().position(|slot| !slot.busy) {
            Some(slot) => self.assign(slot, request),
            None => {
                ClientCounters::bump(&self.counters.queued);
                self.pending.push_back(request);
            }
        }
    }

    fn assign(&mut self, slot: usize, request: RequestInfo) {
        use tokio::sync::mpsc::error::TrySendError;
        match self.slots[slot].requests.try_send(request) {
            Ok(()) => {
                self.slots[slot].busy = true;
                ClientCounters::bump(&self.counters.dispatched);
            }
            Err(TrySendError::Full(request)) => {
                error!(worker = slot, "worker handed a request while busy");
                request.handle.fail(ErrorKind::Internal);
            }
            Err(TrySendError::Closed(request)) => {
                request.handle.fail(ErrorKind::Shutdown);
            }
        }
    }

    fn complete(&mut self, done: WorkerDone) {
        self.slots[done.worker].busy = false;
        if let Some(request) = self.pending.pop_front() {
            self.assign(done.worker, request);
        }
    }

    /// Stop workers, then fail the overflow queue.
    ///
    /// Workers settle their in-flight handles before exiting, so when
    /// this returns every accepted handle has been settled.
    async fn drain(&mut self) {
        self.stopped.store(true, Ordering::Release);
        self.shutdown.cancel();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
        for request in self.pending.drain(..) {
            request.handle.fail(ErrorKind::Shutdown);
        }
    }
}

#[derive(Debug, Default)]
struct ClientCounters {
    dispatched: AtomicU64,
    queued: AtomicU64,
    rejected: AtomicU64,
}

impl ClientCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ClientStats {
        ClientStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of client dispatch counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    /// Requests handed directly to a worker.
    pub dispatched: u64,
    /// Requests parked in the overflow queue.
    pub queued: u64,
    /// Requests refused at submission (shutdown, unparseable URL).
    pub rejected: u64,
}
