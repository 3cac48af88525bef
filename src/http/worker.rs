//! Upstream HTTP worker.
//!
//! Each worker is one task owning one optional keep-alive session and at
//! most one in-flight request. The dispatcher hands requests over a
//! capacity-one channel and learns about completion through
//! [`WorkerDone`] notices. All worker state lives in the task, so none
//! of it is locked.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::ErrorKind;
use crate::http::codec::{self, CodecError};
use crate::http::config::HttpClientConfig;
use crate::http::types::{HttpResponse, RequestInfo};

/// Completion notice from a worker to the dispatcher.
#[derive(Debug)]
pub(crate) struct WorkerDone {
    pub(crate) worker: usize,
}

/// Target endpoint extracted from a request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    fn from_url(url: &Url) -> Result<Self, ErrorKind> {
        if url.scheme() != "http" {
            warn!(url = %url, "unsupported url scheme");
            return Err(ErrorKind::Network);
        }
        let host = url.host_str().ok_or(ErrorKind::Resolution)?.to_string();
        let port = url.port_or_known_default().ok_or(ErrorKind::Resolution)?;
        Ok(Self { host, port })
    }
}

/// A live keep-alive upstream session.
struct Session {
    stream: TcpStream,
    /// Read-ahead carried between responses on this connection.
    buf: BytesMut,
}

pub(crate) struct HttpWorker {
    id: usize,
    config: HttpClientConfig,
    endpoint: Option<Endpoint>,
    resolved: Option<SocketAddr>,
    session: Option<Session>,
    /// Consecutive connect failures; reset on success and on exhaustion.
    reconnects: u16,
}

impl HttpWorker {
    pub(crate) fn new(id: usize, config: HttpClientConfig) -> Self {
        Self {
            id,
            config,
            endpoint: None,
            resolved: None,
            session: None,
            reconnects: 0,
        }
    }

    /// Worker task body: one request at a time until shutdown.
    ///
    /// The handle of every request received here is settled exactly once:
    /// either with the processing outcome or, when shutdown interrupts
    /// the request, with [`ErrorKind::Shutdown`].
    pub(crate) async fn run(
        mut self,
        mut requests: mpsc::Receiver<RequestInfo>,
        done: mpsc::UnboundedSender<WorkerDone>,
        shutdown: CancellationToken,
    ) {
        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let RequestInfo {
                handle,
                method,
                url,
                headers,
                body,
            } = request;

            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Err(ErrorKind::Shutdown),
                outcome = self.process(&method, &url, &headers, body.as_ref()) => outcome,
            };
            match outcome {
                Ok(response) => handle.resolve(response),
                Err(kind) => handle.fail(kind),
            }

            if done.send(WorkerDone { worker: self.id }).is_err() {
                break;
            }
        }

        // Anything still queued at this worker drains with `Shutdown`;
        // the dispatcher drains its own pending queue.
        while let Ok(request) = requests.try_recv() {
            request.handle.fail(ErrorKind::Shutdown);
        }
        debug!(worker = self.id, "http worker stopped");
    }

    /// Drive one request through resolve, connect, and exchange.
    async fn process(
        &mut self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&Bytes>,
    ) -> Result<HttpResponse, ErrorKind> {
        let endpoint = Endpoint::from_url(url)?;
        if self.endpoint.as_ref() != Some(&endpoint) {
            self.endpoint = Some(endpoint);
            self.resolved = None;
            self.session = None;
        }

        let addr = match self.resolved {
            Some(addr) => addr,
            None => {
                let addr = self.resolve().await?;
                self.resolved = Some(addr);
                addr
            }
        };

        if self.session.is_none() {
            let session = self.connect(addr).await?;
            self.session = Some(session);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ErrorKind::Internal);
        };

        let exchange = Self::exchange(session, method, url, headers, body);
        let result = tokio::time::timeout(self.config.request_timeout, exchange).await;
        match result {
            Ok(Ok((response, reusable))) => {
                if !reusable {
                    self.session = None;
                }
                Ok(response)
            }
            Ok(Err(CodecError::Io(err))) => {
                warn!(worker = self.id, url = %url, error = %err, "transaction i/o error");
                self.session = None;
                Err(ErrorKind::Network)
            }
            Ok(Err(err)) => {
                warn!(worker = self.id, url = %url, error = %err, "transaction failed");
                self.session = None;
                Err(ErrorKind::Network)
            }
            Err(_) => {
                warn!(worker = self.id, url = %url, "request timed out");
                self.session = None;
                Err(ErrorKind::Timeout)
            }
        }
    }

    /// Resolve the cached endpoint to a socket address.
    async fn resolve(&mut self) -> Result<SocketAddr, ErrorKind> {
        let Some(endpoint) = self.endpoint.as_ref() else {
            return Err(ErrorKind::Internal);
        };
        match tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port)).await {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => {
                    debug!(worker = self.id, host = %endpoint.host, addr = %addr, "resolved");
                    Ok(addr)
                }
                None => {
                    warn!(worker = self.id, host = %endpoint.host, "host resolved to no addresses");
                    Err(ErrorKind::Resolution)
                }
            },
            Err(err) => {
                warn!(worker = self.id, host = %endpoint.host, error = %err, "resolution failed");
                Err(ErrorKind::Resolution)
            }
        }
    }

    /// Connect with a per-attempt timeout and bounded retries.
    async fn connect(&mut self, addr: SocketAddr) -> Result<Session, ErrorKind> {
        loop {
            let attempt =
                tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await;
            match attempt {
                Ok(Ok(stream)) => {
                    self.reconnects = 0;
                    debug!(worker = self.id, addr = %addr, "connected");
                    return Ok(Session {
                        stream,
                        buf: BytesMut::new(),
                    });
                }
                Ok(Err(err)) => {
                    warn!(worker = self.id, addr = %addr, error = %err, "connect failed")
                }
                Err(_) => warn!(worker = self.id, addr = %addr, "connect attempt timed out"),
            }
            self.reconnects += 1;
            if self.reconnects >= self.config.connect_retries {
                self.reconnects = 0;
                return Err(ErrorKind::Connection);
            }
            if !self.config.connect_retry_delay.is_zero() {
                tokio::time::sleep(self.config.connect_retry_delay).await;
            }
        }
    }

    /// Send the request and read the response on an acquired session.
    async fn exchange(
        session: &mut Session,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&Bytes>,
    ) -> Result<(HttpResponse, bool), CodecError> {
        let mut head = BytesMut::with_capacity(256);
        codec::encode_request(method, url, headers, &mut head);
        session.stream.write_all(&head).await?;
        if let Some(body) = body {
            session.stream.write_all(body).await?;
        }
        session.stream.flush().await?;

        let decoded = codec::read_response(&mut session.stream, &mut session.buf).await?;
        let response = HttpResponse {
            status: decoded.status,
            headers: decoded.headers,
            body: decoded.body,
        };
        Ok((response, !decoded.must_close))
    }
}
