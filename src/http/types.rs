//! Request and response types for the HTTP subsystem.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::completion::CompletionHandle;

/// Live representation of one HTTP round trip.
///
/// Built by the client from caller input and carried through the
/// dispatcher to a worker, which settles the handle exactly once.
#[derive(Debug)]
pub(crate) struct RequestInfo {
    pub(crate) handle: CompletionHandle<HttpResponse>,
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Bytes>,
}

/// Response delivered to a request's completion handle.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Accumulated response body.
    pub body: Bytes,
}
