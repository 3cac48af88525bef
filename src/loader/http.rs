//! HTTP-backed tile loader.

use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use tracing::warn;

use crate::completion::{self, CompletionHandle};
use crate::error::ErrorKind;
use crate::http::HttpClient;
use crate::loader::TileLoader;
use crate::tile::{CachedTile, TileId};

/// Configuration for an [`HttpTileLoader`].
#[derive(Clone, Debug)]
pub struct HttpTileLoaderConfig {
    /// Origin base URL, e.g. `http://tiles.example.com`.
    pub base_url: String,
    /// Imagery versions this origin serves.
    pub versions: Vec<String>,
}

/// Loads tiles from an HTTP origin through the pooled client.
///
/// Status mapping: 200 yields the tile (content type taken from the
/// response), 404 and 204 yield an absent tile, and everything else -
/// including transport failures - fails the handle with
/// [`ErrorKind::Fetch`]. Requests issued while the client's workers are
/// still connecting simply queue; no readiness handshake is needed.
pub struct HttpTileLoader {
    client: Arc<HttpClient>,
    config: HttpTileLoaderConfig,
    runtime: tokio::runtime::Handle,
}

impl HttpTileLoader {
    /// Create a loader over `client`.
    ///
    /// Captures the current tokio runtime for response handling, so this
    /// must run inside a runtime context.
    pub fn new(client: Arc<HttpClient>, config: HttpTileLoaderConfig) -> Self {
        Self::with_runtime(client, config, tokio::runtime::Handle::current())
    }

    /// Create a loader handling responses on `runtime`.
    pub fn with_runtime(
        client: Arc<HttpClient>,
        config: HttpTileLoaderConfig,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            client,
            config,
            runtime,
        }
    }

    fn tile_url(&self, tile: &TileId, version: &str) -> String {
        format!(
            "{}/{version}/{tile}",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

impl TileLoader for HttpTileLoader {
    fn load(
        &self,
        handle: CompletionHandle<Option<Arc<CachedTile>>>,
        tile: &TileId,
        version: &str,
    ) {
        let url = self.tile_url(tile, version);
        let (request_handle, response) = completion::channel();
        self.client
            .request(request_handle, Method::GET, &url, None, None);

        self.runtime.spawn(async move {
            match response.await {
                Ok(response) if response.status == StatusCode::OK => {
                    let content_type = response
                        .headers
                        .get(CONTENT_TYPE)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string);
                    let mut tile = CachedTile::new(response.body);
                    if let Some(content_type) = content_type {
                        tile = tile.with_content_type(content_type);
                    }
                    handle.resolve(Some(Arc::new(tile)));
                }
                Ok(response)
                    if response.status == StatusCode::NOT_FOUND
                        || response.status == StatusCode::NO_CONTENT =>
                {
                    handle.resolve(None);
                }
                Ok(response) => {
                    warn!(url = %url, status = %response.status, "origin returned unexpected status");
                    handle.fail(ErrorKind::Fetch);
                }
                Err(kind) => {
                    warn!(url = %url, error = %kind, "origin request failed");
                    handle.fail(ErrorKind::Fetch);
                }
            }
        });
    }

    fn has_version(&self, version: &str) -> bool {
        self.config.versions.iter().any(|v| v == version)
    }
}
