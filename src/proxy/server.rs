/* Morty (AGPL-3.0)

Copyright (C) 2025 - Morty Contributors

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.

*/

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use http::header::CONTENT_TYPE;
use tokio::net::TcpListener;

use crate::assets;
use crate::config::ProxyConfig;
use crate::proxy::client::UpstreamClient;
use crate::proxy::handler;

/// Shared per-request resources: the frozen config and the upstream client.
/// Both are safe for concurrent use; requests never share anything mutable.
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub client: UpstreamClient,
}

/// Owns the listening socket and serves the proxy surface: the two static
/// endpoints plus the catch-all proxy envelope. Each connection is handled
/// on its own tokio task by the server runtime.
pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    client: UpstreamClient,
}

impl ProxyServer {
    pub fn new(config: Arc<ProxyConfig>, client: UpstreamClient) -> Self {
        Self { config, client }
    }

    /// Binds the listener and accepts connections until the process exits.
    /// Bind errors are fatal; per-request errors are rendered as landing
    /// pages by the handler and never stop the server.
    pub async fn run(self) -> Result<()> {
        let listen_address = self.config.listen_address.clone();
        let state = Arc::new(AppState {
            config: self.config,
            client: self.client,
        });

        let router = Router::new()
            .route("/robots.txt", get(serve_robots))
            .route("/favicon.ico", get(serve_favicon))
            .fallback(handler::proxy_envelope)
            .with_state(state);

        let listener = TcpListener::bind(&listen_address)
            .await
            .with_context(|| format!("binding to {listen_address}"))?;
        tracing::info!(address = %listen_address, "listening");

        axum::serve(listener, router)
            .await
            .context("serving proxy requests")
    }
}

async fn serve_robots() -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/plain")], assets::ROBOTS_TXT)
}

async fn serve_favicon() -> impl IntoResponse {
    ([(CONTENT_TYPE, "image/png")], assets::FAVICON_PNG.clone())
}
