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

use anyhow::Result;

use crate::config::ProxyConfig;
use crate::proxy::client::UpstreamClient;
use crate::proxy::ProxyServer;

/// Wires together configuration, the upstream HTTP client and the server.
pub struct MortyApp {
    server: ProxyServer,
}

impl MortyApp {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let config = Arc::new(config);
        let client = UpstreamClient::new(&config)?;
        let server = ProxyServer::new(config, client);
        Ok(Self { server })
    }

    /// Runs the proxy (binds the listener, accepts until the process exits).
    pub async fn run(self) -> Result<()> {
        self.server.run().await
    }
}
