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

use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Raw operator inputs as collected from flags and environment variables.
/// Validated and frozen into a [`ProxyConfig`] before the server starts.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub listen_address: String,
    /// Base64-encoded HMAC key; empty disables URL signing.
    pub key: String,
    /// Upstream timeout in seconds.
    pub request_timeout: u8,
    pub ipv6: bool,
    pub follow_redirects: bool,
    pub debug: bool,
    pub proxy_env: bool,
    pub http_proxy: Option<String>,
    pub socks5_proxy: Option<String>,
}

/// Outbound dialer selection, in precedence order: environment proxies, an
/// explicit HTTP proxy, a SOCKS5 proxy, then direct connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundProxy {
    Environment,
    Http(String),
    Socks5(String),
    Direct,
}

/// Process-wide policy, read-only after startup.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_address: String,
    /// Decoded HMAC key bytes; `None` disables URL signing.
    pub key: Option<Vec<u8>>,
    pub request_timeout: Duration,
    pub ipv6: bool,
    pub follow_redirects: bool,
    pub debug: bool,
    pub outbound: OutboundProxy,
}

impl ProxyConfig {
    /// Validates the operator inputs and freezes them. Errors here are fatal
    /// at startup: an undecodable key, a missing listen address, or
    /// `--proxyenv` without any proxy environment variables.
    pub fn resolve(options: ConfigOptions) -> Result<Self> {
        if options.listen_address.is_empty() {
            bail!("no listen address defined");
        }

        if options.proxy_env
            && std::env::var("HTTP_PROXY").unwrap_or_default().is_empty()
            && std::env::var("HTTPS_PROXY").unwrap_or_default().is_empty()
        {
            bail!(
                "--proxyenv is used but no environment variables named 'HTTP_PROXY' and/or 'HTTPS_PROXY' could be found"
            );
        }

        let key = if options.key.is_empty() {
            None
        } else {
            Some(
                STANDARD
                    .decode(&options.key)
                    .context("parsing key: invalid base64")?,
            )
        };

        let outbound = if options.proxy_env {
            OutboundProxy::Environment
        } else if let Some(proxy) = options.http_proxy.filter(|p| !p.is_empty()) {
            OutboundProxy::Http(proxy)
        } else if let Some(proxy) = options.socks5_proxy.filter(|p| !p.is_empty()) {
            OutboundProxy::Socks5(proxy)
        } else {
            OutboundProxy::Direct
        };

        Ok(Self {
            listen_address: options.listen_address,
            key,
            request_timeout: Duration::from_secs(u64::from(options.request_timeout)),
            ipv6: options.ipv6,
            follow_redirects: options.follow_redirects,
            debug: options.debug,
            outbound,
        })
    }
}
