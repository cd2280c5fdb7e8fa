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

use clap::Parser;
use morty::app::MortyApp;
use morty::config::{ConfigOptions, ProxyConfig};
use morty::utils::init_tracing;

/// Command-line interface. Every flag doubles as an environment variable so
/// the proxy configures the same way under an init system or a container
/// runtime.
#[derive(Debug, Parser)]
#[command(name = "morty", version, about = "Privacy aware web content sanitizer proxy")]
struct Cli {
    /// Listen address
    #[arg(long, env = "MORTY_ADDRESS")]
    listen: String,

    /// HMAC url validation key (base64 encoded) - leave blank to disable validation
    #[arg(long, env = "MORTY_KEY", default_value = "", hide_env_values = true)]
    key: String,

    /// Request timeout in seconds
    #[arg(long, env = "MORTY_REQUEST_TIMEOUT", default_value_t = 5)]
    timeout: u8,

    /// Allow IPv6 HTTP requests
    #[arg(long, env = "MORTY_IPV6")]
    ipv6: bool,

    /// Debug mode
    #[arg(long, env = "DEBUG")]
    debug: bool,

    /// Follow HTTP GET redirect
    #[arg(long, env = "MORTY_FOLLOW_REDIRECTS")]
    followredirect: bool,

    /// Use the proxies set in the environment (HTTP_PROXY, HTTPS_PROXY and
    /// NO_PROXY). Overrides --proxy, --socks5, --ipv6.
    #[arg(long, conflicts_with_all = ["proxy", "socks5"])]
    proxyenv: bool,

    /// Use the specified HTTP proxy (ie: '[user:pass@]hostname:port').
    /// Overrides --socks5, --ipv6.
    #[arg(long)]
    proxy: Option<String>,

    /// Use a SOCKS5 proxy (ie: 'hostname:port'). Overrides --ipv6.
    #[arg(long, conflicts_with = "proxy")]
    socks5: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.debug);

    let config = ProxyConfig::resolve(ConfigOptions {
        listen_address: cli.listen,
        key: cli.key,
        request_timeout: cli.timeout,
        ipv6: cli.ipv6,
        follow_redirects: cli.followredirect,
        debug: cli.debug,
        proxy_env: cli.proxyenv,
        http_proxy: cli.proxy,
        socks5_proxy: cli.socks5,
    })?;

    if config.debug {
        tracing::debug!(?config, "using config");
    }

    let app = MortyApp::new(config)?;
    app.run().await
}
