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

use tracing_subscriber::EnvFilter;

/// Centralized tracing init so the binary and integration tests share the
/// same behavior. `RUST_LOG` wins; otherwise debug mode raises the crate to
/// `debug` while dependencies stay at `info`.
pub fn init_tracing(debug: bool) {
    let default_filter = if debug { "info,morty=debug" } else { "info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into());
    let env_filter = EnvFilter::new(filter);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .compact()
        .init();
}
