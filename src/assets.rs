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

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use once_cell::sync::Lazy;

pub const ROBOTS_TXT: &str = "User-Agent: *\nDisallow: /\n";

const FAVICON_BASE64: &str = "iVBORw0KGgoAAAANSUhEUgAAABAAAAAQEAYAAABPYyMiAAAABmJLR0T///////8JWPfcAAAACXBIWXMAAABIAAAASABGyWs+AAAAF0lEQVRIx2NgGAWjYBSMglEwCkbBSAcACBAAAeaR9cIAAAAASUVORK5CYII=";

/// 16x16 favicon, decoded once at first use.
pub static FAVICON_PNG: Lazy<Bytes> =
    Lazy::new(|| Bytes::from(STANDARD.decode(FAVICON_BASE64).unwrap_or_default()));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn favicon_decodes_to_png() {
        assert!(FAVICON_PNG.starts_with(b"\x89PNG"));
    }
}
