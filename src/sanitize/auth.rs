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

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub type Signature = Hmac<Sha256>;

/// Signs a target URI, returning the lowercase hex HMAC-SHA256 tag carried in
/// the `mortyhash` parameter.
pub fn hash_uri(uri: &str, key: &[u8]) -> String {
    let mut mac = Signature::new_from_slice(key).expect("hmac accepts keys of any length");
    mac.update(uri.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a client-submitted `mortyurl` against its `mortyhash`.
///
/// The signature covers the exact URI bytes as received, before any query
/// parameter merging. Comparison is constant-time; a hex decode failure or a
/// length mismatch rejects.
pub fn verify_request_uri(uri: &[u8], hash: &[u8], key: &[u8]) -> bool {
    let sig = match hex::decode(hash) {
        Ok(sig) => sig,
        Err(err) => {
            tracing::debug!(error = %err, "hmac parameter is not valid hex");
            return false;
        }
    };
    let mut mac = Signature::new_from_slice(key).expect("hmac accepts keys of any length");
    mac.update(uri);
    mac.verify_slice(&sig).is_ok()
}
