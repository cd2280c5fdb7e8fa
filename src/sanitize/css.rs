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

use std::io::Write;

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::sanitize::uri::{proxify_uri, RequestContext};

/// Liberal on purpose: tolerates unbalanced parentheses and stray quote
/// characters so that sloppy real-world stylesheets still get their URLs
/// rewritten.
static CSS_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\((['"]?)[ \t\x0c]*([\x09\x21\x23-\x26\x28\x2a-\x7e]+)(['"]?)\)?"#)
        .expect("css url pattern compiles")
});

/// Streams `css` to `out`, replacing every `url(...)` reference with its
/// proxified form. Spans between matches are copied verbatim; a reference
/// that cannot be rewritten is left in place and logged at debug level.
pub fn sanitize_css<W: Write>(ctx: &RequestContext<'_>, out: &mut W, css: &[u8]) {
    let mut start_index = 0;

    for captures in CSS_URL_REGEX.captures_iter(css) {
        let Some(url) = captures.get(2) else {
            continue;
        };
        match proxify_uri(ctx, url.as_bytes()) {
            Ok(uri) => {
                let _ = out.write_all(&css[start_index..url.start()]);
                let _ = out.write_all(uri.as_bytes());
                start_index = url.end();
            }
            Err(err) => {
                tracing::debug!(
                    uri = %String::from_utf8_lossy(url.as_bytes()),
                    error = %err,
                    "cannot proxify css uri"
                );
            }
        }
    }

    if start_index < css.len() {
        let _ = out.write_all(&css[start_index..]);
    }
}
