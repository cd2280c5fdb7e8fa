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

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::sanitize::auth::hash_uri;

/// Query escaping equivalent to the unreserved set: alphanumerics and
/// `-._~` pass through, everything else is percent-encoded.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// `data:` URIs that may be emitted verbatim. Only raster image payloads; no
/// SVG, which can carry script.
const SAFE_DATA_URI_PREFIXES: [&[u8]; 5] = [
    b"data:image/png",
    b"data:image/jpeg",
    b"data:image/pjpeg",
    b"data:image/gif",
    b"data:image/webp",
];

/// Per-response rewriting scope.
///
/// `base_url` starts as the upstream document URL and may be replaced
/// mid-stream by a `<base href>` element; every later rewrite in the same
/// document resolves against the replacement. `body_injected` records whether
/// the banner was already emitted ahead of `</body>` so the pipeline knows
/// whether to append it after the token stream ends.
pub struct RequestContext<'k> {
    pub key: Option<&'k [u8]>,
    pub base_url: Url,
    pub body_injected: bool,
}

impl<'k> RequestContext<'k> {
    pub fn new(key: Option<&'k [u8]>, base_url: Url) -> Self {
        Self {
            key,
            base_url,
            body_injected: false,
        }
    }
}

/// Cleans a raw URI byte slice: trailing bytes ≤ 0x20 are trimmed, leading and
/// embedded bytes ≤ 0x20 before the scheme are skipped, and the scheme is
/// ASCII-lowercased. Scheme accumulation stops at the first `:`; a `/`, `?`,
/// `\` or `#` ends it early since those indicate a relative reference.
///
/// Returns the cleaned bytes and `"<scheme>:"` when a colon was reached
/// (empty string otherwise). Idempotent on its own output.
pub fn sanitize_uri(uri: &[u8]) -> (Vec<u8>, String) {
    let end = uri
        .iter()
        .rposition(|&c| c > 0x20)
        .map(|pos| pos + 1)
        .unwrap_or(0);
    let uri = &uri[..end];

    let mut scheme = Vec::with_capacity(10);
    let mut first_index = None;
    let mut colon_index = None;

    for (i, &c) in uri.iter().enumerate() {
        if c <= 0x20 {
            continue;
        }
        let c = if c.is_ascii_uppercase() { c + 32 } else { c };
        scheme.push(c);
        if first_index.is_none() {
            first_index = Some(i);
        }
        if c == b':' {
            colon_index = Some(i);
            break;
        }
        if matches!(c, b'/' | b'?' | b'\\' | b'#') {
            break;
        }
    }

    match colon_index {
        Some(colon) => {
            let mut cleaned = scheme.clone();
            cleaned.extend_from_slice(&uri[colon + 1..]);
            let scheme = String::from_utf8_lossy(&scheme).into_owned();
            (cleaned, scheme)
        }
        None => {
            let start = first_index.unwrap_or(uri.len());
            (uri[start..].to_vec(), String::new())
        }
    }
}

/// Rewrites a URI reference so that fetching it goes back through the proxy.
///
/// `javascript:` and disallowed `data:` URIs collapse to an empty string;
/// allowed `data:image/*` payloads pass through verbatim. Everything else is
/// resolved against the context base URL and rendered as
/// `./?[mortyhash=H&]mortyurl=<encoded>[#fragment]`, except for pure
/// self-links which reduce to their fragment.
pub fn proxify_uri(ctx: &RequestContext<'_>, uri: &[u8]) -> Result<String, url::ParseError> {
    let (cleaned, scheme) = sanitize_uri(uri);

    if scheme == "javascript:" {
        return Ok(String::new());
    }

    if scheme == "data:" {
        if SAFE_DATA_URI_PREFIXES
            .iter()
            .any(|prefix| cleaned.starts_with(prefix))
        {
            return Ok(String::from_utf8_lossy(&cleaned).into_owned());
        }
        return Ok(String::new());
    }

    let raw = String::from_utf8_lossy(&cleaned);
    let mut resolved = Url::options()
        .base_url(Some(&ctx.base_url))
        .parse(&raw)?;

    // The fragment stays client-side; it is not part of the mortyurl.
    let fragment = match resolved.fragment() {
        Some(f) if !f.is_empty() => format!("#{f}"),
        _ => String::new(),
    };
    resolved.set_fragment(None);

    // Some pages spell out the full document URL just to attach a fragment;
    // keep those as plain fragment links instead of a proxy round trip.
    let base = &ctx.base_url;
    let userinfo_compatible = (base.username().is_empty() && base.password().is_none())
        || (resolved.username() == base.username() && resolved.password() == base.password());
    if resolved.scheme() == base.scheme()
        && userinfo_compatible
        && resolved.host_str() == base.host_str()
        && resolved.port() == base.port()
        && resolved.path() == base.path()
        && resolved.query() == base.query()
    {
        return Ok(fragment);
    }

    let morty_uri = resolved.to_string();
    Ok(match ctx.key {
        None => format!("./?mortyurl={}{}", query_escape(&morty_uri), fragment),
        Some(key) => format!(
            "./?mortyhash={}&mortyurl={}{}",
            hash_uri(&morty_uri, key),
            query_escape(&morty_uri),
            fragment
        ),
    })
}

fn query_escape(input: &str) -> String {
    utf8_percent_encode(input, QUERY_ESCAPE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RequestContext<'static> {
        RequestContext::new(None, Url::parse("http://127.0.0.1/").expect("base url"))
    }

    #[test]
    fn sanitize_uri_cases() {
        let cases: &[(&[u8], &[u8], &str)] = &[
            (b"http://example.com/", b"http://example.com/", "http:"),
            (b"HtTPs://example.com/     \t", b"https://example.com/", "https:"),
            (
                b"      Ht  TPs://example.com/     \t",
                b"https://example.com/",
                "https:",
            ),
            (b"javascript:void(0)", b"javascript:void(0)", "javascript:"),
            (
                b"      /path/to/a/file/without/protocol     ",
                b"/path/to/a/file/without/protocol",
                "",
            ),
            (b"      #fragment     ", b"#fragment", ""),
            (b"      qwertyuiop     ", b"qwertyuiop", ""),
            (b"", b"", ""),
            (b":", b":", ":"),
            (b"   :", b":", ":"),
            ("sch\u{e9}ma:".as_bytes(), "sch\u{e9}ma:".as_bytes(), "sch\u{e9}ma:"),
        ];

        for (input, expected, expected_scheme) in cases {
            let (cleaned, scheme) = sanitize_uri(input);
            assert_eq!(
                cleaned.as_slice(),
                *expected,
                "cleaning {:?}",
                String::from_utf8_lossy(input)
            );
            assert_eq!(&scheme, expected_scheme);
        }
    }

    #[test]
    fn sanitize_uri_is_idempotent() {
        let inputs: &[&[u8]] = &[
            b"HtTPs://example.com/     \t",
            b"   relative/path ",
            b"javascript:void(0)",
        ];
        for input in inputs {
            let (once, scheme_once) = sanitize_uri(input);
            let (twice, scheme_twice) = sanitize_uri(&once);
            assert_eq!(once, twice);
            assert_eq!(scheme_once, scheme_twice);
        }
    }

    #[test]
    fn proxify_relative_and_absolute() {
        let ctx = context();
        let cases: &[(&str, &str)] = &[
            ("http://x.com/", "./?mortyurl=http%3A%2F%2Fx.com%2F"),
            ("http://a@x.com/", "./?mortyurl=http%3A%2F%2Fa%40x.com%2F"),
            ("./x", "./?mortyurl=http%3A%2F%2F127.0.0.1%2Fx"),
            ("http://x.com/y", "./?mortyurl=http%3A%2F%2Fx.com%2Fy"),
            ("#a", "#a"),
        ];
        for (input, expected) in cases {
            let rewritten = proxify_uri(&ctx, input.as_bytes()).expect("proxify should succeed");
            assert_eq!(&rewritten, expected, "proxifying {input:?}");
        }
    }

    #[test]
    fn proxify_suppresses_javascript() {
        let ctx = context();
        assert_eq!(
            proxify_uri(&ctx, b"javascript:void(0)").expect("proxify should succeed"),
            ""
        );
        assert_eq!(
            proxify_uri(&ctx, b"  JavaScript:alert(1)").expect("proxify should succeed"),
            ""
        );
    }

    #[test]
    fn proxify_data_uris() {
        let ctx = context();
        let allowed = b"data:image/png;base64,iVBORw0KGgo=";
        assert_eq!(
            proxify_uri(&ctx, allowed).expect("proxify should succeed"),
            String::from_utf8_lossy(allowed)
        );
        assert_eq!(
            proxify_uri(&ctx, b"data:text/html,<script>x</script>").expect("proxify"),
            ""
        );
        assert_eq!(
            proxify_uri(&ctx, b"data:image/svg+xml,<svg onload=x>").expect("proxify"),
            ""
        );
    }

    #[test]
    fn proxify_signs_when_key_present() {
        let key: &[u8] = b"0123456789abcdef";
        let ctx = RequestContext::new(Some(key), Url::parse("http://127.0.0.1/").expect("base"));
        let rewritten = proxify_uri(&ctx, b"http://x.com/y").expect("proxify should succeed");
        let expected_hash = hash_uri("http://x.com/y", key);
        assert_eq!(
            rewritten,
            format!("./?mortyhash={expected_hash}&mortyurl=http%3A%2F%2Fx.com%2Fy")
        );
    }

    #[test]
    fn proxify_self_link_keeps_fragment_only() {
        let ctx = RequestContext::new(
            None,
            Url::parse("http://example.com/page?x=1").expect("base"),
        );
        assert_eq!(
            proxify_uri(&ctx, b"http://example.com/page?x=1#section").expect("proxify"),
            "#section"
        );
        assert_eq!(
            proxify_uri(&ctx, b"http://example.com/page?x=1").expect("proxify"),
            ""
        );
    }
}
