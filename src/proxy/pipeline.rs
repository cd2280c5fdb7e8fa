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

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use http::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION};
use http::{Method, StatusCode};
use once_cell::sync::Lazy;
use url::Url;

use crate::contenttype::{format_media_type, ContentType, Filter};
use crate::proxy::server::AppState;
use crate::sanitize::{sanitize_css, sanitize_html, proxify_uri, RequestContext};
use crate::templates;
use crate::utils::ProxyError;

const MAX_REDIRECT_COUNT: u32 = 5;

/// Parameters that survive on the rewritten Content-Type; everything else
/// (boundaries, tracking hints) is stripped.
const ALLOWED_CONTENT_TYPE_PARAMETERS: [&str; 1] = ["charset"];

/// Content served inline after sanitization.
static ALLOWED_CONTENT_TYPES: Lazy<Filter> = Lazy::new(|| {
    Filter::Any(vec![
        // html
        Filter::equals("text", "html", ""),
        Filter::equals("application", "xhtml", "xml"),
        // css
        Filter::equals("text", "css", ""),
        // images
        Filter::equals("image", "gif", ""),
        Filter::equals("image", "png", ""),
        Filter::equals("image", "jpeg", ""),
        Filter::equals("image", "pjpeg", ""),
        Filter::equals("image", "webp", ""),
        Filter::equals("image", "tiff", ""),
        Filter::equals("image", "vnd.microsoft.icon", ""),
        Filter::equals("image", "bmp", ""),
        Filter::equals("image", "x-ms-bmp", ""),
        Filter::equals("image", "x-icon", ""),
        // fonts
        Filter::equals("application", "font-otf", ""),
        Filter::equals("application", "font-ttf", ""),
        Filter::equals("application", "font-woff", ""),
        Filter::equals("application", "vnd.ms-fontobject", ""),
    ])
});

/// Content forwarded unchanged but forced to download.
static ALLOWED_ATTACHMENT_CONTENT_TYPES: Lazy<Filter> = Lazy::new(|| {
    Filter::Any(vec![
        // texts
        Filter::equals("text", "csv", ""),
        Filter::equals("text", "tab-separated-values", ""),
        Filter::equals("text", "plain", ""),
        // API
        Filter::equals("application", "json", ""),
        // documents
        Filter::equals("application", "x-latex", ""),
        Filter::equals("application", "pdf", ""),
        Filter::equals("application", "vnd.oasis.opendocument.text", ""),
        Filter::equals("application", "vnd.oasis.opendocument.spreadsheet", ""),
        Filter::equals("application", "vnd.oasis.opendocument.presentation", ""),
        Filter::equals("application", "vnd.oasis.opendocument.graphics", ""),
        // compressed archives
        Filter::equals("application", "zip", ""),
        Filter::equals("application", "gzip", ""),
        Filter::equals("application", "x-compressed", ""),
        Filter::equals("application", "x-gtar", ""),
        Filter::equals("application", "x-compress", ""),
        // generic binary
        Filter::equals("application", "octet-stream", ""),
    ])
});

/// Drives one client request against the upstream: fetch, gate by content
/// type, normalize to UTF-8, sanitize, respond. Redirects for GET requests
/// are followed here (bounded) when enabled; otherwise the Location header
/// is rewritten for the client to follow through the proxy.
///
/// `request_headers` are the client's own request headers; a client-sent
/// `Content-Disposition` is carried over onto raw passthrough responses and
/// seeds the parameters of a forced attachment.
pub async fn process_uri(
    state: &AppState,
    method: Method,
    request_headers: &HeaderMap,
    client_body: Bytes,
    target: String,
) -> Result<Response, ProxyError> {
    let config = &state.config;
    let mut target = target;
    let mut redirect_count: u32 = 0;

    loop {
        let parsed = parse_target(&target)?;

        // Anything the sanitizer cannot vouch for gets an interstitial
        // instead of a fetch.
        if !matches!(parsed.scheme(), "http" | "https")
            || parsed
                .host_str()
                .is_some_and(|host| host.ends_with(".onion"))
        {
            return Err(ProxyError::ExitRequired(parsed));
        }

        tracing::debug!(method = %method, uri = %target, "fetching upstream");

        let body = if method == Method::POST || method == Method::PUT {
            Some(client_body.clone())
        } else {
            None
        };
        let response = state
            .client
            .fetch(method.clone(), parsed.clone(), body)
            .await?;

        if response.status != StatusCode::OK {
            if matches!(response.status.as_u16(), 301 | 302 | 303 | 307 | 308) {
                if let Some(location) = response
                    .headers
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                {
                    if config.follow_redirects && method == Method::GET {
                        if redirect_count < MAX_REDIRECT_COUNT {
                            tracing::debug!(location, "follow redirect");
                            target = location.to_string();
                            redirect_count += 1;
                            continue;
                        }
                        return Err(ProxyError::TooManyRedirects);
                    }
                    // Other methods are not replayed; the client gets the
                    // redirect back, rewritten to stay inside the proxy.
                    let rc = RequestContext::new(config.key.as_deref(), parsed.clone());
                    if let Ok(proxy_uri) = proxify_uri(&rc, location.as_bytes()) {
                        if let Ok(value) = HeaderValue::from_str(&proxy_uri) {
                            tracing::debug!(location, "redirect");
                            return Ok(Response::builder()
                                .status(response.status)
                                .header(LOCATION, value)
                                .body(Body::empty())
                                .unwrap_or_default());
                        }
                    }
                }
            }
            return Err(ProxyError::UpstreamStatus {
                status: response.status.as_u16(),
                uri: target,
            });
        }

        let content_type_header = response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .ok_or(ProxyError::InvalidContentType)?;
        let mut content_type = ContentType::parse(content_type_header)
            .map_err(|_| ProxyError::InvalidContentType)?;

        let mut content_disposition: Option<HeaderValue> =
            request_headers.get(CONTENT_DISPOSITION).cloned();
        if !ALLOWED_CONTENT_TYPES.matches(&content_type) {
            if ALLOWED_ATTACHMENT_CONTENT_TYPES.matches(&content_type) {
                content_disposition =
                    Some(force_attachment(content_disposition.as_ref(), &parsed));
            } else {
                return Err(ProxyError::ForbiddenContentType(parsed.to_string()));
            }
        }

        // XHTML is sanitized exactly like HTML.
        if content_type.sub_type == "xhtml" {
            content_type.top_level_type = "text".into();
            content_type.sub_type = "html".into();
            content_type.suffix.clear();
        }

        let mut body = response.body;
        if content_type.top_level_type == "text" {
            let encoding = detect_encoding(&body, &content_type);
            if encoding != UTF_8 {
                let (decoded, _, had_errors) = encoding.decode(&body);
                if had_errors {
                    return Err(ProxyError::InvalidEncoding);
                }
                body = Bytes::from(decoded.into_owned().into_bytes());
            }
            content_type
                .parameters
                .insert("charset".into(), "UTF-8".into());
        }

        content_type.filter_parameters(&ALLOWED_CONTENT_TYPE_PARAMETERS);

        if content_type.sub_type == "css" && content_type.suffix.is_empty() {
            let rc = RequestContext::new(config.key.as_deref(), parsed.clone());
            let mut out = Vec::with_capacity(body.len());
            sanitize_css(&rc, &mut out, &body);
            return Ok(content_response(&content_type, None, out));
        }

        if content_type.sub_type == "html" && content_type.suffix.is_empty() {
            let mut rc = RequestContext::new(config.key.as_deref(), parsed.clone());
            let mut out = Vec::with_capacity(body.len() + 1024);
            sanitize_html(&mut rc, &mut out, &body);
            if !rc.body_injected {
                // Document without a </body>: the banner still ships.
                let base_url = rc.base_url.to_string();
                templates::write_body_extension(&mut out, &base_url, rc.key.is_some());
            }
            return Ok(content_response(&content_type, None, out));
        }

        return Ok(content_response(
            &content_type,
            content_disposition,
            body.to_vec(),
        ));
    }
}

fn parse_target(target: &str) -> Result<Url, ProxyError> {
    match Url::parse(target) {
        Ok(url) => Ok(url),
        // Bare "host/path" targets default to HTTPS.
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{target}")).map_err(ProxyError::InvalidRequestUri)
        }
        Err(err) => Err(ProxyError::InvalidRequestUri(err)),
    }
}

fn content_response(
    content_type: &ContentType,
    content_disposition: Option<HeaderValue>,
    body: Vec<u8>,
) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type.to_string());
    if let Some(disposition) = content_disposition {
        builder = builder.header(CONTENT_DISPOSITION, disposition);
    }
    builder.body(Body::from(body)).unwrap_or_default()
}

/// Forces `Content-Disposition: attachment`, keeping any parameters the
/// client sent and synthesizing a file name from the URL path when none was
/// given.
fn force_attachment(existing: Option<&HeaderValue>, url: &Url) -> HeaderValue {
    let mut params = existing
        .and_then(|value| value.to_str().ok())
        .and_then(|value| ContentType::parse(value).ok())
        .map(|parsed| parsed.parameters)
        .unwrap_or_default();

    if !params.contains_key("filename") {
        let file_name = std::path::Path::new(url.path())
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("/");
        params.insert("fileName".to_string(), file_name.to_string());
    }

    HeaderValue::from_str(&format_media_type("attachment", &params))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Encoding detection order: byte order mark, the Content-Type charset
/// parameter, a `<meta>` prescan of the first KiB, then a fallback that
/// assumes UTF-8 for valid UTF-8 bytes and windows-1252 otherwise.
fn detect_encoding(body: &[u8], content_type: &ContentType) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(body) {
        return encoding;
    }
    if let Some(label) = content_type.parameters.get("charset") {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            return encoding;
        }
    }
    if let Some(label) = prescan_meta_charset(&body[..body.len().min(1024)]) {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            return encoding;
        }
    }
    if std::str::from_utf8(body).is_ok() {
        UTF_8
    } else {
        WINDOWS_1252
    }
}

fn prescan_meta_charset(prefix: &[u8]) -> Option<String> {
    let prefix = String::from_utf8_lossy(prefix).to_ascii_lowercase();
    let mut search_start = 0;

    while let Some(relative) = prefix[search_start..].find("charset=") {
        let value_start = search_start + relative + "charset=".len();
        let remainder = prefix[value_start..].trim_start();

        let label = match remainder.chars().next() {
            Some(quote @ ('"' | '\'')) => remainder[1..].split(quote).next(),
            Some(_) => remainder
                .split(|c: char| matches!(c, '"' | '\'' | ';' | '>') || c.is_ascii_whitespace())
                .next(),
            None => None,
        };

        if let Some(label) = label {
            let label = label.trim();
            if !label.is_empty() {
                return Some(label.to_string());
            }
        }
        search_start = value_start;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_html(params: &[(&str, &str)]) -> ContentType {
        ContentType {
            top_level_type: "text".into(),
            sub_type: "html".into(),
            suffix: String::new(),
            parameters: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn inline_allowlist_gates_content() {
        for accepted in [
            "text/html",
            "application/xhtml+xml",
            "text/css",
            "image/png",
            "image/x-icon",
            "application/font-woff",
        ] {
            let ct = ContentType::parse(accepted).expect("parse");
            assert!(ALLOWED_CONTENT_TYPES.matches(&ct), "{accepted}");
        }
        for rejected in [
            "application/javascript",
            "text/javascript",
            "application/pdf",
            "video/mp4",
            "image/svg+xml",
        ] {
            let ct = ContentType::parse(rejected).expect("parse");
            assert!(!ALLOWED_CONTENT_TYPES.matches(&ct), "{rejected}");
        }
    }

    #[test]
    fn attachment_allowlist_gates_content() {
        for accepted in ["text/plain", "application/pdf", "application/zip", "application/octet-stream"] {
            let ct = ContentType::parse(accepted).expect("parse");
            assert!(ALLOWED_ATTACHMENT_CONTENT_TYPES.matches(&ct), "{accepted}");
        }
        for rejected in ["application/javascript", "video/mp4", "text/html"] {
            let ct = ContentType::parse(rejected).expect("parse");
            assert!(!ALLOWED_ATTACHMENT_CONTENT_TYPES.matches(&ct), "{rejected}");
        }
    }

    #[test]
    fn parse_target_defaults_to_https() {
        assert_eq!(
            parse_target("example.com/x").expect("parse").as_str(),
            "https://example.com/x"
        );
        assert_eq!(
            parse_target("http://example.com/x").expect("parse").as_str(),
            "http://example.com/x"
        );
    }

    #[test]
    fn detects_bom_and_declared_charsets() {
        let bom = b"\xff\xfet\x00e\x00s\x00t\x00";
        assert_eq!(
            detect_encoding(bom, &text_html(&[])),
            encoding_rs::UTF_16LE
        );

        assert_eq!(
            detect_encoding(b"plain ascii", &text_html(&[("charset", "ISO-8859-2")])),
            encoding_rs::ISO_8859_2
        );

        let meta = b"<html><head><meta charset=\"koi8-r\"></head><body></body></html>";
        assert_eq!(detect_encoding(meta, &text_html(&[])), encoding_rs::KOI8_R);
    }

    #[test]
    fn fallback_prefers_utf8_then_windows_1252() {
        assert_eq!(
            detect_encoding("résumé".as_bytes(), &text_html(&[])),
            UTF_8
        );
        assert_eq!(detect_encoding(b"r\xe9sum\xe9", &text_html(&[])), WINDOWS_1252);
    }

    #[test]
    fn prescan_handles_quoting_styles() {
        assert_eq!(
            prescan_meta_charset(b"<meta charset=utf-8>").as_deref(),
            Some("utf-8")
        );
        assert_eq!(
            prescan_meta_charset(b"<meta charset='shift_jis'>").as_deref(),
            Some("shift_jis")
        );
        assert_eq!(
            prescan_meta_charset(
                b"<meta http-equiv=\"content-type\" content=\"text/html; charset=windows-1251\">"
            )
            .as_deref(),
            Some("windows-1251")
        );
        assert_eq!(prescan_meta_charset(b"<meta name=viewport>"), None);
    }

    #[test]
    fn forced_attachment_synthesizes_file_name() {
        let url = Url::parse("http://example.com/files/report.pdf").expect("url");
        let value = force_attachment(None, &url);
        assert_eq!(
            value.to_str().expect("ascii"),
            "attachment; filename=report.pdf"
        );
    }

    #[test]
    fn forced_attachment_keeps_existing_file_name() {
        let url = Url::parse("http://example.com/files/report.pdf").expect("url");
        let existing = HeaderValue::from_static("inline; filename=custom.pdf");
        let value = force_attachment(Some(&existing), &url);
        assert_eq!(
            value.to_str().expect("ascii"),
            "attachment; filename=custom.pdf"
        );
    }
}
