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

use morty::sanitize::auth::hash_uri;
use morty::sanitize::{sanitize_html, RequestContext};
use url::Url;

fn sanitize_with(base: &str, key: Option<&[u8]>, html: &str) -> (String, bool) {
    let mut ctx = RequestContext::new(key, Url::parse(base).expect("base url"));
    let mut out = Vec::new();
    sanitize_html(&mut ctx, &mut out, html.as_bytes());
    (
        String::from_utf8(out).expect("sanitized output is utf-8"),
        ctx.body_injected,
    )
}

fn sanitize(html: &str) -> String {
    sanitize_with("http://127.0.0.1/", None, html).0
}

#[test]
fn url_attributes_are_proxified_and_event_handlers_dropped() {
    let out = sanitize(r#"<a href="./x" onclick="alert(1)">link</a>"#);
    assert!(out.contains(r#"<a href="./?mortyurl=http%3A%2F%2F127.0.0.1%2Fx">"#));
    assert!(!out.contains("onclick"));
    assert!(!out.contains("alert"));
}

#[test]
fn src_and_action_attributes_are_rewritten() {
    let out = sanitize(r#"<img src="http://x.com/y" alt="imgtitle" />"#);
    assert!(out.contains(r#"src="./?mortyurl=http%3A%2F%2Fx.com%2Fy""#));
    assert!(out.contains(r#"alt="imgtitle""#));
    assert!(out.ends_with("/>"));

    let out = sanitize(r#"<form action="/z">"#);
    assert!(out.contains(r#"action="./?mortyurl=http%3A%2F%2F127.0.0.1%2Fz""#));
}

#[test]
fn full_document_scenario() {
    let input = concat!(
        "<!doctype html><html><head><title>t</title>",
        "<script>bad()</script></head>",
        "<body><h1>x</h1><iframe src=\"y\"></iframe></body></html>"
    );
    let (out, body_injected) = sanitize_with("http://127.0.0.1/", None, input);

    assert!(out.contains("<h1>x</h1>"));
    assert!(!out.contains("bad()"));
    assert!(!out.contains("<script"));
    assert!(!out.contains("<iframe"));
    // Injected head metas.
    assert!(out.contains(r#"<meta http-equiv="Content-Type" content="text/html; charset=utf-8">"#));
    assert!(out.contains(r#"<meta http-equiv="X-UA-Compatible" content="IE=edge">"#));
    assert!(out.contains(r#"<meta name="referrer" content="no-referrer">"#));
    // Banner sits before the closing body tag.
    let banner = out.find("mortyheader").expect("banner injected");
    let body_end = out.find("</body>").expect("body close kept");
    assert!(banner < body_end);
    assert!(body_injected);
}

#[test]
fn unsafe_subtrees_are_suppressed_wholesale() {
    let out = sanitize("<p>a</p><svg><circle cx=\"1\"/><script>evil()</script></svg><p>b</p>");
    assert!(out.contains("<p>a</p>"));
    assert!(out.contains("<p>b</p>"));
    assert!(!out.contains("svg"));
    assert!(!out.contains("circle"));
    assert!(!out.contains("evil"));
}

#[test]
fn mispaired_unsafe_tags_stay_suppressed() {
    // </svg> inside the script's raw text must not re-enable output.
    let out = sanitize("<svg><script></svg></script><b>hidden</b>");
    assert!(!out.contains("hidden"));
    assert!(!out.contains("<b>"));
}

#[test]
fn nested_same_name_unsafe_tags_balance() {
    let out = sanitize("<iframe><iframe src=\"x\"></iframe></iframe><i>visible</i>");
    assert!(out.contains("<i>visible</i>"));
}

#[test]
fn base_href_replaces_resolution_base_mid_stream() {
    let out = sanitize(concat!(
        r#"<a href="/first">1</a>"#,
        r#"<base href="http://other.example/sub/">"#,
        r#"<a href="second">2</a>"#
    ));
    assert!(out.contains("mortyurl=http%3A%2F%2F127.0.0.1%2Ffirst"));
    assert!(out.contains("mortyurl=http%3A%2F%2Fother.example%2Fsub%2Fsecond"));
    assert!(!out.contains("<base"));
}

#[test]
fn noscript_content_is_promoted_and_sanitized() {
    let out = sanitize(concat!(
        "<noscript>",
        r#"<meta http-equiv="refresh" content="0; URL=./xy">"#,
        "<p>fallback</p>",
        "</noscript>"
    ));
    assert!(!out.contains("noscript"));
    assert!(out.contains("<p>fallback</p>"));
    assert!(out.contains(
        r#"http-equiv="refresh" content="0; url=./?mortyurl=http%3A%2F%2F127.0.0.1%2Fxy""#
    ));
}

#[test]
fn meta_refresh_url_with_quotes() {
    let out = sanitize(
        r#"<meta http-equiv="refresh" content="0; url='http://x.com/page'">"#,
    );
    assert!(out.contains("content=\"0; url=./?mortyurl=http%3A%2F%2Fx.com%2Fpage\""));
}

#[test]
fn meta_tags_are_filtered() {
    assert_eq!(sanitize(r#"<meta charset="utf-8">"#), "");
    assert_eq!(sanitize(r#"<meta http-equiv="set-cookie" content="a=b">"#), "");
    let out = sanitize(r#"<meta name="description" content="hello">"#);
    assert!(out.contains(r#"name="description""#));
    assert!(out.contains(r#"content="hello""#));
    let out = sanitize(r#"<meta http-equiv="Content-Language" content="en">"#);
    assert!(out.contains(r#"http-equiv="content-language""#));
}

#[test]
fn link_tags_are_filtered_by_rel_and_as() {
    let out = sanitize(r#"<link rel="stylesheet" href="./core.bundle.css">"#);
    assert!(out.contains(r#"<link rel="stylesheet""#));
    assert!(out.contains("mortyurl=http%3A%2F%2F127.0.0.1%2Fcore.bundle.css"));

    assert_eq!(sanitize(r#"<link rel="preconnect" href="http://cdn.example/">"#), "");
    assert_eq!(sanitize(r#"<link rel="icon" as="script" href="x.js">"#), "");
}

#[test]
fn style_element_and_attribute_are_rewritten() {
    let out = sanitize("<style>html { background: url(./a.jpg); }</style>");
    assert!(out.contains("<style>"));
    assert!(out.contains("url(./?mortyurl=http%3A%2F%2F127.0.0.1%2Fa.jpg)"));
    assert!(out.contains("</style>"));

    let out = sanitize(r#"<input type="submit" style="background: url(http://aa.bb/cc)">"#);
    assert!(out.contains("mortyurl=http%3A%2F%2Faa.bb%2Fcc"));
    assert!(!out.contains("http://aa.bb/cc\""));
}

#[test]
fn form_gets_hidden_inputs() {
    let (out, _) = sanitize_with("http://127.0.0.1/", None, r#"<form action="/z">"#);
    assert!(out.contains(
        r#"<input type="hidden" name="mortyurl" value="http://127.0.0.1/z" />"#
    ));
    assert!(!out.contains("mortyhash"));

    let key: &[u8] = b"0123456789abcdef";
    let (out, _) = sanitize_with("http://127.0.0.1/", Some(key), r#"<form action="/z">"#);
    let expected = hash_uri("http://127.0.0.1/z", key);
    assert!(out.contains(&format!(
        r#"<input type="hidden" name="mortyhash" value="{expected}" />"#
    )));
}

#[test]
fn form_without_action_uses_base_url() {
    let (out, _) = sanitize_with("http://127.0.0.1/page", None, "<form method=\"get\">");
    assert!(out.contains(
        r#"<input type="hidden" name="mortyurl" value="http://127.0.0.1/page" />"#
    ));
}

#[test]
fn comments_are_dropped_and_doctype_kept() {
    let out = sanitize("<!doctype html><!-- tracking beacon --><p>x</p>");
    assert!(out.starts_with("<!DOCTYPE html>"));
    assert!(!out.contains("tracking beacon"));
    assert!(out.contains("<p>x</p>"));
}

#[test]
fn text_entities_do_not_rematerialize_as_markup() {
    let out = sanitize("<p>a &amp; b &lt;script&gt;</p>");
    assert!(out.contains("a &amp; b &lt;script&gt;"));
    assert!(!out.contains("<script"));
}

#[test]
fn banner_not_marked_injected_without_body_close() {
    let (out, body_injected) = sanitize_with("http://127.0.0.1/", None, "<p>no body end</p>");
    assert!(!body_injected);
    assert!(!out.contains("mortyheader"));
}

#[test]
fn javascript_hrefs_collapse_to_empty() {
    let out = sanitize(r#"<a href="javascript:void(0)">x</a>"#);
    assert!(out.contains(r#"<a href="">x</a>"#));
}

#[test]
fn data_image_uris_pass_through() {
    let out = sanitize(r#"<img src="data:image/png;base64,iVBORw0KGgo=">"#);
    assert!(out.contains(r#"src="data:image/png;base64,iVBORw0KGgo=""#));

    let out = sanitize(r#"<img src="data:text/html,<h1>x">"#);
    assert!(out.contains(r#"src="""#));
}

#[test]
fn fragment_links_stay_local() {
    let out = sanitize(r##"<a href="#section">jump</a>"##);
    assert!(out.contains(r##"<a href="#section">jump</a>"##));
}

#[test]
fn unterminated_style_is_still_sanitized() {
    let out = sanitize("<style>div { background: url(/tail.png); }");
    assert!(out.contains("mortyurl=http%3A%2F%2F127.0.0.1%2Ftail.png"));
}

#[test]
fn every_output_url_routes_through_the_proxy() {
    let input = concat!(
        "<!doctype html><html><head>",
        r#"<link rel="stylesheet" href="http://cdn.example/site.css">"#,
        "</head><body>",
        r#"<a href="./relative">r</a>"#,
        r#"<a href="https://other.example/page?q=1#frag">o</a>"#,
        r##"<a href="#local">l</a>"##,
        r#"<img src="data:image/gif;base64,R0lGOD=">"#,
        r#"<form action="submit"><input type="text" name="q"></form>"#,
        "</body></html>"
    );
    let (out, _) = sanitize_with("http://127.0.0.1/dir/", None, input);

    // Collect every href/src/action value in the output.
    let mut urls = Vec::new();
    for needle in ["href=\"", "src=\"", "action=\""] {
        let mut rest = out.as_str();
        while let Some(at) = rest.find(needle) {
            let value = &rest[at + needle.len()..];
            let end = value.find('"').unwrap_or(value.len());
            urls.push(value[..end].to_string());
            rest = &value[end..];
        }
    }

    assert!(!urls.is_empty());
    for url in urls {
        let ok = url.starts_with("./?mortyurl=")
            || url.starts_with("./?mortyhash=")
            || url.starts_with('#')
            || url.starts_with("data:image/")
            || url.is_empty()
            // Template-owned literals: banner home link, banner link to the
            // original document, project link.
            || url == "/"
            || url == "http://127.0.0.1/dir/"
            || url.starts_with("https://github.com/");
        assert!(ok, "unexpected URL in output: {url}");
    }
}
