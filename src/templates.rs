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

/// Meta lines injected right after every sanitized `<head>`.
pub const HTML_HEAD_INJECTION: &str = r#"<meta http-equiv="Content-Type" content="text/html; charset=utf-8">
<meta http-equiv="X-UA-Compatible" content="IE=edge">
<meta name="referrer" content="no-referrer">
"#;

const PAGE_START: &str = r#"<!doctype html>
<html>
<head>
<title>MortyProxy</title>
<meta name="viewport" content="width=device-width, initial-scale=1 , maximum-scale=1.0, user-scalable=1" />
<style>
html { height: 100%; }
body { min-height : 100%; display: flex; flex-direction:column; font-family: 'Garamond', 'Georgia', serif; text-align: center; color: #444; background: #FAFAFA; margin: 0; padding: 0; font-size: 1.1em; }
input { border: 1px solid #888; padding: 0.3em; color: #444; background: #FFF; font-size: 1.1em; }
input[placeholder] { width:80%; }
a { text-decoration: none; #2980b9; }
h1, h2 { font-weight: 200; margin-bottom: 2rem; }
h1 { font-size: 3em; }
.container { flex:1; min-height: 100%; margin-bottom: 1em; }
.footer { margin: 1em; }
.footer p { font-size: 0.8em; }
</style>
</head>
<body>
	<div class="container">
		<h1>MortyProxy</h1>
"#;

const PAGE_END: &str = r#"
	</div>
	<div class="footer">
		<p>Morty rewrites web pages to exclude malicious HTML tags and CSS/HTML attributes. It also replaces external resource references to prevent third-party information leaks.<br />
		<a href="https://github.com/morty-proxy/morty-rs">view on github</a>
		</p>
	</div>
</body>
</html>"#;

const LANDING_FORM: &str = r#"
		<form action="post">
		Visit url: <input placeholder="https://url.." name="mortyurl" autofocus />
		<input type="submit" value="go" />
		</form>"#;

const LANDING_KEY_WARNING: &str =
    "<h3>Warning! This instance does not support direct URL opening.</h3>";

/// HTML-escapes a string for use in attribute values and text content.
/// Escapes the same five characters browsers treat as markup delimiters.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes text-node content. The tokenizer hands over character data with
/// entities already decoded, so `&`, `<` and `>` have to be re-escaped or
/// decoded entities would re-materialize as markup.
pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Hidden inputs injected after every `<form>` open tag so submissions route
/// back through the proxy.
pub fn write_form_extension<W: Write>(out: &mut W, base_url: &str, morty_hash: Option<&str>) {
    let _ = write!(
        out,
        r#"<input type="hidden" name="mortyurl" value="{}" />"#,
        escape_html(base_url)
    );
    if let Some(hash) = morty_hash {
        let _ = write!(
            out,
            r#"<input type="hidden" name="mortyhash" value="{}" />"#,
            escape_html(hash)
        );
    }
}

/// Top banner injected ahead of `</body>` (or appended after the stream when
/// the document never closes its body).
pub fn write_body_extension<W: Write>(out: &mut W, base_url: &str, has_key: bool) {
    let escaped_url = escape_html(base_url);
    let readonly = if has_key { r#"readonly="true""# } else { "" };
    let _ = write!(
        out,
        r#"
<input type="checkbox" id="mortytoggle" autocomplete="off" />
<div id="mortyheader">
  <form method="get">
    <label for="mortytoggle">hide</label>
    <span><a href="/">Morty Proxy</a></span>
    <input type="url" value="{escaped_url}" name="mortyurl" {readonly} />
    This is a <a href="https://github.com/morty-proxy/morty-rs">proxified and sanitized</a> view of the page, visit <a href="{escaped_url}" rel="noreferrer">original site</a>.
  </form>
</div>
<style>
body{{ position: absolute !important; top: 42px !important; left: 0 !important; right: 0 !important; bottom: 0 !important; }}
#mortyheader {{ position: fixed; margin: 0; box-sizing: border-box; -webkit-box-sizing: border-box; top: 0; left: 0; right: 0; z-index: 2147483647 !important; font-size: 12px; line-height: normal; border-width: 0px 0px 2px 0; border-style: solid; border-color: #AAAAAA; background: #FFF; padding: 4px; color: #444; height: 42px; }}
#mortyheader * {{ padding: 0; margin: 0; }}
#mortyheader p {{ padding: 0 0 0.7em 0; display: block; }}
#mortyheader a {{ color: #3498db; font-weight: bold; display: inline; }}
#mortyheader label {{ text-align: right; cursor: pointer; position: fixed; right: 4px; top: 4px; display: block; color: #444; }}
#mortyheader > form > span {{ font-size: 24px; font-weight: bold; margin-right: 20px; margin-left: 20px; }}
input[type=checkbox]#mortytoggle {{ display: none; }}
input[type=checkbox]#mortytoggle:checked ~ div {{ display: none; visibility: hidden; }}
#mortyheader input[type=url] {{ width: 50%; padding: 4px; font-size: 16px; }}
</style>
"#
    );
}

/// Renders the landing page, optionally with an error banner. Shown for
/// direct visits and for every request the pipeline refuses.
pub fn main_page(has_key: bool, error: Option<&str>) -> String {
    let mut page = String::with_capacity(PAGE_START.len() + PAGE_END.len() + 256);
    page.push_str(PAGE_START);
    if let Some(message) = error {
        page.push_str("<h2>Error: ");
        page.push_str(&escape_html(message));
        page.push_str("</h2>");
    }
    if has_key {
        page.push_str(LANDING_KEY_WARNING);
    } else {
        page.push_str(LANDING_FORM);
    }
    page.push_str(PAGE_END);
    page
}

/// Renders the interstitial shown before leaving the proxy for a scheme it
/// cannot sanitize.
pub fn exit_page(uri: &str) -> String {
    let escaped = escape_html(uri);
    let mut page = String::with_capacity(PAGE_START.len() + PAGE_END.len() + 256);
    page.push_str(PAGE_START);
    page.push_str("<h2>You are about to exit MortyProxy</h2>");
    page.push_str("<p>Following</p><p><a href=\"");
    page.push_str(&escaped);
    page.push_str("\" rel=\"noreferrer\">");
    page.push_str(&escaped);
    page.push_str("</a></p><p>the content of this URL will be <b>NOT</b> sanitized.</p>");
    page.push_str(PAGE_END);
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_covers_markup_delimiters() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&#34;x&#34;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn form_extension_with_and_without_hash() {
        let mut out = Vec::new();
        write_form_extension(&mut out, "http://x.com/", None);
        let html = String::from_utf8(out).expect("utf-8");
        assert!(html.contains(r#"name="mortyurl" value="http://x.com/""#));
        assert!(!html.contains("mortyhash"));

        let mut out = Vec::new();
        write_form_extension(&mut out, "http://x.com/", Some("abcd"));
        let html = String::from_utf8(out).expect("utf-8");
        assert!(html.contains(r#"name="mortyhash" value="abcd""#));
    }

    #[test]
    fn body_extension_marks_readonly_with_key() {
        let mut out = Vec::new();
        write_body_extension(&mut out, "http://x.com/", true);
        let html = String::from_utf8(out).expect("utf-8");
        assert!(html.contains(r#"readonly="true""#));
        assert!(html.contains("mortyheader"));

        let mut out = Vec::new();
        write_body_extension(&mut out, "http://x.com/", false);
        let html = String::from_utf8(out).expect("utf-8");
        assert!(!html.contains("readonly"));
    }

    #[test]
    fn main_page_variants() {
        let open = main_page(false, None);
        assert!(open.contains("Visit url:"));
        assert!(!open.contains("Error:"));

        let locked = main_page(true, Some("invalid \"mortyhash\" parameter"));
        assert!(locked.contains("does not support direct URL opening"));
        assert!(locked.contains("Error: invalid &#34;mortyhash&#34; parameter"));
    }

    #[test]
    fn exit_page_escapes_target() {
        let page = exit_page("ftp://x/<script>");
        assert!(page.contains("exit MortyProxy"));
        assert!(page.contains("ftp://x/&lt;script&gt;"));
        assert!(!page.contains("<script>"));
    }
}
