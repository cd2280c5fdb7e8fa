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

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Doctype, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer,
    TokenizerOpts,
};

use crate::sanitize::auth::hash_uri;
use crate::sanitize::css::sanitize_css;
use crate::sanitize::uri::{proxify_uri, RequestContext};
use crate::templates;

/// Elements whose entire subtree can execute code or load cross-origin
/// content. While one of these is open, nothing is emitted.
const UNSAFE_ELEMENTS: [&str; 7] = [
    "applet", "canvas", "embed", "iframe", "math", "script", "svg",
];

/// Attributes copied through (HTML-escaped) on any element.
const SAFE_ATTRIBUTES: [&str; 34] = [
    "abbr",
    "accesskey",
    "align",
    "alt",
    "as",
    "autocomplete",
    "charset",
    "checked",
    "class",
    "content",
    "contenteditable",
    "contextmenu",
    "dir",
    "for",
    "height",
    "hidden",
    "hreflang",
    "id",
    "lang",
    "media",
    "method",
    "name",
    "nowrap",
    "placeholder",
    "property",
    "rel",
    "spellcheck",
    "tabindex",
    "target",
    "title",
    "translate",
    "type",
    "value",
    "width",
];

/// `rel` values under which a `<link>` survives; anything else drops the
/// whole element.
const LINK_REL_SAFE_VALUES: [&str; 18] = [
    "alternate",
    "archives",
    "author",
    "copyright",
    "first",
    "help",
    "icon",
    "index",
    "last",
    "license",
    "manifest",
    "next",
    "prev",
    "publisher",
    "search",
    "shortcut icon",
    "stylesheet",
    "up",
];

/// `http-equiv` values under which a `<meta>` survives. `refresh` gets its
/// URL rewritten.
const META_HTTP_EQUIV_SAFE_VALUES: [&str; 4] = ["date", "last-modified", "refresh", "content-language"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextMode {
    Default,
    InStyle,
    InNoscript,
}

/// Sanitizes a UTF-8 HTML document into `out`.
///
/// This is a token-stream filter, not a tree rewriter: tokens are classified
/// one by one against the whitelists above and written out in order, so the
/// output streams without buffering the document. Malformed input produces
/// best-effort output, never an abort.
pub fn sanitize_html<W: Write>(ctx: &mut RequestContext<'_>, out: &mut W, html: &[u8]) {
    let text = String::from_utf8_lossy(html);
    let sink = SanitizerSink {
        ctx,
        out,
        mode: TextMode::Default,
        unsafe_stack: Vec::new(),
        pending_text: String::new(),
    };

    let mut tokenizer = Tokenizer::new(sink, TokenizerOpts::default());
    let mut input = BufferQueue::new();
    input.push_back(StrTendril::from_slice(&text));
    let _ = tokenizer.feed(&mut input);
    tokenizer.end();
}

struct TagAttr {
    name: String,
    value: String,
    escaped: String,
}

struct SanitizerSink<'a, 'k, W: Write> {
    ctx: &'a mut RequestContext<'k>,
    out: &'a mut W,
    mode: TextMode,
    /// Currently-open unsafe element names. A stack, not a counter: nested
    /// same-named unsafe tags must pair up, and `<svg><script></svg></script>`
    /// must not re-enable output early.
    unsafe_stack: Vec<String>,
    /// Raw-text content (`<style>`, `<noscript>`) accumulated until its end
    /// tag, so the CSS rewriter and the recursive HTML pass each see one
    /// contiguous chunk.
    pending_text: String,
}

impl<W: Write> TokenSink for SanitizerSink<'_, '_, W> {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => self.handle_start_tag(&tag),
                TagKind::EndTag => {
                    self.handle_end_tag(&tag.name);
                    TokenSinkResult::Continue
                }
            },
            Token::CharacterTokens(text) => {
                self.handle_text(&text);
                TokenSinkResult::Continue
            }
            Token::DoctypeToken(doctype) => {
                if self.unsafe_stack.is_empty() {
                    self.write_doctype(&doctype);
                }
                TokenSinkResult::Continue
            }
            Token::ParseError(err) => {
                tracing::trace!(error = %err, "html parse error");
                TokenSinkResult::Continue
            }
            // Comments are dropped wholesale.
            Token::CommentToken(_) | Token::NullCharacterToken | Token::EOFToken => {
                TokenSinkResult::Continue
            }
        }
    }

    fn end(&mut self) {
        // Unterminated <style>/<noscript> content still gets sanitized.
        self.flush_pending_text();
    }
}

impl<W: Write> SanitizerSink<'_, '_, W> {
    fn handle_start_tag(&mut self, tag: &Tag) -> TokenSinkResult<()> {
        let name = tag.name.to_string();
        let self_closing = tag.self_closing;

        if !self.unsafe_stack.is_empty() {
            if UNSAFE_ELEMENTS.contains(&name.as_str()) {
                self.unsafe_stack.push(name.clone());
            }
            return raw_text_transition(&name);
        }

        if UNSAFE_ELEMENTS.contains(&name.as_str()) {
            if !self_closing {
                self.unsafe_stack.push(name.clone());
            }
            return raw_text_transition(&name);
        }

        if name == "base" {
            for attr in &tag.attrs {
                if &*attr.name.local == "href" {
                    if let Ok(base) = self.ctx.base_url.join(&attr.value) {
                        self.ctx.base_url = base;
                    }
                }
            }
            return raw_text_transition(&name);
        }

        if name == "noscript" {
            // The tag itself is dropped; the raw content is promoted and
            // re-parsed as HTML once the end tag arrives, since scripts are
            // suppressed anyway and the fallback should render.
            self.mode = TextMode::InNoscript;
            return raw_text_transition(&name);
        }

        let attrs: Vec<TagAttr> = tag
            .attrs
            .iter()
            .map(|attr| TagAttr {
                name: attr.name.local.to_string(),
                value: attr.value.to_string(),
                escaped: templates::escape_html(&attr.value),
            })
            .collect();

        if name == "link" {
            self.write_link_tag(&attrs);
            return raw_text_transition(&name);
        }

        if name == "meta" {
            self.write_meta_tag(&attrs);
            return raw_text_transition(&name);
        }

        let _ = write!(self.out, "<{name}");
        self.write_attrs(&attrs);

        if self_closing {
            let _ = self.out.write_all(b" />");
        } else {
            let _ = self.out.write_all(b">");
            if name == "style" {
                self.mode = TextMode::InStyle;
            }
        }

        if name == "head" {
            let _ = self.out.write_all(templates::HTML_HEAD_INJECTION.as_bytes());
        }

        if name == "form" {
            self.inject_form_inputs(&attrs);
        }

        raw_text_transition(&name)
    }

    fn handle_end_tag(&mut self, name: &str) {
        if let Some(top) = self.unsafe_stack.last() {
            if top == name {
                self.unsafe_stack.pop();
            }
            return;
        }

        match name {
            "body" => {
                let base_url = self.ctx.base_url.to_string();
                templates::write_body_extension(self.out, &base_url, self.ctx.key.is_some());
                self.ctx.body_injected = true;
            }
            "style" => {
                self.flush_pending_text();
                self.mode = TextMode::Default;
            }
            "noscript" => {
                self.flush_pending_text();
                self.mode = TextMode::Default;
                // The end tag is dropped along with its start tag.
                return;
            }
            _ => {}
        }

        let _ = write!(self.out, "</{name}>");
    }

    fn handle_text(&mut self, text: &str) {
        if !self.unsafe_stack.is_empty() {
            return;
        }
        match self.mode {
            TextMode::Default => {
                let _ = self.out.write_all(templates::escape_text(text).as_bytes());
            }
            TextMode::InStyle | TextMode::InNoscript => {
                self.pending_text.push_str(text);
            }
        }
    }

    fn flush_pending_text(&mut self) {
        if self.pending_text.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_text);
        match self.mode {
            TextMode::InStyle => sanitize_css(self.ctx, self.out, pending.as_bytes()),
            TextMode::InNoscript => sanitize_html(self.ctx, self.out, pending.as_bytes()),
            TextMode::Default => {
                let _ = self.out.write_all(templates::escape_text(&pending).as_bytes());
            }
        }
    }

    fn write_link_tag(&mut self, attrs: &[TagAttr]) {
        for attr in attrs {
            if attr.name == "rel" && !LINK_REL_SAFE_VALUES.contains(&attr.value.as_str()) {
                return;
            }
            if attr.name == "as" && attr.value == "script" {
                return;
            }
        }

        let _ = self.out.write_all(b"<link");
        self.write_attrs(attrs);
        let _ = self.out.write_all(b">");
    }

    fn write_meta_tag(&mut self, attrs: &[TagAttr]) {
        let mut http_equiv = String::new();
        let mut content = String::new();

        for attr in attrs {
            if attr.name == "http-equiv" {
                http_equiv = attr.value.to_ascii_lowercase();
                if !META_HTTP_EQUIV_SAFE_VALUES.contains(&http_equiv.as_str()) {
                    return;
                }
            }
            if attr.name == "content" {
                content.clone_from(&attr.value);
            }
            // <meta charset="..."> is superseded by the injected headers.
            if attr.name == "charset" {
                return;
            }
        }

        let _ = self.out.write_all(b"<meta");
        let url_index = content.to_ascii_lowercase().find("url=");
        if http_equiv == "refresh" {
            if let Some(index) = url_index {
                let mut content_url = &content[index + 4..];
                // <meta http-equiv="refresh" content="0; url='...'"> carries
                // quotes that are not part of the URL.
                let bytes = content_url.as_bytes();
                if bytes.len() >= 2
                    && (bytes[0] == b'\'' || bytes[0] == b'"')
                    && bytes[0] == bytes[bytes.len() - 1]
                {
                    content_url = &content_url[1..content_url.len() - 1];
                }
                if let Ok(uri) = proxify_uri(self.ctx, content_url.as_bytes()) {
                    let _ = write!(
                        self.out,
                        " http-equiv=\"refresh\" content=\"{}url={}\"",
                        &content[..index],
                        uri
                    );
                }
                let _ = self.out.write_all(b">");
                return;
            }
        }

        if !http_equiv.is_empty() {
            let _ = write!(self.out, " http-equiv=\"{http_equiv}\"");
        }
        self.write_attrs(attrs);
        let _ = self.out.write_all(b">");
    }

    fn write_attrs(&mut self, attrs: &[TagAttr]) {
        for attr in attrs {
            self.write_attr(attr);
        }
    }

    fn write_attr(&mut self, attr: &TagAttr) {
        if SAFE_ATTRIBUTES.contains(&attr.name.as_str()) {
            let _ = write!(self.out, " {}=\"{}\"", attr.name, attr.escaped);
            return;
        }
        match attr.name.as_str() {
            "src" | "href" | "action" => match proxify_uri(self.ctx, attr.value.as_bytes()) {
                Ok(uri) => {
                    let _ = write!(self.out, " {}=\"{}\"", attr.name, uri);
                }
                Err(err) => {
                    tracing::debug!(uri = %attr.value, error = %err, "cannot proxify uri");
                }
            },
            "style" => {
                let mut css = Vec::with_capacity(attr.value.len());
                sanitize_css(self.ctx, &mut css, attr.value.as_bytes());
                let _ = write!(
                    self.out,
                    " style=\"{}\"",
                    templates::escape_html(&String::from_utf8_lossy(&css))
                );
            }
            // Anything else is dropped.
            _ => {}
        }
    }

    fn inject_form_inputs(&mut self, attrs: &[TagAttr]) {
        let mut form_url = None;
        for attr in attrs {
            if attr.name == "action" {
                form_url = self.ctx.base_url.join(&attr.value).ok();
                break;
            }
        }
        let form_url = form_url.unwrap_or_else(|| self.ctx.base_url.clone());
        let url_str = form_url.to_string();
        let morty_hash = self.ctx.key.map(|key| hash_uri(&url_str, key));
        templates::write_form_extension(self.out, &url_str, morty_hash.as_deref());
    }

    fn write_doctype(&mut self, doctype: &Doctype) {
        let _ = self.out.write_all(b"<!DOCTYPE");
        if let Some(name) = &doctype.name {
            let _ = write!(self.out, " {name}");
        }
        if let Some(public_id) = &doctype.public_id {
            let _ = write!(self.out, " PUBLIC \"{public_id}\"");
            if let Some(system_id) = &doctype.system_id {
                let _ = write!(self.out, " \"{system_id}\"");
            }
        } else if let Some(system_id) = &doctype.system_id {
            let _ = write!(self.out, " SYSTEM \"{system_id}\"");
        }
        let _ = self.out.write_all(b">");
    }
}

/// Mirrors the tokenizer state transitions a browser applies after these
/// start tags, so raw-text content (scripts, styles, noscript fallbacks)
/// arrives as text tokens instead of being parsed as markup.
fn raw_text_transition(name: &str) -> TokenSinkResult<()> {
    match name {
        "script" => TokenSinkResult::RawData(RawKind::ScriptData),
        "style" | "iframe" | "xmp" | "noembed" | "noframes" | "noscript" => {
            TokenSinkResult::RawData(RawKind::Rawtext)
        }
        "title" | "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
        "plaintext" => TokenSinkResult::Plaintext,
        _ => TokenSinkResult::Continue,
    }
}
