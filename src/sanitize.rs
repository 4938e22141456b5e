//! Allow-list HTML sanitizer.
//!
//! Walks the parsed document tree and re-serializes it keeping only a fixed
//! set of tags and attributes. Disallowed tags are unwrapped (their children
//! survive); script-capable constructs are dropped wholesale, content
//! included. Text is re-escaped on output, so nothing executable can be
//! smuggled through the result.

use ego_tree::NodeRef;
use scraper::{Html, Node};

const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "a", "strong", "em", "b", "i", "u", "ul", "ol", "li", "h1", "h2", "h3", "h4",
    "blockquote", "img", "figure", "figcaption", "code", "pre", "span", "hr",
];

const ALLOWED_ATTRS: &[&str] = &["href", "src", "alt", "title", "target", "rel"];

/// Tags whose entire subtree is removed, not just the tag itself.
const DROP_TAGS: &[&str] = &["script", "style", "noscript"];

/// Tags serialized without a closing counterpart.
const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// Reduce `html` to the allow-listed tag and attribute set.
pub fn sanitize_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    for child in fragment.root_element().children() {
        write_node(child, &mut out);
    }
    out
}

fn write_node(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&escape_text(&text)),
        Node::Element(elem) => {
            let name = elem.name();
            if DROP_TAGS.contains(&name) {
                return;
            }
            if !ALLOWED_TAGS.contains(&name) {
                // Unwrap: the tag goes, its children stay.
                for child in node.children() {
                    write_node(child, out);
                }
                return;
            }
            out.push('<');
            out.push_str(name);
            for attr in ALLOWED_ATTRS {
                if let Some(value) = elem.attr(attr) {
                    out.push(' ');
                    out.push_str(attr);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
            }
            out.push('>');
            if VOID_TAGS.contains(&name) {
                return;
            }
            for child in node.children() {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        // Comments, doctypes, and processing instructions never survive.
        _ => {}
    }
}

/// Text content of `html` with tags removed, one space between text runs.
pub fn strip_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    for node in fragment.root_element().descendants() {
        if let Some(text) = node.value().as_text() {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(trimmed);
        }
    }
    out
}

pub(crate) fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}
