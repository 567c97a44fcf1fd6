//! Static backend: a fetched HTML body parsed once into an immutable tree.

use super::{normalize_text, parse_css, DocumentAdapter};
use crate::error::FieldError;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Node};

/// Elements rendered on their own line by a browser's default stylesheet.
const BLOCK_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "caption",
    "dd",
    "details",
    "dialog",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hgroup",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "summary",
    "table",
    "tbody",
    "tfoot",
    "thead",
    "tr",
    "ul",
];

/// Elements that contribute no rendered text.
const HIDDEN_ELEMENTS: &[&str] = &["head", "noscript", "script", "style", "template"];

/// Elements whose whitespace is preserved as written.
const PREFORMATTED_ELEMENTS: &[&str] = &["pre", "textarea"];

/// A parsed HTML document plus the URL it was fetched from.
pub struct StaticDocument {
    html: Html,
    url: String,
}

impl StaticDocument {
    /// Parse a decoded HTML body fetched from `url`.
    pub fn from_html(html: &str, url: impl Into<String>) -> Self {
        Self {
            html: Html::parse_document(html),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait(?Send)]
impl<'d> DocumentAdapter for &'d StaticDocument {
    type Node = ElementRef<'d>;

    async fn select_document(&self, css: &str) -> Result<Vec<ElementRef<'d>>, FieldError> {
        let selector = parse_css(css)?;
        let document: &'d StaticDocument = *self;
        Ok(document.html.select(&selector).collect())
    }

    async fn select_within(
        &self,
        context: &ElementRef<'d>,
        css: &str,
    ) -> Result<Vec<ElementRef<'d>>, FieldError> {
        let selector = parse_css(css)?;
        let context: ElementRef<'d> = *context;
        Ok(context.select(&selector).collect())
    }

    async fn text(&self, node: &ElementRef<'d>) -> Result<String, FieldError> {
        Ok(normalize_text(&inner_text(*node)))
    }

    async fn attribute(
        &self,
        node: &ElementRef<'d>,
        name: &str,
    ) -> Result<Option<String>, FieldError> {
        Ok(node.value().attr(name).map(str::to_string))
    }

    fn current_url(&self) -> &str {
        &self.url
    }
}

/// Approximate `HTMLElement.innerText` for an element of a static tree.
///
/// Whitespace inside text runs collapses the way CSS `white-space: normal`
/// does, block elements and `<br>` break lines, and table cells are spaced
/// apart. Combined with [`normalize_text`] this gives the same string a
/// rendered page reports for ordinary markup.
pub fn inner_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    let preformatted = PREFORMATTED_ELEMENTS.contains(&element.value().name());
    collect_text(element, preformatted, &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, preformatted: bool, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                if preformatted {
                    out.push_str(text);
                } else {
                    push_collapsed(out, text);
                }
            }
            Node::Element(el) => {
                let name = el.name();
                if HIDDEN_ELEMENTS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let Some(child_element) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                collect_text(
                    child_element,
                    preformatted || PREFORMATTED_ELEMENTS.contains(&name),
                    out,
                );
                if block {
                    out.push('\n');
                } else if name == "td" || name == "th" {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn push_collapsed(out: &mut String, text: &str) {
    let at_break = |out: &String| out.is_empty() || out.ends_with(|c: char| c == ' ' || c == '\n');
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !at_break(out) {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    if pending_space && !at_break(out) {
        out.push(' ');
    }
}
