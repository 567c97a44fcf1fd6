//! Selector dialect shared by both document backends.
//!
//! Selectors are CSS with two additions: `.` names the context node itself,
//! and a leading `//` roots the rest of the selector at the document instead
//! of the context node.

/// Matches the context node itself.
pub const SELF_SELECTOR: &str = ".";

/// Prefix marking a selector as evaluated against the whole document.
pub const DOCUMENT_ROOT_PREFIX: &str = "//";

/// Where a selector is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// The context node itself.
    SelfNode,
    /// The whole document; carries the CSS with the root prefix removed.
    Document(&'a str),
    /// Descendants of the context node.
    Relative(&'a str),
}

impl<'a> Scope<'a> {
    pub fn of(selector: &'a str) -> Self {
        let selector = selector.trim();
        if is_self(selector) {
            Scope::SelfNode
        } else if let Some(rest) = selector.strip_prefix(DOCUMENT_ROOT_PREFIX) {
            Scope::Document(rest.trim_start())
        } else {
            Scope::Relative(selector)
        }
    }
}

pub fn is_self(selector: &str) -> bool {
    selector.trim() == SELF_SELECTOR
}

/// Strip the document-root prefix if present.
pub fn document_css(selector: &str) -> &str {
    let selector = selector.trim();
    selector
        .strip_prefix(DOCUMENT_ROOT_PREFIX)
        .map(str::trim_start)
        .unwrap_or(selector)
}
