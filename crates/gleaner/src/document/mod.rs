// Copyright 2026 Gleaner Contributors
// SPDX-License-Identifier: Apache-2.0

//! Backend-neutral query interface over a parsed or rendered document.
//!
//! Both backends answer the same five questions (find one, find all, text,
//! attribute, current URL). The rooting rule for selectors lives in the
//! provided `find_*` methods so the two implementations cannot drift apart.
//!
//! Futures are `?Send`: the static tree from `scraper` is `!Send`, so
//! extraction runs on a single thread (inside a `LocalSet` when batched).

pub mod live;
pub mod static_doc;

pub use live::{LiveDocument, LiveNode, LiveOptions};
pub use static_doc::StaticDocument;

use crate::error::FieldError;
use crate::selector::Scope;
use async_trait::async_trait;
use scraper::Selector;

/// Query capabilities shared by the static and live backends.
#[async_trait(?Send)]
pub trait DocumentAdapter {
    /// Handle to one element of this document.
    type Node: Clone;

    /// All matches of `css` anywhere in the document, in document order.
    async fn select_document(&self, css: &str) -> Result<Vec<Self::Node>, FieldError>;

    /// All matches of `css` among the descendants of `context`.
    async fn select_within(
        &self,
        context: &Self::Node,
        css: &str,
    ) -> Result<Vec<Self::Node>, FieldError>;

    /// innerText-equivalent text, normalized with [`normalize_text`].
    async fn text(&self, node: &Self::Node) -> Result<String, FieldError>;

    async fn attribute(&self, node: &Self::Node, name: &str) -> Result<Option<String>, FieldError>;

    /// The document's resolved location (after redirects).
    fn current_url(&self) -> &str;

    /// Evaluate a selector in dialect form. `None` as context means the
    /// document itself.
    async fn find_all(
        &self,
        selector: &str,
        context: Option<&Self::Node>,
    ) -> Result<Vec<Self::Node>, FieldError> {
        match Scope::of(selector) {
            Scope::SelfNode => Ok(context.cloned().into_iter().collect()),
            Scope::Document(css) => self.select_document(css).await,
            Scope::Relative(css) => match context {
                Some(node) => self.select_within(node, css).await,
                None => self.select_document(css).await,
            },
        }
    }

    async fn find_one(
        &self,
        selector: &str,
        context: Option<&Self::Node>,
    ) -> Result<Option<Self::Node>, FieldError> {
        Ok(self.find_all(selector, context).await?.into_iter().next())
    }
}

/// Parse a CSS selector, mapping failures to a field error.
///
/// The live backend runs this too, so both report malformed selectors the
/// same way instead of surfacing two different parser messages.
pub(crate) fn parse_css(css: &str) -> Result<Selector, FieldError> {
    Selector::parse(css).map_err(|e| FieldError::InvalidSelector {
        selector: css.to_string(),
        reason: format!("{e:?}"),
    })
}

/// Collapse horizontal whitespace runs to one space, trim every line, drop
/// blank lines, and rejoin with `\n`.
pub fn normalize_text(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello \t  world  "), "Hello world");
        assert_eq!(normalize_text("a\n\n   \n b  c \r\nd"), "a\nb c\nd");
        assert_eq!(normalize_text("\u{a0}x\u{a0}\u{a0}y"), "x y");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_parse_css_rejects_garbage() {
        assert!(parse_css("td.name").is_ok());
        assert!(matches!(
            parse_css("td[["),
            Err(FieldError::InvalidSelector { .. })
        ));
        assert!(parse_css("").is_err());
    }
}
