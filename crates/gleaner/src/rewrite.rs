//! `count(<selector>)` expansion.
//!
//! Before a selector is queried, every `count(...)` span is replaced by the
//! number of elements its inner selector matches from the same context, so
//! `tr:nth-child(count(th))` becomes `tr:nth-child(4)` on a four-column table.
//! Nested counts are expanded innermost first. Quoted attribute values are
//! opaque to both the count search and the parenthesis check.

use crate::document::DocumentAdapter;
use crate::error::FieldError;
use futures::future::{FutureExt, LocalBoxFuture};
use std::ops::Range;

const COUNT_OPEN: &str = "count(";

pub fn has_count(selector: &str) -> bool {
    find_count(selector).is_some()
}

/// Offset of the first `count(` outside quoted strings.
fn find_count(selector: &str) -> Option<usize> {
    unquoted(selector)
        .map(|(offset, _)| offset)
        .find(|&offset| selector[offset..].starts_with(COUNT_OPEN))
}

/// Characters of `selector`, with their byte offsets, that sit outside
/// single- or double-quoted strings. Quotes themselves are skipped.
fn unquoted(selector: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    selector.char_indices().filter(move |&(_, ch)| match quote {
        Some(open) => {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            false
        }
        None if ch == '"' || ch == '\'' => {
            quote = Some(ch);
            false
        }
        None => true,
    })
}

/// Replace every `count(...)` in `selector` with its match count.
///
/// Parentheses are checked across the whole selector first, so an unbalanced
/// selector fails without issuing any query.
pub async fn rewrite_counts<D: DocumentAdapter>(
    doc: &D,
    context: Option<&D::Node>,
    selector: &str,
) -> Result<String, FieldError> {
    check_balanced(selector)?;
    if !has_count(selector) {
        return Ok(selector.to_string());
    }
    expand(doc, context, selector.to_string()).await
}

fn expand<'a, D: DocumentAdapter>(
    doc: &'a D,
    context: Option<&'a D::Node>,
    selector: String,
) -> LocalBoxFuture<'a, Result<String, FieldError>> {
    async move {
        let mut current = selector;
        while let Some(span) = next_count(&current)? {
            let inner = current[span.inner.clone()].to_string();
            let inner = if has_count(&inner) {
                expand(doc, context, inner).await?
            } else {
                inner
            };
            let count = doc.find_all(&inner, context).await?.len();
            current.replace_range(span.whole, &count.to_string());
        }
        Ok(current)
    }
    .boxed_local()
}

struct CountSpan {
    /// `count(` through the matching `)`.
    whole: Range<usize>,
    /// Text between the parentheses.
    inner: Range<usize>,
}

fn next_count(selector: &str) -> Result<Option<CountSpan>, FieldError> {
    let Some(start) = find_count(selector) else {
        return Ok(None);
    };
    let open = start + COUNT_OPEN.len() - 1;
    let mut depth = 0usize;
    for (offset, ch) in unquoted(&selector[open..]) {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let close = open + offset;
                    return Ok(Some(CountSpan {
                        whole: start..close + 1,
                        inner: open + 1..close,
                    }));
                }
            }
            _ => {}
        }
    }
    Err(unbalanced(selector))
}

/// Fail unless every `(` in `selector` has a matching `)`.
pub fn check_balanced(selector: &str) -> Result<(), FieldError> {
    let mut depth = 0i64;
    for (_, ch) in unquoted(selector) {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(unbalanced(selector));
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(unbalanced(selector))
    }
}

fn unbalanced(selector: &str) -> FieldError {
    FieldError::UnbalancedCountExpression {
        selector: selector.to_string(),
    }
}
