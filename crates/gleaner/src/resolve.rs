//! Recursive field resolution against a document adapter.
//!
//! Every failure here is a [`FieldError`]. At item level the failure is
//! recorded in the collector and the field is left out; inside nested and
//! list fields sub-field failures are only logged, and the aggregate fails
//! when nothing resolved at all.

use crate::document::DocumentAdapter;
use crate::error::{ErrorCollector, FieldError};
use crate::item::{FieldValue, RawItem, Record};
use crate::rewrite::{has_count, rewrite_counts};
use crate::schema::{Control, Field, FieldKind, ValueSource};
use crate::selector::document_css;
use futures::future::{FutureExt, LocalBoxFuture};
use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

/// Longest input echoed back in a `PatternNoMatch` message.
const ECHO_LIMIT: usize = 120;

/// Resolves schema fields against one document.
pub struct FieldResolver<'d, D: DocumentAdapter> {
    doc: &'d D,
}

impl<'d, D: DocumentAdapter> FieldResolver<'d, D> {
    pub fn new(doc: &'d D) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &D {
        self.doc
    }

    /// Candidate elements for a schema's root selector, evaluated against
    /// the whole document.
    pub async fn roots(&self, selector: &str) -> Result<Vec<D::Node>, FieldError> {
        let selector = self.expand(None, selector).await?;
        self.doc.select_document(document_css(&selector)).await
    }

    /// Resolve every field of a schema against one candidate element.
    pub async fn resolve_item(
        &self,
        element: &D::Node,
        fields: &[Field],
        errors: &mut ErrorCollector,
    ) -> RawItem {
        let mut item = RawItem::default();
        for field in fields {
            match self.resolve(element, field).await {
                Ok(value) => item.insert(field, value),
                Err(e) => {
                    debug!(field = %field.name, error = %e, "field not resolved");
                    errors.record(&field.name, &e);
                }
            }
        }
        item
    }

    /// Resolve one field against `context`.
    pub fn resolve<'a>(
        &'a self,
        context: &'a D::Node,
        field: &'a Field,
    ) -> LocalBoxFuture<'a, Result<FieldValue, FieldError>> {
        async move {
            match &field.control {
                Some(control) => self.resolve_control(context, field, control).await,
                None => self.resolve_kind(context, field).await,
            }
        }
        .boxed_local()
    }

    async fn resolve_kind(&self, context: &D::Node, field: &Field) -> Result<FieldValue, FieldError> {
        match &field.kind {
            FieldKind::Text => {
                let node = self.locate(context, &field.selector).await?;
                Ok(FieldValue::Text(self.doc.text(&node).await?))
            }
            FieldKind::Attribute(name) => {
                let node = self.locate(context, &field.selector).await?;
                self.doc
                    .attribute(&node, name)
                    .await?
                    .map(FieldValue::Text)
                    .ok_or_else(|| FieldError::AttributeNotFound {
                        selector: field.selector.clone(),
                        attribute: name.clone(),
                    })
            }
            FieldKind::Nested(sub_fields) => {
                let node = self.locate(context, &field.selector).await?;
                let record = self.resolve_record(&node, sub_fields).await;
                if record.is_empty() {
                    Err(FieldError::EmptyAggregate {
                        selector: field.selector.clone(),
                    })
                } else {
                    Ok(FieldValue::Object(record))
                }
            }
            FieldKind::List(sub_fields) => self.resolve_list(context, field, sub_fields).await,
            FieldKind::Unsupported(kind) => Err(FieldError::UnsupportedFieldKind(kind.clone())),
        }
    }

    /// Resolve sub-fields into a mapping, keeping only the ones that succeed.
    async fn resolve_record(&self, context: &D::Node, fields: &[Field]) -> Record {
        let mut record = Record::new();
        for field in fields {
            match self.resolve(context, field).await {
                Ok(value) => {
                    record.insert(field.name.clone(), value);
                }
                Err(e) => debug!(field = %field.name, error = %e, "sub-field not resolved"),
            }
        }
        record
    }

    async fn resolve_list(
        &self,
        context: &D::Node,
        field: &Field,
        sub_fields: &[Field],
    ) -> Result<FieldValue, FieldError> {
        let selector = self.expand(Some(context), &field.selector).await?;
        let nodes = self.doc.find_all(&selector, Some(context)).await?;
        if nodes.is_empty() {
            return Err(FieldError::SelectorNotFound {
                selector: selector.into_owned(),
            });
        }

        if let [only] = sub_fields {
            if only.is_self_text() && !only.is_control() {
                let mut texts = Vec::with_capacity(nodes.len());
                for node in &nodes {
                    match self.resolve(node, only).await {
                        Ok(FieldValue::Text(text)) => texts.push(text),
                        Ok(_) => {}
                        Err(e) => debug!(field = %only.name, error = %e, "list entry not resolved"),
                    }
                }
                return Ok(FieldValue::TextList(texts));
            }
        }

        let mut records = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let record = self.resolve_record(node, sub_fields).await;
            if !record.is_empty() {
                records.push(record);
            }
        }
        Ok(FieldValue::ObjectList(records))
    }

    /// `_id*` / `_time*` fields. A nested control resolves its sub-fields in
    /// the same context first and falls back to its own source when that
    /// yields nothing. A control without a source resolves by its kind.
    async fn resolve_control(
        &self,
        context: &D::Node,
        field: &Field,
        control: &Control,
    ) -> Result<FieldValue, FieldError> {
        if let FieldKind::Nested(sub_fields) = &field.kind {
            let record = self.resolve_record(context, sub_fields).await;
            if !record.is_empty() {
                return Ok(FieldValue::Object(record));
            }
        }

        match (control.source, control.pattern.as_ref()) {
            (Some(ValueSource::Url), Some(pattern)) => {
                capture(pattern, self.doc.current_url()).map(FieldValue::Text)
            }
            (Some(ValueSource::Element), Some(pattern)) => {
                let node = self.locate(context, &field.selector).await?;
                let text = self.doc.text(&node).await?;
                capture(pattern, &text).map(FieldValue::Text)
            }
            (None, _) if !field.kind.is_nested() => self.resolve_kind(context, field).await,
            _ => Err(FieldError::EmptyAggregate {
                selector: field.selector.clone(),
            }),
        }
    }

    async fn locate(&self, context: &D::Node, selector: &str) -> Result<D::Node, FieldError> {
        let selector = self.expand(Some(context), selector).await?;
        self.doc
            .find_one(&selector, Some(context))
            .await?
            .ok_or_else(|| FieldError::SelectorNotFound {
                selector: selector.into_owned(),
            })
    }

    async fn expand<'s>(
        &self,
        context: Option<&D::Node>,
        selector: &'s str,
    ) -> Result<Cow<'s, str>, FieldError> {
        if has_count(selector) {
            rewrite_counts(self.doc, context, selector).await.map(Cow::Owned)
        } else {
            Ok(Cow::Borrowed(selector))
        }
    }
}

/// Run `pattern` over `input` and join its capture groups with `/`.
///
/// Optional groups that did not participate contribute an empty segment.
/// A pattern without groups never captures anything.
pub fn capture(pattern: &Regex, input: &str) -> Result<String, FieldError> {
    let no_match = || FieldError::PatternNoMatch {
        pattern: pattern.as_str().to_string(),
        input: input.chars().take(ECHO_LIMIT).collect(),
    };
    if pattern.captures_len() <= 1 {
        return Err(no_match());
    }
    let captures = pattern.captures(input).ok_or_else(no_match)?;
    Ok(captures
        .iter()
        .skip(1)
        .map(|group| group.map_or("", |m| m.as_str()))
        .collect::<Vec<_>>()
        .join("/"))
}
