//! Error types for schema loading, field resolution, and extraction calls.
//!
//! Three tiers, matching how far a failure is allowed to propagate:
//!
//! - [`FieldError`] is recovered locally. The field is left out of its item,
//!   the failure is recorded, and resolution carries on.
//! - [`ExtractError`] is terminal for one extraction call (one URL). No
//!   partial result is produced.
//! - [`ConfigError`] rejects a schema configuration at load time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failure resolving a single field against a single context node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("element not found for selector: {selector}")]
    SelectorNotFound { selector: String },

    #[error("attribute {attribute} not found on element matched by: {selector}")]
    AttributeNotFound { selector: String, attribute: String },

    #[error("pattern {pattern} captured nothing from: {input}")]
    PatternNoMatch { pattern: String, input: String },

    #[error("unsupported field type: {0}")]
    UnsupportedFieldKind(String),

    #[error("unbalanced parentheses in count expression: {selector}")]
    UnbalancedCountExpression { selector: String },

    #[error("invalid selector {selector}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// A nested group produced no sub-values, or a control field had nothing
    /// to fall back to.
    #[error("all nested fields failed to extract for selector: {selector}")]
    EmptyAggregate { selector: String },

    /// The live page rejected or failed a query.
    #[error("document query failed for selector {selector}: {message}")]
    Query { selector: String, message: String },
}

/// A failure that aborts one extraction call.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to fetch {url}: {message}")]
    DocumentFetch { url: String, message: String },

    #[error("failed to parse document from {url}: {message}")]
    DocumentParse { url: String, message: String },

    #[error("failed to acquire browser session: {0}")]
    SessionAcquisition(String),
}

impl ExtractError {
    pub(crate) fn fetch(url: &str, message: impl Into<String>) -> Self {
        Self::DocumentFetch {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

/// A schema configuration that could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("invalid pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn field(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// A recorded, non-fatal failure reported alongside extraction results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionError {
    /// Field name, or schema name for schema-level failures.
    pub field: String,
    pub message: String,
    pub url: String,
}

/// Accumulates non-fatal errors for one extraction call.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    url: String,
    errors: Vec<ExtractionError>,
}

impl ErrorCollector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            errors: Vec::new(),
        }
    }

    /// Record a field-level failure.
    pub fn record(&mut self, field: &str, error: &FieldError) {
        self.record_message(field, error.to_string());
    }

    /// Record a failure that has no `FieldError` behind it (schema-level).
    pub fn record_message(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ExtractionError {
            field: field.to_string(),
            message: message.into(),
            url: self.url.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<ExtractionError> {
        self.errors
    }
}
