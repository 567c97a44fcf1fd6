//! Extracted values, raw and normalized.

use crate::error::ExtractionError;
use crate::schema::{Field, SchemaInfo};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name to value, ordered by name.
pub type Record = BTreeMap<String, FieldValue>;

/// A resolved field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Object(Record),
    /// A list whose only sub-field is the element's own text.
    TextList(Vec<String>),
    ObjectList(Vec<Record>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Record> {
        match self {
            FieldValue::Object(record) => Some(record),
            _ => None,
        }
    }
}

/// One item before normalization: regular fields and control fields kept
/// apart so control values never leak into the output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub fields: Record,
    pub controls: Record,
}

impl RawItem {
    pub fn insert(&mut self, field: &Field, value: FieldValue) {
        let target = if field.is_control() {
            &mut self.controls
        } else {
            &mut self.fields
        };
        target.insert(field.name.clone(), value);
    }
}

/// A normalized item as emitted to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub external_time: DateTime<FixedOffset>,
    #[serde(flatten)]
    pub fields: Record,
}

/// Items extracted for one schema.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaResult {
    pub schema: SchemaInfo,
    pub items: Vec<ExtractedItem>,
}

/// Everything one extraction call produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub schemas: BTreeMap<String, SchemaResult>,
    pub errors: Vec<ExtractionError>,
    /// Location of the document after redirects.
    pub final_url: String,
}

impl ExtractionResult {
    pub fn item_count(&self) -> usize {
        self.schemas.values().map(|s| s.items.len()).sum()
    }

    pub fn items(&self, schema: &str) -> &[ExtractedItem] {
        self.schemas
            .get(schema)
            .map(|s| s.items.as_slice())
            .unwrap_or(&[])
    }
}
