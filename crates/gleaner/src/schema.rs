//! Immutable description of what to extract.
//!
//! Configs are validated while they are deserialized, and every capture
//! pattern is compiled exactly once here, so the resolver never sees a
//! malformed field.

use crate::error::ConfigError;
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name prefix of identifier control fields.
pub const ID_PREFIX: &str = "_id";
/// Name prefix of timestamp control fields.
pub const TIME_PREFIX: &str = "_time";

const DEFAULT_TIMEZONE: &str = "Asia/Hong_Kong";
const DEFAULT_DATE_FORMAT: &str = "%Y/%m/%d";

/// Which document backend a config runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fetch once over HTTP and parse into an immutable tree.
    #[default]
    Static,
    /// Render in a browser tab and query the live page.
    #[serde(alias = "browser")]
    Live,
}

/// What happens to an item whose id controls do not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingIdPolicy {
    /// Emit the item without `external_id`.
    #[default]
    Keep,
    /// Leave the item out of the result.
    Drop,
}

/// A complete extractor configuration: routing info plus the schemas to run.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "ConfigSpec")]
pub struct ExtractorConfig {
    pub name: String,
    /// Routing pattern deciding which URLs this config applies to.
    pub pattern: Option<Regex>,
    pub example_url: Option<String>,
    pub mode: Mode,
    pub schemas: Vec<Schema>,
    /// Zone in which `_time` controls are interpreted.
    pub timezone: Tz,
    /// chrono format string for the joined `_time` value.
    pub date_format: String,
    pub missing_id: MissingIdPolicy,
}

impl ExtractorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&data)
    }

    /// Whether the routing pattern accepts `url`. No pattern accepts everything.
    pub fn matches(&self, url: &str) -> bool {
        self.pattern.as_ref().map_or(true, |re| re.is_match(url))
    }
}

#[derive(Deserialize)]
struct ConfigSpec {
    name: String,
    #[serde(default)]
    pattern: String,
    #[serde(default)]
    example_url: String,
    #[serde(default)]
    mode: Mode,
    #[serde(default)]
    schemas: Vec<Schema>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    date_format: Option<String>,
    #[serde(default)]
    missing_id: MissingIdPolicy,
}

impl TryFrom<ConfigSpec> for ExtractorConfig {
    type Error = ConfigError;

    fn try_from(spec: ConfigSpec) -> Result<Self, Self::Error> {
        let pattern = compile_optional(&spec.pattern)?;

        let zone = spec.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        let timezone: Tz = zone
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("unknown timezone {zone}: {e}")))?;

        let mut seen = std::collections::HashSet::new();
        for schema in &spec.schemas {
            if !seen.insert(schema.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate schema name: {}",
                    schema.name
                )));
            }
        }

        Ok(Self {
            name: spec.name,
            pattern,
            example_url: Some(spec.example_url).filter(|u| !u.is_empty()),
            mode: spec.mode,
            schemas: spec.schemas,
            timezone,
            date_format: spec
                .date_format
                .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string()),
            missing_id: spec.missing_id,
        })
    }
}

/// One kind of repeated item on a page.
#[derive(Debug, Clone, Deserialize)]
pub struct Schema {
    /// Unique key into the result mapping.
    pub name: String,
    #[serde(default)]
    pub entity_type: String,
    /// Enumerates candidate elements across the whole document.
    pub selector: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn info(&self) -> SchemaInfo {
        SchemaInfo {
            name: self.name.clone(),
            entity_type: self.entity_type.clone(),
        }
    }
}

/// Schema identity reported with its results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    pub entity_type: String,
}

/// How a field shapes its value.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Text,
    /// Value of the named attribute.
    Attribute(String),
    Nested(Vec<Field>),
    List(Vec<Field>),
    /// Accepted at load, fails at resolution.
    Unsupported(String),
}

impl FieldKind {
    pub fn is_nested(&self) -> bool {
        matches!(self, FieldKind::Nested(_))
    }
}

/// Which canonical value a control field feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Id,
    Time,
}

impl ControlKind {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.starts_with(ID_PREFIX) {
            Some(ControlKind::Id)
        } else if name.starts_with(TIME_PREFIX) {
            Some(ControlKind::Time)
        } else {
            None
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            ControlKind::Id => ID_PREFIX,
            ControlKind::Time => TIME_PREFIX,
        }
    }
}

/// Where a control field reads the text its pattern runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// The document's current URL.
    Url,
    /// Text of the element matched by the field's selector.
    Element,
}

/// Extra rules carried by `_id*` / `_time*` fields.
#[derive(Debug, Clone)]
pub struct Control {
    pub kind: ControlKind,
    pub source: Option<ValueSource>,
    pub pattern: Option<Regex>,
}

/// One named extraction rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "FieldSpec")]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub selector: String,
    pub control: Option<Control>,
}

impl Field {
    pub fn is_control(&self) -> bool {
        self.control.is_some()
    }

    /// A text field whose selector matches the context node itself.
    pub fn is_self_text(&self) -> bool {
        matches!(self.kind, FieldKind::Text) && crate::selector::is_self(&self.selector)
    }
}

#[derive(Deserialize)]
struct FieldSpec {
    name: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    selector: String,
    #[serde(default)]
    pattern: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    attribute: String,
    #[serde(default)]
    fields: Vec<Field>,
}

impl TryFrom<FieldSpec> for Field {
    type Error = ConfigError;

    fn try_from(spec: FieldSpec) -> Result<Self, Self::Error> {
        let name = spec.name;
        let kind = match spec.kind.as_str() {
            "text" => FieldKind::Text,
            "attribute" => {
                if spec.attribute.is_empty() {
                    return Err(ConfigError::field(&name, "attribute fields need `attribute`"));
                }
                FieldKind::Attribute(spec.attribute)
            }
            "nested" | "list" => {
                if spec.fields.is_empty() {
                    return Err(ConfigError::field(
                        &name,
                        format!("{} fields need sub-fields", spec.kind),
                    ));
                }
                if spec.kind == "nested" {
                    FieldKind::Nested(spec.fields)
                } else {
                    FieldKind::List(spec.fields)
                }
            }
            other => FieldKind::Unsupported(other.to_string()),
        };

        let control = match ControlKind::from_name(&name) {
            Some(control_kind) => Some(compile_control(
                &name,
                control_kind,
                &kind,
                &spec.from,
                &spec.pattern,
                &spec.selector,
            )?),
            None => None,
        };

        // Control values only reach normalization from the item level.
        if control.is_none() {
            if let FieldKind::Nested(sub_fields) | FieldKind::List(sub_fields) = &kind {
                if let Some(inner) = sub_fields.iter().find(|f| f.is_control()) {
                    return Err(ConfigError::field(
                        &name,
                        format!(
                            "control field {} must sit at item level or inside a control field",
                            inner.name
                        ),
                    ));
                }
            }
        }

        // Nested controls resolve their sub-fields against the current context.
        let needs_selector = match &control {
            None => !matches!(kind, FieldKind::Unsupported(_)),
            Some(c) => c.source.is_none() && !matches!(kind, FieldKind::Nested(_)),
        };
        if needs_selector && spec.selector.trim().is_empty() {
            return Err(ConfigError::field(&name, "missing selector"));
        }

        Ok(Self {
            name,
            kind,
            selector: spec.selector,
            control,
        })
    }
}

fn compile_control(
    name: &str,
    kind: ControlKind,
    field_kind: &FieldKind,
    from: &str,
    pattern: &str,
    selector: &str,
) -> Result<Control, ConfigError> {
    let source = match from {
        "url" => Some(ValueSource::Url),
        "element" => Some(ValueSource::Element),
        "" => None,
        other => return Err(ConfigError::field(name, format!("unsupported from: {other}"))),
    };
    let pattern = compile_optional(pattern)?;

    if source.is_some() && pattern.is_none() {
        return Err(ConfigError::field(name, "control fields with `from` need `pattern`"));
    }
    if source.is_none() && matches!(field_kind, FieldKind::Unsupported(_)) {
        return Err(ConfigError::field(
            name,
            "control fields need `from` and `pattern`, or a field type",
        ));
    }
    if source == Some(ValueSource::Element) && selector.trim().is_empty() {
        return Err(ConfigError::field(name, "`from: element` needs a selector"));
    }

    Ok(Control {
        kind,
        source,
        pattern,
    })
}

fn compile_optional(pattern: &str) -> Result<Option<Regex>, ConfigError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|source| ConfigError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn horse_config() -> serde_json::Value {
        json!({
            "name": "horse",
            "pattern": "Horse\\.aspx",
            "example_url": "https://racing.example.com/Horse.aspx?HorseId=HK_2021_G372",
            "schemas": [{
                "name": "horse",
                "entity_type": "horse",
                "selector": "//table.horseProfile",
                "fields": [
                    { "name": "_id", "from": "url", "pattern": "HorseId=(\\w+)" },
                    { "name": "name", "type": "text", "selector": "td.name" },
                    { "name": "photo", "type": "attribute", "selector": "img", "attribute": "src" },
                    { "name": "owners", "type": "list", "selector": "li.owner",
                      "fields": [{ "name": "owner", "type": "text", "selector": "." }] }
                ]
            }]
        })
    }

    #[test]
    fn test_loads_defaults() {
        let config: ExtractorConfig = serde_json::from_value(horse_config()).unwrap();
        assert_eq!(config.mode, Mode::Static);
        assert_eq!(config.timezone, chrono_tz::Asia::Hong_Kong);
        assert_eq!(config.date_format, "%Y/%m/%d");
        assert_eq!(config.missing_id, MissingIdPolicy::Keep);
        assert_eq!(config.schemas.len(), 1);

        let fields = &config.schemas[0].fields;
        assert!(fields[0].is_control());
        assert_eq!(fields[0].control.as_ref().unwrap().source, Some(ValueSource::Url));
        assert!(matches!(fields[2].kind, FieldKind::Attribute(ref a) if a == "src"));
        match &fields[3].kind {
            FieldKind::List(sub) => assert!(sub[0].is_self_text()),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_routing_pattern() {
        let config: ExtractorConfig = serde_json::from_value(horse_config()).unwrap();
        assert!(config.matches("https://racing.example.com/Horse.aspx?HorseId=1"));
        assert!(!config.matches("https://racing.example.com/Jockey.aspx"));
    }

    #[test]
    fn test_browser_mode_alias() {
        let mut value = horse_config();
        value["mode"] = json!("browser");
        let config: ExtractorConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.mode, Mode::Live);
    }

    #[test]
    fn test_attribute_requires_name() {
        let err = serde_json::from_value::<Field>(json!({
            "name": "photo", "type": "attribute", "selector": "img"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("attribute"));
    }

    #[test]
    fn test_control_requires_source() {
        let err = serde_json::from_value::<Field>(json!({
            "name": "_time", "selector": "td"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("from"));

        let typed: Field = serde_json::from_value(json!({
            "name": "_id_a", "type": "text", "selector": "td.code"
        }))
        .unwrap();
        assert!(typed.is_control());
        assert!(typed.control.unwrap().source.is_none());
    }

    #[test]
    fn test_nested_control_without_source_is_allowed() {
        let field: Field = serde_json::from_value(json!({
            "name": "_id", "type": "nested",
            "fields": [
                { "name": "_id_a", "from": "element", "selector": "td.code", "pattern": "(\\w+)" }
            ]
        }))
        .unwrap();
        let control = field.control.unwrap();
        assert_eq!(control.kind, ControlKind::Id);
        assert!(control.source.is_none());
    }

    #[test]
    fn test_control_inside_plain_aggregate_rejected() {
        for kind in ["nested", "list"] {
            let err = serde_json::from_value::<Field>(json!({
                "name": "runs", "type": kind, "selector": "tr.run",
                "fields": [
                    { "name": "venue", "type": "text", "selector": "td.venue" },
                    { "name": "_time_d", "type": "text", "selector": "td.date" }
                ]
            }))
            .unwrap_err();
            assert!(err.to_string().contains("_time_d"), "{kind}: {err}");
        }
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = serde_json::from_value::<Field>(json!({
            "name": "_id", "from": "url", "pattern": "(unclosed"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));
    }

    #[test]
    fn test_unknown_kind_is_deferred() {
        let field: Field = serde_json::from_value(json!({
            "name": "blob", "type": "html", "selector": "div"
        }))
        .unwrap();
        assert!(matches!(field.kind, FieldKind::Unsupported(ref k) if k == "html"));
    }

    #[test]
    fn test_duplicate_schema_names_rejected() {
        let mut value = horse_config();
        let schema = value["schemas"][0].clone();
        value["schemas"].as_array_mut().unwrap().push(schema);
        assert!(serde_json::from_value::<ExtractorConfig>(value).is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("horse.json");
        std::fs::write(&path, horse_config().to_string()).unwrap();
        let config = ExtractorConfig::from_path(&path).unwrap();
        assert_eq!(config.name, "horse");

        let missing = ExtractorConfig::from_path(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
