//! Turns raw items into their public form.
//!
//! Control values are folded into `external_id` and `external_time` and then
//! dropped; regular fields pass through untouched.

use crate::item::{ExtractedItem, FieldValue, RawItem, Record};
use crate::schema::{ExtractorConfig, MissingIdPolicy, ID_PREFIX, TIME_PREFIX};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::debug;

const ID_SEPARATOR: &str = "_";
const TIME_SEPARATOR: &str = "/";

/// Source of "now" for items whose time controls do not resolve.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub struct Normalizer {
    timezone: Tz,
    date_format: String,
    missing_id: MissingIdPolicy,
    clock: Arc<dyn Clock>,
}

impl Normalizer {
    pub fn new(config: &ExtractorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            timezone: config.timezone,
            date_format: config.date_format.clone(),
            missing_id: config.missing_id,
            clock,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Normalize one item. Returns `None` only when the item has no id and
    /// the policy is [`MissingIdPolicy::Drop`].
    pub fn normalize(&self, raw: RawItem) -> Option<ExtractedItem> {
        let external_id = compose_id(&raw.controls);
        if external_id.is_none() && self.missing_id == MissingIdPolicy::Drop {
            debug!("dropping item without external id");
            return None;
        }

        let external_time = self
            .compose_time(&raw.controls)
            .unwrap_or_else(|| fixed(self.clock.now().with_timezone(&self.timezone)));

        Some(ExtractedItem {
            external_id,
            external_time,
            fields: raw.fields,
        })
    }

    fn compose_time(&self, controls: &Record) -> Option<DateTime<FixedOffset>> {
        let mut parts = control_parts(controls, TIME_PREFIX);
        if parts.is_empty() {
            return None;
        }
        let joined = join(&parts, TIME_SEPARATOR);
        if let Some(time) = self.parse_time(&joined) {
            return Some(time);
        }

        // Components named after calendar units (`_time_y`, `_time_m`, ...)
        // sort out of calendar order, so retry most significant first.
        parts.sort_by_key(|(key, _)| calendar_rank(key));
        let reordered = join(&parts, TIME_SEPARATOR);
        if reordered != joined {
            if let Some(time) = self.parse_time(&reordered) {
                return Some(time);
            }
        }
        debug!(value = %joined, format = %self.date_format, "unparsable time control");
        None
    }

    /// Interpret `value` with the configured format in the configured zone.
    /// Date-only formats resolve to local midnight.
    pub fn parse_time(&self, value: &str) -> Option<DateTime<FixedOffset>> {
        let value = value.trim();
        let naive = NaiveDateTime::parse_from_str(value, &self.date_format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, &self.date_format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })?;
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(fixed)
    }
}

fn fixed(time: DateTime<Tz>) -> DateTime<FixedOffset> {
    time.with_timezone(&time.offset().fix())
}

/// Compose the identifier from `_id*` controls: sorted by key, joined with
/// `_`, uppercased. An empty result counts as absent.
pub fn compose_id(controls: &Record) -> Option<String> {
    let parts = control_parts(controls, ID_PREFIX);
    Some(join(&parts, ID_SEPARATOR).to_uppercase()).filter(|id| !id.is_empty())
}

/// Collect `(key, value)` string pairs under `prefix`, sorted by key.
///
/// Plain string controls contribute themselves; nested mappings contribute
/// their own prefixed string entries.
fn control_parts<'r>(controls: &'r Record, prefix: &str) -> Vec<(&'r str, &'r str)> {
    let mut parts = Vec::new();
    for (key, value) in controls.range(prefix.to_string()..) {
        if !key.starts_with(prefix) {
            break;
        }
        match value {
            FieldValue::Text(text) => parts.push((key.as_str(), text.as_str())),
            FieldValue::Object(record) => parts.extend(
                record
                    .iter()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .filter_map(|(k, v)| v.as_text().map(|t| (k.as_str(), t))),
            ),
            _ => {}
        }
    }
    parts.sort_by(|a, b| a.0.cmp(b.0));
    parts
}

fn join(parts: &[(&str, &str)], separator: &str) -> String {
    parts
        .iter()
        .map(|(_, value)| *value)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Rank of a time component by its key suffix; unknown suffixes sort last.
fn calendar_rank(key: &str) -> u8 {
    let suffix = key
        .trim_start_matches(TIME_PREFIX)
        .trim_start_matches('_')
        .to_ascii_lowercase();
    match suffix.as_str() {
        "y" | "yy" | "yyyy" | "year" => 0,
        "m" | "mm" | "mon" | "month" => 1,
        "d" | "dd" | "day" => 2,
        "h" | "hh" | "hour" => 3,
        "mi" | "min" | "minute" => 4,
        "s" | "ss" | "sec" | "second" => 5,
        _ => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(extra: serde_json::Value) -> ExtractorConfig {
        let mut value = json!({ "name": "t", "schemas": [] });
        if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(value).unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 4, 30, 0).unwrap()
    }

    fn normalizer(extra: serde_json::Value) -> Normalizer {
        Normalizer::new(&config(extra), Arc::new(FixedClock(fixed_now())))
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn raw(controls: &[(&str, FieldValue)]) -> RawItem {
        let mut item = RawItem::default();
        item.fields.insert("name".into(), text("Golden Sixty"));
        for (k, v) in controls {
            item.controls.insert(k.to_string(), v.clone());
        }
        item
    }

    #[test]
    fn test_id_composition_is_order_independent() {
        let forward = raw(&[("_id_a", text("h1901")), ("_id_b", text("02"))]);
        let backward = raw(&[("_id_b", text("02")), ("_id_a", text("h1901"))]);
        let n = normalizer(json!({}));
        assert_eq!(
            n.normalize(forward).unwrap().external_id.as_deref(),
            Some("H1901_02")
        );
        assert_eq!(
            n.normalize(backward).unwrap().external_id.as_deref(),
            Some("H1901_02")
        );
    }

    #[test]
    fn test_id_from_nested_control() {
        let mut nested = Record::new();
        nested.insert("_id_b".into(), text("02"));
        nested.insert("_id_a".into(), text("h1901"));
        nested.insert("label".into(), text("ignored"));
        let item = normalizer(json!({}))
            .normalize(raw(&[("_id", FieldValue::Object(nested))]))
            .unwrap();
        assert_eq!(item.external_id.as_deref(), Some("H1901_02"));
        assert!(!item.fields.contains_key("_id"));
        assert_eq!(item.fields["name"], text("Golden Sixty"));
    }

    #[test]
    fn test_time_from_calendar_parts() {
        let item = normalizer(json!({}))
            .normalize(raw(&[
                ("_time_y", text("2024")),
                ("_time_m", text("03")),
                ("_time_d", text("05")),
            ]))
            .unwrap();
        assert_eq!(item.external_time.to_rfc3339(), "2024-03-05T00:00:00+08:00");
    }

    #[test]
    fn test_time_from_single_control_in_zone() {
        let item = normalizer(json!({ "timezone": "Europe/London" }))
            .normalize(raw(&[("_time", text("2024/07/01"))]))
            .unwrap();
        assert_eq!(item.external_time.to_rfc3339(), "2024-07-01T00:00:00+01:00");
    }

    #[test]
    fn test_time_falls_back_to_clock() {
        let n = normalizer(json!({}));
        let expected = "2025-06-01T12:30:00+08:00";

        let absent = n.normalize(raw(&[])).unwrap();
        assert_eq!(absent.external_time.to_rfc3339(), expected);

        let garbage = n.normalize(raw(&[("_time", text("next tuesday"))])).unwrap();
        assert_eq!(garbage.external_time.to_rfc3339(), expected);
    }

    #[test]
    fn test_missing_id_policy() {
        let keep = normalizer(json!({})).normalize(raw(&[])).unwrap();
        assert!(keep.external_id.is_none());

        let drop = normalizer(json!({ "missing_id": "drop" }));
        assert!(drop.normalize(raw(&[])).is_none());
        assert!(drop.normalize(raw(&[("_id", text(""))])).is_none());
        assert!(drop.normalize(raw(&[("_id", text("x1"))])).is_some());
    }

    #[test]
    fn test_datetime_format() {
        let n = normalizer(json!({ "date_format": "%d/%m/%Y %H:%M" }));
        let time = n.parse_time("05/03/2024 14:45").unwrap();
        assert_eq!(time.to_rfc3339(), "2024-03-05T14:45:00+08:00");
        assert!(n.parse_time("2024/03/05").is_none());
    }
}
