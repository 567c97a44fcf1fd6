//! Shared fixtures: a race-results page and a config that exercises every
//! field kind against it.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use gleaner::{Backend, Extractor, ExtractorConfig, FixedClock, HttpFetcher};
use serde_json::json;
use std::sync::Arc;

pub const RESULTS_URL: &str = "https://racing.example.com/results?date=2024-03-05";

pub const RESULTS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Results</title><script>window.tracking = true;</script></head>
<body>
  <table class="results">
    <tr class="header"><th>Pl</th><th>Horse</th><th>Jockey</th><th>Date</th></tr>
    <tr class="runner" data-code="h190">
      <td class="pl">1</td>
      <td class="horse"><a href="/horse?id=HK_2019_H190">Golden   Sixty</a></td>
      <td class="jockey">V Ho</td>
      <td class="date">2024/03/05</td>
    </tr>
    <tr class="runner" data-code="j201">
      <td class="pl">2</td>
      <td class="horse"><a href="/horse?id=HK_2020_J201">Romantic Warrior</a></td>
      <td class="jockey">J McDonald</td>
      <td class="date">2024/03/06</td>
    </tr>
    <tr class="runner">
      <td class="pl">3</td>
      <td class="horse">Beauty Joy</td>
      <td class="jockey">Z Purton</td>
      <td class="date">TBC</td>
    </tr>
  </table>
  <ul class="tips"><li>Golden Sixty</li><li>Beauty Joy</li><li>Lucky Sweynesse</li></ul>
</body>
</html>"#;

pub fn results_config() -> serde_json::Value {
    json!({
        "name": "results",
        "pattern": "racing\\.example\\.com/results",
        "example_url": RESULTS_URL,
        "schemas": [
            {
                "name": "runners",
                "entity_type": "runner",
                "selector": "//table.results tr.runner",
                "fields": [
                    { "name": "_id", "type": "nested", "fields": [
                        { "name": "_id_a", "type": "attribute", "selector": ".", "attribute": "data-code" },
                        { "name": "_id_b", "type": "text", "selector": "td.pl" }
                    ]},
                    { "name": "_time", "from": "element", "selector": "td.date",
                      "pattern": "(\\d{4})/(\\d{2})/(\\d{2})" },
                    { "name": "horse", "type": "text", "selector": "td.horse" },
                    { "name": "link", "type": "attribute", "selector": "td.horse a", "attribute": "href" },
                    { "name": "last_column", "type": "text",
                      "selector": "td:nth-child(count(//tr.header th))" },
                    { "name": "sire", "type": "text", "selector": "td.sire" }
                ]
            },
            {
                "name": "tips",
                "entity_type": "tip",
                "selector": "//ul.tips",
                "fields": [
                    { "name": "horses", "type": "list", "selector": "li",
                      "fields": [{ "name": "horse", "type": "text", "selector": "." }] }
                ]
            },
            {
                "name": "trials",
                "entity_type": "trial",
                "selector": "//table.trials tr",
                "fields": [{ "name": "horse", "type": "text", "selector": "td.horse" }]
            }
        ]
    })
}

pub fn config_from(value: serde_json::Value) -> Arc<ExtractorConfig> {
    Arc::new(serde_json::from_value(value).expect("fixture config is valid"))
}

/// 2025-06-01 12:30 in Hong Kong.
pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 4, 30, 0).unwrap()))
}

pub const CLOCK_RFC3339: &str = "2025-06-01T12:30:00+08:00";

/// An extractor for running against documents built by the test itself.
pub fn offline_extractor(config: Arc<ExtractorConfig>) -> Extractor {
    Extractor::new(config, Backend::Static(Arc::new(HttpFetcher::default()))).with_clock(clock())
}
