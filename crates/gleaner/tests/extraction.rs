//! End-to-end extraction against a static document.

mod common;

use assert_json_diff::assert_json_eq;
use common::*;
use gleaner::{FieldValue, StaticDocument};
use serde_json::json;

#[tokio::test]
async fn test_runner_items() {
    let extractor = offline_extractor(config_from(results_config()));
    let doc = StaticDocument::from_html(RESULTS_PAGE, RESULTS_URL);
    let result = extractor.extract_document(&doc).await;

    assert_eq!(result.final_url, RESULTS_URL);
    let runners = result.items("runners");
    assert_eq!(runners.len(), 3);

    assert_json_eq!(
        serde_json::to_value(&runners[0]).unwrap(),
        json!({
            "external_id": "H190_1",
            "external_time": "2024-03-05T00:00:00+08:00",
            "horse": "Golden Sixty",
            "link": "/horse?id=HK_2019_H190",
            "last_column": "2024/03/05"
        })
    );

    // Only the position resolves for the id, and the date is unparsable.
    assert_json_eq!(
        serde_json::to_value(&runners[2]).unwrap(),
        json!({
            "external_id": "3",
            "external_time": CLOCK_RFC3339,
            "horse": "Beauty Joy",
            "last_column": "TBC"
        })
    );
}

#[tokio::test]
async fn test_list_collapses_to_strings() {
    let extractor = offline_extractor(config_from(results_config()));
    let doc = StaticDocument::from_html(RESULTS_PAGE, RESULTS_URL);
    let result = extractor.extract_document(&doc).await;

    let tips = result.items("tips");
    assert_eq!(tips.len(), 1);
    assert_eq!(
        tips[0].fields["horses"],
        FieldValue::TextList(vec![
            "Golden Sixty".into(),
            "Beauty Joy".into(),
            "Lucky Sweynesse".into()
        ])
    );
    assert!(tips[0].external_id.is_none());
    assert_eq!(tips[0].external_time.to_rfc3339(), CLOCK_RFC3339);
}

#[tokio::test]
async fn test_errors_are_collected_not_fatal() {
    let extractor = offline_extractor(config_from(results_config()));
    let doc = StaticDocument::from_html(RESULTS_PAGE, RESULTS_URL);
    let result = extractor.extract_document(&doc).await;

    let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["sire", "sire", "_time", "link", "sire", "trials"]);
    assert!(result.errors.iter().all(|e| e.url == RESULTS_URL));

    // A schema whose root matches nothing is reported once and stays empty.
    assert!(result.items("trials").is_empty());
    assert!(result.schemas.contains_key("trials"));
    let trials_error = result.errors.last().unwrap();
    assert!(trials_error.message.contains("//table.trials tr"));

    // Control fields never leak into items.
    for item in result.items("runners") {
        assert!(item.fields.keys().all(|k| !k.starts_with('_')));
        assert!(!item.fields.contains_key("sire"));
    }
}

#[tokio::test]
async fn test_partial_failure_keeps_item() {
    let config = config_from(json!({
        "name": "partial",
        "schemas": [{
            "name": "rows",
            "selector": "tr.runner",
            "fields": [
                { "name": "a", "type": "text", "selector": "td.jockey" },
                { "name": "b", "type": "text", "selector": "td.trainer" }
            ]
        }]
    }));
    let extractor = offline_extractor(config);
    let doc = StaticDocument::from_html(
        r#"<table><tr class="runner"><td class="jockey">V Ho</td></tr></table>"#,
        "https://example.com/one",
    );
    let result = extractor.extract_document(&doc).await;

    let rows = result.items("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields.len(), 1);
    assert_eq!(rows[0].fields["a"], FieldValue::Text("V Ho".into()));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].field, "b");
}

#[tokio::test]
async fn test_repeated_extraction_is_identical() {
    let extractor = offline_extractor(config_from(results_config()));
    let doc = StaticDocument::from_html(RESULTS_PAGE, RESULTS_URL);

    let first = serde_json::to_string(&extractor.extract_document(&doc).await).unwrap();
    let second = serde_json::to_string(&extractor.extract_document(&doc).await).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_drop_policy_removes_items_without_id() {
    let mut config = results_config();
    config["missing_id"] = json!("drop");
    let extractor = offline_extractor(config_from(config));
    let doc = StaticDocument::from_html(RESULTS_PAGE, RESULTS_URL);
    let result = extractor.extract_document(&doc).await;

    assert_eq!(result.items("runners").len(), 3);
    assert!(result.items("tips").is_empty());
}

#[tokio::test]
async fn test_unbalanced_root_selector_is_schema_error() {
    let config = config_from(json!({
        "name": "broken",
        "schemas": [
            { "name": "bad", "selector": "tr:nth-child(count(th)", "fields": [] },
            { "name": "good", "selector": "tr.runner", "fields": [
                { "name": "pl", "type": "text", "selector": "td.pl" }
            ]}
        ]
    }));
    let extractor = offline_extractor(config);
    let doc = StaticDocument::from_html(RESULTS_PAGE, RESULTS_URL);
    let result = extractor.extract_document(&doc).await;

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].field, "bad");
    assert!(result.errors[0].message.contains("unbalanced"));
    assert_eq!(result.items("good").len(), 3);
}
