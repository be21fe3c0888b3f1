use cardwise_types::{Filter, FilterOp, Payload, compare_values, parse_timestamp};
use serde_json::json;
use std::cmp::Ordering;

fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap()
}

#[test]
fn equality_on_strings() {
    let tx = payload(json!({ "cardId": "visa" }));
    assert!(Filter::equals("cardId", "visa").matches(&tx));
    assert!(!Filter::equals("cardId", "amex").matches(&tx));
    assert!(Filter::new("cardId", FilterOp::Ne, "amex").matches(&tx));
}

#[test]
fn missing_field_never_matches() {
    let tx = payload(json!({ "cardId": "visa" }));
    assert!(!Filter::new("amountSpent", FilterOp::Ne, 5).matches(&tx));
    assert!(!Filter::new("amountSpent", FilterOp::Gt, 5).matches(&tx));
}

#[test]
fn numeric_ordering() {
    let tx = payload(json!({ "amountSpent": 12.5 }));
    assert!(Filter::new("amountSpent", FilterOp::Gt, 12).matches(&tx));
    assert!(Filter::new("amountSpent", FilterOp::Le, 12.5).matches(&tx));
    assert!(!Filter::new("amountSpent", FilterOp::Lt, 12.5).matches(&tx));
}

#[test]
fn nested_field_lookup() {
    let tx = payload(json!({ "storeInfo": { "storeType": "grocery" } }));
    assert!(Filter::equals("storeInfo.storeType", "grocery").matches(&tx));
}

#[test]
fn timestamps_compare_as_instants() {
    let tx = payload(json!({ "dateAdded": "2025-03-01T10:00:00+02:00" }));
    assert!(Filter::new("dateAdded", FilterOp::Gt, "2025-03-01T07:59:59Z").matches(&tx));
    assert!(Filter::new("dateAdded", FilterOp::Lt, "2025-03-01T08:00:01Z").matches(&tx));
}

#[test]
fn timestamp_string_against_millis() {
    let millis = parse_timestamp(&json!("2025-01-01T00:00:00Z"))
        .unwrap()
        .timestamp_millis();
    assert_eq!(
        compare_values(&json!("2025-01-01T00:00:01Z"), &json!(millis)),
        Some(Ordering::Greater)
    );
}

#[test]
fn filters_are_anded() {
    let tx = payload(json!({ "cardId": "visa", "amountSpent": 40 }));
    let filters = vec![
        Filter::equals("cardId", "visa"),
        Filter::new("amountSpent", FilterOp::Ge, 50),
    ];
    assert!(!Filter::all_match(&filters, &tx));
    assert!(Filter::all_match(&filters[..1], &tx));
}

#[test]
fn operator_parse_and_serde() {
    assert_eq!(">=".parse::<FilterOp>().unwrap(), FilterOp::Ge);
    assert!("~=".parse::<FilterOp>().is_err());
    let filter = Filter::equals("cardId", "visa");
    let json = serde_json::to_value(&filter).unwrap();
    assert_eq!(json, json!({ "field": "cardId", "op": "==", "value": "visa" }));
}
