use cardwise_storage::LocalStore;
use cardwise_sync::{Backend, BackendError, CardRank, Ledger, StoreInfo, category_for_store_type};
use cardwise_types::{Payload, timestamp_value};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;

fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap()
}

fn ledger() -> Ledger {
    let backend = Backend::new(LocalStore::open_in_memory().unwrap());
    backend.sign_in("u1").unwrap();
    Ledger::new(backend)
}

fn store(store_type: &str) -> StoreInfo {
    StoreInfo {
        store_name: "Corner".into(),
        address: "1 Main St".into(),
        store_type: store_type.into(),
    }
}

fn seed_catalog(ledger: &Ledger) {
    let backend = ledger.backend();
    backend
        .db_set(
            "cards.amex",
            &payload(json!({ "rewards": { "dining": 4, "others": 1 }, "conversion": 1.5 })),
            false,
        )
        .unwrap();
    backend
        .db_set(
            "cards.visa",
            &payload(json!({ "rewards": { "gas": 3, "others": 2 }, "conversion": 1 })),
            false,
        )
        .unwrap();
    backend
        .db_set("cards.plain", &payload(json!({ "rewards": { "travel": 5 } })), false)
        .unwrap();
}

// ── Categories ───────────────────────────────────────────────────

#[test]
fn store_types_map_to_categories() {
    assert_eq!(category_for_store_type("Restaurant"), "dining");
    assert_eq!(category_for_store_type("Supermarket"), "grocery");
    assert_eq!(category_for_store_type("Drugstore"), "drugstore");
    assert_eq!(category_for_store_type("Gas station"), "gas");
    assert_eq!(category_for_store_type("hardware store"), "homeImprovement");
    assert_eq!(category_for_store_type("Zoo"), "travel");
    assert_eq!(category_for_store_type("Bowling alley"), "others");
    assert_eq!(category_for_store_type(""), "others");
}

// ── User ─────────────────────────────────────────────────────────

#[test]
fn ensure_user_is_idempotent() {
    let ledger = ledger();
    assert_eq!(ledger.ensure_user().unwrap(), "u1");
    let first = ledger.backend().db_get_document("users.u1").unwrap().unwrap();
    assert!(first.contains_key("dateCreated"));

    ledger.ensure_user().unwrap();
    let second = ledger.backend().db_get_document("users.u1").unwrap().unwrap();
    assert_eq!(first, second);
}

#[test]
fn ledger_requires_sign_in() {
    let ledger = ledger();
    ledger.backend().sign_out().unwrap();
    assert!(matches!(ledger.ensure_user(), Err(BackendError::NotSignedIn)));
    assert!(matches!(ledger.cards(), Err(BackendError::NotSignedIn)));
}

// ── Cards ────────────────────────────────────────────────────────

#[test]
fn saved_card_is_listed_with_doc_id() {
    let ledger = ledger();
    let doc_id = ledger.save_card_to_user("amex").unwrap();

    let cards = ledger.cards().unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].card_id, "amex");
    assert_eq!(cards[0].doc_id, doc_id);

    let stored = ledger
        .backend()
        .db_get_document(&format!("users.u1.cards.{doc_id}"))
        .unwrap()
        .unwrap();
    assert_eq!(stored["docId"], doc_id.as_str());
    assert!(stored["transactions"].is_null());
}

#[test]
fn card_doc_id_lookup() {
    let ledger = ledger();
    let doc_id = ledger.save_card_to_user("visa").unwrap();
    assert_eq!(ledger.card_doc_id("visa").unwrap(), Some(doc_id));
    assert_eq!(ledger.card_doc_id("amex").unwrap(), None);
}

#[test]
fn delete_card_cascades_to_its_transactions() {
    let ledger = ledger();
    let amex = ledger.save_card_to_user("amex").unwrap();
    ledger.save_card_to_user("visa").unwrap();
    ledger.save_transaction("amex", &store("Cafe"), 4.5).unwrap();
    ledger.save_transaction("amex", &store("Bar"), 12.0).unwrap();
    ledger.save_transaction("visa", &store("Gas station"), 40.0).unwrap();

    assert_eq!(ledger.delete_card("amex", &amex).unwrap(), 2);

    let cards = ledger.cards().unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].card_id, "visa");
    let remaining = ledger.transactions().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].card_id, "visa");
}

// ── Transactions ─────────────────────────────────────────────────

#[test]
fn saved_transaction_round_trips() {
    let ledger = ledger();
    let doc_id = ledger.save_transaction("amex", &store("Restaurant"), 23.25).unwrap();

    let transactions = ledger.transactions().unwrap();
    assert_eq!(transactions.len(), 1);
    let transaction = &transactions[0];
    assert_eq!(transaction.doc_id, doc_id);
    assert_eq!(transaction.store_info, store("Restaurant"));
    assert_eq!(transaction.amount_spent, 23.25);
    assert!(transaction.date_added.is_some());
    assert_eq!(transaction.category(), "dining");
}

#[test]
fn transactions_for_card_filters_by_card() {
    let ledger = ledger();
    ledger.save_transaction("amex", &store("Cafe"), 1.0).unwrap();
    ledger.save_transaction("visa", &store("Cafe"), 2.0).unwrap();
    ledger.save_transaction("amex", &store("Cafe"), 3.0).unwrap();

    let mut amounts: Vec<f64> = ledger
        .transactions_for_card("amex")
        .unwrap()
        .into_iter()
        .map(|t| t.amount_spent)
        .collect();
    amounts.sort_by(f64::total_cmp);
    assert_eq!(amounts, vec![1.0, 3.0]);
}

#[test]
fn transactions_between_is_exclusive() {
    let ledger = ledger();
    let days = [1, 10, 20];
    for day in days {
        let doc_id = ledger.save_transaction("amex", &store("Cafe"), day as f64).unwrap();
        let date = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        ledger
            .edit_transaction(&doc_id, &payload(json!({ "dateAdded": timestamp_value(date) })))
            .unwrap();
    }

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
    let found = ledger.transactions_between(start, end).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].amount_spent, 10.0);
}

#[test]
fn edit_and_delete_transaction() {
    let ledger = ledger();
    let doc_id = ledger.save_transaction("amex", &store("Cafe"), 5.0).unwrap();

    ledger
        .edit_transaction(&doc_id, &payload(json!({ "amountSpent": 7.5 })))
        .unwrap();
    let transactions = ledger.transactions().unwrap();
    assert_eq!(transactions[0].amount_spent, 7.5);
    assert_eq!(transactions[0].store_info.store_type, "Cafe");

    ledger.delete_transaction(&doc_id).unwrap();
    assert!(ledger.transactions().unwrap().is_empty());
}

#[test]
fn malformed_transaction_is_invalid_data() {
    let ledger = ledger();
    ledger
        .backend()
        .db_add("users.u1.transactions", &payload(json!({ "amountSpent": 3 })))
        .unwrap();
    assert!(matches!(
        ledger.transactions(),
        Err(BackendError::InvalidData(_))
    ));
}

// ── Rewards ──────────────────────────────────────────────────────

#[test]
fn rewards_apply_conversion() {
    let ledger = ledger();
    seed_catalog(&ledger);

    let rewards = ledger.rewards("amex").unwrap().unwrap();
    let expected: BTreeMap<String, f64> =
        [("dining".to_string(), 6.0), ("others".to_string(), 1.5)].into();
    assert_eq!(rewards, expected);
}

#[test]
fn rewards_missing_card_or_conversion() {
    let ledger = ledger();
    seed_catalog(&ledger);
    assert_eq!(ledger.rewards("unknown").unwrap(), None);
    assert_eq!(ledger.rewards("plain").unwrap(), None);
}

#[test]
fn ranking_uses_category_then_fallback() {
    let ledger = ledger();
    seed_catalog(&ledger);
    for card in ["visa", "amex", "plain"] {
        ledger.save_card_to_user(card).unwrap();
    }

    let dining = ledger.rank_cards_for_category("Restaurant").unwrap();
    assert_eq!(
        dining,
        vec![
            CardRank { card_id: "amex".into(), reward: 6.0 },
            CardRank { card_id: "visa".into(), reward: 2.0 },
            CardRank { card_id: "plain".into(), reward: 0.0 },
        ]
    );

    let gas = ledger.rank_cards_for_category("Gas station").unwrap();
    assert_eq!(gas[0].card_id, "visa");
    assert_eq!(gas[0].reward, 3.0);
    assert_eq!(gas[1].card_id, "amex");
    assert_eq!(gas[1].reward, 1.5);
}

#[test]
fn ranking_without_cards_is_empty() {
    let ledger = ledger();
    seed_catalog(&ledger);
    assert!(ledger.rank_cards_for_category("Cafe").unwrap().is_empty());
}

#[test]
fn spending_groups_by_category() {
    let ledger = ledger();
    ledger.save_transaction("amex", &store("Cafe"), 4.0).unwrap();
    ledger.save_transaction("amex", &store("Bar"), 6.0).unwrap();
    ledger.save_transaction("visa", &store("Gas station"), 30.0).unwrap();
    ledger.save_transaction("visa", &store("Bowling alley"), 12.0).unwrap();

    let totals = ledger.spending_by_category().unwrap();
    let expected: BTreeMap<String, f64> = [
        ("dining".to_string(), 10.0),
        ("gas".to_string(), 30.0),
        ("others".to_string(), 12.0),
    ]
    .into();
    assert_eq!(totals, expected);
}
