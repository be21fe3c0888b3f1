//! Account-scoped domain operations: the user record, owned cards,
//! transactions, reward lookups and spending summaries.
//!
//! Layout under the signed-in account:
//! - `users.<uid>`: the user record
//! - `users.<uid>.cards.<docId>`: an owned card, referencing the catalog
//! - `users.<uid>.transactions.<docId>`: a purchase made with an owned card
//! - `cards.<cardId>`: catalog row with `rewards` per category and a
//!   `conversion` factor

use crate::backend::{Backend, DOC_ID_FIELD};
use crate::error::{BackendError, BackendResult};
use cardwise_types::{Filter, FilterOp, Payload, parse_timestamp, timestamp_value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::debug;

/// Category used when a store type maps to nothing more specific.
pub const FALLBACK_CATEGORY: &str = "others";

const DINING: &[&str] = &["Bar", "Cafe", "Meal delivery", "Meal takeaway", "Restaurant"];
const GROCERY: &[&str] = &["Bakery", "Liquor Store", "Supermarket", "Grocery or supermarket"];
const DRUGSTORE: &[&str] = &["Drugstore"];
const GAS: &[&str] = &["Gas station"];
const HOME_IMPROVEMENT: &[&str] = &[
    "Furniture store",
    "Home goods store",
    "electrician",
    "hardware store",
    "Plumber",
    "Roofing contractor",
];
const TRAVEL: &[&str] = &[
    "Airport",
    "Amusement park",
    "Aquarium",
    "Art gallery",
    "Car rental",
    "Light rail station",
    "Parking",
    "Tourist attraction",
    "Transit station",
    "Travel agency",
    "Zoo",
];

/// Maps a merchant's store type to a reward category.
pub fn category_for_store_type(store_type: &str) -> &'static str {
    let table: [(&'static str, &[&str]); 6] = [
        ("dining", DINING),
        ("grocery", GROCERY),
        ("drugstore", DRUGSTORE),
        ("gas", GAS),
        ("homeImprovement", HOME_IMPROVEMENT),
        ("travel", TRAVEL),
    ];
    table
        .iter()
        .find(|(_, types)| types.contains(&store_type))
        .map(|(category, _)| *category)
        .unwrap_or(FALLBACK_CATEGORY)
}

/// Where a purchase was made.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreInfo {
    pub store_name: String,
    pub address: String,
    pub store_type: String,
}

/// A card the user owns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedCard {
    pub doc_id: String,
    pub card_id: String,
}

/// A recorded purchase.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub doc_id: String,
    pub card_id: String,
    #[serde(default)]
    pub store_info: StoreInfo,
    #[serde(default)]
    pub amount_spent: f64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub date_added: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn category(&self) -> &'static str {
        category_for_store_type(&self.store_info.store_type)
    }
}

/// A card ranked for a category.
#[derive(Debug, Clone, PartialEq)]
pub struct CardRank {
    pub card_id: String,
    pub reward: f64,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_timestamp(&value))
}

/// Domain operations for the signed-in account.
#[derive(Clone)]
pub struct Ledger {
    backend: Backend,
}

impl Ledger {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    fn user_path(&self) -> BackendResult<String> {
        Ok(format!("users.{}", self.backend.user_id()?))
    }

    fn cards_path(&self) -> BackendResult<String> {
        Ok(format!("{}.cards", self.user_path()?))
    }

    fn transactions_path(&self) -> BackendResult<String> {
        Ok(format!("{}.transactions", self.user_path()?))
    }

    // ── User ──

    /// Registers the user record if it does not exist yet and returns the
    /// user id.
    pub fn ensure_user(&self) -> BackendResult<String> {
        let user_id = self.backend.user_id()?;
        let path = self.user_path()?;
        if !self.backend.db_does_doc_exist(&path)? {
            self.backend
                .db_set(&path, &object(json!({ "dateCreated": self.backend.timestamp() })), false)?;
            debug!("registered user {user_id}");
        }
        Ok(user_id)
    }

    // ── Cards ──

    /// Adds a catalog card to the user's cards and returns its document id.
    pub fn save_card_to_user(&self, card_id: &str) -> BackendResult<String> {
        let cards = self.cards_path()?;
        let doc_id = self.backend.db_add(
            &cards,
            &object(json!({ "cardId": card_id, "transactions": null, "diff": null })),
        )?;
        self.backend.db_set(
            &format!("{cards}.{doc_id}"),
            &object(json!({ DOC_ID_FIELD: doc_id })),
            true,
        )?;
        Ok(doc_id)
    }

    pub fn cards(&self) -> BackendResult<Vec<OwnedCard>> {
        decode_all(self.backend.db_get_sub_collections(&self.cards_path()?)?)
    }

    /// Document id of the user's card referencing `card_id`, if owned.
    pub fn card_doc_id(&self, card_id: &str) -> BackendResult<Option<String>> {
        Ok(self
            .cards()?
            .into_iter()
            .find(|card| card.card_id == card_id)
            .map(|card| card.doc_id))
    }

    /// Removes an owned card and every transaction made with it. Returns how
    /// many transactions were removed.
    pub fn delete_card(&self, card_id: &str, doc_id: &str) -> BackendResult<usize> {
        self.backend
            .db_delete(&format!("{}.{doc_id}", self.cards_path()?))?;
        let transactions = self.transactions_for_card(card_id)?;
        for transaction in &transactions {
            self.delete_transaction(&transaction.doc_id)?;
        }
        Ok(transactions.len())
    }

    // ── Transactions ──

    /// Records a purchase and returns its document id.
    pub fn save_transaction(
        &self,
        card_id: &str,
        store: &StoreInfo,
        amount_spent: f64,
    ) -> BackendResult<String> {
        let transactions = self.transactions_path()?;
        let doc_id = self.backend.db_add(
            &transactions,
            &object(json!({
                "cardId": card_id,
                "storeInfo": store,
                "amountSpent": amount_spent,
                "dateAdded": self.backend.timestamp(),
            })),
        )?;
        self.backend.db_set(
            &format!("{transactions}.{doc_id}"),
            &object(json!({ DOC_ID_FIELD: doc_id })),
            true,
        )?;
        Ok(doc_id)
    }

    pub fn transactions(&self) -> BackendResult<Vec<Transaction>> {
        decode_all(self.backend.db_get_sub_collections(&self.transactions_path()?)?)
    }

    /// Transactions added strictly between `start` and `end`.
    pub fn transactions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BackendResult<Vec<Transaction>> {
        self.query_transactions(&[
            Filter::new("dateAdded", FilterOp::Gt, timestamp_value(start)),
            Filter::new("dateAdded", FilterOp::Lt, timestamp_value(end)),
        ])
    }

    pub fn transactions_for_card(&self, card_id: &str) -> BackendResult<Vec<Transaction>> {
        self.query_transactions(&[Filter::equals("cardId", card_id)])
    }

    /// Merges `data` into a transaction.
    pub fn edit_transaction(&self, doc_id: &str, data: &Payload) -> BackendResult<()> {
        self.backend
            .db_set(&format!("{}.{doc_id}", self.transactions_path()?), data, true)
    }

    pub fn delete_transaction(&self, doc_id: &str) -> BackendResult<()> {
        self.backend
            .db_delete(&format!("{}.{doc_id}", self.transactions_path()?))
    }

    fn query_transactions(&self, filters: &[Filter]) -> BackendResult<Vec<Transaction>> {
        decode_all(self.backend.db_query(&self.transactions_path()?, filters)?)
    }

    // ── Rewards ──

    /// Reward rates of a catalog card, already multiplied by its
    /// `conversion` factor. `None` if the card or either field is missing.
    pub fn rewards(&self, card_id: &str) -> BackendResult<Option<BTreeMap<String, f64>>> {
        let Some(card) = self.backend.db_get_document(&format!("cards.{card_id}"))? else {
            return Ok(None);
        };
        let (Some(rewards), Some(conversion)) = (
            card.get("rewards").and_then(Value::as_object),
            card.get("conversion").and_then(Value::as_f64),
        ) else {
            return Ok(None);
        };
        Ok(Some(
            rewards
                .iter()
                .filter_map(|(category, rate)| Some((category.clone(), rate.as_f64()? * conversion)))
                .collect(),
        ))
    }

    /// The user's cards ordered by reward for the category of `store_type`,
    /// best first. A card without a rate for the category falls back to its
    /// `others` rate, then to zero.
    pub fn rank_cards_for_category(&self, store_type: &str) -> BackendResult<Vec<CardRank>> {
        let category = category_for_store_type(store_type);
        let mut ranked = Vec::new();
        for card in self.cards()? {
            let reward = self
                .rewards(&card.card_id)?
                .and_then(|rates| {
                    rates
                        .get(category)
                        .or_else(|| rates.get(FALLBACK_CATEGORY))
                        .copied()
                })
                .unwrap_or(0.0);
            ranked.push(CardRank {
                card_id: card.card_id,
                reward,
            });
        }
        ranked.sort_by(|a, b| b.reward.total_cmp(&a.reward));
        Ok(ranked)
    }

    /// Total spent per category over all transactions.
    pub fn spending_by_category(&self) -> BackendResult<BTreeMap<String, f64>> {
        let mut totals = BTreeMap::new();
        for transaction in self.transactions()? {
            *totals
                .entry(transaction.category().to_string())
                .or_insert(0.0) += transaction.amount_spent;
        }
        Ok(totals)
    }
}

fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

fn decode_all<T: for<'de> Deserialize<'de>>(docs: Vec<Payload>) -> BackendResult<Vec<T>> {
    docs.into_iter()
        .map(|doc| {
            serde_json::from_value(Value::Object(doc))
                .map_err(|e| BackendError::InvalidData(e.to_string()))
        })
        .collect()
}
