//! Release journal entries.
//!
//! One document per released `(product collection, order, product)` line.
//! A journaled line never contributes to a release again when the run targets
//! the same product collection. Lines are only journaled for products that
//! exist in that collection, and each entry commits in the same batch as the
//! counter adjustment it records.

use std::collections::HashSet;

use serde_json::{Value, json};

use stockwarden_core::{OrderId, ProductId, RunId};
use stockwarden_sales::ReleaseReason;

use crate::store::{Fields, WriteOp};

pub const RELEASED_AT: &str = "releasedAt";

/// Journal document id for one released line.
pub fn document_id(product_collection: &str, order_id: &OrderId, product_id: &ProductId) -> String {
    format!("{product_collection}:{order_id}:{product_id}")
}

/// A line to be journaled by this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Units requested by the order for this product.
    pub quantity: u64,
    pub reason: ReleaseReason,
}

/// A journal entry read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub document_id: String,
    pub product_collection: String,
    pub order_id: OrderId,
    pub product_id: ProductId,
}

/// Lines already released against `product_collection`.
pub fn released_lines(records: &[JournalRecord], product_collection: &str) -> HashSet<(OrderId, ProductId)> {
    records
        .iter()
        .filter(|r| r.product_collection == product_collection)
        .map(|r| (r.order_id.clone(), r.product_id.clone()))
        .collect()
}

/// Upsert recording that `line` has been released.
pub fn entry(collection: &str, product_collection: &str, line: &JournalLine, run_id: RunId) -> WriteOp {
    let mut fields = Fields::new();
    fields.insert("productCollection".to_string(), json!(product_collection));
    fields.insert("orderId".to_string(), json!(line.order_id.as_str()));
    fields.insert("productId".to_string(), json!(line.product_id.as_str()));
    fields.insert("quantity".to_string(), Value::from(line.quantity));
    fields.insert("reason".to_string(), json!(line.reason.as_str()));
    fields.insert("runId".to_string(), json!(run_id.to_string()));

    WriteOp::Upsert {
        collection: collection.to_string(),
        id: document_id(product_collection, &line.order_id, &line.product_id),
        fields,
        server_timestamps: vec![RELEASED_AT.to_string()],
    }
}
