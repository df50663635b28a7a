//! Document → domain record decoding.
//!
//! Stored documents were written by several independent clients over time,
//! so every field is optional and loosely typed. Decoding never fails a run:
//! unusable records and order lines are skipped and reported as malformed.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stockwarden_core::{DeliveryId, OrderId, ProductId};
use stockwarden_deliveries::Delivery;
use stockwarden_products::ProductRecord;
use stockwarden_sales::{Order, OrderLine, OrderStatus};

use crate::journal::JournalRecord;
use crate::store::Document;

/// Name used for products without a `name` field.
pub const UNNAMED_PRODUCT: &str = "(unnamed)";

/// A record (or part of one) that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedRecord {
    pub collection: String,
    pub id: String,
    pub reason: String,
}

/// Decode a timestamp field.
///
/// Accepts an RFC 3339 string, integer epoch milliseconds, or an exported
/// timestamp object (`{_seconds, _nanoseconds}` or `{seconds, nanos}`).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Value::Object(map) => {
            let seconds = map.get("_seconds").or_else(|| map.get("seconds"))?.as_i64()?;
            let nanos = map
                .get("_nanoseconds")
                .or_else(|| map.get("nanos"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, u32::try_from(nanos).ok()?).single()
        }
        _ => None,
    }
}

fn non_empty_str<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

/// Decode an order. Unusable lines are dropped and reported.
pub fn decode_order(
    collection: &str,
    doc: &Document,
    malformed: &mut Vec<MalformedRecord>,
) -> Option<Order> {
    let mut report = |reason: String| {
        malformed.push(MalformedRecord {
            collection: collection.to_string(),
            id: doc.id.clone(),
            reason,
        })
    };

    let id = match OrderId::new(doc.id.clone()) {
        Ok(id) => id,
        Err(e) => {
            report(e.to_string());
            return None;
        }
    };

    let status = OrderStatus::parse(doc.get("status").and_then(Value::as_str));
    let created_at = doc.get("createdAt").and_then(parse_timestamp);

    let items: &[Value] = match doc.get("items") {
        Some(Value::Array(items)) => items.as_slice(),
        None | Some(Value::Null) => &[],
        Some(_) => {
            report("items is not a list".to_string());
            &[]
        }
    };

    let mut lines = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let product_id = item
            .get("productId")
            .and_then(Value::as_str)
            .map(ProductId::new);
        let quantity = item.get("quantity").filter(|q| !q.is_null());

        match (product_id, quantity) {
            (Some(Ok(product_id)), Some(quantity)) => match integer(quantity) {
                Some(quantity) => match OrderLine::new(product_id, quantity) {
                    Ok(line) => lines.push(line),
                    Err(e) => report(format!("item {i}: {e}")),
                },
                None => report(format!("item {i}: quantity is not an integer")),
            },
            (Some(Ok(_)), None) => report(format!("item {i}: missing quantity")),
            (Some(Err(e)), _) => report(format!("item {i}: {e}")),
            (None, _) => report(format!("item {i}: missing productId")),
        }
    }

    Some(Order::new(id, status, created_at, lines))
}

/// Decode a product. Missing counters read as zero.
pub fn decode_product(
    collection: &str,
    doc: &Document,
    malformed: &mut Vec<MalformedRecord>,
) -> Option<ProductRecord> {
    let id = match ProductId::new(doc.id.clone()) {
        Ok(id) => id,
        Err(e) => {
            malformed.push(MalformedRecord {
                collection: collection.to_string(),
                id: doc.id.clone(),
                reason: e.to_string(),
            });
            return None;
        }
    };

    let counter = |field: &str| doc.get(field).and_then(integer).unwrap_or(0);
    let name = non_empty_str(doc, "name").unwrap_or(UNNAMED_PRODUCT);

    Some(ProductRecord::new(
        id,
        name,
        counter("stock"),
        counter("reservedStock"),
    ))
}

/// Decode a delivery. An empty or missing `orderId` makes it an orphan.
pub fn decode_delivery(
    collection: &str,
    doc: &Document,
    malformed: &mut Vec<MalformedRecord>,
) -> Option<Delivery> {
    let id = match DeliveryId::new(doc.id.clone()) {
        Ok(id) => id,
        Err(e) => {
            malformed.push(MalformedRecord {
                collection: collection.to_string(),
                id: doc.id.clone(),
                reason: e.to_string(),
            });
            return None;
        }
    };

    let order_id = non_empty_str(doc, "orderId").and_then(|s| OrderId::new(s).ok());
    let status = non_empty_str(doc, "status").map(str::to_string);
    let created_at = doc.get("createdAt").and_then(parse_timestamp);

    Some(Delivery::new(id, order_id, status, created_at))
}

/// Decode a release journal entry. Entries missing any key field are skipped.
pub fn decode_journal_entry(
    collection: &str,
    doc: &Document,
    malformed: &mut Vec<MalformedRecord>,
) -> Option<JournalRecord> {
    let product_collection = non_empty_str(doc, "productCollection");
    let order_id = non_empty_str(doc, "orderId").and_then(|s| OrderId::new(s).ok());
    let product_id = non_empty_str(doc, "productId").and_then(|s| ProductId::new(s).ok());

    match (product_collection, order_id, product_id) {
        (Some(product_collection), Some(order_id), Some(product_id)) => Some(JournalRecord {
            document_id: doc.id.clone(),
            product_collection: product_collection.to_string(),
            order_id,
            product_id,
        }),
        _ => {
            malformed.push(MalformedRecord {
                collection: collection.to_string(),
                id: doc.id.clone(),
                reason: "journal entry without productCollection, orderId and productId".to_string(),
            });
            None
        }
    }
}
