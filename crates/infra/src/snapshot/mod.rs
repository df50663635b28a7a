//! Snapshot readers.
//!
//! Every collection a run depends on is read in full before anything is
//! computed. Any read failure aborts the run before a single write is issued.

pub mod decode;

pub use decode::{MalformedRecord, UNNAMED_PRODUCT, parse_timestamp};

use std::collections::BTreeMap;

use tracing::{debug, info};

use stockwarden_core::ProductId;
use stockwarden_deliveries::DeliveriesByOrder;
use stockwarden_products::ProductRecord;
use stockwarden_sales::Order;

use crate::config::Collections;
use crate::journal::JournalRecord;
use crate::run::ReconcileError;
use crate::store::{Document, DocumentStore};

/// Point-in-time view of every collection a run reads.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub orders: Vec<Order>,
    pub products: BTreeMap<ProductId, ProductRecord>,
    pub deliveries: DeliveriesByOrder,
    /// Every release journal entry, whatever product collection it targets.
    pub journal: Vec<JournalRecord>,
    pub malformed: Vec<MalformedRecord>,
}

async fn read(store: &(impl DocumentStore + ?Sized), collection: &str) -> Result<Vec<Document>, ReconcileError> {
    let docs = store
        .read_all(collection)
        .await
        .map_err(|source| ReconcileError::SnapshotRead {
            collection: collection.to_string(),
            source,
        })?;
    debug!(collection, documents = docs.len(), "snapshot read");
    Ok(docs)
}

pub async fn read_orders(
    store: &(impl DocumentStore + ?Sized),
    collection: &str,
    malformed: &mut Vec<MalformedRecord>,
) -> Result<Vec<Order>, ReconcileError> {
    let docs = read(store, collection).await?;
    Ok(docs
        .iter()
        .filter_map(|d| decode::decode_order(collection, d, malformed))
        .collect())
}

pub async fn read_products(
    store: &(impl DocumentStore + ?Sized),
    collection: &str,
    malformed: &mut Vec<MalformedRecord>,
) -> Result<BTreeMap<ProductId, ProductRecord>, ReconcileError> {
    let docs = read(store, collection).await?;
    Ok(docs
        .iter()
        .filter_map(|d| decode::decode_product(collection, d, malformed))
        .map(|p| (p.id.clone(), p))
        .collect())
}

pub async fn read_deliveries(
    store: &(impl DocumentStore + ?Sized),
    collection: &str,
    malformed: &mut Vec<MalformedRecord>,
) -> Result<DeliveriesByOrder, ReconcileError> {
    let docs = read(store, collection).await?;
    Ok(DeliveriesByOrder::group(
        docs.iter()
            .filter_map(|d| decode::decode_delivery(collection, d, malformed)),
    ))
}

pub async fn read_journal(
    store: &(impl DocumentStore + ?Sized),
    collection: &str,
    malformed: &mut Vec<MalformedRecord>,
) -> Result<Vec<JournalRecord>, ReconcileError> {
    let docs = read(store, collection).await?;
    Ok(docs
        .iter()
        .filter_map(|d| decode::decode_journal_entry(collection, d, malformed))
        .collect())
}

impl Snapshot {
    /// Read all four collections, failing fast on the first read error.
    pub async fn read(
        store: &(impl DocumentStore + ?Sized),
        collections: &Collections,
    ) -> Result<Self, ReconcileError> {
        let mut malformed = Vec::new();

        let orders = read_orders(store, &collections.orders, &mut malformed).await?;
        let products = read_products(store, &collections.products, &mut malformed).await?;
        let deliveries = read_deliveries(store, &collections.deliveries, &mut malformed).await?;
        let journal = read_journal(store, &collections.releases, &mut malformed).await?;

        info!(
            orders = orders.len(),
            products = products.len(),
            deliveries = deliveries.total(),
            journaled = journal.len(),
            malformed = malformed.len(),
            "snapshots loaded"
        );

        Ok(Self {
            orders,
            products,
            deliveries,
            journal,
            malformed,
        })
    }
}
