//! Duplicate delivery resolution.
//!
//! For every order with more than one delivery, the deliveries are ordered by
//! `(createdAt, id)` ascending with a missing `createdAt` read as the Unix
//! epoch. The first one survives; every other one is marked for deletion.
//! The partition depends only on the set of records, never on input order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwarden_core::{DeliveryId, OrderId};

use crate::delivery::{DeliveriesByOrder, Delivery};

/// Survivor/removal partition for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub order_id: OrderId,
    pub survivor: DeliveryId,
    pub survivor_created_at: Option<DateTime<Utc>>,
    /// Removed deliveries, in canonical order.
    pub removed: Vec<(DeliveryId, Option<DateTime<Utc>>)>,
}

/// Output of the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateResolution {
    /// Groups with at least one removal, ordered by order id.
    pub groups: Vec<DuplicateGroup>,
    /// Distinct order ids seen in the delivery snapshot.
    pub orders_scanned: usize,
}

impl DuplicateResolution {
    /// Delivery ids to delete, deterministic (by order id, then canonical order).
    pub fn deletions(&self) -> impl Iterator<Item = &DeliveryId> {
        self.groups
            .iter()
            .flat_map(|g| g.removed.iter().map(|(id, _)| id))
    }

    pub fn affected_orders(&self) -> usize {
        self.groups.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|g| g.removed.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.groups.is_empty()
    }
}

fn canonical_key(d: &Delivery) -> (DateTime<Utc>, &DeliveryId) {
    (d.created_at.unwrap_or(DateTime::UNIX_EPOCH), &d.id)
}

/// Partition every order's deliveries into one survivor and the removals.
pub fn resolve_duplicates(deliveries: &DeliveriesByOrder) -> DuplicateResolution {
    let mut groups = Vec::new();

    for (order_id, records) in &deliveries.groups {
        if records.len() < 2 {
            continue;
        }

        let mut sorted: Vec<&Delivery> = records.iter().collect();
        sorted.sort_by(|a, b| canonical_key(a).cmp(&canonical_key(b)));

        let (survivor, rest) = match sorted.split_first() {
            Some(split) => split,
            None => continue,
        };

        groups.push(DuplicateGroup {
            order_id: order_id.clone(),
            survivor: survivor.id.clone(),
            survivor_created_at: survivor.created_at,
            removed: rest.iter().map(|d| (d.id.clone(), d.created_at)).collect(),
        });
    }

    DuplicateResolution {
        groups,
        orders_scanned: deliveries.groups.len(),
    }
}
