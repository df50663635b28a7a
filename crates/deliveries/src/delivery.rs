use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwarden_core::{DeliveryId, OrderId};

/// Read-only snapshot of a delivery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    /// The order this delivery fulfills. Not unique, and occasionally absent.
    pub order_id: Option<OrderId>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Delivery {
    pub fn new(
        id: DeliveryId,
        order_id: Option<OrderId>,
        status: Option<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            order_id,
            status,
            created_at,
        }
    }
}

/// Delivery snapshot grouped by the order each record fulfills.
///
/// Deliveries without an `orderId` are kept apart as orphans: they never form
/// a duplicate group with each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveriesByOrder {
    pub groups: BTreeMap<OrderId, Vec<Delivery>>,
    pub orphans: Vec<Delivery>,
}

impl DeliveriesByOrder {
    pub fn group(deliveries: impl IntoIterator<Item = Delivery>) -> Self {
        let mut out = DeliveriesByOrder::default();
        for d in deliveries {
            match d.order_id.clone() {
                Some(order_id) => out.groups.entry(order_id).or_default().push(d),
                None => out.orphans.push(d),
            }
        }
        out
    }

    pub fn total(&self) -> usize {
        self.groups.values().map(Vec::len).sum::<usize>() + self.orphans.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delivery> {
        self.groups.values().flatten().chain(self.orphans.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(id: &str, order: Option<&str>) -> Delivery {
        Delivery::new(
            DeliveryId::new(id).unwrap(),
            order.map(|o| OrderId::new(o).unwrap()),
            Some("pending".to_string()),
            None,
        )
    }

    #[test]
    fn groups_by_order_and_separates_orphans() {
        let grouped = DeliveriesByOrder::group(vec![
            delivery("d1", Some("o1")),
            delivery("d2", None),
            delivery("d3", Some("o1")),
            delivery("d4", Some("o2")),
            delivery("d5", None),
        ]);

        assert_eq!(grouped.groups.len(), 2);
        assert_eq!(grouped.groups[&OrderId::new("o1").unwrap()].len(), 2);
        assert_eq!(grouped.orphans.len(), 2);
        assert_eq!(grouped.total(), 5);
        assert_eq!(grouped.iter().count(), 5);
    }
}
