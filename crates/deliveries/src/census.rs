//! Delivery status census (read-only).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::delivery::DeliveriesByOrder;

/// Label used for deliveries without a status field.
pub const UNDEFINED_STATUS: &str = "undefined";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCensus {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub orders_with_deliveries: usize,
    /// Deliveries without an `orderId`.
    pub orphans: usize,
}

impl DeliveryCensus {
    pub fn count(deliveries: &DeliveriesByOrder) -> Self {
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        for d in deliveries.iter() {
            let status = d
                .status
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(UNDEFINED_STATUS);
            *by_status.entry(status.to_string()).or_default() += 1;
        }

        Self {
            total: deliveries.total(),
            by_status,
            orders_with_deliveries: deliveries.groups.len(),
            orphans: deliveries.orphans.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::Delivery;
    use stockwarden_core::{DeliveryId, OrderId};

    fn delivery(id: &str, order: Option<&str>, status: Option<&str>) -> Delivery {
        Delivery::new(
            DeliveryId::new(id).unwrap(),
            order.map(|o| OrderId::new(o).unwrap()),
            status.map(str::to_string),
            None,
        )
    }

    #[test]
    fn counts_statuses_and_orphans() {
        let grouped = DeliveriesByOrder::group(vec![
            delivery("d1", Some("o1"), Some("delivered")),
            delivery("d2", Some("o1"), Some("delivered")),
            delivery("d3", Some("o2"), Some("in_transit")),
            delivery("d4", None, None),
            delivery("d5", Some("o3"), Some("  ")),
        ]);
        let census = DeliveryCensus::count(&grouped);

        assert_eq!(census.total, 5);
        assert_eq!(census.orders_with_deliveries, 3);
        assert_eq!(census.orphans, 1);
        assert_eq!(census.by_status["delivered"], 2);
        assert_eq!(census.by_status["in_transit"], 1);
        assert_eq!(census.by_status[UNDEFINED_STATUS], 2);
    }
}
