use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use stockwarden_core::{OrderId, ProductId};
use stockwarden_sales::{ClassifiedOrder, OrderLine, ReleaseReason, ReservationClass};

/// Units requested for release on one product, with the orders behind them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDemand {
    pub quantity: u64,
    pub orders: Vec<OrderId>,
}

/// An order whose not-yet-journaled lines feed the to-release mapping in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasedOrder {
    pub order_id: OrderId,
    pub reason: ReleaseReason,
    pub lines: Vec<OrderLine>,
    pub age_minutes: i64,
}

/// Orders per reservation class.
///
/// Releasing classes only count orders that contribute to this run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub legitimate_hold: usize,
    pub expired_pending: usize,
    pub must_release: usize,
    pub unknown: usize,
    /// Releasing orders whose every line is already in the release journal.
    pub already_released: usize,
}

/// Ephemeral reservation ledger, rebuilt from the order snapshot on every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationLedger {
    held: BTreeMap<ProductId, u64>,
    to_release: BTreeMap<ProductId, ReleaseDemand>,
    released_orders: Vec<ReleasedOrder>,
    counts: ClassCounts,
}

impl ReservationLedger {
    /// Aggregate classified orders.
    ///
    /// `journal` holds the `(order, product)` lines whose release was already
    /// applied by an earlier run; they contribute to neither mapping. A
    /// releasing order whose every line is journaled counts as
    /// `already_released` instead of `expired_pending`/`must_release`.
    pub fn build(orders: &[ClassifiedOrder], journal: &HashSet<(OrderId, ProductId)>) -> Self {
        let mut ledger = ReservationLedger::default();

        for c in orders {
            if c.class.holds_stock() {
                match c.class {
                    ReservationClass::Unknown => ledger.counts.unknown += 1,
                    _ => ledger.counts.legitimate_hold += 1,
                }
                for line in c.order.lines() {
                    let held = ledger.held.entry(line.product_id.clone()).or_default();
                    *held = held.saturating_add(line.quantity);
                }
                continue;
            }

            let Some(reason) = c.release_reason() else {
                continue;
            };
            let order_id = c.order.id();
            let pending: Vec<OrderLine> = c
                .order
                .lines()
                .iter()
                .filter(|l| !journal.contains(&(order_id.clone(), l.product_id.clone())))
                .cloned()
                .collect();

            if pending.is_empty() {
                if !c.order.lines().is_empty() {
                    ledger.counts.already_released += 1;
                }
                continue;
            }
            match c.class {
                ReservationClass::ExpiredPending => ledger.counts.expired_pending += 1,
                _ => ledger.counts.must_release += 1,
            }

            for line in &pending {
                let demand = ledger.to_release.entry(line.product_id.clone()).or_default();
                demand.quantity = demand.quantity.saturating_add(line.quantity);
                if !demand.orders.contains(order_id) {
                    demand.orders.push(order_id.clone());
                }
            }
            ledger.released_orders.push(ReleasedOrder {
                order_id: order_id.clone(),
                reason,
                lines: pending,
                age_minutes: c.age_minutes(),
            });
        }

        ledger.released_orders.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        ledger
    }

    /// Legitimate holds per product.
    pub fn held(&self) -> &BTreeMap<ProductId, u64> {
        &self.held
    }

    pub fn held_for(&self, product_id: &ProductId) -> u64 {
        self.held.get(product_id).copied().unwrap_or(0)
    }

    /// Requested releases per product, ordered by product id.
    pub fn to_release(&self) -> &BTreeMap<ProductId, ReleaseDemand> {
        &self.to_release
    }

    /// Orders feeding `to_release`, ordered by order id.
    pub fn released_orders(&self) -> &[ReleasedOrder] {
        &self.released_orders
    }

    pub fn counts(&self) -> ClassCounts {
        self.counts
    }

    pub fn requested_units(&self) -> u64 {
        self.to_release.values().map(|d| d.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use stockwarden_sales::{ExpiryPolicy, Order, OrderStatus};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn pid(raw: &str) -> ProductId {
        ProductId::new(raw).unwrap()
    }

    fn order(id: &str, status: &str, age_min: i64, lines: &[(&str, i64)]) -> Order {
        Order::new(
            OrderId::new(id).unwrap(),
            OrderStatus::parse(Some(status)),
            Some(now() - Duration::minutes(age_min)),
            lines
                .iter()
                .map(|(p, q)| OrderLine::new(pid(p), *q).unwrap())
                .collect(),
        )
    }

    fn classify(orders: Vec<Order>) -> Vec<ClassifiedOrder> {
        ExpiryPolicy::default().classify_all(orders, now())
    }

    #[test]
    fn holds_and_releases_are_kept_apart() {
        let orders = classify(vec![
            order("o1", "cancelled", 5, &[("p1", 3)]),
            order("o2", "pending", 45, &[("p2", 2)]),
            order("o3", "confirmed", 0, &[("p1", 4)]),
            order("o4", "delivered", 600, &[("p1", 1), ("p3", 7)]),
            order("o5", "awaiting_payment", 900, &[("p3", 2)]),
        ]);
        let ledger = ReservationLedger::build(&orders, &HashSet::new());

        assert_eq!(ledger.held_for(&pid("p1")), 4);
        assert_eq!(ledger.held_for(&pid("p3")), 2);
        assert_eq!(ledger.held_for(&pid("p2")), 0);

        let p1 = &ledger.to_release()[&pid("p1")];
        assert_eq!(p1.quantity, 4);
        assert_eq!(p1.orders.len(), 2);
        assert_eq!(ledger.to_release()[&pid("p2")].quantity, 2);
        assert_eq!(ledger.to_release()[&pid("p3")].quantity, 7);
        assert_eq!(ledger.requested_units(), 13);

        let counts = ledger.counts();
        assert_eq!(counts.legitimate_hold, 1);
        assert_eq!(counts.expired_pending, 1);
        assert_eq!(counts.must_release, 2);
        assert_eq!(counts.unknown, 1);

        let released: Vec<&str> = ledger
            .released_orders()
            .iter()
            .map(|r| r.order_id.as_str())
            .collect();
        assert_eq!(released, vec!["o1", "o2", "o4"]);
    }

    fn journaled(lines: &[(&str, &str)]) -> HashSet<(OrderId, ProductId)> {
        lines
            .iter()
            .map(|(o, p)| (OrderId::new(*o).unwrap(), pid(p)))
            .collect()
    }

    #[test]
    fn journaled_orders_are_skipped() {
        let orders = classify(vec![
            order("o1", "cancelled", 5, &[("p1", 3)]),
            order("o2", "cancelled", 5, &[("p1", 1)]),
            order("o3", "pending", 90, &[("p2", 4)]),
        ]);
        let ledger = ReservationLedger::build(&orders, &journaled(&[("o1", "p1"), ("o3", "p2")]));

        assert_eq!(ledger.to_release()[&pid("p1")].quantity, 1);
        assert!(!ledger.to_release().contains_key(&pid("p2")));
        assert_eq!(ledger.counts().already_released, 2);
        assert_eq!(ledger.counts().must_release, 1);
        assert_eq!(ledger.counts().expired_pending, 0);
        assert_eq!(ledger.released_orders().len(), 1);
    }

    #[test]
    fn partially_journaled_order_releases_only_remaining_lines() {
        let orders = classify(vec![order("o1", "delivered", 5, &[("p1", 3), ("p2", 2)])]);
        let ledger = ReservationLedger::build(&orders, &journaled(&[("o1", "p1")]));

        assert!(!ledger.to_release().contains_key(&pid("p1")));
        assert_eq!(ledger.to_release()[&pid("p2")].quantity, 2);
        let released = &ledger.released_orders()[0];
        assert_eq!(released.lines.len(), 1);
        assert_eq!(released.lines[0].product_id, pid("p2"));
        assert_eq!(ledger.counts().already_released, 0);
    }

    #[test]
    fn repeated_product_lines_in_one_order_list_the_order_once() {
        let orders = classify(vec![order("o1", "cancelled", 5, &[("p1", 3), ("p1", 2)])]);
        let ledger = ReservationLedger::build(&orders, &HashSet::new());
        let demand = &ledger.to_release()[&pid("p1")];
        assert_eq!(demand.quantity, 5);
        assert_eq!(demand.orders, vec![OrderId::new("o1").unwrap()]);
    }
}
