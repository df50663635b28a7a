//! Discrepancy calculation.
//!
//! `release(p) = min(requested(p), stored(p))`, with a negative stored counter
//! read as zero. The clamp keeps the corrected counter non-negative no matter
//! how stale or duplicated the order-derived signal is. Products whose release
//! is zero yield no record, so a repeated run over unchanged data is a no-op.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockwarden_core::{OrderId, ProductId};
use stockwarden_products::{ProductRecord, StockAnomaly};

use crate::ledger::ReservationLedger;

/// One bounded release against a product's `reservedStock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub product_id: ProductId,
    pub name: String,
    /// Units the classified orders asked to release.
    pub requested: u64,
    /// Units actually released (`<= reserved_before`).
    pub release: u64,
    pub reserved_before: i64,
    pub reserved_after: i64,
    pub orders: Vec<OrderId>,
}

/// Observed data-quality problem. Reported, never corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataAnomaly {
    /// A stored product violates `0 <= reservedStock <= stock`.
    Stock {
        product_id: ProductId,
        name: String,
        anomaly: StockAnomaly,
    },
    /// Orders reference a product that is not in the catalog.
    MissingProduct { product_id: ProductId, requested: u64 },
    /// After correction the stored reservation still exceeds all legitimate holds.
    UnexplainedReservation {
        product_id: ProductId,
        name: String,
        reserved_after: i64,
        held: u64,
    },
}

impl DataAnomaly {
    pub fn product_id(&self) -> &ProductId {
        match self {
            DataAnomaly::Stock { product_id, .. }
            | DataAnomaly::MissingProduct { product_id, .. }
            | DataAnomaly::UnexplainedReservation { product_id, .. } => product_id,
        }
    }
}

impl core::fmt::Display for DataAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DataAnomaly::Stock { name, anomaly, .. } => write!(f, "{name}: {anomaly}"),
            DataAnomaly::MissingProduct { product_id, requested } => write!(
                f,
                "product {product_id} not found ({requested} unit(s) requested for release)"
            ),
            DataAnomaly::UnexplainedReservation {
                name,
                reserved_after,
                held,
                ..
            } => write!(
                f,
                "{name}: {reserved_after} unit(s) reserved but only {held} backed by active orders"
            ),
        }
    }
}

/// Output of the calculator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancies {
    /// Ordered by product id.
    pub corrections: Vec<CorrectionRecord>,
    pub anomalies: Vec<DataAnomaly>,
}

impl Discrepancies {
    pub fn units_released(&self) -> u64 {
        self.corrections.iter().map(|c| c.release).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }
}

/// Compare the ledger against stored counters.
pub fn compute_corrections(
    ledger: &ReservationLedger,
    products: &BTreeMap<ProductId, ProductRecord>,
) -> Discrepancies {
    let mut corrections = Vec::new();
    let mut anomalies = Vec::new();

    for product in products.values() {
        for anomaly in product.anomalies() {
            anomalies.push(DataAnomaly::Stock {
                product_id: product.id.clone(),
                name: product.name.clone(),
                anomaly,
            });
        }
    }

    for (product_id, demand) in ledger.to_release() {
        let Some(product) = products.get(product_id) else {
            anomalies.push(DataAnomaly::MissingProduct {
                product_id: product_id.clone(),
                requested: demand.quantity,
            });
            continue;
        };

        let release = demand.quantity.min(product.releasable());
        if release == 0 {
            continue;
        }

        corrections.push(CorrectionRecord {
            product_id: product_id.clone(),
            name: product.name.clone(),
            requested: demand.quantity,
            release,
            reserved_before: product.reserved_stock,
            reserved_after: product.reserved_stock - release as i64,
            orders: demand.orders.clone(),
        });
    }

    let released: BTreeMap<&ProductId, u64> = corrections
        .iter()
        .map(|c| (&c.product_id, c.release))
        .collect();
    for product in products.values() {
        let reserved_after =
            product.reserved_stock - released.get(&product.id).copied().unwrap_or(0) as i64;
        let held = ledger.held_for(&product.id);
        if reserved_after > 0 && reserved_after as u64 > held {
            anomalies.push(DataAnomaly::UnexplainedReservation {
                product_id: product.id.clone(),
                name: product.name.clone(),
                reserved_after,
                held,
            });
        }
    }

    Discrepancies {
        corrections,
        anomalies,
    }
}
