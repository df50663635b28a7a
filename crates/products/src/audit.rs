//! Stock health audit (read-only).

use serde::{Deserialize, Serialize};

use crate::product::ProductRecord;

/// Catalog-wide stock totals and invariant counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockHealth {
    pub total_products: usize,
    pub total_stock: i64,
    pub total_reserved: i64,
    pub total_available: i64,
    pub products_with_reservations: usize,
    pub fully_reserved_products: usize,
    /// Products violating `0 <= reservedStock <= stock`.
    pub products_with_errors: usize,
}

impl StockHealth {
    pub fn audit<'a>(products: impl IntoIterator<Item = &'a ProductRecord>) -> Self {
        let mut health = StockHealth::default();
        for p in products {
            health.total_products += 1;
            health.total_stock = health.total_stock.saturating_add(p.stock);
            health.total_reserved = health.total_reserved.saturating_add(p.reserved_stock);
            if p.reserved_stock > 0 {
                health.products_with_reservations += 1;
            }
            if p.is_fully_reserved() {
                health.fully_reserved_products += 1;
            }
            if !p.anomalies().is_empty() {
                health.products_with_errors += 1;
            }
        }
        health.total_available = health.total_stock.saturating_sub(health.total_reserved);
        health
    }

    pub fn is_healthy(&self) -> bool {
        self.products_with_errors == 0
    }
}
