use serde::{Deserialize, Serialize};

use stockwarden_core::ProductId;

/// Stock fields of a product document.
///
/// Counters are signed: the engine must be able to *observe* corrupted values
/// (negative reservations) even though it never produces them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    /// Total physical units.
    pub stock: i64,
    /// Units held against in-flight orders.
    pub reserved_stock: i64,
}

/// Invariant violation observed on a stored product (reported, not fixed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockAnomaly {
    ReservedExceedsStock { reserved: i64, stock: i64 },
    NegativeReserved { reserved: i64 },
    NegativeStock { stock: i64 },
}

impl core::fmt::Display for StockAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StockAnomaly::ReservedExceedsStock { reserved, stock } => {
                write!(f, "reserved stock {reserved} exceeds total stock {stock}")
            }
            StockAnomaly::NegativeReserved { reserved } => {
                write!(f, "negative reserved stock {reserved}")
            }
            StockAnomaly::NegativeStock { stock } => write!(f, "negative total stock {stock}"),
        }
    }
}

impl ProductRecord {
    pub fn new(id: ProductId, name: impl Into<String>, stock: i64, reserved_stock: i64) -> Self {
        Self {
            id,
            name: name.into(),
            stock,
            reserved_stock,
        }
    }

    /// Available-to-sell quantity (`stock - reservedStock`).
    pub fn available(&self) -> i64 {
        self.stock.saturating_sub(self.reserved_stock)
    }

    /// Reserved units usable as a release ceiling (negative reads as zero).
    pub fn releasable(&self) -> u64 {
        self.reserved_stock.max(0) as u64
    }

    /// Every violation of `0 <= reservedStock <= stock` (and `stock >= 0`).
    pub fn anomalies(&self) -> Vec<StockAnomaly> {
        let mut out = Vec::new();
        if self.reserved_stock < 0 {
            out.push(StockAnomaly::NegativeReserved {
                reserved: self.reserved_stock,
            });
        }
        if self.stock < 0 {
            out.push(StockAnomaly::NegativeStock { stock: self.stock });
        }
        if self.reserved_stock > self.stock {
            out.push(StockAnomaly::ReservedExceedsStock {
                reserved: self.reserved_stock,
                stock: self.stock,
            });
        }
        out
    }

    /// Everything reserved, nothing left to sell.
    pub fn is_fully_reserved(&self) -> bool {
        self.reserved_stock > 0 && self.available() <= 0
    }
}
