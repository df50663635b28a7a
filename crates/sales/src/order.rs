use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwarden_core::{DomainError, DomainResult, OrderId, ProductId};

/// Order status as stored by the checkout path.
///
/// The store keeps this as a free-form string. Recognized values map onto the
/// known lifecycle; anything else is kept verbatim in `Other` so it can be
/// reported and treated conservatively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Cancelled,
    Delivered,
    Other(String),
}

impl OrderStatus {
    /// Parse a stored status.
    ///
    /// A missing status reads as `Pending`, which is what the checkout path
    /// writes before any transition happens.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return OrderStatus::Pending;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "pending" => OrderStatus::Pending,
            "confirmed" => OrderStatus::Confirmed,
            "preparing" => OrderStatus::Preparing,
            "cancelled" => OrderStatus::Cancelled,
            "delivered" => OrderStatus::Delivered,
            _ => OrderStatus::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Other(raw) => raw,
        }
    }

    /// Terminal statuses whose reservations must be returned to the pool.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Delivered)
    }

    /// Known active statuses that legitimately hold stock.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Preparing
        )
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        OrderStatus::parse(Some(&value))
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order line: product and reserved quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u64,
}

impl OrderLine {
    /// Validate a raw line. Quantities must be strictly positive.
    pub fn new(product_id: ProductId, quantity: i64) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation(format!(
                "quantity for product {product_id} must be positive (got {quantity})"
            )));
        }
        Ok(Self {
            product_id,
            quantity: quantity as u64,
        })
    }
}

/// Read-only snapshot of an order document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    status: OrderStatus,
    created_at: Option<DateTime<Utc>>,
    lines: Vec<OrderLine>,
}

impl Order {
    pub fn new(
        id: OrderId,
        status: OrderStatus,
        created_at: Option<DateTime<Utc>>,
        lines: Vec<OrderLine>,
    ) -> Self {
        Self {
            id,
            status,
            created_at,
            lines,
        }
    }

    pub fn id(&self) -> &OrderId {
        &self.id
    }

    pub fn status(&self) -> &OrderStatus {
        &self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Total units across all lines.
    pub fn total_units(&self) -> u64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}
