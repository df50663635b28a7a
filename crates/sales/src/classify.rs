//! Reservation classification.
//!
//! Every order is tagged with exactly one [`ReservationClass`]:
//!
//! - `LegitimateHold`: pending/confirmed/preparing and not expired
//! - `ExpiredPending`: pending for longer than the expiry policy allows
//! - `MustRelease`: cancelled or delivered
//! - `Unknown`: any other status; never released, counted as a hold
//!
//! Only `pending` is subject to expiry. Orders without `createdAt` have age
//! zero and therefore never expire.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::order::{Order, OrderStatus};

/// Reservation tag assigned to an order for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReservationClass {
    LegitimateHold,
    ExpiredPending,
    MustRelease,
    Unknown,
}

impl ReservationClass {
    /// Whether the order's lines count toward the legitimate `held` total.
    pub fn holds_stock(self) -> bool {
        matches!(self, ReservationClass::LegitimateHold | ReservationClass::Unknown)
    }

    /// Whether the order's lines must be returned to the available pool.
    pub fn releases_stock(self) -> bool {
        matches!(self, ReservationClass::ExpiredPending | ReservationClass::MustRelease)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationClass::LegitimateHold => "legitimate-hold",
            ReservationClass::ExpiredPending => "expired-pending",
            ReservationClass::MustRelease => "must-release",
            ReservationClass::Unknown => "unknown",
        }
    }
}

/// Why an order's reservation was released (persisted in the release journal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseReason {
    Cancelled,
    Delivered,
    ExpiredPending,
}

impl ReleaseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseReason::Cancelled => "cancelled",
            ReleaseReason::Delivered => "delivered",
            ReleaseReason::ExpiredPending => "expired-pending",
        }
    }
}

/// Data-driven expiry policy for pending orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pending_ttl: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::minutes(30),
        }
    }
}

impl ExpiryPolicy {
    pub fn new(pending_ttl: Duration) -> Self {
        Self { pending_ttl }
    }

    pub fn pending_ttl(&self) -> Duration {
        self.pending_ttl
    }

    /// Age of an order at `now`.
    ///
    /// Missing or future `createdAt` yields zero.
    pub fn age(order: &Order, now: DateTime<Utc>) -> Duration {
        match order.created_at() {
            Some(created) if created < now => now - created,
            _ => Duration::zero(),
        }
    }

    /// Tag one order.
    pub fn classify(&self, order: Order, now: DateTime<Utc>) -> ClassifiedOrder {
        let age = Self::age(&order, now);
        let class = match order.status() {
            OrderStatus::Cancelled | OrderStatus::Delivered => ReservationClass::MustRelease,
            OrderStatus::Pending if age > self.pending_ttl => ReservationClass::ExpiredPending,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Preparing => {
                ReservationClass::LegitimateHold
            }
            OrderStatus::Other(_) => ReservationClass::Unknown,
        };
        ClassifiedOrder { order, class, age }
    }

    /// Tag a whole snapshot, preserving input order.
    pub fn classify_all(
        &self,
        orders: impl IntoIterator<Item = Order>,
        now: DateTime<Utc>,
    ) -> Vec<ClassifiedOrder> {
        orders.into_iter().map(|o| self.classify(o, now)).collect()
    }
}

/// An order plus its tag for the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedOrder {
    pub order: Order,
    pub class: ReservationClass,
    pub age: Duration,
}

impl ClassifiedOrder {
    pub fn release_reason(&self) -> Option<ReleaseReason> {
        match (self.class, self.order.status()) {
            (ReservationClass::ExpiredPending, _) => Some(ReleaseReason::ExpiredPending),
            (ReservationClass::MustRelease, OrderStatus::Cancelled) => {
                Some(ReleaseReason::Cancelled)
            }
            (ReservationClass::MustRelease, OrderStatus::Delivered) => {
                Some(ReleaseReason::Delivered)
            }
            _ => None,
        }
    }

    pub fn age_minutes(&self) -> i64 {
        self.age.num_minutes()
    }
}
