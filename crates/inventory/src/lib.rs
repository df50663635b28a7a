//! Inventory reservation accounting.
//!
//! This crate contains the reservation rules, implemented purely as
//! deterministic domain logic (no IO, no storage):
//!
//! - [`ledger`]: what *should* be held and what *must* be released, computed
//!   directly from classified orders (never by subtracting from a stored
//!   counter, which may already be corrupt)
//! - [`discrepancy`]: bounded corrections against stored `reservedStock`

pub mod discrepancy;
pub mod ledger;

pub use discrepancy::{CorrectionRecord, DataAnomaly, Discrepancies, compute_corrections};
pub use ledger::{ClassCounts, ReleaseDemand, ReleasedOrder, ReservationLedger};
