//! Orders domain module.
//!
//! This crate contains the order model as read from the marketplace store and
//! the reservation classification rules, implemented purely as deterministic
//! domain logic (no IO, no storage). Orders are read-only input to the engine.

pub mod classify;
pub mod order;

pub use classify::{ClassifiedOrder, ExpiryPolicy, ReleaseReason, ReservationClass};
pub use order::{Order, OrderLine, OrderStatus};
