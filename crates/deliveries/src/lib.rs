//! Deliveries domain module.
//!
//! Delivery records, the duplicate-delivery resolver (at most one delivery per
//! order), and the delivery status census. Pure, deterministic logic (no IO).
//! Nothing here touches stock: duplicates are a data-quality defect orthogonal
//! to reservation accounting.

pub mod census;
pub mod delivery;
pub mod duplicates;

pub use census::DeliveryCensus;
pub use delivery::{DeliveriesByOrder, Delivery};
pub use duplicates::{DuplicateGroup, DuplicateResolution, resolve_duplicates};
