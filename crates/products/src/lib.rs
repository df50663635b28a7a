//! Products domain module.
//!
//! Product stock records as stored by the catalog, the stock anomaly rules,
//! and the read-only stock health audit. Pure, deterministic logic (no IO).

pub mod audit;
pub mod product;

pub use audit::StockHealth;
pub use product::{ProductRecord, StockAnomaly};
