//! `stockwarden-core`: shared building blocks for the reconciliation engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! document identifiers, the run identifier, and the domain error model.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{DeliveryId, OrderId, ProductId, RunId};
