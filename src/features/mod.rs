//! Feature derivation and export
//!
//! Turns resolved performances and history windows into the fixed-width
//! feature rows consumed by the downstream classifier.

pub mod export;
pub mod extract;

pub use extract::{extract, FeatureRow, HistorySlot};
