//! Order resolution: parsed lines + catalog → three-bucket partition.

pub mod engine;

pub use engine::{ResolutionEngine, carry_forward, enforce_partition, reconcile_with_catalog};
