//! Process-wide concurrency primitives.

pub mod order_gate;

pub use order_gate::OrderGate;
