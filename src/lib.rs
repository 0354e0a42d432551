//! voxorder - voice-driven food ordering
//!
//! This crate provides:
//! - Speech transcription and LLM oracle provider abstractions
//! - Order resolution against a live-scraped menu catalog
//! - Multi-turn clarification sessions
//! - Browser automation that scrapes menus and fills the cart
//! - HTTP server exposing the pipeline

pub mod automation;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod oracle;
pub mod order;
pub mod pipeline;
pub mod resolution;
pub mod server;
pub mod session;
pub mod speech;
pub mod text;
pub mod utils;

pub use config::Config;
pub use error::{AutomationError, PipelineError};
pub use pipeline::{OrderPipeline, PipelineInput, PipelineResponse, Runtime};
