//! Text-understanding oracles.
//!
//! Two opaque text → structured-data capabilities sit behind traits:
//! extraction (utterance → [`ParsedOrder`]) and resolution
//! (parsed order + catalog → [`ResolutionBucketSet`]).  The policy the
//! resolver must follow lives in [`prompt`]; the engine in
//! [`crate::resolution`] owns post-processing.

pub mod llm;
pub mod prompt;
pub mod rules;
pub mod sanitize;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::OracleConfig;
use crate::order::{MenuCatalogEntry, ParsedOrder, ResolutionBucketSet};

/// Input to the extraction oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub text: String,
    /// Restaurant already known from context (e.g. an open session).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant: Option<String>,
    /// Structured order from the previous turn, for follow-ups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_order: Option<ParsedOrder>,
}

/// Input to the resolution oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub parsed_order: ParsedOrder,
    pub menu_catalog: Vec<MenuCatalogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_resolution: Option<ResolutionBucketSet>,
    /// Raw utterance, so exclusion language survives extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utterance: Option<String>,
}

/// Utterance → structured order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ParsedOrder>;
}

/// Parsed order + catalog → three-bucket resolution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResolutionOracle: Send + Sync {
    async fn resolve(&self, request: &ResolutionRequest) -> Result<ResolutionBucketSet>;
}

/// Both capabilities selected by configuration.
#[derive(Clone)]
pub struct Oracles {
    pub name: String,
    pub extractor: Arc<dyn ExtractionOracle>,
    pub resolver: Arc<dyn ResolutionOracle>,
}

/// Create the configured oracles.
///
/// Supported `provider` values:
/// - `"openai"`: any OpenAI-compatible chat-completions endpoint.
/// - `"rules"`: deterministic rule-based matcher, no network.
pub fn create_oracles(config: &OracleConfig) -> Result<Oracles> {
    match config.provider.as_str() {
        "openai" => {
            let llm = Arc::new(llm::LlmOracle::new(config)?);
            Ok(Oracles {
                name: "openai".to_string(),
                extractor: llm.clone(),
                resolver: llm,
            })
        }
        "rules" => {
            let rules = Arc::new(rules::RulesOracle::new());
            Ok(Oracles {
                name: "rules".to_string(),
                extractor: rules.clone(),
                resolver: rules,
            })
        }
        other => bail!("unknown oracle provider: {other:?} (expected \"openai\" or \"rules\")"),
    }
}

/// Run extraction under a deadline, degrading any failure to an empty
/// order.  Quantities below one are coerced to one.
pub async fn extract_or_empty(
    oracle: &dyn ExtractionOracle,
    request: &ExtractionRequest,
    deadline: Duration,
) -> ParsedOrder {
    let mut order = match tokio::time::timeout(deadline, oracle.extract(request)).await {
        Ok(Ok(order)) => order,
        Ok(Err(e)) => {
            warn!("Extraction failed, treating as empty order: {:#}", e);
            return ParsedOrder::empty();
        }
        Err(_) => {
            warn!(deadline_ms = deadline.as_millis() as u64, "Extraction timed out");
            return ParsedOrder::empty();
        }
    };
    order.items.retain(|line| !line.item.trim().is_empty());
    for line in &mut order.items {
        line.item = line.item.trim().to_string();
        line.quantity = line.quantity.max(1);
    }
    order.restaurant = order
        .restaurant
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    order
}
