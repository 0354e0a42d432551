//! Pipeline orchestrator.
//!
//! One dialogue turn: transcription → extraction → (scrape) → resolution
//! → clarification bookkeeping.  Order placement is a separate entry
//! point that takes the confident bucket back from the caller.

mod e2e_test;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::automation::{AutomationSession, BrowserSession, FakeSite, PageDriver, SiteSelectors, WebDriverPage};
use crate::config::{Config, duration_or};
use crate::error::PipelineError;
use crate::oracle::{ExtractionOracle, ExtractionRequest, create_oracles, extract_or_empty};
use crate::order::{
    ConfidentMatch, OrderPlacementResult, ParsedOrder, ResolutionBucketSet, ResolutionSummary,
};
use crate::resolution::ResolutionEngine;
use crate::session::{ClarificationMachine, SessionId, SessionStore, TurnOutcome};
use crate::speech::{AudioInput, SpeechProvider, Transcript, create_speech_provider};
use crate::utils::preview;

pub const NO_SPEECH: &str = "No speech detected";
pub const NO_ITEMS: &str = "No items found in order";
pub const NO_RESTAURANT: &str = "Which restaurant should I order from?";

/// One turn's input.  Text wins over audio when both are present.
#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    pub text: Option<String>,
    pub audio: Option<AudioInput>,
    pub session_id: Option<SessionId>,
    pub restaurant: Option<String>,
}

/// What the caller gets back for one turn.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResponse {
    pub transcript: String,
    pub parsed_order: ParsedOrder,
    pub resolution: ResolutionBucketSet,
    pub summary: ResolutionSummary,
    pub session_id: Option<SessionId>,
    pub needs_clarification: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant: Option<String>,
    pub message: String,
}

impl PipelineResponse {
    fn soft(transcript: String, parsed: ParsedOrder, session_id: Option<SessionId>, message: &str) -> Self {
        let resolution = ResolutionBucketSet::default();
        Self {
            transcript,
            restaurant: parsed.restaurant.clone(),
            parsed_order: parsed,
            summary: resolution.summary(),
            resolution,
            needs_clarification: session_id.is_some(),
            session_id,
            attempts: 0,
            message: message.to_string(),
        }
    }

    fn from_turn(transcript: String, parsed: ParsedOrder, turn: TurnOutcome) -> Self {
        let message = describe(&turn.resolution);
        Self {
            transcript,
            parsed_order: parsed,
            summary: turn.resolution.summary(),
            needs_clarification: turn.session_id.is_some(),
            resolution: turn.resolution,
            session_id: turn.session_id,
            attempts: turn.attempts,
            restaurant: turn.restaurant,
            message,
        }
    }
}

/// Human-readable line for a resolution: the open questions first.
fn describe(set: &ResolutionBucketSet) -> String {
    if set.is_empty() {
        return NO_ITEMS.to_string();
    }
    let mut parts: Vec<String> = set
        .needs_clarification
        .iter()
        .map(|c| c.clarification_question.clone())
        .collect();
    for missing in &set.not_found {
        let mut line = format!("I couldn't find \"{}\" on the menu.", missing.requested_item);
        if let Some(s) = missing.suggestion.as_deref().filter(|s| !s.is_empty()) {
            line.push_str(&format!(" Did you mean {}?", s));
        }
        parts.push(line);
    }
    if parts.is_empty() {
        let items: u32 = set.confident.iter().map(|m| m.quantity).sum();
        return format!("Order ready: {} item{}", items, if items == 1 { "" } else { "s" });
    }
    parts.join(" ")
}

pub struct OrderPipeline {
    speech: Arc<dyn SpeechProvider>,
    extractor: Arc<dyn ExtractionOracle>,
    machine: ClarificationMachine,
    automation: Arc<dyn AutomationSession>,
    extraction_deadline: Duration,
}

impl OrderPipeline {
    pub fn new(
        speech: Arc<dyn SpeechProvider>,
        extractor: Arc<dyn ExtractionOracle>,
        machine: ClarificationMachine,
        automation: Arc<dyn AutomationSession>,
        extraction_deadline: Duration,
    ) -> Self {
        Self {
            speech,
            extractor,
            machine,
            automation,
            extraction_deadline,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.machine.store()
    }

    pub fn automation(&self) -> &Arc<dyn AutomationSession> {
        &self.automation
    }

    /// Run one dialogue turn.
    pub async fn process(&self, input: PipelineInput) -> Result<PipelineResponse, PipelineError> {
        let text = match self.utterance(&input).await? {
            Some(text) => text,
            None => {
                // Silence keeps an open dialogue open.
                let session_id = input.session_id.filter(|id| self.sessions().contains(id));
                return Ok(PipelineResponse::soft(
                    NO_SPEECH.to_string(),
                    ParsedOrder::empty(),
                    session_id,
                    NO_SPEECH,
                ));
            }
        };
        info!(text = %preview(&text, 120), session = ?input.session_id, "Processing order turn");

        if let Some(id) = &input.session_id {
            if let Some(response) = self.follow_up(id, &text).await {
                return Ok(response);
            }
            debug!(session_id = %id, "Unknown or expired session, starting a new order");
        }
        self.new_order(text, input.restaurant).await
    }

    /// Transcript text, or `None` when the audio held no speech.
    async fn utterance(&self, input: &PipelineInput) -> Result<Option<String>, PipelineError> {
        if let Some(text) = input.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(Some(text.to_string()));
        }
        let audio = match &input.audio {
            Some(audio) if !audio.bytes.is_empty() => audio,
            _ => return Err(PipelineError::EmptyInput),
        };
        let transcript = self
            .speech
            .transcribe(audio)
            .await
            .map_err(PipelineError::Transcription)?;
        Ok(match transcript {
            Transcript::Speech(t) if !t.trim().is_empty() => Some(t.trim().to_string()),
            _ => None,
        })
    }

    async fn follow_up(&self, id: &SessionId, text: &str) -> Option<PipelineResponse> {
        let (restaurant, prior) = {
            let handle = self.sessions().get(id)?;
            let session = handle.lock().await;
            (session.restaurant.clone(), session.original_request.clone())
        };
        let request = ExtractionRequest {
            text: text.to_string(),
            restaurant: restaurant.clone(),
            prior_order: Some(prior),
        };
        let mut parsed = extract_or_empty(self.extractor.as_ref(), &request, self.extraction_deadline).await;
        parsed.restaurant = restaurant;
        let turn = self.machine.resume(id, &parsed, text).await?;
        Some(PipelineResponse::from_turn(text.to_string(), parsed, turn))
    }

    async fn new_order(&self, text: String, hint: Option<String>) -> Result<PipelineResponse, PipelineError> {
        let hint = hint.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        let request = ExtractionRequest {
            text: text.clone(),
            restaurant: hint.clone(),
            prior_order: None,
        };
        let mut parsed = extract_or_empty(self.extractor.as_ref(), &request, self.extraction_deadline).await;
        if parsed.restaurant.is_none() {
            parsed.restaurant = hint;
        }
        if parsed.is_empty() {
            return Ok(PipelineResponse::soft(text, parsed, None, NO_ITEMS));
        }
        let Some(restaurant) = parsed.restaurant.clone() else {
            warn!("Order names no restaurant");
            return Ok(PipelineResponse::soft(text, parsed, None, NO_RESTAURANT));
        };

        let catalog = self.automation.scrape_catalog(&restaurant).await?;
        let turn = self
            .machine
            .start(&parsed, Some(restaurant), Arc::new(catalog), &text)
            .await;
        Ok(PipelineResponse::from_turn(text, parsed, turn))
    }

    /// Put the confident lines into the site's cart.
    pub async fn place_order(
        &self,
        restaurant: &str,
        items: &[ConfidentMatch],
    ) -> Result<OrderPlacementResult, PipelineError> {
        if items.is_empty() {
            return Ok(OrderPlacementResult::from_lines(vec![]));
        }
        Ok(self.automation.place_order(restaurant, items).await?)
    }
}

/// Everything `serve`, `order` and `menu` need, built from configuration.
pub struct Runtime {
    pub pipeline: Arc<OrderPipeline>,
    pub browser: Arc<BrowserSession>,
    /// Present when driving a real browser, so it can be closed on exit.
    pub webdriver: Option<Arc<WebDriverPage>>,
}

impl Runtime {
    pub async fn build(config: &Config) -> Result<Self> {
        let speech = create_speech_provider(&config.speech)?;
        let oracles = create_oracles(&config.oracle)?;
        let deadline = duration_or(&config.oracle.timeout, Duration::from_secs(30));

        let engine = Arc::new(ResolutionEngine::new(oracles.resolver.clone(), deadline));
        let store = Arc::new(SessionStore::from_config(&config.session));
        let machine = ClarificationMachine::new(store, engine);

        let mut browser_config = config.clone();
        let (driver, webdriver): (Arc<dyn PageDriver>, Option<Arc<WebDriverPage>>) =
            match config.browser.driver.as_str() {
                "webdriver" => {
                    let page = Arc::new(
                        WebDriverPage::connect(&config.browser)
                            .await
                            .context("failed to start browser session")?,
                    );
                    (page.clone(), Some(page))
                }
                "demo" => {
                    let site = FakeSite::demo();
                    browser_config.browser.site = site.site_config();
                    (Arc::new(site), None)
                }
                other => bail!("unknown browser driver: {other:?} (expected \"webdriver\" or \"demo\")"),
            };

        let browser = Arc::new(BrowserSession::from_config(
            driver,
            SiteSelectors::default(),
            &browser_config,
        ));

        info!(
            speech = speech.name(),
            oracle = %oracles.name,
            driver = %config.browser.driver,
            "Pipeline assembled"
        );
        let pipeline = Arc::new(OrderPipeline::new(
            speech,
            oracles.extractor,
            machine,
            browser.clone(),
            deadline,
        ));
        Ok(Self {
            pipeline,
            browser,
            webdriver,
        })
    }

    /// Close the real browser, if any.
    pub async fn shutdown(&self) {
        if let Some(page) = &self.webdriver {
            if let Err(e) = page.close().await {
                warn!("Failed to close browser session: {}", e);
            }
        }
    }
}
