//! Error taxonomy for the ordering pipeline.
//!
//! Provider adapters use `anyhow` internally; the orchestrator and the
//! browser automation surface typed errors so callers can tell a
//! precondition failure from a per-line locator failure.

use thiserror::Error;

/// Errors raised by the browser automation surface.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// The browser or page has not been initialized.
    #[error("browser automation is not initialized")]
    NotReady,

    #[error("no open restaurant matching {0:?}")]
    RestaurantNotFound(String),

    #[error("no menu items found for {0:?}")]
    EmptyMenu(String),

    #[error("timed out waiting for {0}")]
    PageLoadTimeout(String),

    /// A menu item or UI control could not be found within bounded retries.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// Another ordering flow holds the browser.
    #[error("browser is busy with another order")]
    Busy,

    #[error("webdriver: {0}")]
    Driver(String),
}

impl AutomationError {
    pub fn driver(err: impl std::fmt::Display) -> Self {
        Self::Driver(err.to_string())
    }
}

/// Errors surfaced by the pipeline entry points.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("either text or audio input is required")]
    EmptyInput,

    #[error("speech processing failed: {0:#}")]
    Transcription(anyhow::Error),

    #[error(transparent)]
    Automation(#[from] AutomationError),
}

pub type AutomationResult<T> = std::result::Result<T, AutomationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn automation_error_converts_into_pipeline_error() {
        let err: PipelineError = AutomationError::RestaurantNotFound("Wendy's".into()).into();
        assert_eq!(err.to_string(), "no open restaurant matching \"Wendy's\"");
    }

    #[test]
    fn transcription_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection refused").context("recognize request failed");
        let err = PipelineError::Transcription(inner);
        assert_eq!(
            err.to_string(),
            "speech processing failed: recognize request failed: connection refused"
        );
    }
}
