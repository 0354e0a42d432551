//! Speech-to-text providers.
//!
//! The transcription call is an opaque collaborator: audio bytes plus
//! encoding metadata in, best transcript (or "no speech") out.

pub mod google;
pub mod mock;

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SpeechConfig;

/// Recorded audio as uploaded by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInput {
    pub bytes: Vec<u8>,
    /// Provider encoding name, e.g. `"WEBM_OPUS"` or `"LINEAR16"`.
    pub encoding: String,
    pub sample_rate_hz: u32,
}

/// Result of one recognition call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Transcript {
    Speech(String),
    NoSpeech,
}

impl Transcript {
    pub fn text(&self) -> Option<&str> {
        match self {
            Transcript::Speech(t) => Some(t),
            Transcript::NoSpeech => None,
        }
    }
}

/// Speech-to-text provider.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Recognize a complete utterance.
    async fn transcribe(&self, audio: &AudioInput) -> Result<Transcript>;

    /// Human-readable provider name.
    fn name(&self) -> &str;
}

/// Create a [`SpeechProvider`] from configuration.
///
/// Supported `provider` values:
/// - `"google"`: Google Cloud Speech-to-Text REST API.
/// - `"mock"`: scripted provider that never hears anything.
pub fn create_speech_provider(config: &SpeechConfig) -> Result<Arc<dyn SpeechProvider>> {
    match config.provider.as_str() {
        "google" => Ok(Arc::new(google::GoogleSpeechProvider::new(
            config.google.clone(),
            crate::config::duration_or(&config.timeout, std::time::Duration::from_secs(20)),
        )?)),
        "mock" => Ok(Arc::new(mock::MockSpeechProvider::new(vec![]))),
        other => bail!("unknown speech provider: {other:?} (expected \"google\" or \"mock\")"),
    }
}
