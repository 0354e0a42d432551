//! Google Cloud Speech-to-Text provider.
//!
//! Communicates via REST API: `POST /v1/speech:recognize`.
//!
//! Flow:
//! 1. Base64-encode the uploaded audio
//! 2. Send it with encoding / sample-rate / language config
//! 3. Take the first alternative of every result, joined by newlines
//! 4. No results → [`Transcript::NoSpeech`]

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GoogleSpeechConfig;
use crate::speech::{AudioInput, SpeechProvider, Transcript};
use crate::utils::preview;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'a str,
    sample_rate_hertz: u32,
    language_code: &'a str,
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(Debug, Deserialize)]
struct RecognitionAlternative {
    #[serde(default)]
    transcript: String,
}

/// Google Speech-to-Text provider using the synchronous recognize API.
pub struct GoogleSpeechProvider {
    config: GoogleSpeechConfig,
    client: reqwest::Client,
}

impl GoogleSpeechProvider {
    pub fn new(config: GoogleSpeechConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build speech HTTP client")?;
        Ok(Self { config, client })
    }

    /// Join the best alternative of every result.
    fn collect_transcript(response: RecognizeResponse) -> Transcript {
        let text = response
            .results
            .into_iter()
            .filter_map(|r| r.alternatives.into_iter().next())
            .map(|a| a.transcript.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            Transcript::NoSpeech
        } else {
            Transcript::Speech(text)
        }
    }
}

#[async_trait]
impl SpeechProvider for GoogleSpeechProvider {
    async fn transcribe(&self, audio: &AudioInput) -> Result<Transcript> {
        let base = self.config.endpoint.trim_end_matches('/');
        let encoding = if audio.encoding.is_empty() {
            self.config.encoding.as_str()
        } else {
            audio.encoding.as_str()
        };
        let sample_rate_hertz = if audio.sample_rate_hz == 0 {
            self.config.sample_rate_hz
        } else {
            audio.sample_rate_hz
        };

        let body = RecognizeRequest {
            config: RecognitionConfig {
                encoding,
                sample_rate_hertz,
                language_code: &self.config.language_code,
            },
            audio: RecognitionAudio {
                content: BASE64.encode(&audio.bytes),
            },
        };

        let response: RecognizeResponse = self
            .client
            .post(format!("{}/v1/speech:recognize", base))
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("recognize request failed")?
            .error_for_status()
            .context("recognize returned error status")?
            .json()
            .await
            .context("failed to parse recognize response as JSON")?;

        let transcript = Self::collect_transcript(response);
        debug!(
            bytes = audio.bytes.len(),
            transcript = %transcript.text().map(|t| preview(t, 80)).unwrap_or_default(),
            "Google recognition complete"
        );
        Ok(transcript)
    }

    fn name(&self) -> &str {
        "google"
    }
}
