//! Mock speech provider for testing.
//!
//! Replays scripted transcripts in order, one per `transcribe` call.
//! When the script runs out every call reports no speech.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::time::sleep;

use crate::speech::{AudioInput, SpeechProvider, Transcript};

/// One scripted response.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Silence,
    Failure(String),
}

/// Mock provider that replays scripted transcripts.
pub struct MockSpeechProvider {
    replies: Mutex<VecDeque<MockReply>>,
    latency: Duration,
}

impl MockSpeechProvider {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            latency: Duration::ZERO,
        }
    }

    /// Script plain transcripts.
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| MockReply::Text(t.into())).collect())
    }

    /// Set simulated recognition latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SpeechProvider for MockSpeechProvider {
    async fn transcribe(&self, _audio: &AudioInput) -> Result<Transcript> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        let next = match self.replies.lock() {
            Ok(mut q) => q.pop_front(),
            Err(_) => bail!("mock speech script poisoned"),
        };
        match next {
            Some(MockReply::Text(t)) => Ok(Transcript::Speech(t)),
            Some(MockReply::Silence) | None => Ok(Transcript::NoSpeech),
            Some(MockReply::Failure(msg)) => bail!(msg),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio() -> AudioInput {
        AudioInput {
            bytes: vec![0; 16],
            encoding: "LINEAR16".into(),
            sample_rate_hz: 16000,
        }
    }

    #[tokio::test]
    async fn replays_in_order_then_silence() {
        let provider = MockSpeechProvider::with_texts(["first", "second"]);
        assert_eq!(
            provider.transcribe(&audio()).await.unwrap(),
            Transcript::Speech("first".into())
        );
        assert_eq!(
            provider.transcribe(&audio()).await.unwrap(),
            Transcript::Speech("second".into())
        );
        assert_eq!(provider.transcribe(&audio()).await.unwrap(), Transcript::NoSpeech);
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn scripted_failure_is_error() {
        let provider = MockSpeechProvider::new(vec![MockReply::Failure("mic unplugged".into())]);
        let err = provider.transcribe(&audio()).await.unwrap_err();
        assert_eq!(err.to_string(), "mic unplugged");
    }
}
