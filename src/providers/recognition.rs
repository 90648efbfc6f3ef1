//! Speech recognition over HTTP

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;

use super::{Recognizer, Transcription};
use crate::{Error, Result};

/// Response from a Whisper-style transcription endpoint
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Recognizer backed by a Whisper-style `/audio/transcriptions` endpoint
pub struct HttpRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpRecognizer {
    /// Create a recognizer for the given endpoint base URL
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(endpoint: String, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "recognition API key required".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<Transcription> {
        tracing::debug!(audio_bytes = audio.len(), language, "starting transcription");
        let started = Instant::now();

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Recognition(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", language.to_string())
            .text("response_format", "json");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.endpoint))
            .header("Authorization", format!("Key {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "recognition request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "recognition API error");
            return Err(Error::Recognition(format!(
                "recognition API error {status}: {body}"
            )));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse transcription response");
            e
        })?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            transcript = %result.text,
            elapsed_ms = format!("{elapsed_ms:.0}"),
            "transcription complete"
        );

        Ok(Transcription {
            text: result.text,
            elapsed_ms,
        })
    }
}

/// Phrases recognition models invent on silence or background noise
const DEFAULT_IGNORE_PHRASES: &[&str] = &[
    "Thank you.",
    "Thanks for watching.",
    "Thanks for watching!",
    "Please subscribe.",
    "Goodbye.",
    "See you.",
    "MBC",
    "Subtitles by",
    "...",
    ".",
];

/// Filters out transcripts that recognizers hallucinate on silence
///
/// Applied between recognition and fragment buffering so invented
/// phrases never reach the conversation.
#[derive(Debug, Clone)]
pub struct TranscriptFilter {
    ignore: HashSet<String>,
}

impl Default for TranscriptFilter {
    fn default() -> Self {
        Self {
            ignore: DEFAULT_IGNORE_PHRASES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl TranscriptFilter {
    /// Create a filter with the default ignore set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter with a custom ignore set
    #[must_use]
    pub fn with_phrases(phrases: impl IntoIterator<Item = String>) -> Self {
        Self {
            ignore: phrases.into_iter().collect(),
        }
    }

    /// Whether a transcript looks invented rather than spoken
    #[must_use]
    pub fn is_hallucination(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.chars().count() < 2 {
            return true;
        }
        if self.ignore.contains(trimmed) {
            return true;
        }
        let lower = trimmed.to_lowercase();
        lower.contains("subtitle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_tiny_transcripts_rejected() {
        let filter = TranscriptFilter::new();
        assert!(filter.is_hallucination(""));
        assert!(filter.is_hallucination("   "));
        assert!(filter.is_hallucination("a"));
    }

    #[test]
    fn known_phrases_rejected() {
        let filter = TranscriptFilter::new();
        assert!(filter.is_hallucination("Thanks for watching."));
        assert!(filter.is_hallucination("  Goodbye.  "));
    }

    #[test]
    fn subtitle_markers_rejected() {
        let filter = TranscriptFilter::new();
        assert!(filter.is_hallucination("Subtitles by the community"));
        assert!(filter.is_hallucination("english subtitles available"));
    }

    #[test]
    fn real_speech_accepted() {
        let filter = TranscriptFilter::new();
        assert!(!filter.is_hallucination("How much for the sword?"));
        assert!(!filter.is_hallucination("Hi"));
    }

    #[test]
    fn custom_phrase_set() {
        let filter = TranscriptFilter::with_phrases(vec!["lorem ipsum".to_string()]);
        assert!(filter.is_hallucination("lorem ipsum"));
        assert!(!filter.is_hallucination("Thanks for watching."));
    }
}
