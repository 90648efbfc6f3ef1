//! Streaming speech synthesis over server-sent events

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::StreamExt;

use super::{AudioChunkStream, Synthesizer, sse_data_lines};
use crate::{Error, Result};

/// One SSE event from the streaming TTS endpoint
#[derive(serde::Deserialize)]
struct TtsStreamEvent {
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    error: Option<TtsStreamError>,
    #[serde(default)]
    recoverable: bool,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(serde::Deserialize)]
struct TtsStreamError {
    #[serde(default)]
    message: String,
}

enum Event {
    Audio(Vec<u8>),
    Done,
    Skip,
    Fatal(String),
}

/// Synthesizer backed by a streaming TTS endpoint emitting base64 PCM16
pub struct SseSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    speed: f32,
}

impl SseSynthesizer {
    /// Create a synthesizer for the given streaming endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(endpoint: String, api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("synthesis API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            speed: 1.0,
        })
    }

    /// Adjust the speaking rate
    #[must_use]
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }
}

#[async_trait]
impl Synthesizer for SseSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<AudioChunkStream> {
        #[derive(serde::Serialize)]
        struct SynthesisRequest<'a> {
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        tracing::debug!(voice, chars = text.len(), "starting synthesis");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&SynthesisRequest {
                input: text,
                voice,
                speed: self.speed,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "synthesis request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "synthesis API error");
            return Err(Error::Synthesis(format!(
                "synthesis API error {status}: {body}"
            )));
        }

        let chunks = sse_data_lines(response)
            .map(|line| line.map(|data| parse_event(&data)))
            .take_while(|item| {
                let done = matches!(item, Ok(Event::Done));
                futures::future::ready(!done)
            })
            .filter_map(|item| async move {
                match item {
                    Err(e) => Some(Err(e)),
                    Ok(Event::Audio(pcm)) => Some(Ok(pcm)),
                    Ok(Event::Fatal(message)) => Some(Err(Error::Synthesis(message))),
                    Ok(Event::Skip | Event::Done) => None,
                }
            })
            .boxed();

        Ok(chunks)
    }
}

/// Classify one SSE payload: audio chunk, recoverable hiccup, fatal
/// error, or end of stream
fn parse_event(data: &str) -> Event {
    let Ok(event) = serde_json::from_str::<TtsStreamEvent>(data) else {
        return Event::Skip;
    };

    if let Some(error) = event.error {
        if event.recoverable {
            tracing::warn!(message = %error.message, "recoverable synthesis event");
            return Event::Skip;
        }
        return Event::Fatal(error.message);
    }

    if event.kind.as_deref() == Some("done") {
        return Event::Done;
    }

    if let Some(audio) = event.audio {
        return match BASE64.decode(audio) {
            Ok(pcm) => Event::Audio(pcm),
            Err(e) => Event::Fatal(format!("invalid base64 audio payload: {e}")),
        };
    }

    Event::Skip
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_event_decodes_base64() {
        let pcm = vec![0u8, 1, 2, 3];
        let data = format!(r#"{{"audio":"{}"}}"#, BASE64.encode(&pcm));
        match parse_event(&data) {
            Event::Audio(decoded) => assert_eq!(decoded, pcm),
            _ => panic!("expected audio event"),
        }
    }

    #[test]
    fn done_event_terminates() {
        assert!(matches!(parse_event(r#"{"type":"done"}"#), Event::Done));
    }

    #[test]
    fn recoverable_error_skipped_fatal_surfaced() {
        let recoverable = r#"{"error":{"message":"blip"},"recoverable":true}"#;
        assert!(matches!(parse_event(recoverable), Event::Skip));

        let fatal = r#"{"error":{"message":"voice not found"},"recoverable":false}"#;
        match parse_event(fatal) {
            Event::Fatal(message) => assert_eq!(message, "voice not found"),
            _ => panic!("expected fatal event"),
        }
    }

    #[test]
    fn invalid_base64_is_fatal() {
        assert!(matches!(
            parse_event(r#"{"audio":"!!not-base64!!"}"#),
            Event::Fatal(_)
        ));
    }

    #[test]
    fn unknown_events_skipped() {
        assert!(matches!(parse_event(r#"{"progress":0.5}"#), Event::Skip));
        assert!(matches!(parse_event("garbage"), Event::Skip));
    }
}
