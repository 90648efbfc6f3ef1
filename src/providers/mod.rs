//! Remote provider interfaces
//!
//! The pipeline talks to speech recognition, reply generation, and
//! speech synthesis through narrow traits so tests can substitute mocks
//! and deployments can swap vendors. Reference HTTP implementations
//! live in the submodules.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::{Error, Result};

pub mod generation;
pub mod recognition;
pub mod synthesis;

pub use generation::SseGenerator;
pub use recognition::{HttpRecognizer, TranscriptFilter};
pub use synthesis::SseSynthesizer;

/// Stream of reply text deltas from a generator
pub type TextDeltaStream = BoxStream<'static, Result<String>>;

/// Finite stream of raw PCM16 chunks for one sentence
pub type AudioChunkStream = BoxStream<'static, Result<Vec<u8>>>;

/// A recognized utterance fragment with its latency
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub elapsed_ms: f64,
}

/// Inputs for one reply generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Converts speech audio to text
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribe a WAV-framed audio clip
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recognition`] if transcription fails, or
    /// [`Error::Http`] for transport-level failures
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<Transcription>;
}

/// Generates a character reply as a stream of text deltas
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Start a generation and return its delta stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`] if the generation cannot start, or
    /// [`Error::Http`] for transport-level failures; mid-stream
    /// failures arrive as `Err` items on the stream
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextDeltaStream>;
}

/// Synthesizes one sentence of speech as streamed PCM16 chunks
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Start synthesis for one sentence and return its chunk stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::Synthesis`] if synthesis cannot start, or
    /// [`Error::Http`] for transport-level failures
    async fn synthesize(&self, text: &str, voice: &str) -> Result<AudioChunkStream>;
}

/// Turn a server-sent-events response body into a stream of `data:`
/// payloads, one item per data line
pub(crate) fn sse_data_lines(response: reqwest::Response) -> BoxStream<'static, Result<String>> {
    struct State {
        body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
        buffer: String,
        pending: std::collections::VecDeque<String>,
        done: bool,
    }

    let state = State {
        body: response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
        buffer: String::new(),
        pending: std::collections::VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                return Some((Ok(line), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    while let Some(pos) = state.buffer.find('\n') {
                        let line: String =
                            state.buffer[..pos].trim_end_matches('\r').to_string();
                        state.buffer.drain(..=pos);
                        if let Some(payload) = line.strip_prefix("data:") {
                            state
                                .pending
                                .push_back(payload.strip_prefix(' ').unwrap_or(payload).to_string());
                        }
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(Error::from(e)), state));
                }
                None => {
                    // a trailing data line without a newline still counts
                    let line = std::mem::take(&mut state.buffer);
                    let line = line.trim_end_matches('\r');
                    if let Some(payload) = line.strip_prefix("data:") {
                        state
                            .pending
                            .push_back(payload.strip_prefix(' ').unwrap_or(payload).to_string());
                    }
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}
