//! Streaming reply generation over server-sent events

use async_trait::async_trait;
use futures::StreamExt;

use super::{GenerationRequest, ReplyGenerator, TextDeltaStream, sse_data_lines};
use crate::{Error, Result};

/// One SSE chunk from a `streamGenerateContent`-style endpoint
#[derive(serde::Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(serde::Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(serde::Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(serde::Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: String,
}

#[derive(serde::Serialize)]
struct GeneratePayload {
    contents: Vec<serde_json::Value>,
    #[serde(rename = "generationConfig")]
    generation_config: serde_json::Value,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<serde_json::Value>,
}

/// Reply generator backed by a `streamGenerateContent?alt=sse` endpoint
pub struct SseGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    seed: Option<u64>,
}

impl SseGenerator {
    /// Create a generator for the given endpoint base URL and model
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(endpoint: String, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("generation API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            seed: None,
        })
    }

    /// Pin the sampling seed for reproducible replies
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn payload(&self, request: &GenerationRequest) -> GeneratePayload {
        let mut generation_config = serde_json::json!({
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
            "thinkingConfig": { "thinkingBudget": 0 },
        });
        if let Some(seed) = self.seed {
            generation_config["seed"] = serde_json::json!(seed);
        }

        let system_instruction = (!request.system_prompt.is_empty()).then(|| {
            serde_json::json!({ "parts": [{ "text": request.system_prompt }] })
        });

        GeneratePayload {
            contents: vec![serde_json::json!({
                "role": "user",
                "parts": [{ "text": request.prompt }],
            })],
            generation_config,
            system_instruction,
        }
    }
}

#[async_trait]
impl ReplyGenerator for SseGenerator {
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<TextDeltaStream> {
        let url = format!(
            "{}/{}:streamGenerateContent?alt=sse&key={}",
            self.endpoint, self.model, self.api_key
        );

        tracing::debug!(
            model = %self.model,
            prompt_chars = request.prompt.len(),
            "starting reply generation"
        );

        let response = self
            .client
            .post(&url)
            .json(&self.payload(request))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "generation request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "generation API error");
            return Err(Error::Generation(format!(
                "generation API error {status}: {body}"
            )));
        }

        let deltas = sse_data_lines(response)
            .filter_map(|line| async move {
                match line {
                    Err(e) => Some(Err(e)),
                    Ok(data) => extract_delta(&data).map(Ok),
                }
            })
            .boxed();

        Ok(deltas)
    }
}

/// Pull the text delta out of one SSE payload; unparseable or empty
/// chunks are skipped, matching lenient SSE consumers
fn extract_delta(data: &str) -> Option<String> {
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    let text = &chunk.candidates.first()?.content.parts.first()?.text;
    (!text.is_empty()).then(|| text.clone())
}
