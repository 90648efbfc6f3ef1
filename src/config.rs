//! Gateway configuration

use std::time::Duration;

use crate::reassembly::ReassemblyConfig;

/// Speech recognition provider settings
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Base URL of the transcription endpoint
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// BCP-47 language hint sent with each clip
    pub language: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "whisper-1".to_string(),
            language: "en".to_string(),
        }
    }
}

/// Reply generation provider settings
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Base URL of the models endpoint
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Pin the sampling seed when set
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            max_tokens: 400,
            seed: None,
        }
    }
}

/// Speech synthesis provider settings
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Streaming TTS endpoint URL
    pub endpoint: String,
    pub api_key: String,
    /// Default voice when a character does not name one
    pub voice: String,
    pub speed: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            voice: "alloy".to_string(),
            speed: 1.0,
        }
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub recognition: RecognitionConfig,
    pub generation: GenerationConfig,
    pub synthesis: SynthesisConfig,
    pub reassembly: ReassemblyConfig,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads `PARLEY_STT_ENDPOINT`, `PARLEY_STT_KEY`, `PARLEY_STT_MODEL`,
    /// `PARLEY_STT_LANGUAGE`, `PARLEY_LLM_ENDPOINT`, `PARLEY_LLM_KEY`,
    /// `PARLEY_LLM_MODEL`, `PARLEY_LLM_TEMPERATURE`, `PARLEY_LLM_MAX_TOKENS`,
    /// `PARLEY_LLM_SEED`, `PARLEY_TTS_ENDPOINT`, `PARLEY_TTS_KEY`,
    /// `PARLEY_TTS_VOICE`, `PARLEY_TTS_SPEED`, `PARLEY_GAP_TIMEOUT_MS`, and
    /// `PARLEY_GAP_POLL_MS`; unset variables keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            recognition: RecognitionConfig {
                endpoint: env_or("PARLEY_STT_ENDPOINT", defaults.recognition.endpoint),
                api_key: env_or("PARLEY_STT_KEY", defaults.recognition.api_key),
                model: env_or("PARLEY_STT_MODEL", defaults.recognition.model),
                language: env_or("PARLEY_STT_LANGUAGE", defaults.recognition.language),
            },
            generation: GenerationConfig {
                endpoint: env_or("PARLEY_LLM_ENDPOINT", defaults.generation.endpoint),
                api_key: env_or("PARLEY_LLM_KEY", defaults.generation.api_key),
                model: env_or("PARLEY_LLM_MODEL", defaults.generation.model),
                temperature: env_parsed("PARLEY_LLM_TEMPERATURE")
                    .unwrap_or(defaults.generation.temperature),
                max_tokens: env_parsed("PARLEY_LLM_MAX_TOKENS")
                    .unwrap_or(defaults.generation.max_tokens),
                seed: env_parsed::<u64>("PARLEY_LLM_SEED").filter(|&s| s > 0),
            },
            synthesis: SynthesisConfig {
                endpoint: env_or("PARLEY_TTS_ENDPOINT", defaults.synthesis.endpoint),
                api_key: env_or("PARLEY_TTS_KEY", defaults.synthesis.api_key),
                voice: env_or("PARLEY_TTS_VOICE", defaults.synthesis.voice),
                speed: env_parsed("PARLEY_TTS_SPEED").unwrap_or(defaults.synthesis.speed),
            },
            reassembly: ReassemblyConfig {
                gap_timeout: env_parsed("PARLEY_GAP_TIMEOUT_MS")
                    .map_or(defaults.reassembly.gap_timeout, Duration::from_millis),
                poll_interval: env_parsed("PARLEY_GAP_POLL_MS")
                    .map_or(defaults.reassembly.poll_interval, Duration::from_millis),
            },
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = GatewayConfig::default();
        assert_eq!(config.generation.max_tokens, 400);
        assert_eq!(config.reassembly.gap_timeout, Duration::from_secs(2));
        assert!(config.generation.seed.is_none());
    }

    #[test]
    #[allow(unsafe_code)]
    fn env_overrides_apply() {
        // env mutation kept to this one test
        unsafe {
            std::env::set_var("PARLEY_LLM_MODEL", "test-model");
            std::env::set_var("PARLEY_LLM_SEED", "7");
            std::env::set_var("PARLEY_GAP_TIMEOUT_MS", "500");
        }

        let config = GatewayConfig::from_env();
        assert_eq!(config.generation.model, "test-model");
        assert_eq!(config.generation.seed, Some(7));
        assert_eq!(config.reassembly.gap_timeout, Duration::from_millis(500));

        unsafe {
            std::env::remove_var("PARLEY_LLM_MODEL");
            std::env::remove_var("PARLEY_LLM_SEED");
            std::env::remove_var("PARLEY_GAP_TIMEOUT_MS");
        }
    }
}
