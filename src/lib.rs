//! Parley Gateway - Real-time voice conversation pipeline for virtual characters
//!
//! This library turns a player's spoken utterance into a synthesized
//! spoken reply from a game character, minimizing time to first audible
//! sound:
//! - Utterance reassembly from out-of-order recognized fragments
//! - Incremental sentence segmentation of a streamed reply
//! - Overlapped generation and synthesis with ordered audio delivery
//! - Per-character conversation history and prompt assembly
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Game Client                          │
//! │   audio fragments in  │  PCM16 chunk stream out     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Parley Gateway                        │
//! │  Reassembly │ History │ Segmenter │ Voice Pipeline  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Remote Providers                       │
//! │   Recognizer  │  ReplyGenerator  │  Synthesizer     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod character;
pub mod config;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod providers;
pub mod reassembly;
pub mod segment;

pub use audio::{SAMPLE_RATE, pcm_duration_secs, pcm_to_wav};
pub use character::{CharacterProfile, PromptOptions, build_opener_request, build_reply_request};
pub use config::{GatewayConfig, GenerationConfig, RecognitionConfig, SynthesisConfig};
pub use error::{Error, Result};
pub use history::{ConversationRecord, ConversationStore, Message, Role};
pub use pipeline::{
    PipelineEvent, PipelineOptions, PipelineSummary, ReplyRequest, ReplyStream, VoicePipeline,
};
pub use providers::{
    AudioChunkStream, GenerationRequest, HttpRecognizer, Recognizer, ReplyGenerator, SseGenerator,
    SseSynthesizer, Synthesizer, TextDeltaStream, Transcription, TranscriptFilter,
};
pub use reassembly::{FragmentResult, ReassemblyConfig, UtteranceReassembler};
pub use segment::{MetaValue, ReplyMetadata, SegmenterOutcome, SentenceSegmenter, SentenceUnit};
