//! Two-stage reply pipeline
//!
//! Generation and synthesis overlap: a control task cuts the delta
//! stream into sentences and queues them, a synthesis task turns each
//! sentence into PCM chunks, and the output loop tags chunks with a
//! global index and forwards them to the caller. The first sentence's
//! audio plays while later sentences are still being generated.
//!
//! End of stream is signalled by closing channels, and a caller that
//! drops the event stream makes every downstream send fail, unwinding
//! all stages.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::audio::{SAMPLE_RATE, pcm_to_wav};
use crate::history::ConversationStore;
use crate::providers::{GenerationRequest, ReplyGenerator, Synthesizer};
use crate::segment::{ReplyMetadata, SegmenterOutcome, SentenceSegmenter, SentenceUnit};
use crate::{Error, Result};

/// Stream of pipeline events delivered to the caller
pub type ReplyStream = ReceiverStream<PipelineEvent>;

/// Channel capacities for the pipeline stages
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Sentences buffered between generation and synthesis
    pub sentence_buffer: usize,
    /// PCM chunks buffered between synthesis and the caller
    pub audio_buffer: usize,
    /// Events buffered toward the caller
    pub event_buffer: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            sentence_buffer: 16,
            audio_buffer: 32,
            event_buffer: 32,
        }
    }
}

/// One reply turn: who speaks, with which voice, from which prompt
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    /// Entity whose history receives this exchange
    pub entity_id: String,
    /// Voice id passed to the synthesizer
    pub voice: String,
    /// Prebuilt prompt, see [`crate::character::build_reply_request`]
    pub generation: GenerationRequest,
    /// Player line to append to history before generation; `None` for
    /// character-initiated turns
    pub user_text: Option<String>,
    /// Recognition latency to surface in the metadata event
    pub recognition_ms: Option<f64>,
}

/// Events emitted by one pipeline run, in order: one `Metadata`, then
/// `Audio` chunks, then exactly one `Done`
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// First event: stream parameters for the player
    Metadata {
        entity_id: String,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
        user_text: Option<String>,
        recognition_ms: Option<f64>,
    },
    /// One PCM16 chunk; indices are gap-free from 1
    Audio {
        chunk_index: u64,
        pcm: Vec<u8>,
        /// Time from pipeline start to this chunk, set on the first only
        first_audio_ms: Option<f64>,
    },
    /// Terminal event with the run's totals
    Done(PipelineSummary),
}

/// Totals for one pipeline run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PipelineSummary {
    /// Full spoken reply text
    pub reply_text: String,
    pub metadata: ReplyMetadata,
    /// Generation wall time, delta stream start to finish
    pub generation_ms: f64,
    pub first_sentence_ms: Option<f64>,
    pub sentence_count: u64,
    /// Synthesis stage wall time
    pub synthesis_ms: f64,
    pub first_audio_ms: Option<f64>,
    pub chunk_count: u64,
    /// Whole run wall time
    pub total_ms: f64,
    /// Stream-level failure, if any; per-sentence failures are only logged
    pub error: Option<String>,
}

/// Orchestrates generation, segmentation, and synthesis for reply turns
pub struct VoicePipeline {
    history: Arc<ConversationStore>,
    generator: Arc<dyn ReplyGenerator>,
    synthesizer: Arc<dyn Synthesizer>,
    options: PipelineOptions,
}

impl VoicePipeline {
    /// Create a pipeline over the given providers and history store
    pub fn new(
        history: Arc<ConversationStore>,
        generator: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            history,
            generator,
            synthesizer,
            options: PipelineOptions::default(),
        }
    }

    /// Override the stage channel capacities
    #[must_use]
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Run one reply turn, returning its event stream
    ///
    /// The stream yields one `Metadata` event, the reply's audio chunks,
    /// and one terminal `Done`. Provider failures after this call
    /// returns are reported in the `Done` summary, not as stream errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty entity id or prompt
    pub fn run(&self, request: ReplyRequest) -> Result<ReplyStream> {
        if request.entity_id.trim().is_empty() {
            return Err(Error::Validation("entity id must not be empty".to_string()));
        }
        if request.generation.prompt.trim().is_empty() {
            return Err(Error::Validation("prompt must not be empty".to_string()));
        }

        let started = Instant::now();

        if let Some(user_text) = &request.user_text {
            self.history.append_user(&request.entity_id, user_text.clone());
        }

        let (sentence_tx, sentence_rx) = mpsc::channel::<SentenceUnit>(self.options.sentence_buffer);
        let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(self.options.audio_buffer);
        let (event_tx, event_rx) = mpsc::channel::<PipelineEvent>(self.options.event_buffer);

        let control = tokio::spawn(control_stage(
            Arc::clone(&self.generator),
            request.generation.clone(),
            sentence_tx,
        ));
        let synthesis = tokio::spawn(synthesis_stage(
            Arc::clone(&self.synthesizer),
            request.voice.clone(),
            sentence_rx,
            audio_tx,
        ));

        let history = Arc::clone(&self.history);
        tokio::spawn(output_stage(OutputStage {
            request,
            started,
            history,
            audio_rx,
            event_tx,
            control,
            synthesis,
        }));

        Ok(ReceiverStream::new(event_rx))
    }

    /// Run one reply turn to completion and return the whole clip
    ///
    /// Drains the event stream, concatenates the PCM, and wraps it in a
    /// WAV container. Useful for callers without streaming playback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an invalid request,
    /// [`Error::Generation`] if the stream ends without a summary, or
    /// [`Error::Audio`] if WAV framing fails
    pub async fn run_to_clip(&self, request: ReplyRequest) -> Result<(Vec<u8>, PipelineSummary)> {
        let mut events = self.run(request)?;

        let mut pcm = Vec::new();
        let mut summary = None;
        while let Some(event) = events.next().await {
            match event {
                PipelineEvent::Metadata { .. } => {}
                PipelineEvent::Audio { pcm: chunk, .. } => pcm.extend_from_slice(&chunk),
                PipelineEvent::Done(s) => summary = Some(s),
            }
        }

        let summary = summary
            .ok_or_else(|| Error::Generation("pipeline ended without a summary".to_string()))?;
        let wav = pcm_to_wav(&pcm, SAMPLE_RATE)?;
        Ok((wav, summary))
    }
}

/// Pull generation deltas, cut sentences, queue them for synthesis
async fn control_stage(
    generator: Arc<dyn ReplyGenerator>,
    request: GenerationRequest,
    sentence_tx: mpsc::Sender<SentenceUnit>,
) -> (SegmenterOutcome, Option<String>) {
    let mut segmenter = SentenceSegmenter::new();
    let mut stream_error = None;

    match generator.generate_stream(&request).await {
        Ok(mut deltas) => {
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(text) => {
                        for unit in segmenter.push(&text) {
                            tracing::debug!(index = unit.index, text = %unit.text, "sentence ready");
                            if sentence_tx.send(unit).await.is_err() {
                                // downstream gone; stop generating
                                return (segmenter.finish().1, stream_error);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "generation stream failed");
                        stream_error = Some(e.to_string());
                        break;
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "generation could not start");
            stream_error = Some(e.to_string());
        }
    }

    let (final_unit, outcome) = segmenter.finish();
    if let Some(unit) = final_unit {
        tracing::debug!(index = unit.index, text = %unit.text, "final sentence ready");
        let _ = sentence_tx.send(unit).await;
    }
    // sentence_tx drops here, closing the queue
    (outcome, stream_error)
}

/// Synthesize queued sentences one at a time, forwarding PCM chunks
///
/// One sentence's chunks are fully drained before the next sentence is
/// pulled, so audio arrives in sentence order. Returns the stage's wall
/// time in milliseconds.
async fn synthesis_stage(
    synthesizer: Arc<dyn Synthesizer>,
    voice: String,
    mut sentence_rx: mpsc::Receiver<SentenceUnit>,
    audio_tx: mpsc::Sender<Vec<u8>>,
) -> f64 {
    let started = Instant::now();

    while let Some(sentence) = sentence_rx.recv().await {
        let mut chunks = match synthesizer.synthesize(&sentence.text, &voice).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!(
                    index = sentence.index,
                    error = %e,
                    "sentence synthesis failed, skipping"
                );
                continue;
            }
        };

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(pcm) => {
                    if audio_tx.send(pcm).await.is_err() {
                        // caller went away
                        return elapsed_ms(started);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        index = sentence.index,
                        error = %e,
                        "sentence audio stream failed, skipping rest of sentence"
                    );
                    break;
                }
            }
        }
    }

    elapsed_ms(started)
}

struct OutputStage {
    request: ReplyRequest,
    started: Instant,
    history: Arc<ConversationStore>,
    audio_rx: mpsc::Receiver<Vec<u8>>,
    event_tx: mpsc::Sender<PipelineEvent>,
    control: tokio::task::JoinHandle<(SegmenterOutcome, Option<String>)>,
    synthesis: tokio::task::JoinHandle<f64>,
}

/// Tag chunks with the global index, then assemble and emit the summary
async fn output_stage(stage: OutputStage) {
    let OutputStage {
        request,
        started,
        history,
        mut audio_rx,
        event_tx,
        control,
        synthesis,
    } = stage;

    let metadata_event = PipelineEvent::Metadata {
        entity_id: request.entity_id.clone(),
        sample_rate: SAMPLE_RATE,
        channels: 1,
        bits_per_sample: 16,
        user_text: request.user_text.clone(),
        recognition_ms: request.recognition_ms,
    };
    if event_tx.send(metadata_event).await.is_err() {
        return;
    }

    let mut chunk_index = 0u64;
    let mut first_audio_ms = None;

    while let Some(pcm) = audio_rx.recv().await {
        chunk_index += 1;
        let first = if chunk_index == 1 {
            let ms = elapsed_ms(started);
            tracing::info!(first_audio_ms = format!("{ms:.0}"), "first audio chunk");
            first_audio_ms = Some(ms);
            first_audio_ms
        } else {
            None
        };

        let event = PipelineEvent::Audio {
            chunk_index,
            pcm,
            first_audio_ms: first,
        };
        if event_tx.send(event).await.is_err() {
            // caller dropped the stream; closing audio_rx unwinds the
            // upstream stages through their failed sends
            tracing::debug!(entity_id = %request.entity_id, "reply stream cancelled");
            return;
        }
    }

    let (outcome, stream_error) = match control.await {
        Ok(result) => result,
        Err(e) => (
            SegmenterOutcome {
                text: String::new(),
                metadata: ReplyMetadata::default(),
                elapsed_ms: 0.0,
                first_unit_ms: None,
                unit_count: 0,
            },
            Some(format!("generation task failed: {e}")),
        ),
    };
    let synthesis_ms = synthesis.await.unwrap_or_default();

    if !outcome.text.is_empty() {
        history.append_agent(&request.entity_id, outcome.text.clone());
    }

    let summary = PipelineSummary {
        reply_text: outcome.text,
        metadata: outcome.metadata,
        generation_ms: outcome.elapsed_ms,
        first_sentence_ms: outcome.first_unit_ms,
        sentence_count: outcome.unit_count,
        synthesis_ms,
        first_audio_ms,
        chunk_count: chunk_index,
        total_ms: elapsed_ms(started),
        error: stream_error,
    };

    tracing::info!(
        entity_id = %request.entity_id,
        sentences = summary.sentence_count,
        chunks = summary.chunk_count,
        total_ms = format!("{:.0}", summary.total_ms),
        error = summary.error.as_deref().unwrap_or(""),
        "reply turn complete"
    );

    let _ = event_tx.send(PipelineEvent::Done(summary)).await;
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
