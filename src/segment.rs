//! Streaming sentence segmentation
//!
//! Model output arrives as arbitrary text deltas. The segmenter cuts the
//! stream into complete sentences as soon as their boundaries appear, so
//! synthesis can start before generation finishes. A trailing
//! `<novoice>` region carries machine-readable metadata that is parsed
//! instead of spoken.

use std::time::Instant;

/// Sentence-ending punctuation that, followed by whitespace, marks a boundary
const BOUNDARY_CHARS: [char; 4] = ['.', '!', '?', '…'];

/// Opening delimiter of the unspoken metadata region
const META_OPEN: &str = "<novoice>";

/// Closing delimiter of the unspoken metadata region
const META_CLOSE: &str = "</novoice>";

/// A complete sentence cut from the delta stream
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SentenceUnit {
    /// Position in the reply, gap-free from 0
    pub index: u64,
    pub text: String,
    /// Set on the unit flushed at end of stream
    pub is_final: bool,
}

/// A parsed metadata value
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl MetaValue {
    fn parse(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<i64>() {
            return Self::Integer(n);
        }
        if let Ok(n) = raw.parse::<f64>() {
            return Self::Decimal(n);
        }
        Self::Text(raw.to_string())
    }

    /// The value as text, when it is one
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a number, widening integers
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Decimal(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

/// Key/value metadata parsed from the `<novoice>` region
///
/// Keys are lowercased; insertion order is preserved and unknown keys
/// are kept for callers with richer vocabularies.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct ReplyMetadata {
    entries: Vec<(String, MetaValue)>,
}

impl ReplyMetadata {
    /// Parse a metadata region body: `key:value` fields separated by `|`
    #[must_use]
    pub fn parse(region: &str) -> Self {
        let body = region
            .split(META_CLOSE)
            .next()
            .unwrap_or_default()
            .trim();

        let mut entries = Vec::new();
        for field in body.split('|') {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();
            if key.is_empty() {
                continue;
            }
            entries.push((key, MetaValue::parse(value)));
        }
        Self { entries }
    }

    /// Look up a value by lowercased key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// The character's declared action, when present
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.get("action").and_then(MetaValue::as_text)
    }

    /// A quoted price, when present
    #[must_use]
    pub fn price(&self) -> Option<f64> {
        self.get("price").and_then(MetaValue::as_number)
    }

    /// The character's mood, when present
    #[must_use]
    pub fn mood(&self) -> Option<&str> {
        self.get("mood").and_then(MetaValue::as_text)
    }

    /// A free-form note, when present
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.get("note").and_then(MetaValue::as_text)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Where the segmenter currently routes incoming text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    /// Accumulating spoken text, watching for boundaries
    Normal,
    /// Inside the metadata region; everything goes to the metadata buffer
    InMetadata,
}

/// Result of a finished segmentation run
#[derive(Debug, Clone)]
pub struct SegmenterOutcome {
    /// Everything routed to speech, whitespace-trimmed
    pub text: String,
    pub metadata: ReplyMetadata,
    /// Wall time from construction to `finish`, in milliseconds
    pub elapsed_ms: f64,
    /// Wall time to the first emitted unit, when any was emitted
    pub first_unit_ms: Option<f64>,
    pub unit_count: u64,
}

/// Incremental sentence cutter over a stream of text deltas
#[derive(Debug)]
pub struct SentenceSegmenter {
    state: SegmentState,
    buffer: String,
    meta_buffer: String,
    spoken: String,
    next_index: u64,
    started: Instant,
    first_unit_ms: Option<f64>,
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SentenceSegmenter {
    /// Start a segmentation run; the run clock starts now
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SegmentState::Normal,
            buffer: String::new(),
            meta_buffer: String::new(),
            spoken: String::new(),
            next_index: 0,
            started: Instant::now(),
            first_unit_ms: None,
        }
    }

    /// Feed one delta, returning any sentences completed by it
    ///
    /// The metadata delimiter is searched on the accumulated buffer, so
    /// a delimiter split across deltas is still found.
    pub fn push(&mut self, delta: &str) -> Vec<SentenceUnit> {
        match self.state {
            SegmentState::InMetadata => {
                self.meta_buffer.push_str(delta);
                Vec::new()
            }
            SegmentState::Normal => {
                self.buffer.push_str(delta);

                if let Some(pos) = self.buffer.find(META_OPEN) {
                    let after = self.buffer[pos + META_OPEN.len()..].to_string();
                    self.buffer.truncate(pos);
                    self.state = SegmentState::InMetadata;
                    self.meta_buffer = after;

                    // nothing further arrives as speech, so the remainder
                    // after the last boundary is emitted now as well
                    let mut units = self.drain_complete();
                    let remainder = std::mem::take(&mut self.buffer);
                    if let Some(unit) = self.make_unit(&remainder, false) {
                        units.push(unit);
                    }
                    units
                } else {
                    self.drain_complete()
                }
            }
        }
    }

    /// Cut every complete sentence off the front of the buffer
    fn drain_complete(&mut self) -> Vec<SentenceUnit> {
        let mut sentences = Vec::new();
        let mut start = 0;
        let mut iter = self.buffer.char_indices().peekable();

        while let Some((i, c)) = iter.next() {
            if BOUNDARY_CHARS.contains(&c) {
                if let Some(&(_, next)) = iter.peek() {
                    if next.is_whitespace() {
                        let end = i + c.len_utf8();
                        sentences.push(self.buffer[start..end].to_string());
                        start = end;
                    }
                }
            }
        }
        drop(iter);

        if start > 0 {
            self.buffer.drain(..start);
        }
        sentences
            .iter()
            .filter_map(|sentence| self.make_unit(sentence, false))
            .collect()
    }

    /// Trim and index a candidate sentence; whitespace-only text yields
    /// nothing and consumes no index
    fn make_unit(&mut self, text: &str, is_final: bool) -> Option<SentenceUnit> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if !self.spoken.is_empty() {
            self.spoken.push(' ');
        }
        self.spoken.push_str(trimmed);

        let index = self.next_index;
        self.next_index += 1;
        if self.first_unit_ms.is_none() {
            self.first_unit_ms = Some(elapsed_ms(self.started));
        }
        Some(SentenceUnit {
            index,
            text: trimmed.to_string(),
            is_final,
        })
    }

    /// End the run: flush any trailing speech as a final unit and parse
    /// the metadata region
    pub fn finish(mut self) -> (Option<SentenceUnit>, SegmenterOutcome) {
        let trailing = std::mem::take(&mut self.buffer);
        let final_unit = self.make_unit(&trailing, true);

        let metadata = if self.meta_buffer.is_empty() {
            ReplyMetadata::default()
        } else {
            ReplyMetadata::parse(&self.meta_buffer)
        };

        let outcome = SegmenterOutcome {
            text: self.spoken,
            metadata,
            elapsed_ms: elapsed_ms(self.started),
            first_unit_ms: self.first_unit_ms,
            unit_count: self.next_index,
        };
        (final_unit, outcome)
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(segmenter: &mut SentenceSegmenter, deltas: &[&str]) -> Vec<SentenceUnit> {
        deltas
            .iter()
            .flat_map(|d| segmenter.push(d))
            .collect()
    }

    #[test]
    fn sentences_cut_at_punctuation_before_whitespace() {
        let mut seg = SentenceSegmenter::new();
        let units = seg.push("Hello there. How are you? Fine");

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "Hello there.");
        assert_eq!(units[1].text, "How are you?");

        let (final_unit, outcome) = seg.finish();
        let final_unit = final_unit.unwrap();
        assert_eq!(final_unit.text, "Fine");
        assert!(final_unit.is_final);
        assert_eq!(outcome.unit_count, 3);
    }

    #[test]
    fn boundary_split_across_deltas_is_found() {
        let mut seg = SentenceSegmenter::new();
        assert!(seg.push("Hold on.").is_empty());
        let units = seg.push(" I will check.");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "Hold on.");
    }

    #[test]
    fn decimal_numbers_do_not_split() {
        let mut seg = SentenceSegmenter::new();
        let units = seg.push("It costs 3.50 gold. Take it");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "It costs 3.50 gold.");
    }

    #[test]
    fn indices_are_gap_free_from_zero() {
        let mut seg = SentenceSegmenter::new();
        let units = push_all(&mut seg, &["One. ", "Two! ", "Three? "]);
        let indices: Vec<u64> = units.iter().map(|u| u.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn whitespace_only_trailing_buffer_consumes_no_index() {
        let mut seg = SentenceSegmenter::new();
        let units = seg.push("Done. ");
        assert_eq!(units.len(), 1);

        let (final_unit, outcome) = seg.finish();
        assert!(final_unit.is_none());
        assert_eq!(outcome.unit_count, 1);
    }

    #[test]
    fn metadata_region_is_unspoken_and_parsed() {
        let mut seg = SentenceSegmenter::new();
        let units = seg.push("Hello there. Fine!<novoice>price:10|mood: happy</novoice>");

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "Hello there.");
        assert_eq!(units[1].text, "Fine!");

        let (final_unit, outcome) = seg.finish();
        assert!(final_unit.is_none());
        assert_eq!(outcome.text, "Hello there. Fine!");
        assert_eq!(outcome.metadata.price(), Some(10.0));
        assert_eq!(outcome.metadata.mood(), Some("happy"));
    }

    #[test]
    fn metadata_delimiter_split_across_deltas() {
        let mut seg = SentenceSegmenter::new();
        assert!(seg.push("Farewell<novo").is_empty());
        let units = seg.push("ice>action:leave</novoice>");

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "Farewell");

        let (_, outcome) = seg.finish();
        assert_eq!(outcome.metadata.action(), Some("leave"));
    }

    #[test]
    fn everything_after_open_delimiter_is_swallowed() {
        let mut seg = SentenceSegmenter::new();
        seg.push("Done.<novoice>note:bye</novoice>");
        let units = seg.push("This. Never! Speaks?");
        assert!(units.is_empty());

        let (_, outcome) = seg.finish();
        assert_eq!(outcome.text, "Done.");
        assert_eq!(outcome.metadata.note(), Some("bye"));
    }

    #[test]
    fn metadata_values_typed_by_shape() {
        let meta = ReplyMetadata::parse("price:12|discount:0.5|mood:wary|odd_field:yes:no");
        assert_eq!(meta.get("price"), Some(&MetaValue::Integer(12)));
        assert_eq!(meta.get("discount"), Some(&MetaValue::Decimal(0.5)));
        assert_eq!(meta.get("mood"), Some(&MetaValue::Text("wary".to_string())));
        // split_once keeps everything after the first colon
        assert_eq!(
            meta.get("odd_field"),
            Some(&MetaValue::Text("yes:no".to_string()))
        );
    }

    #[test]
    fn metadata_keys_lowercased_and_unknown_kept() {
        let meta = ReplyMetadata::parse("Mood:calm|GIFT_ITEM:rose");
        assert_eq!(meta.mood(), Some("calm"));
        assert_eq!(
            meta.get("gift_item"),
            Some(&MetaValue::Text("rose".to_string()))
        );
        assert_eq!(meta.len(), 2);
    }

    #[test]
    fn malformed_metadata_fields_are_skipped() {
        let meta = ReplyMetadata::parse("no_colon_here|mood:fine|:orphan");
        assert_eq!(meta.len(), 1);
        assert_eq!(meta.mood(), Some("fine"));
    }

    #[test]
    fn delta_granularity_does_not_change_units() {
        let text = "First one. Second two! Third three?<novoice>mood:even</novoice>";

        let mut whole = SentenceSegmenter::new();
        let mut whole_units = whole.push(text);
        let (f, whole_out) = whole.finish();
        whole_units.extend(f);

        let mut chopped = SentenceSegmenter::new();
        let mut chopped_units: Vec<SentenceUnit> = text
            .chars()
            .map(String::from)
            .flat_map(|c| chopped.push(&c))
            .collect();
        let (f, chopped_out) = chopped.finish();
        chopped_units.extend(f);

        let texts = |units: &[SentenceUnit]| {
            units.iter().map(|u| u.text.clone()).collect::<Vec<_>>()
        };
        assert_eq!(texts(&whole_units), texts(&chopped_units));
        assert_eq!(whole_out.text, chopped_out.text);
        assert_eq!(whole_out.metadata, chopped_out.metadata);
    }

    #[test]
    fn empty_stream_yields_no_units() {
        let seg = SentenceSegmenter::new();
        let (final_unit, outcome) = seg.finish();
        assert!(final_unit.is_none());
        assert_eq!(outcome.unit_count, 0);
        assert_eq!(outcome.text, "");
        assert!(outcome.first_unit_ms.is_none());
    }

    #[test]
    fn ellipsis_is_a_boundary() {
        let mut seg = SentenceSegmenter::new();
        let units = seg.push("Well… maybe. So");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "Well…");
        assert_eq!(units[1].text, "maybe.");
    }
}
