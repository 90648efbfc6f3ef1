//! Out-of-order utterance fragment reassembly
//!
//! Long utterances arrive as independently recognized fragments that may
//! land in any order. Fragments are buffered per session keyed by their
//! position, callers may wait briefly for gaps to fill, and `finalize`
//! consumes the session and joins the texts in order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// One recognized fragment of an utterance
#[derive(Debug, Clone)]
pub struct FragmentResult {
    pub text: String,
    /// Recognition latency for this fragment, in milliseconds
    pub recognition_ms: f64,
}

/// Gap-wait tuning for [`UtteranceReassembler::await_contiguous`]
#[derive(Debug, Clone)]
pub struct ReassemblyConfig {
    /// How long to wait for missing fragments before giving up
    pub gap_timeout: Duration,
    /// Interval between re-checks of the session
    pub poll_interval: Duration,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            gap_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Buffers utterance fragments per session until finalized
#[derive(Debug, Default)]
pub struct UtteranceReassembler {
    sessions: Mutex<HashMap<String, BTreeMap<u32, FragmentResult>>>,
    config: ReassemblyConfig,
}

impl UtteranceReassembler {
    /// Create a reassembler with default gap-wait tuning
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reassembler with explicit gap-wait tuning
    #[must_use]
    pub fn with_config(config: ReassemblyConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Store a fragment, overwriting any previous fragment at the same
    /// index. Creates the session lazily.
    pub fn add_fragment(
        &self,
        session_id: &str,
        index: u32,
        text: impl Into<String>,
        recognition_ms: f64,
    ) {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions.entry(session_id.to_string()).or_default().insert(
            index,
            FragmentResult {
                text: text.into(),
                recognition_ms,
            },
        );
    }

    /// Indices currently buffered for a session, empty if absent
    #[must_use]
    pub fn indices(&self, session_id: &str) -> BTreeSet<u32> {
        let sessions = self
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions
            .get(session_id)
            .map(|frags| frags.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Wait until the session's indices form a contiguous `[min, max]`
    /// range, or until the gap timeout elapses.
    ///
    /// Returns immediately for an empty or unknown session. The lock is
    /// released between polls so recognizers can keep adding fragments.
    /// On timeout the remaining gaps are accepted and logged.
    pub async fn await_contiguous(&self, session_id: &str) {
        let deadline = Instant::now() + self.config.gap_timeout;

        loop {
            let missing = self.missing_indices(session_id);
            if missing.is_empty() {
                return;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    session_id,
                    missing = ?missing,
                    "gap wait timed out; finalizing with missing fragments"
                );
                return;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn missing_indices(&self, session_id: &str) -> Vec<u32> {
        let sessions = self
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(frags) = sessions.get(session_id) else {
            return Vec::new();
        };
        let (Some(&min), Some(&max)) = (frags.keys().next(), frags.keys().next_back()) else {
            return Vec::new();
        };
        (min..=max).filter(|i| !frags.contains_key(i)).collect()
    }

    /// Consume the session: join fragment texts in ascending index order
    /// with single spaces and return the highest-index fragment's
    /// recognition latency. Returns `("", None)` for an unknown session,
    /// so a second call after finalize yields nothing.
    pub fn finalize(&self, session_id: &str) -> (String, Option<f64>) {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(frags) = sessions.remove(session_id) else {
            return (String::new(), None);
        };

        let last_ms = frags.values().next_back().map(|f| f.recognition_ms);
        let text = frags
            .values()
            .map(|f| f.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        tracing::debug!(
            session_id,
            fragments = frags.len(),
            chars = text.len(),
            "utterance finalized"
        );

        (text, last_ms)
    }
}
