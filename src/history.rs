//! In-memory conversation history store

use std::collections::HashMap;
use std::sync::Mutex;

/// Who said a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Ordered message log for one entity
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationRecord {
    pub entity_id: String,
    pub messages: Vec<Message>,
}

/// Thread-safe per-entity conversation log
///
/// The lock guards only map edits and is never held across an await
/// point; reads return cloned snapshots.
#[derive(Debug, Default)]
pub struct ConversationStore {
    records: Mutex<HashMap<String, ConversationRecord>>,
}

/// Max characters of a message quoted in cross-entity summaries
const PREVIEW_CHARS: usize = 80;

impl ConversationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user message to an entity's log, creating it if needed
    pub fn append_user(&self, entity_id: &str, text: impl Into<String>) {
        self.append(entity_id, Role::User, text.into());
    }

    /// Append an agent message to an entity's log, creating it if needed
    pub fn append_agent(&self, entity_id: &str, text: impl Into<String>) {
        self.append(entity_id, Role::Agent, text.into());
    }

    fn append(&self, entity_id: &str, role: Role, content: String) {
        let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let record = records
            .entry(entity_id.to_string())
            .or_insert_with(|| ConversationRecord {
                entity_id: entity_id.to_string(),
                messages: Vec::new(),
            });
        record.messages.push(Message { role, content });
    }

    /// Snapshot of an entity's messages, empty if unknown
    #[must_use]
    pub fn messages(&self, entity_id: &str) -> Vec<Message> {
        let records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records
            .get(entity_id)
            .map(|r| r.messages.clone())
            .unwrap_or_default()
    }

    /// Snapshot of every record keyed by entity id
    #[must_use]
    pub fn all_records(&self) -> HashMap<String, ConversationRecord> {
        let records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.clone()
    }

    /// Remove an entity's record, returning whether it existed
    pub fn clear(&self, entity_id: &str) -> bool {
        let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.remove(entity_id).is_some()
    }

    /// Remove every record
    pub fn clear_all(&self) {
        let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.clear();
    }

    /// Number of entities with a record
    #[must_use]
    pub fn len(&self) -> usize {
        let records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.len()
    }

    /// Whether the store has no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One line per other entity with history: message count and a short
    /// preview of its latest message. Empty string when nothing to report.
    #[must_use]
    pub fn summarize_others(&self, exclude_entity_id: &str) -> String {
        let records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut lines: Vec<String> = Vec::new();
        let mut ids: Vec<&String> = records.keys().collect();
        ids.sort();

        for id in ids {
            if id == exclude_entity_id {
                continue;
            }
            let record = &records[id];
            let Some(last) = record.messages.last() else {
                continue;
            };
            lines.push(format!(
                "{id}: {} messages, last: \"{}\"",
                record.messages.len(),
                truncate_chars(&last.content, PREVIEW_CHARS)
            ));
        }

        lines.join("\n")
    }
}

/// Truncate to at most `max` chars, appending an ellipsis when cut
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}…")
}
