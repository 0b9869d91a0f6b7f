//! Ordered transcript of a tutoring conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Tutor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Tutor => write!(f, "tutor"),
        }
    }
}

/// A single utterance in the session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub seq: u64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Transcript store shared between the controller and the tool router.
pub type SharedTranscript = Arc<Mutex<TranscriptStore>>;

/// Append-only message log for one session.
///
/// Sequence positions increase strictly in the order events arrive from
/// the transport. The only permitted mutation is the single-slot
/// correction of the most recent tutor utterance.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    entries: Vec<TranscriptMessage>,
    next_seq: u64,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns its sequence position.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(TranscriptMessage {
            seq,
            role,
            content: content.into(),
            created_at: Utc::now(),
        });
        seq
    }

    /// Rewrites the nearest preceding tutor message, scanning backward
    /// from the end of the log. Student messages appended after it are
    /// left untouched; correction events may arrive out of order with
    /// respect to the student's own speech. Returns `false` when no
    /// tutor message exists yet.
    pub fn correct_last(&mut self, new_content: impl Into<String>) -> bool {
        match self.entries.iter_mut().rev().find(|m| m.role == Role::Tutor) {
            Some(message) => {
                message.content = new_content.into();
                true
            }
            None => false,
        }
    }

    /// The most recent tutor utterance, if any.
    pub fn last_tutor_utterance(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|m| m.role == Role::Tutor)
            .map(|m| m.content.as_str())
    }

    /// Full ordered log, cloned for the persistence collaborator.
    pub fn export(&self) -> Vec<TranscriptMessage> {
        self.entries.clone()
    }

    pub fn messages(&self) -> &[TranscriptMessage] {
        &self.entries
    }

    /// Resets the log for the next session.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_positions_match_arrival_order() {
        let mut store = TranscriptStore::new();
        for i in 0..100u64 {
            let role = if i % 2 == 0 { Role::Student } else { Role::Tutor };
            let seq = store.append(role, format!("utterance {i}"));
            assert_eq!(seq, i);
        }
        assert_eq!(store.len(), 100);
        for (i, message) in store.messages().iter().enumerate() {
            assert_eq!(message.seq, i as u64);
        }
    }

    #[test]
    fn correction_rewrites_nearest_tutor_message() {
        let mut store = TranscriptStore::new();
        store.append(Role::Tutor, "What is x?");
        store.append(Role::Student, "um, four?");

        assert!(store.correct_last("What is x here?"));

        let messages = store.messages();
        assert_eq!(messages[0].content, "What is x here?");
        assert_eq!(messages[0].role, Role::Tutor);
        assert_eq!(messages[1].content, "um, four?");
    }

    #[test]
    fn correction_without_tutor_message_is_a_noop() {
        let mut store = TranscriptStore::new();
        store.append(Role::Student, "hello?");
        assert!(!store.correct_last("ignored"));
        assert_eq!(store.messages()[0].content, "hello?");
    }

    #[test]
    fn correction_does_not_reorder_entries() {
        let mut store = TranscriptStore::new();
        store.append(Role::Tutor, "a");
        store.append(Role::Tutor, "b");
        store.append(Role::Student, "c");
        store.correct_last("b-fixed");

        let contents: Vec<&str> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a", "b-fixed", "c"]);
    }

    #[test]
    fn clear_resets_sequence_numbering() {
        let mut store = TranscriptStore::new();
        store.append(Role::Student, "first session");
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.append(Role::Student, "second session"), 0);
    }

    #[test]
    fn last_tutor_utterance_skips_student_messages() {
        let mut store = TranscriptStore::new();
        assert!(store.last_tutor_utterance().is_none());
        store.append(Role::Tutor, "try factoring");
        store.append(Role::Student, "okay");
        assert_eq!(store.last_tutor_utterance(), Some("try factoring"));
    }

    #[test]
    fn message_serialization_round_trips() {
        let mut store = TranscriptStore::new();
        store.append(Role::Tutor, "Let's begin.");
        let exported = store.export();

        let json = serde_json::to_string(&exported[0]).unwrap();
        assert!(json.contains("\"tutor\""));
        assert!(json.contains("Let's begin."));

        let parsed: TranscriptMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.role, Role::Tutor);
        assert_eq!(parsed.seq, 0);
    }
}
