//! Context snapshot types describing the learner's on-screen state.

use crate::transcript::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// One recent exchange, kept as lightweight context for the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

/// The exercise currently open in the host UI.
///
/// `correct_answer` is only consulted for answer checking; it is never
/// embedded in any prompt sent to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseSnapshot {
    pub question: String,
    pub topic: String,
    pub subtopic: String,
    pub difficulty: Difficulty,
    pub draft_answer: Option<String>,
    pub correct_answer: Option<String>,
    pub attempts: u32,
    pub hints: Vec<String>,
    pub last_feedback: Option<String>,
}

impl ExerciseSnapshot {
    pub fn new(
        question: impl Into<String>,
        topic: impl Into<String>,
        subtopic: impl Into<String>,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            question: question.into(),
            topic: topic.into(),
            subtopic: subtopic.into(),
            difficulty,
            draft_answer: None,
            correct_answer: None,
            attempts: 0,
            hints: Vec::new(),
            last_feedback: None,
        }
    }
}

/// Structured summary of the learner's current state, injected into the
/// agent's system prompt at session start. `exercise: None` is the empty
/// variant used when nothing is open on screen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub student_name: Option<String>,
    pub exercise: Option<ExerciseSnapshot>,
    pub recent_turns: Vec<ConversationTurn>,
}

/// Snapshot slot shared between the host UI, the prompt builder and the
/// tool router. The host writes; this crate only reads.
pub type SharedSnapshot = Arc<RwLock<ContextSnapshot>>;

impl ContextSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_exercise(&self) -> bool {
        self.exercise.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_display_and_serde_agree() {
        assert_eq!(Difficulty::Medium.to_string(), "medium");
        assert_eq!(serde_json::to_string(&Difficulty::Hard).unwrap(), "\"hard\"");
        let parsed: Difficulty = serde_json::from_str("\"easy\"").unwrap();
        assert_eq!(parsed, Difficulty::Easy);
    }

    #[test]
    fn empty_snapshot_has_no_exercise() {
        let snapshot = ContextSnapshot::empty();
        assert!(!snapshot.has_exercise());
        assert!(snapshot.student_name.is_none());
        assert!(snapshot.recent_turns.is_empty());
    }

    #[test]
    fn exercise_constructor_starts_unattempted() {
        let exercise = ExerciseSnapshot::new("Solve x + 1 = 2", "algebra", "linear equations", Difficulty::Easy);
        assert_eq!(exercise.attempts, 0);
        assert!(exercise.hints.is_empty());
        assert!(exercise.correct_answer.is_none());
    }
}
