//! The closed set of agent-invocable actions and their dispatcher.
//!
//! Every invocation resolves to a non-empty, speech-appropriate string.
//! Failures in the content collaborators are absorbed here; nothing that
//! happens inside a tool handler ever crosses back over the wire as an
//! error.

use crate::{
    content::ContentService,
    events::{AppEvent, EventBus},
    exercise::{ExerciseSnapshot, SharedSnapshot},
    mathspeak,
    transcript::SharedTranscript,
};
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{info, warn};

/// Names the agent may invoke remotely. Closed by design: dispatch is a
/// single match, so the set of invocable actions is statically checkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolName {
    RequestEasierExercise,
    RequestHarderExercise,
    SolveCurrentExercise,
    GiveHint,
    CheckSubmittedAnswer,
    ExplainTheory,
    RepeatLastUtterance,
    SlowDown,
}

impl ToolName {
    /// Parses a wire-format tool name (camelCase).
    pub fn parse(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_string())).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::RequestEasierExercise => "requestEasierExercise",
            ToolName::RequestHarderExercise => "requestHarderExercise",
            ToolName::SolveCurrentExercise => "solveCurrentExercise",
            ToolName::GiveHint => "giveHint",
            ToolName::CheckSubmittedAnswer => "checkSubmittedAnswer",
            ToolName::ExplainTheory => "explainTheory",
            ToolName::RepeatLastUtterance => "repeatLastUtterance",
            ToolName::SlowDown => "slowDown",
        }
    }

    pub const ALL: [ToolName; 8] = [
        ToolName::RequestEasierExercise,
        ToolName::RequestHarderExercise,
        ToolName::SolveCurrentExercise,
        ToolName::GiveHint,
        ToolName::CheckSubmittedAnswer,
        ToolName::ExplainTheory,
        ToolName::RepeatLastUtterance,
        ToolName::SlowDown,
    ];
}

const ENCOURAGING_FALLBACK: &str =
    "I'm having a little trouble with that right now, but you're doing great. Let's keep working through it together.";

#[derive(Deserialize)]
struct CheckAnswerArgs {
    answer: String,
}

/// Routes remote tool invocations to local handlers.
pub struct ToolRouter {
    content: Arc<dyn ContentService>,
    bus: Arc<dyn EventBus>,
    snapshot: SharedSnapshot,
    transcript: SharedTranscript,
    content_timeout: Duration,
}

impl ToolRouter {
    pub fn new(
        content: Arc<dyn ContentService>,
        bus: Arc<dyn EventBus>,
        snapshot: SharedSnapshot,
        transcript: SharedTranscript,
        content_timeout: Duration,
    ) -> Self {
        Self {
            content,
            bus,
            snapshot,
            transcript,
            content_timeout,
        }
    }

    /// Dispatches one tool invocation. Always resolves to a non-empty
    /// spoken string; never panics, never returns an error.
    pub async fn invoke(&self, name: ToolName, args: &Value) -> String {
        info!(tool = name.as_str(), "executing tool");
        let spoken = match name {
            ToolName::RequestEasierExercise => {
                self.bus.publish(AppEvent::RequestEasier);
                "Sure. Let's take a small step back and try something a bit easier.".to_string()
            }
            ToolName::RequestHarderExercise => {
                self.bus.publish(AppEvent::RequestHarder);
                "Love the confidence! Let's find you something with more bite.".to_string()
            }
            ToolName::SolveCurrentExercise => self.solve_current().await,
            ToolName::GiveHint => self.give_hint().await,
            ToolName::CheckSubmittedAnswer => self.check_answer(args).await,
            ToolName::ExplainTheory => self.explain_theory().await,
            ToolName::RepeatLastUtterance => self.repeat_last().await,
            ToolName::SlowDown => {
                "Of course. We'll slow right down and take it one small step at a time.".to_string()
            }
        };
        if spoken.trim().is_empty() {
            ENCOURAGING_FALLBACK.to_string()
        } else {
            spoken
        }
    }

    async fn solve_current(&self) -> String {
        match self.current_exercise().await {
            Some(ex) => match self.guarded(self.content.solve_exercise(&ex.question)).await {
                Some(solution) => {
                    self.bus.publish(AppEvent::ShowSolution);
                    solution
                }
                None => ENCOURAGING_FALLBACK.to_string(),
            },
            None => "There's no exercise on screen yet. Pick one and I'll walk you through it.".to_string(),
        }
    }

    async fn give_hint(&self) -> String {
        match self.current_exercise().await {
            Some(ex) if !ex.hints.is_empty() => {
                // Escalate through the hint list as attempts pile up,
                // then stay on the strongest hint.
                let index = (ex.attempts as usize).min(ex.hints.len() - 1);
                self.bus.publish(AppEvent::HintShown { hint_number: index + 1 });
                format!("Here's hint {}: {}", index + 1, ex.hints[index])
            }
            Some(ex) => match self.guarded(self.content.fetch_hint(&ex.question, ex.attempts)).await {
                Some(hint) => hint,
                None => socratic_prompt(&ex.question),
            },
            None => {
                "We don't have an exercise open, but tell me what you're stuck on and we'll untangle it."
                    .to_string()
            }
        }
    }

    async fn check_answer(&self, args: &Value) -> String {
        let parsed: CheckAnswerArgs = match serde_json::from_value(args.clone()) {
            Ok(parsed) => parsed,
            Err(_) => {
                return "I didn't quite catch your answer. Could you say it one more time?".to_string();
            }
        };
        let stored = self
            .current_exercise()
            .await
            .and_then(|ex| ex.correct_answer);
        match stored {
            Some(correct) => {
                if mathspeak::normalize(&parsed.answer) == mathspeak::normalize(&correct) {
                    self.bus.publish(AppEvent::AnswerCorrect);
                    "That's exactly right. Well done! Ready for the next one?".to_string()
                } else {
                    self.bus.publish(AppEvent::AnswerIncorrect);
                    "Not quite, but you're close. Want to look at it from another angle?".to_string()
                }
            }
            None => {
                "I don't have the answer key for this one, but walk me through your reasoning and we'll check it together."
                    .to_string()
            }
        }
    }

    async fn explain_theory(&self) -> String {
        match self.current_exercise().await {
            Some(ex) => match self
                .guarded(self.content.explain_theory(&ex.topic, &ex.subtopic))
                .await
            {
                Some(explanation) => explanation,
                None => ENCOURAGING_FALLBACK.to_string(),
            },
            None => "Tell me which topic you'd like to hear about and I'll explain it.".to_string(),
        }
    }

    async fn repeat_last(&self) -> String {
        let last = {
            let transcript = self.transcript.lock().await;
            transcript.last_tutor_utterance().map(str::to_string)
        };
        match last {
            Some(text) => text,
            None => "I haven't said anything yet. Let's get started!".to_string(),
        }
    }

    async fn current_exercise(&self) -> Option<ExerciseSnapshot> {
        self.snapshot.read().await.exercise.clone()
    }

    /// Bounds a content-collaborator call and flattens every failure
    /// mode (error, timeout, empty output) into `None`.
    async fn guarded<F>(&self, call: F) -> Option<String>
    where
        F: Future<Output = anyhow::Result<String>>,
    {
        match tokio::time::timeout(self.content_timeout, call).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
            Ok(Ok(_)) => {
                warn!("content collaborator returned empty text");
                None
            }
            Ok(Err(error)) => {
                warn!(error = ?error, "content collaborator failed");
                None
            }
            Err(_) => {
                warn!(timeout_ms = self.content_timeout.as_millis() as u64, "content collaborator timed out");
                None
            }
        }
    }
}

/// Generic Socratic nudge for exercises with no stored hints, picked by
/// lightweight keyword matching on the question text.
fn socratic_prompt(question: &str) -> String {
    const PROMPTS: &[(&[&str], &str)] = &[
        (
            &["solve", "equation", "variable"],
            "What could you do to both sides of the equation to get the unknown by itself?",
        ),
        (
            &["fraction", "numerator", "denominator"],
            "What do the top and the bottom of the fraction each tell you?",
        ),
        (
            &["graph", "slope", "line"],
            "What happens to the line as x grows? Which direction does it move?",
        ),
        (
            &["percent", "percentage", "discount"],
            "Can you rewrite the percentage as a fraction of the whole?",
        ),
        (
            &["area", "perimeter", "triangle", "rectangle", "circle"],
            "Which lengths do you already know, and which formula connects them?",
        ),
    ];

    let lowered = question.to_lowercase();
    let matcher = SkimMatcherV2::default();
    PROMPTS
        .iter()
        .filter_map(|(keywords, prompt)| {
            keywords
                .iter()
                .filter_map(|keyword| matcher.fuzzy_match(&lowered, keyword))
                .max()
                .map(|score| (score, *prompt))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, prompt)| prompt.to_string())
        .unwrap_or_else(|| {
            "What do you already know that might apply here? Start with the first fact that stands out to you."
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::MockContentService,
        events::AppEvent,
        exercise::{ContextSnapshot, Difficulty, ExerciseSnapshot},
        transcript::{Role, TranscriptStore},
    };
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::{Mutex, RwLock};

    #[derive(Default)]
    struct RecordingBus(StdMutex<Vec<AppEvent>>);

    impl RecordingBus {
        fn events(&self) -> Vec<AppEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    impl EventBus for RecordingBus {
        fn publish(&self, event: AppEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    mockall::mock! {
        Content {}

        #[async_trait]
        impl ContentService for Content {
            async fn explain_theory(&self, topic: &str, subtopic: &str) -> anyhow::Result<String>;
            async fn solve_exercise(&self, question: &str) -> anyhow::Result<String>;
            async fn fetch_hint(&self, question: &str, attempt: u32) -> anyhow::Result<String>;
        }
    }

    /// Content service whose every call outlives any sane timeout.
    struct StalledContent;

    #[async_trait]
    impl ContentService for StalledContent {
        async fn explain_theory(&self, _topic: &str, _subtopic: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok("too late".to_string())
        }

        async fn solve_exercise(&self, _question: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok("too late".to_string())
        }

        async fn fetch_hint(&self, _question: &str, _attempt: u32) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok("too late".to_string())
        }
    }

    fn exercise(attempts: u32, hints: Vec<&str>) -> ExerciseSnapshot {
        let mut ex =
            ExerciseSnapshot::new("Solve 2x + 3 = 7", "algebra", "linear equations", Difficulty::Medium);
        ex.attempts = attempts;
        ex.hints = hints.into_iter().map(str::to_string).collect();
        ex.correct_answer = Some("2".to_string());
        ex
    }

    fn router_with(
        content: Arc<dyn ContentService>,
        snapshot: ContextSnapshot,
    ) -> (ToolRouter, Arc<RecordingBus>, SharedTranscript) {
        let bus = Arc::new(RecordingBus::default());
        let transcript: SharedTranscript = Arc::new(Mutex::new(TranscriptStore::new()));
        let router = ToolRouter::new(
            content,
            bus.clone(),
            Arc::new(RwLock::new(snapshot)),
            transcript.clone(),
            Duration::from_millis(200),
        );
        (router, bus, transcript)
    }

    fn snapshot_with(ex: ExerciseSnapshot) -> ContextSnapshot {
        ContextSnapshot {
            student_name: None,
            exercise: Some(ex),
            recent_turns: Vec::new(),
        }
    }

    #[test]
    fn wire_names_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::parse(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolName::parse("giveHint"), Some(ToolName::GiveHint));
        assert!(ToolName::parse("launchMissiles").is_none());
    }

    #[tokio::test]
    async fn every_tool_resolves_to_a_non_empty_string() {
        let mut content = MockContent::new();
        content
            .expect_explain_theory()
            .returning(|_, _| Err(anyhow!("collaborator down")));
        content
            .expect_solve_exercise()
            .returning(|_| Err(anyhow!("collaborator down")));
        content
            .expect_fetch_hint()
            .returning(|_, _| Err(anyhow!("collaborator down")));

        let (router, _bus, _) = router_with(Arc::new(content), snapshot_with(exercise(0, vec![])));
        for tool in ToolName::ALL {
            let spoken = router.invoke(tool, &json!({})).await;
            assert!(!spoken.trim().is_empty(), "{tool:?} produced an empty result");
        }

        // The empty-context variant must hold the same guarantee.
        let (router, _bus, _) = router_with(Arc::new(MockContentService), ContextSnapshot::empty());
        for tool in ToolName::ALL {
            let spoken = router.invoke(tool, &Value::Null).await;
            assert!(!spoken.trim().is_empty(), "{tool:?} produced an empty result");
        }
    }

    #[tokio::test]
    async fn give_hint_escalates_and_reports_one_based_number() {
        let (router, bus, _) =
            router_with(Arc::new(MockContentService), snapshot_with(exercise(2, vec!["h0", "h1"])));
        let spoken = router.invoke(ToolName::GiveHint, &json!({})).await;
        assert!(spoken.contains("h1"), "expected the second hint, got: {spoken}");
        assert_eq!(bus.events(), vec![AppEvent::HintShown { hint_number: 2 }]);
    }

    #[tokio::test]
    async fn give_hint_without_stored_hints_falls_back_to_socratic_prompt() {
        let mut content = MockContent::new();
        content
            .expect_fetch_hint()
            .returning(|_, _| Err(anyhow!("no hint service")));
        let (router, bus, _) = router_with(Arc::new(content), snapshot_with(exercise(0, vec![])));

        let spoken = router.invoke(ToolName::GiveHint, &json!({})).await;
        assert!(spoken.contains("both sides"), "expected the equation nudge, got: {spoken}");
        assert!(bus.events().is_empty(), "no hint-shown event without a stored hint");
    }

    #[tokio::test]
    async fn check_answer_accepts_spoken_numbers() {
        let (router, bus, _) =
            router_with(Arc::new(MockContentService), snapshot_with(exercise(1, vec![])));
        let spoken = router
            .invoke(ToolName::CheckSubmittedAnswer, &json!({"answer": "two"}))
            .await;
        assert!(!spoken.is_empty());
        assert_eq!(bus.events(), vec![AppEvent::AnswerCorrect]);
    }

    #[tokio::test]
    async fn check_answer_rejects_wrong_answers() {
        let (router, bus, _) =
            router_with(Arc::new(MockContentService), snapshot_with(exercise(1, vec![])));
        router
            .invoke(ToolName::CheckSubmittedAnswer, &json!({"answer": "five"}))
            .await;
        assert_eq!(bus.events(), vec![AppEvent::AnswerIncorrect]);
    }

    #[tokio::test]
    async fn check_answer_with_missing_argument_asks_again() {
        let (router, bus, _) =
            router_with(Arc::new(MockContentService), snapshot_with(exercise(1, vec![])));
        let spoken = router.invoke(ToolName::CheckSubmittedAnswer, &json!({})).await;
        assert!(spoken.contains("one more time"));
        assert!(bus.events().is_empty());
    }

    #[tokio::test]
    async fn solve_publishes_show_solution_only_on_success() {
        let (router, bus, _) =
            router_with(Arc::new(MockContentService), snapshot_with(exercise(0, vec![])));
        router.invoke(ToolName::SolveCurrentExercise, &json!({})).await;
        assert_eq!(bus.events(), vec![AppEvent::ShowSolution]);

        let mut failing = MockContent::new();
        failing
            .expect_solve_exercise()
            .returning(|_| Err(anyhow!("model offline")));
        let (router, bus, _) = router_with(Arc::new(failing), snapshot_with(exercise(0, vec![])));
        let spoken = router.invoke(ToolName::SolveCurrentExercise, &json!({})).await;
        assert_eq!(spoken, ENCOURAGING_FALLBACK);
        assert!(bus.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_collaborators_hit_the_timeout_fallback() {
        let (router, bus, _) =
            router_with(Arc::new(StalledContent), snapshot_with(exercise(0, vec![])));
        let spoken = router.invoke(ToolName::ExplainTheory, &json!({})).await;
        assert_eq!(spoken, ENCOURAGING_FALLBACK);
        assert!(bus.events().is_empty());
    }

    #[tokio::test]
    async fn repeat_last_utterance_replays_the_tutor() {
        let (router, _bus, transcript) =
            router_with(Arc::new(MockContentService), snapshot_with(exercise(0, vec![])));
        {
            let mut t = transcript.lock().await;
            t.append(Role::Tutor, "Try isolating x first.");
            t.append(Role::Student, "what was that?");
        }
        let spoken = router.invoke(ToolName::RepeatLastUtterance, &json!({})).await;
        assert_eq!(spoken, "Try isolating x first.");
    }

    #[test]
    fn socratic_prompt_has_a_default() {
        let prompt = socratic_prompt("???");
        assert!(!prompt.is_empty());
    }
}
