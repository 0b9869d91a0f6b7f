//! System-prompt and greeting construction from a context snapshot.

use crate::exercise::ContextSnapshot;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// The instructions/first-utterance pair handed to the realtime channel
/// at establish time.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptBundle {
    pub instructions: String,
    pub greeting: String,
}

const TUTORING_RULES: &str = "\n# Tutoring rules\n\
- Ask one question at a time and wait for the student to answer.\n\
- Never reveal the final answer unless the student explicitly asks you to solve the exercise and the solve tool has been invoked.\n\
- Keep spoken sentences short; this is a voice conversation.\n\
- Escalate hint-first: nudge with a hint before explaining theory, and explain theory before solving.\n\
- Celebrate progress and keep the tone encouraging.\n";

const SPOKEN_MATH_RULES: &str = "\n# Speaking math out loud\n\
- Say exponents as 'x squared', 'x cubed', or 'x to the power of n'.\n\
- Say fractions as 'a over b', for example 'three over four'.\n\
- Say negative numbers as 'negative three', never 'minus three' when naming a value.\n\
- Spell equations plainly: 'two x plus three equals seven'.\n";

const EXERCISE_GREETINGS: &[&str] = &[
    "Hi {name}! I can see a {difficulty} {topic} problem on your screen. Want to talk it through together?",
    "Hey {name}, good to hear you! Let's dig into this {topic} exercise. Tell me your first thought.",
    "Welcome back {name}! We've got some {topic} practice lined up. Where would you like to start?",
    "Hello {name}! Today's challenge is a {difficulty} one from {topic}. Take a breath and tell me what you notice first.",
];

const GENERAL_GREETINGS: &[&str] = &[
    "Hi {name}! Nothing is on the board yet. What would you like to work on today?",
    "Hey {name}, good to hear you. Pick a topic and we'll take it from there.",
    "Welcome {name}! Tell me what you're studying and we'll figure it out together.",
];

/// Builds the system prompt and opening line for a session.
///
/// Greeting selection is pseudo-random over a fixed template pool but
/// fully determined by the seed, so hosts (and tests) can pin it.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    seed: u64,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self { seed: rand::random() }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    pub fn build(&self, snapshot: &ContextSnapshot) -> PromptBundle {
        PromptBundle {
            instructions: self.instructions(snapshot),
            greeting: self.greeting(snapshot),
        }
    }

    fn instructions(&self, snapshot: &ContextSnapshot) -> String {
        let mut out = String::from(
            "You are Viva, a warm and encouraging spoken math tutor. You are talking with a student over live audio.\n",
        );
        if let Some(name) = &snapshot.student_name {
            out.push_str(&format!("The student's name is {name}.\n"));
        }
        match &snapshot.exercise {
            Some(ex) => {
                out.push_str("\n# Current exercise\n");
                out.push_str(&format!("Question: {}\n", ex.question));
                out.push_str(&format!("Topic: {} ({})\n", ex.topic, ex.subtopic));
                out.push_str(&format!("Difficulty: {}\n", ex.difficulty));
                if let Some(draft) = &ex.draft_answer {
                    out.push_str(&format!("Student's current draft answer: {draft}\n"));
                }
                out.push_str(&format!("Attempts so far: {}\n", ex.attempts));
                if !ex.hints.is_empty() {
                    out.push_str("Hints, in escalation order:\n");
                    for (i, hint) in ex.hints.iter().enumerate() {
                        out.push_str(&format!("  {}. {}\n", i + 1, hint));
                    }
                }
                if let Some(feedback) = &ex.last_feedback {
                    out.push_str(&format!("Last feedback shown to the student: {feedback}\n"));
                }
            }
            None => {
                out.push_str(
                    "\n# No active exercise\n\
                     The student has not opened an exercise yet. Offer general help, suggest a topic to practice, and invite them to pick a problem.\n",
                );
            }
        }
        if !snapshot.recent_turns.is_empty() {
            out.push_str("\n# Recent conversation\n");
            for turn in &snapshot.recent_turns {
                out.push_str(&format!("{}: {}\n", turn.role, turn.text));
            }
        }
        out.push_str(TUTORING_RULES);
        out.push_str(SPOKEN_MATH_RULES);
        out
    }

    fn greeting(&self, snapshot: &ContextSnapshot) -> String {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let name = snapshot.student_name.as_deref();
        match &snapshot.exercise {
            Some(ex) => {
                let template = EXERCISE_GREETINGS[rng.random_range(0..EXERCISE_GREETINGS.len())];
                fill(template, name, Some(&ex.topic), Some(&ex.difficulty.to_string()))
            }
            None => {
                let template = GENERAL_GREETINGS[rng.random_range(0..GENERAL_GREETINGS.len())];
                fill(template, name, None, None)
            }
        }
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn fill(template: &str, name: Option<&str>, topic: Option<&str>, difficulty: Option<&str>) -> String {
    let mut s = template.to_string();
    match name {
        Some(n) => s = s.replace("{name}", n),
        None => {
            s = s.replace(" {name}", "");
            s = s.replace("{name}", "");
        }
    }
    if let Some(t) = topic {
        s = s.replace("{topic}", t);
    }
    if let Some(d) = difficulty {
        s = s.replace("{difficulty}", d);
    }
    s
}
