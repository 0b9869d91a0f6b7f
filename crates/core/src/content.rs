//! Content-generation collaborators for theory, solutions and hints.
//!
//! These calls leave the process and may be slow or fail outright; the
//! tool router wraps every call with a timeout and a spoken fallback, so
//! implementations are free to surface errors honestly.

use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Generates spoken tutoring content on demand.
#[async_trait]
pub trait ContentService: Send + Sync {
    /// A short spoken explanation of the theory behind a subtopic.
    async fn explain_theory(&self, topic: &str, subtopic: &str) -> Result<String>;

    /// A step-by-step spoken walkthrough of the given exercise.
    async fn solve_exercise(&self, question: &str) -> Result<String>;

    /// A fresh hint for an exercise that ships no stored hints.
    async fn fetch_hint(&self, question: &str, attempt: u32) -> Result<String>;
}

/// `ContentService` backed by an OpenAI-compatible chat API.
///
/// Prompt templates are loaded by the host at startup; the map must
/// contain the keys `"explain_theory"`, `"solve_exercise"` and
/// `"give_hint"`, each with the matching `{placeholder}`s.
pub struct LlmContentService {
    client: Client<OpenAIConfig>,
    model: String,
    prompts: HashMap<String, String>,
}

impl LlmContentService {
    pub fn new(config: OpenAIConfig, model: String, prompts: HashMap<String, String>) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            prompts,
        }
    }

    async fn complete(&self, template_key: &str, substitutions: &[(&str, &str)]) -> Result<String> {
        let template = self
            .prompts
            .get(template_key)
            .with_context(|| format!("Missing prompt template: '{template_key}'"))?;
        let mut prompt = template.clone();
        for (placeholder, value) in substitutions {
            prompt = prompt.replace(placeholder, value);
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content("You are a friendly math tutor speaking out loud to a student.")
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;
        let answer = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .as_ref()
            .context("No content in LLM response")?;
        Ok(answer.trim().to_string())
    }
}

#[async_trait]
impl ContentService for LlmContentService {
    async fn explain_theory(&self, topic: &str, subtopic: &str) -> Result<String> {
        self.complete("explain_theory", &[("{topic}", topic), ("{subtopic}", subtopic)])
            .await
    }

    async fn solve_exercise(&self, question: &str) -> Result<String> {
        self.complete("solve_exercise", &[("{question}", question)]).await
    }

    async fn fetch_hint(&self, question: &str, attempt: u32) -> Result<String> {
        let attempt = attempt.to_string();
        self.complete("give_hint", &[("{question}", question), ("{attempt}", &attempt)])
            .await
    }
}

/// Deterministic `ContentService` for development and integration tests.
pub struct MockContentService;

#[async_trait]
impl ContentService for MockContentService {
    async fn explain_theory(&self, topic: &str, subtopic: &str) -> Result<String> {
        Ok(format!(
            "Let's talk about {subtopic}. It's one of the building blocks of {topic}, and the main idea is simpler than it looks."
        ))
    }

    async fn solve_exercise(&self, question: &str) -> Result<String> {
        Ok(format!(
            "Let's work through it together. Start from '{question}' and take it one operation at a time."
        ))
    }

    async fn fetch_hint(&self, question: &str, attempt: u32) -> Result<String> {
        Ok(format!(
            "Attempt {}: look again at '{}' and focus on the very first step.",
            attempt + 1,
            question
        ))
    }
}
