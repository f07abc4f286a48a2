//! Ollama chat API backend for the summarizer.

use super::{Summarizer, SummarizerError, SummarizerFuture};
use crate::config::SummarizerConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Summarizer backed by a local or remote Ollama server.
pub struct OllamaSummarizer {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout_seconds: u64,
    label: String,
}

impl OllamaSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self, SummarizerError> {
        info!(
            "Initializing summarizer with model {} at {}",
            config.model, config.ollama_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SummarizerError::Request(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
            label: format!("ollama:{}", config.model),
        })
    }

    /// Send one system + user exchange and return the assistant text.
    async fn chat(&self, system: &str, prompt: &str) -> Result<String, SummarizerError> {
        let url = format!("{}/api/chat", self.base_url);

        let request = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        debug!("Sending {} byte prompt to {}", prompt.len(), url);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummarizerError::Timeout(self.timeout_seconds)
                } else if e.is_connect() {
                    SummarizerError::Connect(self.base_url.clone())
                } else {
                    SummarizerError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizerError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| SummarizerError::Parse(e.to_string()))?;

        Ok(chat_response.message.content)
    }
}

impl Summarizer for OllamaSummarizer {
    fn name(&self) -> &str {
        &self.label
    }

    fn summarize<'a>(&'a self, text_block: &'a str) -> SummarizerFuture<'a, String> {
        Box::pin(async move {
            let prompt = format!(
                "Given the following feedback suggestions from a feedback form, write a \
                 grammatically correct, concise, and insightful summary.\n\n\
                 Feedback suggestions:\n{}",
                text_block
            );
            self.chat(SYSTEM_PROMPT, &prompt).await
        })
    }

    fn classify_columns<'a>(
        &'a self,
        sample: &'a str,
    ) -> SummarizerFuture<'a, HashMap<String, String>> {
        Box::pin(async move {
            let prompt = format!(
                "Given this sample from a feedback form, identify the Likert-scale (1 to 5) \
                 rating questions and group them into logical categories such as \
                 'Curriculum', 'Faculty' or 'Facilities'.\n\
                 Return only a JSON object mapping each question column name, exactly as \
                 written, to its category name:\n\
                 {{\"Question column name\": \"Category name\"}}\n\n\
                 Sample data:\n{}",
                sample
            );
            let response = self.chat(SYSTEM_PROMPT, &prompt).await?;
            parse_column_mapping(&response)
        })
    }

    fn find_common_themes<'a>(&'a self, summaries: &'a [String]) -> SummarizerFuture<'a, String> {
        Box::pin(async move {
            let mut prompt = String::from(
                "The following are summaries of feedback collected from different groups. \
                 Identify the common themes that appear across them as a short bullet list.\n\n",
            );
            for (i, summary) in summaries.iter().enumerate() {
                prompt.push_str(&format!("Summary {}:\n{}\n\n", i + 1, summary));
            }
            self.chat(SYSTEM_PROMPT, &prompt).await
        })
    }

    fn propose_action_plan<'a>(&'a self, themes: &'a str) -> SummarizerFuture<'a, String> {
        Box::pin(async move {
            let prompt = format!(
                "Based on these recurring feedback themes, propose a concise, prioritised \
                 action plan with concrete steps.\n\nThemes:\n{}",
                themes
            );
            self.chat(SYSTEM_PROMPT, &prompt).await
        })
    }
}

/// Extract a `{"column": "category"}` object from a model response that may
/// be wrapped in code fences or surrounded by prose.
pub fn parse_column_mapping(response: &str) -> Result<HashMap<String, String>, SummarizerError> {
    let start = response
        .find('{')
        .ok_or_else(|| SummarizerError::Parse("no JSON object in response".to_string()))?;
    let end = response
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| SummarizerError::Parse("unterminated JSON object".to_string()))?;

    let object: HashMap<String, Value> = serde_json::from_str(&response[start..=end])
        .map_err(|e| SummarizerError::Parse(e.to_string()))?;

    let mapping: HashMap<String, String> = object
        .into_iter()
        .filter_map(|(column, category)| match category {
            Value::String(s) => Some((column, s)),
            other => {
                debug!("Ignoring non-string category for '{}': {}", column, other);
                None
            }
        })
        .collect();

    Ok(mapping)
}

const SYSTEM_PROMPT: &str = "You are a helpful assistant that analyses survey feedback. \
Answer with the requested content only, without preamble.";
