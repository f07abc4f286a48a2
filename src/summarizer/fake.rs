//! Deterministic summarizer for tests.

use super::{Summarizer, SummarizerError, SummarizerFuture};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Succeed,
    Fail,
    Hang,
}

/// Scripted [`Summarizer`] that never touches the network.
pub struct FakeSummarizer {
    behaviour: Behaviour,
    mapping: HashMap<String, String>,
}

impl FakeSummarizer {
    pub fn succeeding() -> Self {
        Self::with_behaviour(Behaviour::Succeed)
    }

    pub fn failing() -> Self {
        Self::with_behaviour(Behaviour::Fail)
    }

    pub fn hanging() -> Self {
        Self::with_behaviour(Behaviour::Hang)
    }

    fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            mapping: HashMap::new(),
        }
    }

    /// Mapping returned by `classify_columns`.
    pub fn with_mapping(mut self, pairs: &[(&str, &str)]) -> Self {
        self.mapping = pairs
            .iter()
            .map(|(col, cat)| (col.to_string(), cat.to_string()))
            .collect();
        self
    }

    fn respond<'a, T: Send + 'a>(&'a self, value: T) -> SummarizerFuture<'a, T> {
        let behaviour = self.behaviour;
        Box::pin(async move {
            match behaviour {
                Behaviour::Succeed => Ok(value),
                Behaviour::Fail => Err(SummarizerError::Api {
                    status: 503,
                    body: "scripted failure".to_string(),
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(value)
                }
            }
        })
    }
}

impl Summarizer for FakeSummarizer {
    fn name(&self) -> &str {
        "fake"
    }

    fn summarize<'a>(&'a self, text_block: &'a str) -> SummarizerFuture<'a, String> {
        self.respond(format!("Summary of {} responses", text_block.lines().count()))
    }

    fn classify_columns<'a>(
        &'a self,
        _sample: &'a str,
    ) -> SummarizerFuture<'a, HashMap<String, String>> {
        self.respond(self.mapping.clone())
    }

    fn find_common_themes<'a>(&'a self, summaries: &'a [String]) -> SummarizerFuture<'a, String> {
        self.respond(format!("Themes across {} summaries", summaries.len()))
    }

    fn propose_action_plan<'a>(&'a self, themes: &'a str) -> SummarizerFuture<'a, String> {
        self.respond(format!("Plan for: {}", themes))
    }
}
