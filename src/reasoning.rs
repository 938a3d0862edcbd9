//! Single-shot deliberate reasoning, separate from conversation history.
//!
//! The model is asked to lay out its reasoning and conclusion as JSON.
//! Callers can opt out of the reasoning trace and receive only the
//! conclusion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AssistantError;
use crate::gateway::{extract_json, CapabilityGateway, PromptMessage};

const THINK_SYSTEM_PROMPT: &str = "You are a careful analytical assistant. \
Work through the user's question step by step before answering.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkOutcome {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub conclusion: String,
}

#[derive(Clone)]
pub struct ReasoningService {
    gateway: Arc<dyn CapabilityGateway>,
}

impl ReasoningService {
    pub fn new(gateway: Arc<dyn CapabilityGateway>) -> Self {
        Self { gateway }
    }

    pub async fn think(
        &self,
        query: &str,
        model_name: &str,
        show_reasoning: bool,
    ) -> Result<ThinkOutcome, AssistantError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AssistantError::validation("query cannot be empty"));
        }

        let history = vec![
            PromptMessage::new("system", THINK_SYSTEM_PROMPT),
            PromptMessage::new("user", build_think_prompt(query)),
        ];
        let completion = self.gateway.complete(&history, model_name).await?;
        let mut outcome = parse_outcome(&completion.content);
        if !show_reasoning {
            outcome.reasoning.clear();
        }
        Ok(outcome)
    }
}

fn build_think_prompt(query: &str) -> String {
    format!(
        r#"Question: {}

Respond with a JSON object in exactly this format:
{{
    "reasoning": "Your step-by-step reasoning",
    "conclusion": "Your final answer, stated directly"
}}

Respond ONLY with valid JSON."#,
        query
    )
}

/// Models do not always honor the JSON instruction. When no parseable
/// object comes back, the whole reply is treated as the conclusion.
fn parse_outcome(response: &str) -> ThinkOutcome {
    if let Some(json_str) = extract_json(response) {
        if let Ok(outcome) = serde_json::from_str::<ThinkOutcome>(&json_str) {
            return outcome;
        }
    }
    ThinkOutcome {
        reasoning: String::new(),
        conclusion: response.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SearchType;
    use crate::gateway::{Completion, MediaAnalysisRequest};
    use async_trait::async_trait;
    use serde_json::Value;

    struct ScriptedGateway {
        reply: String,
    }

    #[async_trait]
    impl CapabilityGateway for ScriptedGateway {
        async fn complete(
            &self,
            _history: &[PromptMessage],
            _model_name: &str,
        ) -> Result<Completion, AssistantError> {
            Ok(Completion {
                content: self.reply.clone(),
                metadata: None,
            })
        }

        async fn analyze_media(
            &self,
            _request: &MediaAnalysisRequest,
        ) -> Result<Value, AssistantError> {
            Err(AssistantError::capability("not wired in this test"))
        }

        async fn search(
            &self,
            _query: &str,
            _search_type: SearchType,
        ) -> Result<Value, AssistantError> {
            Err(AssistantError::capability("not wired in this test"))
        }
    }

    fn service(reply: &str) -> ReasoningService {
        ReasoningService::new(Arc::new(ScriptedGateway {
            reply: reply.to_string(),
        }))
    }

    #[tokio::test]
    async fn think_splits_reasoning_from_conclusion() {
        let reply = r#"```json
{"reasoning": "2 and 2 are both even", "conclusion": "4"}
```"#;
        let outcome = service(reply)
            .think("what is 2+2?", "gpt-4", true)
            .await
            .expect("think");
        assert_eq!(outcome.reasoning, "2 and 2 are both even");
        assert_eq!(outcome.conclusion, "4");
    }

    #[tokio::test]
    async fn hidden_reasoning_strips_the_trace_but_keeps_the_conclusion() {
        let reply = r#"{"reasoning": "long internal deliberation", "conclusion": "yes"}"#;
        let outcome = service(reply)
            .think("should I cache this?", "gpt-4", false)
            .await
            .expect("think");
        assert!(outcome.reasoning.is_empty());
        assert_eq!(outcome.conclusion, "yes");
    }

    #[tokio::test]
    async fn plain_text_replies_become_the_conclusion() {
        let outcome = service("  Just the answer, no structure.  ")
            .think("hello?", "gpt-4", true)
            .await
            .expect("think");
        assert!(outcome.reasoning.is_empty());
        assert_eq!(outcome.conclusion, "Just the answer, no structure.");
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let err = service("unused")
            .think("   ", "gpt-4", true)
            .await
            .expect_err("blank query");
        assert!(matches!(err, AssistantError::Validation(_)));
    }
}
