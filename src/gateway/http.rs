//! OpenAI-format chat-completions gateway.
//!
//! Media analysis and web search ride the same completions endpoint:
//! the model is prompted for a JSON payload in the shape the caller
//! stores, and the reply is extracted from fenced or raw JSON.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::database::{AssistantDatabase, SearchType};
use crate::error::AssistantError;
use crate::gateway::{
    extract_json, CapabilityGateway, Completion, MediaAnalysisRequest, MediaProcessing,
    PromptMessage,
};

pub struct HttpGateway {
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
    db: Arc<AssistantDatabase>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

impl HttpGateway {
    pub fn new(
        api_url: String,
        api_key: String,
        model: String,
        timeout_secs: u64,
        db: Arc<AssistantDatabase>,
    ) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            timeout: Duration::from_secs(timeout_secs),
            client: reqwest::Client::new(),
            db,
        }
    }

    fn require_model(&self, model_name: &str) -> Result<(), AssistantError> {
        self.db
            .find_active_model(model_name)?
            .map(|_| ())
            .ok_or_else(|| {
                AssistantError::capability(format!("model not available: {}", model_name))
            })
    }

    async fn chat(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AssistantError> {
        let url = format!("{}/chat/completions", self.api_url);

        let mut req = self.client.post(&url).timeout(self.timeout).json(request);
        // Local model servers typically run without a key.
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = req.send().await.map_err(|e| {
            AssistantError::capability(format!("failed to reach model API: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read body".to_string());
            return Err(AssistantError::capability(format!(
                "model API returned {}: {}",
                status, body
            )));
        }

        response.json().await.map_err(|e| {
            AssistantError::capability(format!("failed to parse model API response: {}", e))
        })
    }

    /// One round trip for callers that only need the reply text.
    async fn generate(
        &self,
        messages: Vec<WireMessage>,
        model_name: &str,
    ) -> Result<String, AssistantError> {
        let request = ChatCompletionRequest {
            model: model_name.to_string(),
            messages,
            temperature: Some(0.7),
            max_tokens: Some(2000),
        };
        let response = self.chat(&request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AssistantError::capability("model API returned no choices"))
    }

    async fn generate_payload(
        &self,
        messages: Vec<WireMessage>,
        model_name: &str,
    ) -> Result<Value, AssistantError> {
        let reply = self.generate(messages, model_name).await?;
        let json_str = extract_json(&reply).ok_or_else(|| {
            AssistantError::capability(format!(
                "model reply contained no JSON: {}",
                truncate(&reply)
            ))
        })?;
        serde_json::from_str(&json_str).map_err(|_| {
            AssistantError::capability(format!(
                "model reply was not valid JSON: {}",
                truncate(&reply)
            ))
        })
    }
}

#[async_trait]
impl CapabilityGateway for HttpGateway {
    async fn complete(
        &self,
        history: &[PromptMessage],
        model_name: &str,
    ) -> Result<Completion, AssistantError> {
        self.require_model(model_name)?;
        let messages = history
            .iter()
            .map(|m| WireMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();
        let request = ChatCompletionRequest {
            model: model_name.to_string(),
            messages,
            temperature: Some(0.7),
            max_tokens: Some(2000),
        };
        let response = self.chat(&request).await?;
        let tokens_used = response.usage.as_ref().map(|u| u.total_tokens);
        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AssistantError::capability("model API returned no choices"))?;
        Ok(Completion {
            content,
            metadata: Some(json!({
                "model": model_name,
                "timestamp": Utc::now().to_rfc3339(),
                "tokens_used": tokens_used,
            })),
        })
    }

    async fn analyze_media(
        &self,
        request: &MediaAnalysisRequest,
    ) -> Result<Value, AssistantError> {
        self.require_model(&request.model_name)?;
        let messages = vec![
            WireMessage {
                role: "system".to_string(),
                content: "You are a media analysis service. You answer only with JSON."
                    .to_string(),
            },
            WireMessage {
                role: "user".to_string(),
                content: media_prompt(request),
            },
        ];
        self.generate_payload(messages, &request.model_name).await
    }

    async fn search(
        &self,
        query: &str,
        search_type: SearchType,
    ) -> Result<Value, AssistantError> {
        self.require_model(&self.model)?;
        let messages = vec![
            WireMessage {
                role: "system".to_string(),
                content: "You are a web search service. You answer only with JSON.".to_string(),
            },
            WireMessage {
                role: "user".to_string(),
                content: search_prompt(query, search_type),
            },
        ];
        self.generate_payload(messages, &self.model).await
    }
}

fn media_prompt(request: &MediaAnalysisRequest) -> String {
    match request.kind {
        MediaProcessing::ImageAnalysis => format!(
            r#"Analyze the image stored at {}.

Respond with a JSON object in exactly this format:
{{
    "analysis": "one-sentence summary of the image",
    "objects_detected": ["object", ...],
    "confidence_scores": [0.0-1.0, ...],
    "model_used": "{}"
}}

Respond ONLY with valid JSON."#,
            request.file_reference, request.model_name
        ),
        MediaProcessing::ImageEnhancement => format!(
            r#"Plan an enhancement pass for the image stored at {}.

Respond with a JSON object in exactly this format:
{{
    "enhancement": "one-sentence summary of the work done",
    "improvements": ["step", ...],
    "quality_score": 0.0-10.0,
    "model_used": "{}"
}}

Respond ONLY with valid JSON."#,
            request.file_reference, request.model_name
        ),
        MediaProcessing::VideoAnalysis => format!(
            r#"Analyze the video stored at {}.

Respond with a JSON object in exactly this format:
{{
    "analysis": "one-sentence summary of the video",
    "duration": seconds,
    "scenes_detected": count,
    "key_frames": [second, ...],
    "model_used": "{}"
}}

Respond ONLY with valid JSON."#,
            request.file_reference, request.model_name
        ),
        MediaProcessing::VideoTranscription => format!(
            r#"Transcribe the video stored at {}.

Respond with a JSON object in exactly this format:
{{
    "transcription": "one-sentence summary of the work done",
    "text": "full transcription",
    "timestamps": [{{"start": seconds, "end": seconds, "text": "segment"}}, ...],
    "model_used": "{}"
}}

Respond ONLY with valid JSON."#,
            request.file_reference, request.model_name
        ),
    }
}

fn search_prompt(query: &str, search_type: SearchType) -> String {
    let depth = match search_type {
        SearchType::Advanced => "a focused, precision-oriented",
        SearchType::Extended => "a broad, exploratory",
    };
    format!(
        r#"Perform {} web search for: {}

Respond with a JSON object in exactly this format:
{{
    "query": "{}",
    "search_type": "{}",
    "results": [
        {{"title": "...", "url": "...", "snippet": "..."}}
    ],
    "total_results": count
}}

Respond ONLY with valid JSON."#,
        depth,
        query,
        query,
        search_type.as_db_str()
    )
}

fn truncate(text: &str) -> String {
    text.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_prompts_name_the_file_and_model() {
        let request = MediaAnalysisRequest {
            kind: MediaProcessing::VideoTranscription,
            file_reference: "/uploads/clip.mp4".to_string(),
            model_name: "gpt-4".to_string(),
        };
        let prompt = media_prompt(&request);
        assert!(prompt.contains("/uploads/clip.mp4"));
        assert!(prompt.contains("\"model_used\": \"gpt-4\""));
        assert!(prompt.contains("timestamps"));
    }

    #[test]
    fn search_prompt_carries_the_depth_marker() {
        let advanced = search_prompt("rust lifetimes", SearchType::Advanced);
        assert!(advanced.contains("precision-oriented"));
        assert!(advanced.contains("rust lifetimes"));

        let extended = search_prompt("rust lifetimes", SearchType::Extended);
        assert!(extended.contains("exploratory"));
        assert!(extended.contains("\"search_type\": \"extended\""));
    }

    #[test]
    fn request_serialization_omits_unset_knobs() {
        let request = ChatCompletionRequest {
            model: "gpt-4".to_string(),
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            temperature: None,
            max_tokens: None,
        };
        let body = serde_json::to_string(&request).expect("serialize");
        assert!(!body.contains("temperature"));
        assert!(!body.contains("max_tokens"));
    }

    #[test]
    fn response_parsing_tolerates_missing_usage() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.choices[0].message.content, "hello");
        assert!(parsed.usage.is_none());
    }
}
