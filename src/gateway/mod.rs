//! Boundary to external reasoning, search, and media-analysis capabilities.
//!
//! Services call the `CapabilityGateway` trait and never reach a provider
//! directly. Two implementations ship: a deterministic local one (default)
//! and an OpenAI-format HTTP client selected by configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::{FileType, SearchType};
use crate::error::AssistantError;

pub mod http;
pub mod local;

pub use http::HttpGateway;
pub use local::LocalGateway;

/// One turn of conversation context in the shape completion calls expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Assistant reply produced by a completion call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub metadata: Option<Value>,
}

/// The recognized (file_type, processing_type) combinations. New kinds of
/// processing extend this table; nothing else branches on the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaProcessing {
    ImageAnalysis,
    ImageEnhancement,
    VideoAnalysis,
    VideoTranscription,
}

impl MediaProcessing {
    pub fn from_parts(file_type: FileType, processing_type: &str) -> Option<Self> {
        match (file_type, processing_type.trim().to_ascii_lowercase().as_str()) {
            (FileType::Image, "analysis") => Some(MediaProcessing::ImageAnalysis),
            (FileType::Image, "enhancement") => Some(MediaProcessing::ImageEnhancement),
            (FileType::Video, "analysis") => Some(MediaProcessing::VideoAnalysis),
            (FileType::Video, "transcription") => Some(MediaProcessing::VideoTranscription),
            _ => None,
        }
    }

    pub fn processing_label(self) -> &'static str {
        match self {
            MediaProcessing::ImageAnalysis | MediaProcessing::VideoAnalysis => "analysis",
            MediaProcessing::ImageEnhancement => "enhancement",
            MediaProcessing::VideoTranscription => "transcription",
        }
    }
}

/// Everything a media-analysis call needs to know about its job.
#[derive(Debug, Clone)]
pub struct MediaAnalysisRequest {
    pub kind: MediaProcessing,
    pub file_reference: String,
    pub model_name: String,
}

/// Abstract capability boundary. All three operations are potentially slow
/// and potentially failing; retry policy belongs to the caller.
#[async_trait]
pub trait CapabilityGateway: Send + Sync {
    /// Model completion over an ordered conversation history.
    async fn complete(
        &self,
        history: &[PromptMessage],
        model_name: &str,
    ) -> Result<Completion, AssistantError>;

    /// Structured analysis of one media file.
    async fn analyze_media(&self, request: &MediaAnalysisRequest)
        -> Result<Value, AssistantError>;

    /// Web search execution.
    async fn search(&self, query: &str, search_type: SearchType)
        -> Result<Value, AssistantError>;
}

/// Pull a JSON document out of a model reply that may wrap it in a fenced
/// code block or surrounding prose.
pub(crate) fn extract_json(response: &str) -> Option<String> {
    let trimmed = response.trim();

    if let Some(fenced) = extract_fenced_block(trimmed) {
        return Some(fenced);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            let candidate = &trimmed[start..=end];
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Some(candidate.to_string());
            }
        }
    }

    if serde_json::from_str::<Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    None
}

fn extract_fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    let end = after.find("```")?;
    let candidate = after[..end].trim();
    if serde_json::from_str::<Value>(candidate).is_ok() {
        Some(candidate.to_string())
    } else {
        None
    }
}
