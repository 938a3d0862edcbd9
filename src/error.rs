//! Failure taxonomy shared by every service operation.

/// Every operation the backend exposes resolves to one of these four kinds.
///
/// `NotFound` and `Validation` surface to the caller untouched.
/// `CapabilityUnavailable` covers the external reasoning/search/analysis
/// boundary, including an inactive or unknown target model. `Persistence`
/// wraps store failures and is always logged where it is raised.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl AssistantError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AssistantError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AssistantError::Validation(message.into())
    }

    pub fn capability(message: impl Into<String>) -> Self {
        AssistantError::CapabilityUnavailable(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        AssistantError::Persistence(message.into())
    }

    /// Machine-readable kind label, used in failure payloads persisted onto
    /// job rows.
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantError::NotFound { .. } => "not_found",
            AssistantError::Validation(_) => "validation_error",
            AssistantError::CapabilityUnavailable(_) => "capability_unavailable",
            AssistantError::Persistence(_) => "persistence_error",
        }
    }
}

impl From<rusqlite::Error> for AssistantError {
    fn from(err: rusqlite::Error) -> Self {
        AssistantError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for AssistantError {
    fn from(err: serde_json::Error) -> Self {
        AssistantError::Persistence(format!("payload encoding: {}", err))
    }
}
