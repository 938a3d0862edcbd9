use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ChatService;
use crate::database::{
    AiModel, AssistantDatabase, ChatMessage, Conversation, MediaFile, SearchQuery, User,
};
use crate::error::AssistantError;
use crate::media::MediaService;
use crate::reasoning::{ReasoningService, ThinkOutcome};
use crate::search::SearchService;

#[derive(Clone)]
pub struct ServerState {
    pub chat: ChatService,
    pub media: MediaService,
    pub search: SearchService,
    pub reasoning: ReasoningService,
    pub db: Arc<AssistantDatabase>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ListConversationsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ListMediaQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ListSearchesQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    email: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreateConversationRequest {
    user_id: String,
    title: String,
    model_name: String,
}

#[derive(Debug, Deserialize)]
struct UpdateConversationRequest {
    title: Option<String>,
    model_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    content: String,
    model_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadMediaRequest {
    user_id: String,
    filename: String,
    original_filename: String,
    file_type: String,
    file_size: i64,
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct ProcessMediaRequest {
    processing_type: String,
    model_name: String,
}

#[derive(Debug, Deserialize)]
struct SubmitSearchRequest {
    user_id: String,
    query: String,
    search_type: String,
}

#[derive(Debug, Deserialize)]
struct ThinkRequest {
    query: String,
    model_name: String,
    show_reasoning: Option<bool>,
}

/// Catalog row as served over HTTP: pricing in decimal currency units
/// rather than the stored integer minor units.
#[derive(Debug, Serialize)]
struct ApiModel {
    id: String,
    name: String,
    provider: String,
    description: Option<String>,
    context_length: i64,
    pricing_input: f64,
    pricing_output: f64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AiModel> for ApiModel {
    fn from(model: AiModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            provider: model.provider,
            description: model.description,
            context_length: model.context_length,
            pricing_input: model.pricing_input as f64 / 100.0,
            pricing_output: model.pricing_output as f64 / 100.0,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub async fn serve(state: Arc<ServerState>, bind_addr: SocketAddr) -> Result<()> {
    let api = Router::new()
        .route("/health", get(health))
        .route("/users", post(create_user))
        .route("/users/:id/conversations", get(list_user_conversations))
        .route("/users/:id/media", get(list_user_media))
        .route("/users/:id/searches", get(list_user_searches))
        .route("/conversations", post(create_conversation))
        .route("/conversations/:id", patch(update_conversation))
        .route(
            "/conversations/:id/messages",
            get(list_messages).post(send_message),
        )
        .route("/media", post(upload_media))
        .route("/media/:id/process", post(process_media))
        .route("/searches", post(submit_search))
        .route("/searches/:id/execute", post(execute_search))
        .route("/think", post(think))
        .route("/models", get(list_models))
        .with_state(state);

    let app = Router::new().nest("/v1", api);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind backend server to {}", bind_addr))?;
    tracing::info!("Factotum backend listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .await
        .context("Backend server failed")?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
    })
}

async fn create_user(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<CreateUserRequest>,
) -> Result<Json<User>, (StatusCode, String)> {
    let email = body.email.trim();
    if !is_valid_email(email) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("invalid email address: {}", body.email),
        ));
    }
    let name = body.name.trim();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "name cannot be empty".to_string()));
    }
    state
        .db
        .create_user(email, name)
        .map(Json)
        .map_err(error_response)
}

async fn create_conversation(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<CreateConversationRequest>,
) -> Result<Json<Conversation>, (StatusCode, String)> {
    state
        .chat
        .create_conversation(&body.user_id, &body.title, &body.model_name)
        .map(Json)
        .map_err(error_response)
}

async fn list_user_conversations(
    State(state): State<Arc<ServerState>>,
    Path(user_id): Path<String>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<Json<Vec<Conversation>>, (StatusCode, String)> {
    let limit = clamp_limit(query.limit, 50, 1, 200);
    state
        .chat
        .list_conversations(&user_id, limit)
        .map(Json)
        .map_err(error_response)
}

async fn update_conversation(
    State(state): State<Arc<ServerState>>,
    Path(conversation_id): Path<String>,
    Json(body): Json<UpdateConversationRequest>,
) -> Result<Json<Conversation>, (StatusCode, String)> {
    state
        .chat
        .update_conversation(
            &conversation_id,
            body.title.as_deref(),
            body.model_name.as_deref(),
        )
        .map(Json)
        .map_err(error_response)
}

async fn send_message(
    State(state): State<Arc<ServerState>>,
    Path(conversation_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<ChatMessage>, (StatusCode, String)> {
    state
        .chat
        .send_message(&conversation_id, &body.content, body.model_name.as_deref())
        .await
        .map(Json)
        .map_err(error_response)
}

async fn list_messages(
    State(state): State<Arc<ServerState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, (StatusCode, String)> {
    state
        .chat
        .list_messages(&conversation_id)
        .map(Json)
        .map_err(error_response)
}

async fn upload_media(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<UploadMediaRequest>,
) -> Result<Json<MediaFile>, (StatusCode, String)> {
    state
        .media
        .upload(
            &body.user_id,
            &body.filename,
            &body.original_filename,
            &body.file_type,
            body.file_size,
            &body.file_path,
        )
        .map(Json)
        .map_err(error_response)
}

async fn process_media(
    State(state): State<Arc<ServerState>>,
    Path(media_id): Path<String>,
    Json(body): Json<ProcessMediaRequest>,
) -> Result<Json<MediaFile>, (StatusCode, String)> {
    state
        .media
        .process(&media_id, &body.processing_type, &body.model_name)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn list_user_media(
    State(state): State<Arc<ServerState>>,
    Path(user_id): Path<String>,
    Query(query): Query<ListMediaQuery>,
) -> Result<Json<Vec<MediaFile>>, (StatusCode, String)> {
    let limit = clamp_limit(query.limit, 50, 1, 200);
    state
        .media
        .list_for_user(&user_id, limit)
        .map(Json)
        .map_err(error_response)
}

async fn submit_search(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<SubmitSearchRequest>,
) -> Result<Json<SearchQuery>, (StatusCode, String)> {
    state
        .search
        .submit(&body.user_id, &body.query, &body.search_type)
        .map(Json)
        .map_err(error_response)
}

async fn execute_search(
    State(state): State<Arc<ServerState>>,
    Path(search_id): Path<String>,
) -> Result<Json<SearchQuery>, (StatusCode, String)> {
    state
        .search
        .execute(&search_id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn list_user_searches(
    State(state): State<Arc<ServerState>>,
    Path(user_id): Path<String>,
    Query(query): Query<ListSearchesQuery>,
) -> Result<Json<Vec<SearchQuery>>, (StatusCode, String)> {
    let limit = clamp_limit(query.limit, 50, 1, 200);
    state
        .search
        .history(&user_id, limit)
        .map(Json)
        .map_err(error_response)
}

async fn think(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ThinkRequest>,
) -> Result<Json<ThinkOutcome>, (StatusCode, String)> {
    state
        .reasoning
        .think(
            &body.query,
            &body.model_name,
            body.show_reasoning.unwrap_or(true),
        )
        .await
        .map(Json)
        .map_err(error_response)
}

async fn list_models(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<ApiModel>>, (StatusCode, String)> {
    state
        .db
        .list_active_models()
        .map(|models| Json(models.into_iter().map(ApiModel::from).collect()))
        .map_err(error_response)
}

fn clamp_limit(value: Option<usize>, default: usize, min: usize, max: usize) -> usize {
    value.unwrap_or(default).clamp(min, max)
}

fn is_valid_email(email: &str) -> bool {
    regex_lite::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map(|re| re.is_match(email))
        .unwrap_or(false)
}

fn error_response(error: AssistantError) -> (StatusCode, String) {
    let status = match &error {
        AssistantError::NotFound { .. } => StatusCode::NOT_FOUND,
        AssistantError::Validation(_) => StatusCode::BAD_REQUEST,
        AssistantError::CapabilityUnavailable(_) => StatusCode::BAD_GATEWAY,
        AssistantError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_applies_default_and_bounds() {
        assert_eq!(clamp_limit(None, 50, 1, 200), 50);
        assert_eq!(clamp_limit(Some(0), 50, 1, 200), 1);
        assert_eq!(clamp_limit(Some(75), 50, 1, 200), 75);
        assert_eq!(clamp_limit(Some(10_000), 50, 1, 200), 200);
    }

    #[test]
    fn error_statuses_follow_the_taxonomy() {
        let (status, _) = error_response(AssistantError::not_found("user", "u1"));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = error_response(AssistantError::validation("bad input"));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = error_response(AssistantError::capability("backend down"));
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, message) = error_response(AssistantError::persistence("disk full"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.contains("disk full"));
    }

    #[test]
    fn email_check_requires_a_plausible_address() {
        assert!(is_valid_email("pat@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("patexample.com"));
        assert!(!is_valid_email("pat@"));
        assert!(!is_valid_email("pat @example.com"));
    }

    #[test]
    fn catalog_pricing_is_served_in_decimal_units() {
        let model = AiModel {
            id: "m1".to_string(),
            name: "gpt-4".to_string(),
            provider: "openai".to_string(),
            description: None,
            context_length: 8192,
            pricing_input: 3000,
            pricing_output: 6000,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let api: ApiModel = model.into();
        assert_eq!(api.pricing_input, 30.0);
        assert_eq!(api.pricing_output, 60.0);
    }
}
