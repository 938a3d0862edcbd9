//! Conversation orchestration: the send-message sequence plus the
//! conversation CRUD that surrounds it.

use std::sync::Arc;

use crate::context;
use crate::database::{AssistantDatabase, ChatMessage, Conversation, MessageRole};
use crate::error::AssistantError;
use crate::gateway::CapabilityGateway;

#[derive(Clone)]
pub struct ChatService {
    db: Arc<AssistantDatabase>,
    gateway: Arc<dyn CapabilityGateway>,
}

impl ChatService {
    pub fn new(db: Arc<AssistantDatabase>, gateway: Arc<dyn CapabilityGateway>) -> Self {
        Self { db, gateway }
    }

    pub fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
        model_name: &str,
    ) -> Result<Conversation, AssistantError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AssistantError::validation("title cannot be empty"));
        }
        let model_name = model_name.trim();
        if model_name.is_empty() {
            return Err(AssistantError::validation("model_name cannot be empty"));
        }
        self.db
            .get_user(user_id)?
            .ok_or_else(|| AssistantError::not_found("user", user_id))?;
        self.db.create_conversation(user_id, title, model_name)
    }

    pub fn update_conversation(
        &self,
        conversation_id: &str,
        title: Option<&str>,
        model_name: Option<&str>,
    ) -> Result<Conversation, AssistantError> {
        if title.is_none() && model_name.is_none() {
            return Err(AssistantError::validation(
                "update requires title or model_name",
            ));
        }
        self.db
            .update_conversation(conversation_id, title, model_name)?
            .ok_or_else(|| AssistantError::not_found("conversation", conversation_id))
    }

    pub fn list_conversations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, AssistantError> {
        self.db.list_conversations_for_user(user_id, limit)
    }

    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, AssistantError> {
        self.db
            .get_conversation(conversation_id)?
            .ok_or_else(|| AssistantError::not_found("conversation", conversation_id))?;
        self.db.list_messages(conversation_id)
    }

    /// The send-message sequence:
    ///
    /// 1. resolve the conversation,
    /// 2. persist the user turn (unconditionally, before any external call,
    ///    so user input survives a downstream failure),
    /// 3. assemble the full ordered history,
    /// 4. ask the gateway for a completion,
    /// 5. persist and return the assistant turn.
    ///
    /// A failure in step 4 propagates to the caller and leaves the user turn
    /// in place; a conversation may therefore hold a user turn with no reply,
    /// and resending is the supported retry.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        model_name: Option<&str>,
    ) -> Result<ChatMessage, AssistantError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AssistantError::validation("message content cannot be empty"));
        }

        let conversation = self
            .db
            .get_conversation(conversation_id)?
            .ok_or_else(|| AssistantError::not_found("conversation", conversation_id))?;
        let model = model_name.unwrap_or(&conversation.model_name);

        let user_turn =
            self.db
                .append_message(conversation_id, MessageRole::User, content, None)?;
        tracing::debug!(
            "conversation {}: stored user turn {}",
            conversation_id,
            user_turn.id
        );

        let history = context::assemble_context(&self.db, conversation_id)?;
        let completion = self.gateway.complete(&history, model).await?;

        let assistant_turn = self.db.append_message(
            conversation_id,
            MessageRole::Assistant,
            &completion.content,
            completion.metadata.as_ref(),
        )?;
        tracing::info!(
            "conversation {}: assistant turn {} via {}",
            conversation_id,
            assistant_turn.id,
            model
        );
        Ok(assistant_turn)
    }
}
