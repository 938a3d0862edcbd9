//! Conversation-context assembly for reasoning calls.

use crate::database::AssistantDatabase;
use crate::error::AssistantError;
use crate::gateway::PromptMessage;

/// Project a conversation's full history into the shape completion calls
/// take: every message ever appended, ascending by created_at, including
/// one written earlier in the same request.
///
/// The sequence is bounded only by storage. Callers needing truncation
/// apply their own windowing from the selected model's context length.
pub fn assemble_context(
    db: &AssistantDatabase,
    conversation_id: &str,
) -> Result<Vec<PromptMessage>, AssistantError> {
    let messages = db.list_messages(conversation_id)?;
    Ok(messages
        .into_iter()
        .map(|m| PromptMessage::new(m.role.as_db_str(), m.content))
        .collect())
}
