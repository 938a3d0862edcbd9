use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

use crate::error::AssistantError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_db_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    fn from_db(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Image,
    Video,
}

impl FileType {
    pub fn as_db_str(self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "image" => Some(FileType::Image),
            "video" => Some(FileType::Video),
            _ => None,
        }
    }

    fn from_db(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(FileType::Image)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Advanced,
    Extended,
}

impl SearchType {
    pub fn as_db_str(self) -> &'static str {
        match self {
            SearchType::Advanced => "advanced",
            SearchType::Extended => "extended",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "advanced" => Some(SearchType::Advanced),
            "extended" => Some(SearchType::Extended),
            _ => None,
        }
    }

    fn from_db(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(SearchType::Advanced)
    }
}

/// Lifecycle state shared by media processing and search execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn from_db(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "processing" => ProcessingStatus::Processing,
            "completed" => ProcessingStatus::Completed,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One turn in a conversation. Append-only: rows are never updated or
/// deleted outside a cascade from their conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub original_filename: String,
    pub file_type: FileType,
    pub file_size: i64,
    pub file_path: String,
    pub processing_status: ProcessingStatus,
    pub processing_result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub id: String,
    pub user_id: String,
    pub query: String,
    pub search_type: SearchType,
    pub results: Option<Value>,
    pub status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pricing is stored in integer minor units (cents). Conversion to decimal
/// happens at the presentation boundary only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiModel {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub description: Option<String>,
    pub context_length: i64,
    pub pricing_input: i64,
    pub pricing_output: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The two job-bearing tables driven by the status lifecycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTable {
    MediaFiles,
    SearchQueries,
}

impl JobTable {
    pub fn entity_name(self) -> &'static str {
        match self {
            JobTable::MediaFiles => "media file",
            JobTable::SearchQueries => "search query",
        }
    }

    fn table(self) -> &'static str {
        match self {
            JobTable::MediaFiles => "media_files",
            JobTable::SearchQueries => "search_queries",
        }
    }

    fn status_column(self) -> &'static str {
        match self {
            JobTable::MediaFiles => "processing_status",
            JobTable::SearchQueries => "status",
        }
    }

    fn result_column(self) -> &'static str {
        match self {
            JobTable::MediaFiles => "processing_result",
            JobTable::SearchQueries => "results",
        }
    }
}

pub struct AssistantDatabase {
    conn: Mutex<Connection>,
}

impl AssistantDatabase {
    /// Helper to lock the connection
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AssistantError> {
        self.conn
            .lock()
            .map_err(|e| AssistantError::persistence(format!("database lock poisoned: {}", e)))
    }

    /// Create or open the database
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, AssistantError> {
        let conn = Connection::open(path)?;
        // Cascade deletes rely on SQLite actually enforcing foreign keys.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.ensure_schema()?;
        Ok(db)
    }

    fn ensure_schema(&self) -> Result<(), AssistantError> {
        let conn = self.lock_conn()?;

        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
            [],
        )?;

        // A conversation binds one user to one model selection at a time.
        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                model_name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
            [],
        )?;

        // Append-only turn log.
        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT,
                created_at TEXT NOT NULL
            )"#,
            [],
        )?;

        // Uploaded assets awaiting or undergoing processing.
        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS media_files (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                filename TEXT NOT NULL,
                original_filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                file_path TEXT NOT NULL,
                processing_status TEXT NOT NULL DEFAULT 'pending',
                processing_result TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
            [],
        )?;

        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS search_queries (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                query TEXT NOT NULL,
                search_type TEXT NOT NULL,
                results TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
            [],
        )?;

        // Selectable capability descriptors; read-only for the services.
        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS ai_models (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                provider TEXT NOT NULL,
                description TEXT,
                context_length INTEGER NOT NULL,
                pricing_input INTEGER NOT NULL,
                pricing_output INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, updated_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_media_files_user ON media_files(user_id, created_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_search_queries_user ON search_queries(user_id, created_at)",
            [],
        )?;

        Ok(())
    }

    // ---- users ----

    pub fn create_user(&self, email: &str, name: &str) -> Result<User, AssistantError> {
        let now = Utc::now();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock_conn()?;
        let inserted = conn.execute(
            "INSERT INTO users (id, email, name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.email,
                user.name,
                now.to_rfc3339(),
                now.to_rfc3339()
            ],
        );
        match inserted {
            Ok(_) => Ok(user),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AssistantError::validation(format!(
                    "email already registered: {}",
                    email
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>, AssistantError> {
        let conn = self.lock_conn()?;
        let row = conn.query_row(
            "SELECT id, email, name, created_at, updated_at FROM users WHERE id = ?1",
            [id],
            map_user,
        );
        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the user and, through the schema's cascades, every
    /// conversation, message, media file, and search query they own.
    pub fn delete_user(&self, id: &str) -> Result<bool, AssistantError> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    // ---- conversations ----

    pub fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
        model_name: &str,
    ) -> Result<Conversation, AssistantError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            model_name: model_name.to_string(),
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO conversations (id, user_id, title, model_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                conversation.id,
                conversation.user_id,
                conversation.title,
                conversation.model_name,
                now.to_rfc3339(),
                now.to_rfc3339()
            ],
        )?;
        Ok(conversation)
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, AssistantError> {
        let conn = self.lock_conn()?;
        let row = conn.query_row(
            "SELECT id, user_id, title, model_name, created_at, updated_at
             FROM conversations WHERE id = ?1",
            [id],
            map_conversation,
        );
        match row {
            Ok(conversation) => Ok(Some(conversation)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Partial update; absent fields keep their value. Returns the
    /// materialized row, or None when the conversation does not exist.
    pub fn update_conversation(
        &self,
        id: &str,
        title: Option<&str>,
        model_name: Option<&str>,
    ) -> Result<Option<Conversation>, AssistantError> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE conversations
             SET title = COALESCE(?2, title),
                 model_name = COALESCE(?3, model_name),
                 updated_at = ?4
             WHERE id = ?1",
            params![id, title, model_name, Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let row = conn.query_row(
            "SELECT id, user_id, title, model_name, created_at, updated_at
             FROM conversations WHERE id = ?1",
            [id],
            map_conversation,
        )?;
        Ok(Some(row))
    }

    pub fn list_conversations_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, AssistantError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, model_name, created_at, updated_at
             FROM conversations
             WHERE user_id = ?1
             ORDER BY updated_at DESC
             LIMIT ?2",
        )?;
        let conversations = stmt
            .query_map(params![user_id, limit], map_conversation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conversations)
    }

    // ---- messages ----

    pub fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        metadata: Option<&Value>,
    ) -> Result<ChatMessage, AssistantError> {
        let now = Utc::now();
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            metadata: metadata.cloned(),
            created_at: now,
        };

        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.conversation_id,
                role.as_db_str(),
                message.content,
                metadata.map(|v| v.to_string()),
                now.to_rfc3339()
            ],
        )?;
        Ok(message)
    }

    /// Full history, ascending by created_at with insertion order breaking
    /// ties (two writes can land inside one timestamp granule).
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, AssistantError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, metadata, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let messages = stmt
            .query_map([conversation_id], map_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    // ---- media files ----

    pub fn create_media_file(
        &self,
        user_id: &str,
        filename: &str,
        original_filename: &str,
        file_type: FileType,
        file_size: i64,
        file_path: &str,
    ) -> Result<MediaFile, AssistantError> {
        let now = Utc::now();
        let media = MediaFile {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            filename: filename.to_string(),
            original_filename: original_filename.to_string(),
            file_type,
            file_size,
            file_path: file_path.to_string(),
            processing_status: ProcessingStatus::Pending,
            processing_result: None,
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO media_files (id, user_id, filename, original_filename, file_type,
                                      file_size, file_path, processing_status, processing_result,
                                      created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?10)",
            params![
                media.id,
                media.user_id,
                media.filename,
                media.original_filename,
                file_type.as_db_str(),
                media.file_size,
                media.file_path,
                ProcessingStatus::Pending.as_db_str(),
                now.to_rfc3339(),
                now.to_rfc3339()
            ],
        )?;
        Ok(media)
    }

    pub fn get_media_file(&self, id: &str) -> Result<Option<MediaFile>, AssistantError> {
        let conn = self.lock_conn()?;
        let row = conn.query_row(
            "SELECT id, user_id, filename, original_filename, file_type, file_size, file_path,
                    processing_status, processing_result, created_at, updated_at
             FROM media_files WHERE id = ?1",
            [id],
            map_media_file,
        );
        match row {
            Ok(media) => Ok(Some(media)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_media_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MediaFile>, AssistantError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, filename, original_filename, file_type, file_size, file_path,
                    processing_status, processing_result, created_at, updated_at
             FROM media_files
             WHERE user_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;
        let media = stmt
            .query_map(params![user_id, limit], map_media_file)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(media)
    }

    // ---- search queries ----

    pub fn create_search_query(
        &self,
        user_id: &str,
        query: &str,
        search_type: SearchType,
    ) -> Result<SearchQuery, AssistantError> {
        let now = Utc::now();
        let search = SearchQuery {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            query: query.to_string(),
            search_type,
            results: None,
            status: ProcessingStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO search_queries (id, user_id, query, search_type, results, status,
                                         created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7)",
            params![
                search.id,
                search.user_id,
                search.query,
                search_type.as_db_str(),
                ProcessingStatus::Pending.as_db_str(),
                now.to_rfc3339(),
                now.to_rfc3339()
            ],
        )?;
        Ok(search)
    }

    pub fn get_search_query(&self, id: &str) -> Result<Option<SearchQuery>, AssistantError> {
        let conn = self.lock_conn()?;
        let row = conn.query_row(
            "SELECT id, user_id, query, search_type, results, status, created_at, updated_at
             FROM search_queries WHERE id = ?1",
            [id],
            map_search_query,
        );
        match row {
            Ok(search) => Ok(Some(search)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_searches_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchQuery>, AssistantError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, query, search_type, results, status, created_at, updated_at
             FROM search_queries
             WHERE user_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;
        let searches = stmt
            .query_map(params![user_id, limit], map_search_query)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(searches)
    }

    // ---- job lifecycle writes (shared by media and search) ----

    pub fn job_status(
        &self,
        table: JobTable,
        id: &str,
    ) -> Result<Option<ProcessingStatus>, AssistantError> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            table.status_column(),
            table.table()
        );
        match conn.query_row(&sql, [id], |row| row.get::<_, String>(0)) {
            Ok(raw) => Ok(Some(ProcessingStatus::from_db(&raw))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persisted before the job operation runs, so a crash mid-operation
    /// leaves a visibly stuck row rather than a silently lost one. Clears
    /// any previous result payload.
    pub fn mark_job_processing(&self, table: JobTable, id: &str) -> Result<(), AssistantError> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "UPDATE {} SET {} = ?2, {} = NULL, updated_at = ?3 WHERE id = ?1",
            table.table(),
            table.status_column(),
            table.result_column()
        );
        conn.execute(
            &sql,
            params![
                id,
                ProcessingStatus::Processing.as_db_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Terminal status and result payload land in one atomic row update.
    pub fn complete_job(
        &self,
        table: JobTable,
        id: &str,
        payload: &Value,
    ) -> Result<(), AssistantError> {
        self.finish_job(table, id, ProcessingStatus::Completed, payload)
    }

    pub fn fail_job(
        &self,
        table: JobTable,
        id: &str,
        payload: &Value,
    ) -> Result<(), AssistantError> {
        self.finish_job(table, id, ProcessingStatus::Failed, payload)
    }

    fn finish_job(
        &self,
        table: JobTable,
        id: &str,
        status: ProcessingStatus,
        payload: &Value,
    ) -> Result<(), AssistantError> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "UPDATE {} SET {} = ?2, {} = ?3, updated_at = ?4 WHERE id = ?1",
            table.table(),
            table.status_column(),
            table.result_column()
        );
        conn.execute(
            &sql,
            params![
                id,
                status.as_db_str(),
                payload.to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    // ---- model catalog ----

    #[allow(clippy::too_many_arguments)]
    pub fn insert_model(
        &self,
        name: &str,
        provider: &str,
        description: Option<&str>,
        context_length: i64,
        pricing_input: i64,
        pricing_output: i64,
        is_active: bool,
    ) -> Result<AiModel, AssistantError> {
        let now = Utc::now();
        let model = AiModel {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            provider: provider.to_string(),
            description: description.map(|d| d.to_string()),
            context_length,
            pricing_input,
            pricing_output,
            is_active,
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock_conn()?;
        let inserted = conn.execute(
            "INSERT INTO ai_models (id, name, provider, description, context_length,
                                    pricing_input, pricing_output, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                model.id,
                model.name,
                model.provider,
                model.description,
                model.context_length,
                model.pricing_input,
                model.pricing_output,
                model.is_active,
                now.to_rfc3339(),
                now.to_rfc3339()
            ],
        );
        match inserted {
            Ok(_) => Ok(model),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AssistantError::validation(format!(
                    "model already registered: {}",
                    name
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_active_models(&self) -> Result<Vec<AiModel>, AssistantError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, provider, description, context_length, pricing_input,
                    pricing_output, is_active, created_at, updated_at
             FROM ai_models
             WHERE is_active = 1
             ORDER BY name DESC",
        )?;
        let models = stmt
            .query_map([], map_model)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(models)
    }

    /// Lookup by selection key; inactive models are invisible here.
    pub fn find_active_model(&self, name: &str) -> Result<Option<AiModel>, AssistantError> {
        let conn = self.lock_conn()?;
        let row = conn.query_row(
            "SELECT id, name, provider, description, context_length, pricing_input,
                    pricing_output, is_active, created_at, updated_at
             FROM ai_models
             WHERE name = ?1 AND is_active = 1",
            [name],
            map_model,
        );
        match row {
            Ok(model) => Ok(Some(model)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Seed the catalog a fresh install starts with. Keyed on the unique
    /// model name, so re-running is a no-op.
    pub fn seed_default_models(&self) -> Result<usize, AssistantError> {
        let defaults: &[(&str, &str, &str, i64, i64, i64)] = &[
            (
                "gpt-4",
                "openai",
                "General-purpose flagship model",
                8192,
                3000,
                6000,
            ),
            (
                "gpt-3.5-turbo",
                "openai",
                "Fast, inexpensive chat model",
                16385,
                50,
                150,
            ),
            (
                "claude-3-opus",
                "anthropic",
                "Long-context reasoning model",
                200000,
                1500,
                7500,
            ),
        ];

        let conn = self.lock_conn()?;
        let mut seeded = 0;
        for (name, provider, description, context_length, pricing_input, pricing_output) in
            defaults
        {
            let now = Utc::now().to_rfc3339();
            seeded += conn.execute(
                "INSERT OR IGNORE INTO ai_models (id, name, provider, description, context_length,
                                                  pricing_input, pricing_output, is_active,
                                                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    name,
                    provider,
                    description,
                    context_length,
                    pricing_input,
                    pricing_output,
                    now,
                    now
                ],
            )?;
        }
        Ok(seeded)
    }
}

fn read_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    row.get::<_, String>(idx)?.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn read_json(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: read_timestamp(row, 3)?,
        updated_at: read_timestamp(row, 4)?,
    })
}

fn map_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        model_name: row.get(3)?,
        created_at: read_timestamp(row, 4)?,
        updated_at: read_timestamp(row, 5)?,
    })
}

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: MessageRole::from_db(&row.get::<_, String>(2)?),
        content: row.get(3)?,
        metadata: read_json(row, 4)?,
        created_at: read_timestamp(row, 5)?,
    })
}

fn map_media_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaFile> {
    Ok(MediaFile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        filename: row.get(2)?,
        original_filename: row.get(3)?,
        file_type: FileType::from_db(&row.get::<_, String>(4)?),
        file_size: row.get(5)?,
        file_path: row.get(6)?,
        processing_status: ProcessingStatus::from_db(&row.get::<_, String>(7)?),
        processing_result: read_json(row, 8)?,
        created_at: read_timestamp(row, 9)?,
        updated_at: read_timestamp(row, 10)?,
    })
}

fn map_search_query(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchQuery> {
    Ok(SearchQuery {
        id: row.get(0)?,
        user_id: row.get(1)?,
        query: row.get(2)?,
        search_type: SearchType::from_db(&row.get::<_, String>(3)?),
        results: read_json(row, 4)?,
        status: ProcessingStatus::from_db(&row.get::<_, String>(5)?),
        created_at: read_timestamp(row, 6)?,
        updated_at: read_timestamp(row, 7)?,
    })
}

fn map_model(row: &rusqlite::Row<'_>) -> rusqlite::Result<AiModel> {
    Ok(AiModel {
        id: row.get(0)?,
        name: row.get(1)?,
        provider: row.get(2)?,
        description: row.get(3)?,
        context_length: row.get(4)?,
        pricing_input: row.get(5)?,
        pricing_output: row.get(6)?,
        is_active: row.get(7)?,
        created_at: read_timestamp(row, 8)?,
        updated_at: read_timestamp(row, 9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn temp_db_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("factotum_{}_{}.db", name, uuid::Uuid::new_v4()));
        path
    }

    fn seeded_user(db: &AssistantDatabase) -> User {
        db.create_user("ada@example.com", "Ada")
            .expect("create user")
    }

    #[test]
    fn duplicate_email_is_rejected_as_validation() {
        let path = temp_db_path("dup_email");
        let db = AssistantDatabase::new(&path).expect("db init");

        seeded_user(&db);
        let err = db
            .create_user("ada@example.com", "Second Ada")
            .expect_err("duplicate email must fail");
        assert!(matches!(err, AssistantError::Validation(_)));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn deleting_a_user_cascades_to_owned_rows() {
        let path = temp_db_path("cascade");
        let db = AssistantDatabase::new(&path).expect("db init");

        let user = seeded_user(&db);
        let conversation = db
            .create_conversation(&user.id, "Trip planning", "gpt-4")
            .expect("create conversation");
        db.append_message(&conversation.id, MessageRole::User, "hello", None)
            .expect("append message");
        let media = db
            .create_media_file(
                &user.id,
                "a1.png",
                "holiday.png",
                FileType::Image,
                2048,
                "/uploads/a1.png",
            )
            .expect("create media");
        let search = db
            .create_search_query(&user.id, "best beaches", SearchType::Advanced)
            .expect("create search");

        assert!(db.delete_user(&user.id).expect("delete user"));
        assert!(db
            .get_conversation(&conversation.id)
            .expect("get conversation")
            .is_none());
        assert!(db.list_messages(&conversation.id).expect("list").is_empty());
        assert!(db.get_media_file(&media.id).expect("get media").is_none());
        assert!(db
            .get_search_query(&search.id)
            .expect("get search")
            .is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn conversation_patch_keeps_unset_fields() {
        let path = temp_db_path("conversation_patch");
        let db = AssistantDatabase::new(&path).expect("db init");

        let user = seeded_user(&db);
        let conversation = db
            .create_conversation(&user.id, "First title", "gpt-4")
            .expect("create conversation");

        let patched = db
            .update_conversation(&conversation.id, Some("Renamed"), None)
            .expect("update")
            .expect("conversation exists");
        assert_eq!(patched.title, "Renamed");
        assert_eq!(patched.model_name, "gpt-4");
        assert!(patched.updated_at >= conversation.updated_at);

        assert!(db
            .update_conversation("missing", Some("x"), None)
            .expect("update missing")
            .is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn messages_come_back_in_append_order() {
        let path = temp_db_path("message_order");
        let db = AssistantDatabase::new(&path).expect("db init");

        let user = seeded_user(&db);
        let conversation = db
            .create_conversation(&user.id, "Ordering", "gpt-4")
            .expect("create conversation");
        for content in ["first", "second", "third"] {
            db.append_message(&conversation.id, MessageRole::User, content, None)
                .expect("append");
        }

        let messages = db.list_messages(&conversation.id).expect("list messages");
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        for pair in messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn message_metadata_round_trips_as_json() {
        let path = temp_db_path("message_metadata");
        let db = AssistantDatabase::new(&path).expect("db init");

        let user = seeded_user(&db);
        let conversation = db
            .create_conversation(&user.id, "Metadata", "gpt-4")
            .expect("create conversation");
        let metadata = json!({"model": "gpt-4", "tokens_used": 42});
        let message = db
            .append_message(
                &conversation.id,
                MessageRole::Assistant,
                "Hi there",
                Some(&metadata),
            )
            .expect("append");

        let fetched = db.list_messages(&conversation.id).expect("list");
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, message.id);
        assert_eq!(fetched[0].role, MessageRole::Assistant);
        assert_eq!(fetched[0].metadata, Some(metadata));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn job_writes_pair_status_with_result_payload() {
        let path = temp_db_path("job_writes");
        let db = AssistantDatabase::new(&path).expect("db init");

        let user = seeded_user(&db);
        let media = db
            .create_media_file(
                &user.id,
                "b2.mp4",
                "clip.mp4",
                FileType::Video,
                1_000_000,
                "/uploads/b2.mp4",
            )
            .expect("create media");
        assert_eq!(media.processing_status, ProcessingStatus::Pending);
        assert!(media.processing_result.is_none());

        db.mark_job_processing(JobTable::MediaFiles, &media.id)
            .expect("mark processing");
        let in_flight = db
            .get_media_file(&media.id)
            .expect("get")
            .expect("media exists");
        assert_eq!(in_flight.processing_status, ProcessingStatus::Processing);
        assert!(in_flight.processing_result.is_none());

        db.complete_job(
            JobTable::MediaFiles,
            &media.id,
            &json!({"analysis": "done"}),
        )
        .expect("complete");
        let done = db
            .get_media_file(&media.id)
            .expect("get")
            .expect("media exists");
        assert_eq!(done.processing_status, ProcessingStatus::Completed);
        assert_eq!(done.processing_result, Some(json!({"analysis": "done"})));

        let search = db
            .create_search_query(&user.id, "rust sqlite", SearchType::Extended)
            .expect("create search");
        db.mark_job_processing(JobTable::SearchQueries, &search.id)
            .expect("mark processing");
        db.fail_job(
            JobTable::SearchQueries,
            &search.id,
            &json!({"error": "provider down"}),
        )
        .expect("fail");
        let failed = db
            .get_search_query(&search.id)
            .expect("get")
            .expect("search exists");
        assert_eq!(failed.status, ProcessingStatus::Failed);
        assert_eq!(failed.results, Some(json!({"error": "provider down"})));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reentering_processing_clears_stale_failure_payload() {
        let path = temp_db_path("reenter");
        let db = AssistantDatabase::new(&path).expect("db init");

        let user = seeded_user(&db);
        let media = db
            .create_media_file(
                &user.id,
                "c3.png",
                "scan.png",
                FileType::Image,
                512,
                "/uploads/c3.png",
            )
            .expect("create media");
        db.mark_job_processing(JobTable::MediaFiles, &media.id)
            .expect("mark");
        db.fail_job(JobTable::MediaFiles, &media.id, &json!({"error": "boom"}))
            .expect("fail");

        db.mark_job_processing(JobTable::MediaFiles, &media.id)
            .expect("re-mark");
        let retried = db
            .get_media_file(&media.id)
            .expect("get")
            .expect("media exists");
        assert_eq!(retried.processing_status, ProcessingStatus::Processing);
        assert!(retried.processing_result.is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn catalog_hides_inactive_models_and_seeding_is_idempotent() {
        let path = temp_db_path("catalog");
        let db = AssistantDatabase::new(&path).expect("db init");

        db.insert_model("local-llama", "local", None, 4096, 0, 0, true)
            .expect("insert active");
        db.insert_model("retired", "openai", None, 2048, 10, 20, false)
            .expect("insert inactive");

        let active = db.list_active_models().expect("list active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "local-llama");

        assert!(db
            .find_active_model("retired")
            .expect("find retired")
            .is_none());
        assert!(db
            .find_active_model("local-llama")
            .expect("find active")
            .is_some());

        let first = db.seed_default_models().expect("seed");
        assert_eq!(first, 3);
        let second = db.seed_default_models().expect("re-seed");
        assert_eq!(second, 0);

        let _ = std::fs::remove_file(&path);
    }
}
