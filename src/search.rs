//! Saved search submissions and their deferred execution.

use std::sync::Arc;

use crate::database::{AssistantDatabase, JobTable, SearchQuery, SearchType};
use crate::error::AssistantError;
use crate::gateway::CapabilityGateway;
use crate::jobs;

#[derive(Clone)]
pub struct SearchService {
    db: Arc<AssistantDatabase>,
    gateway: Arc<dyn CapabilityGateway>,
}

impl SearchService {
    pub fn new(db: Arc<AssistantDatabase>, gateway: Arc<dyn CapabilityGateway>) -> Self {
        Self { db, gateway }
    }

    /// Record a search request without running it. The row starts out
    /// pending with no results until `execute` is called for it.
    pub fn submit(
        &self,
        user_id: &str,
        query: &str,
        search_type: &str,
    ) -> Result<SearchQuery, AssistantError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AssistantError::validation("search query cannot be empty"));
        }
        let search_type = SearchType::parse(search_type).ok_or_else(|| {
            AssistantError::validation(format!("unknown search type: {}", search_type))
        })?;
        self.db
            .get_user(user_id)?
            .ok_or_else(|| AssistantError::not_found("user", user_id))?;

        let search = self.db.create_search_query(user_id, query, search_type)?;
        tracing::debug!(
            "queued {} search {} for user {}",
            search_type.as_db_str(),
            search.id,
            user_id
        );
        Ok(search)
    }

    pub async fn execute(&self, search_id: &str) -> Result<SearchQuery, AssistantError> {
        let search = self
            .db
            .get_search_query(search_id)?
            .ok_or_else(|| AssistantError::not_found("search query", search_id))?;

        jobs::run_job(&self.db, JobTable::SearchQueries, search_id, || async {
            self.gateway.search(&search.query, search.search_type).await
        })
        .await?;

        self.db
            .get_search_query(search_id)?
            .ok_or_else(|| AssistantError::not_found("search query", search_id))
    }

    pub fn history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchQuery>, AssistantError> {
        self.db.list_searches_for_user(user_id, limit)
    }
}
