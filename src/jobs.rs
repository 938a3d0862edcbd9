//! Status lifecycle engine shared by media processing and search execution.
//!
//! One job row moves `pending|failed -> processing -> completed|failed`.
//! The processing transition is persisted before the operation runs, so a
//! crash mid-operation leaves a visibly stuck row instead of a silently
//! lost one.

use serde_json::{json, Value};
use std::future::Future;

use crate::database::{AssistantDatabase, JobTable, ProcessingStatus};
use crate::error::AssistantError;

/// Drive one job through the lifecycle.
///
/// On success the result payload lands atomically with the `completed`
/// status. On failure a structured error payload is recorded best-effort
/// (a secondary persistence failure is logged, never thrown) and the
/// original error is re-raised to the caller.
pub async fn run_job<F, Fut>(
    db: &AssistantDatabase,
    table: JobTable,
    id: &str,
    operation: F,
) -> Result<Value, AssistantError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, AssistantError>>,
{
    let status = db
        .job_status(table, id)?
        .ok_or_else(|| AssistantError::not_found(table.entity_name(), id))?;

    match status {
        ProcessingStatus::Completed => {
            return Err(AssistantError::validation(format!(
                "{} {} already completed",
                table.entity_name(),
                id
            )));
        }
        ProcessingStatus::Processing => {
            // Allowed back in: a crashed run leaves this state behind.
            tracing::warn!(
                "{} {} still marked processing; re-driving",
                table.entity_name(),
                id
            );
        }
        ProcessingStatus::Pending | ProcessingStatus::Failed => {}
    }

    db.mark_job_processing(table, id)?;
    tracing::debug!("{} {} entered processing", table.entity_name(), id);

    match operation().await {
        Ok(payload) => {
            db.complete_job(table, id, &payload)?;
            tracing::info!("{} {} completed", table.entity_name(), id);
            Ok(payload)
        }
        Err(err) => {
            let failure = failure_payload(&err);
            if let Err(db_err) = db.fail_job(table, id, &failure) {
                tracing::warn!(
                    "Failed to persist failure for {} {}: {}",
                    table.entity_name(),
                    id,
                    db_err
                );
            }
            tracing::info!("{} {} failed: {}", table.entity_name(), id, err);
            Err(err)
        }
    }
}

/// Structured payload recorded on the row when a job fails. Never null, so
/// a failed row always explains itself.
pub fn failure_payload(err: &AssistantError) -> Value {
    json!({
        "error": err.to_string(),
        "kind": err.kind(),
    })
}
