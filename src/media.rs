//! Media upload registration and lifecycle-driven processing.
//!
//! Upload stores metadata only; no bytes move through this service. The
//! processing operation dispatches on the (file_type, processing_type)
//! table in `gateway::MediaProcessing` and drives the row through the
//! shared status lifecycle.

use std::sync::Arc;

use crate::database::{AssistantDatabase, FileType, JobTable, MediaFile};
use crate::error::AssistantError;
use crate::gateway::{CapabilityGateway, MediaAnalysisRequest, MediaProcessing};
use crate::jobs;

#[derive(Clone)]
pub struct MediaService {
    db: Arc<AssistantDatabase>,
    gateway: Arc<dyn CapabilityGateway>,
}

impl MediaService {
    pub fn new(db: Arc<AssistantDatabase>, gateway: Arc<dyn CapabilityGateway>) -> Self {
        Self { db, gateway }
    }

    pub fn upload(
        &self,
        user_id: &str,
        filename: &str,
        original_filename: &str,
        file_type: &str,
        file_size: i64,
        file_path: &str,
    ) -> Result<MediaFile, AssistantError> {
        let file_type = FileType::parse(file_type)
            .ok_or_else(|| AssistantError::validation(format!("unknown file type: {}", file_type)))?;
        if filename.trim().is_empty() {
            return Err(AssistantError::validation("filename cannot be empty"));
        }
        if file_size < 0 {
            return Err(AssistantError::validation("file size cannot be negative"));
        }
        if file_path.trim().is_empty() {
            return Err(AssistantError::validation("file path cannot be empty"));
        }
        self.db
            .get_user(user_id)?
            .ok_or_else(|| AssistantError::not_found("user", user_id))?;

        let media = self.db.create_media_file(
            user_id,
            filename.trim(),
            original_filename.trim(),
            file_type,
            file_size,
            file_path.trim(),
        )?;
        tracing::info!(
            "registered {} upload {} for user {}",
            file_type.as_db_str(),
            media.id,
            user_id
        );
        Ok(media)
    }

    /// Run one processing pass over an uploaded file and return the
    /// materialized row. An unrecognized (file_type, processing_type)
    /// pair is rejected before any status transition.
    pub async fn process(
        &self,
        media_id: &str,
        processing_type: &str,
        model_name: &str,
    ) -> Result<MediaFile, AssistantError> {
        let media = self
            .db
            .get_media_file(media_id)?
            .ok_or_else(|| AssistantError::not_found("media file", media_id))?;

        let kind = MediaProcessing::from_parts(media.file_type, processing_type).ok_or_else(|| {
            AssistantError::validation(format!(
                "unsupported processing '{}' for {} files",
                processing_type,
                media.file_type.as_db_str()
            ))
        })?;

        let request = MediaAnalysisRequest {
            kind,
            file_reference: media.file_path.clone(),
            model_name: model_name.to_string(),
        };
        jobs::run_job(&self.db, JobTable::MediaFiles, media_id, || async {
            self.gateway.analyze_media(&request).await
        })
        .await?;

        self.db
            .get_media_file(media_id)?
            .ok_or_else(|| AssistantError::not_found("media file", media_id))
    }

    pub fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MediaFile>, AssistantError> {
        self.db.list_media_for_user(user_id, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{ProcessingStatus, SearchType};
    use crate::gateway::{Completion, PromptMessage};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::PathBuf;

    struct CannedAnalyzer {
        fail: bool,
    }

    #[async_trait]
    impl CapabilityGateway for CannedAnalyzer {
        async fn complete(
            &self,
            _history: &[PromptMessage],
            _model_name: &str,
        ) -> Result<Completion, AssistantError> {
            Err(AssistantError::capability("not wired in this test"))
        }

        async fn analyze_media(
            &self,
            request: &MediaAnalysisRequest,
        ) -> Result<Value, AssistantError> {
            if self.fail {
                return Err(AssistantError::capability("vision backend offline"));
            }
            Ok(match request.kind {
                MediaProcessing::ImageAnalysis => json!({
                    "analysis": "Image analysis completed",
                    "objects_detected": ["person", "car", "building"],
                    "confidence_scores": [0.95, 0.87, 0.92],
                    "model_used": request.model_name,
                }),
                other => json!({"kind": other.processing_label()}),
            })
        }

        async fn search(
            &self,
            _query: &str,
            _search_type: SearchType,
        ) -> Result<Value, AssistantError> {
            Err(AssistantError::capability("not wired in this test"))
        }
    }

    fn temp_db_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("factotum_{}_{}.db", name, uuid::Uuid::new_v4()));
        path
    }

    fn service(path: &PathBuf, fail: bool) -> (MediaService, Arc<AssistantDatabase>) {
        let db = Arc::new(AssistantDatabase::new(path).expect("db init"));
        let gateway = Arc::new(CannedAnalyzer { fail });
        (MediaService::new(db.clone(), gateway), db)
    }

    #[tokio::test]
    async fn upload_validates_before_touching_storage() {
        let path = temp_db_path("upload_validate");
        let (media, db) = service(&path, false);
        let user = db.create_user("pat@example.com", "Pat").expect("user");

        let err = media
            .upload(&user.id, "x.gif", "x.gif", "gif", 10, "/uploads/x.gif")
            .expect_err("gif is not a known file type");
        assert!(matches!(err, AssistantError::Validation(_)));

        let err = media
            .upload(&user.id, "x.png", "x.png", "image", -1, "/uploads/x.png")
            .expect_err("negative size");
        assert!(matches!(err, AssistantError::Validation(_)));

        let err = media
            .upload("ghost", "x.png", "x.png", "image", 10, "/uploads/x.png")
            .expect_err("unknown owner");
        assert!(matches!(err, AssistantError::NotFound { .. }));

        let stored = media
            .upload(&user.id, "x.png", "photo.png", "image", 10, "/uploads/x.png")
            .expect("valid upload");
        assert_eq!(stored.processing_status, ProcessingStatus::Pending);
        assert!(stored.processing_result.is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn image_analysis_completes_with_detected_objects() {
        let path = temp_db_path("image_analysis");
        let (media, db) = service(&path, false);
        let user = db.create_user("pat@example.com", "Pat").expect("user");
        let uploaded = media
            .upload(&user.id, "m1.png", "shot.png", "image", 4096, "/uploads/m1.png")
            .expect("upload");

        let processed = media
            .process(&uploaded.id, "analysis", "gpt-4")
            .await
            .expect("process");
        assert_eq!(processed.processing_status, ProcessingStatus::Completed);
        let result = processed.processing_result.expect("result payload");
        let objects = result["objects_detected"]
            .as_array()
            .expect("object list");
        assert!(!objects.is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn unrecognized_combination_is_rejected_without_transition() {
        let path = temp_db_path("bad_combo");
        let (media, db) = service(&path, false);
        let user = db.create_user("pat@example.com", "Pat").expect("user");
        let uploaded = media
            .upload(&user.id, "v1.mp4", "clip.mp4", "video", 9000, "/uploads/v1.mp4")
            .expect("upload");

        let err = media
            .process(&uploaded.id, "enhancement", "gpt-4")
            .await
            .expect_err("video enhancement is not in the table");
        assert!(matches!(err, AssistantError::Validation(_)));

        let row = db
            .get_media_file(&uploaded.id)
            .expect("get")
            .expect("row exists");
        assert_eq!(row.processing_status, ProcessingStatus::Pending);
        assert!(row.processing_result.is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn gateway_failure_marks_the_row_failed_and_reraises() {
        let path = temp_db_path("media_outage");
        let (media, db) = service(&path, true);
        let user = db.create_user("pat@example.com", "Pat").expect("user");
        let uploaded = media
            .upload(&user.id, "m2.png", "pic.png", "image", 100, "/uploads/m2.png")
            .expect("upload");

        let err = media
            .process(&uploaded.id, "analysis", "gpt-4")
            .await
            .expect_err("backend offline");
        assert!(matches!(err, AssistantError::CapabilityUnavailable(_)));

        let row = db
            .get_media_file(&uploaded.id)
            .expect("get")
            .expect("row exists");
        assert_eq!(row.processing_status, ProcessingStatus::Failed);
        let payload = row.processing_result.expect("failure payload");
        assert_eq!(payload["kind"], "capability_unavailable");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn processing_a_missing_file_is_not_found() {
        let path = temp_db_path("media_missing");
        let (media, _db) = service(&path, false);

        let err = media
            .process("no-such-media", "analysis", "gpt-4")
            .await
            .expect_err("missing row");
        assert!(matches!(err, AssistantError::NotFound { .. }));

        let _ = std::fs::remove_file(&path);
    }
}
