use super::model::{NotificationPage, UnreadCount};
use crate::error::Result;
use crate::http::{ApiRequest, RequestPipeline};
use std::sync::Arc;

/// REST surface of the notification service, routed through the authenticated pipeline
#[derive(Clone)]
pub struct NotificationApi {
    pipeline: Arc<RequestPipeline>,
}

impl NotificationApi {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    /// `GET /notifications/me`
    pub async fn list(&self, page: u32, page_size: u32, unread_only: bool) -> Result<NotificationPage> {
        let request = ApiRequest::get("/notifications/me")
            .query("page", page)
            .query("page_size", page_size)
            .query("unread_only", unread_only);
        self.pipeline.call_json(request).await
    }

    pub async fn unread_count(&self) -> Result<u64> {
        let count: UnreadCount = self
            .pipeline
            .call_json(ApiRequest::get("/notifications/unread-count"))
            .await?;
        Ok(count.unread_count)
    }

    pub async fn mark_read(&self, id: &str) -> Result<()> {
        self.pipeline
            .put(&format!("/notifications/{}/read", urlencoding::encode(id)), None)
            .await?;
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        self.pipeline.put("/notifications/mark-all-read", None).await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.pipeline
            .delete(&format!("/notifications/{}", urlencoding::encode(id)))
            .await?;
        Ok(())
    }
}
