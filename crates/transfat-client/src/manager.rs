//! Registry of the uploads a client process is running.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::controller::UploadController;
use crate::error::UploadError;

/// Controllers keyed by a locally assigned task id.
#[derive(Default)]
pub struct UploadManager {
    uploads: Mutex<HashMap<Uuid, Arc<UploadController>>>,
}

impl UploadManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, controller: Arc<UploadController>) -> Uuid {
        let task_id = Uuid::new_v4();
        self.uploads.lock().await.insert(task_id, controller);
        task_id
    }

    pub async fn get(&self, task_id: Uuid) -> Option<Arc<UploadController>> {
        self.uploads.lock().await.get(&task_id).cloned()
    }

    pub async fn task_ids(&self) -> Vec<Uuid> {
        self.uploads.lock().await.keys().copied().collect()
    }

    /// Drop a finished upload. Active uploads must be cancelled first.
    pub async fn remove(&self, task_id: Uuid) -> Result<(), UploadError> {
        let controller = self
            .get(task_id)
            .await
            .ok_or_else(|| UploadError::InvalidState(format!("No upload task {}", task_id)))?;
        controller.remove().await?;
        self.uploads.lock().await.remove(&task_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UploadCoordinatorApi;
    use crate::controller::ControllerConfig;
    use crate::error::TransferError;
    use crate::transport::PartTransport;
    use async_trait::async_trait;
    use bytes::Bytes;
    use transfat_core::models::{
        CompleteUploadResponse, InitiateUploadRequest, InitiateUploadResponse, PartETag,
        PartUrlResponse, UpdateStatusResponse, UploadStatus,
    };

    struct UnreachableApi;

    #[async_trait]
    impl UploadCoordinatorApi for UnreachableApi {
        async fn initiate(
            &self,
            _request: &InitiateUploadRequest,
        ) -> Result<InitiateUploadResponse, UploadError> {
            Err(UploadError::api("connection refused"))
        }

        async fn part_url(
            &self,
            _upload_id: &str,
            _part_number: u32,
        ) -> Result<PartUrlResponse, UploadError> {
            Err(UploadError::api("connection refused"))
        }

        async fn complete(
            &self,
            _upload_id: &str,
            _parts: &[PartETag],
        ) -> Result<CompleteUploadResponse, UploadError> {
            Err(UploadError::api("connection refused"))
        }

        async fn update_status(
            &self,
            _upload_id: &str,
            _status: UploadStatus,
        ) -> Result<UpdateStatusResponse, UploadError> {
            Err(UploadError::api("connection refused"))
        }
    }

    struct NoTransport;

    #[async_trait]
    impl PartTransport for NoTransport {
        async fn put_part(&self, _url: &str, _body: Bytes) -> Result<String, TransferError> {
            Err(TransferError::Transient("unused".into()))
        }
    }

    fn controller() -> Arc<UploadController> {
        Arc::new(UploadController::new(
            Arc::new(UnreachableApi),
            Arc::new(NoTransport),
            ControllerConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_remove_idle_upload_is_rejected() {
        let manager = UploadManager::new();
        let task_id = manager.add(controller()).await;

        assert!(manager.remove(task_id).await.is_err());
        assert!(manager.get(task_id).await.is_some());
    }

    #[tokio::test]
    async fn test_remove_after_cancel() {
        let manager = UploadManager::new();
        let ctrl = controller();
        let task_id = manager.add(ctrl.clone()).await;

        ctrl.cancel().await;
        manager.remove(task_id).await.unwrap();
        assert!(manager.get(task_id).await.is_none());
        assert!(manager.task_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_after_failed_initiate() {
        let manager = UploadManager::new();
        let ctrl = controller();
        let task_id = manager.add(ctrl.clone()).await;

        let err = ctrl
            .start(
                crate::source::PartSource::Memory(Bytes::from_static(b"abc")),
                "a.mp4",
                "video/mp4",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Api { .. }));

        manager.remove(task_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_unknown_task() {
        let manager = UploadManager::new();
        assert!(matches!(
            manager.remove(Uuid::new_v4()).await,
            Err(UploadError::InvalidState(_))
        ));
    }
}
