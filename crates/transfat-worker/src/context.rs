//! Task dispatch seam
//!
//! The API's application state implements [`TaskHandlerContext`]. The queue
//! holds only a weak reference, so dropping the state stops dispatch instead
//! of keeping the whole application alive.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use transfat_core::models::Task;

#[async_trait]
pub trait TaskHandlerContext: Send + Sync {
    /// Run the handler registered for `task.task_type`. The returned JSON is
    /// stored as the task result. Wrap errors in
    /// [`transfat_core::TaskError::unrecoverable`] to skip remaining retries.
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<serde_json::Value>;
}
