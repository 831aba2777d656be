//! TaskHandlerContext implementation for AppState.
//!
//! Dispatches tasks to the appropriate handler based on task type.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use transfat_core::models::{Task, TaskType};
use transfat_worker::TaskHandlerContext;

use crate::state::AppState;
use crate::task_handlers::{TaskHandler, TranscodeTaskHandler};

#[async_trait]
impl TaskHandlerContext for AppState {
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<serde_json::Value> {
        match task.task_type {
            TaskType::TranscodeVideo => {
                let handler = TranscodeTaskHandler;
                handler.process(task, self).await
            }
        }
    }
}
