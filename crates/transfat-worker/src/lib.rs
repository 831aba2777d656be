//! Transfat background work
//!
//! [`TaskQueue`] persists jobs through a [`transfat_db::TaskStore`] and runs
//! them on a bounded worker pool. Delivery is at-least-once: handlers must be
//! idempotent.

pub mod context;
pub mod queue;

pub use context::TaskHandlerContext;
pub use queue::{
    TaskQueue, TaskQueueConfig, TaskReport, TaskReportSender, MAX_RETRY_BACKOFF_SECS,
};
