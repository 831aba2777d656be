//! Data models for the application
//!
//! Upload sessions and their status machines, the chunk layout, queued tasks,
//! and the HTTP wire types shared with the upload client.

mod chunking;
mod task;
mod upload;
mod upload_api;

pub use chunking::*;
pub use task::*;
pub use upload::*;
pub use upload_api::*;
