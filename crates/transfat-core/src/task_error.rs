//! Task execution errors
//!
//! A handler returns `anyhow::Error`; wrapping it in [`TaskError`] lets the
//! handler tell the queue whether another attempt could succeed. A transcode
//! job whose upload row has vanished will never succeed, while a dropped
//! connection to the object store might.

use std::fmt;

#[derive(Debug)]
pub struct TaskError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl TaskError {
    /// The queue marks the task failed straight away, keeping the remaining
    /// retry budget unused.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// The queue reschedules the task with backoff while attempts remain.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }

    /// True when `err` wraps a `TaskError` flagged unrecoverable. Plain errors
    /// count as recoverable.
    pub fn is_unrecoverable(err: &anyhow::Error) -> bool {
        err.downcast_ref::<TaskError>()
            .map(|te| !te.is_recoverable())
            .unwrap_or(false)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

pub trait TaskResultExt<T> {
    /// Mark this result as unrecoverable on error
    fn unrecoverable(self) -> Result<T, TaskError>;
}

impl<T, E: Into<anyhow::Error>> TaskResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, TaskError> {
        self.map_err(|e| TaskError::unrecoverable(e.into()))
    }
}
