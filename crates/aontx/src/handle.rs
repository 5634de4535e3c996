use std::fmt::Debug;
use std::panic;
use std::thread::{self, JoinHandle};

use crate::error::ExecutionError;

/// An execution running on a background thread.
///
/// Dropping the handle detaches the execution; it still runs to completion,
/// including any rollback.
#[must_use = "dropping the handle discards the execution result"]
pub struct ExecutionHandle<E: Debug> {
    inner: JoinHandle<Result<(), ExecutionError<E>>>,
}

impl<E> ExecutionHandle<E>
where
    E: Debug + Send + 'static,
{
    pub(crate) fn spawn<F>(execution: F) -> Self
    where
        F: FnOnce() -> Result<(), ExecutionError<E>> + Send + 'static,
    {
        Self {
            inner: thread::spawn(execution),
        }
    }

    /// Whether the execution, including rollback, has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Wait for the execution to settle and return its result.
    ///
    /// # Errors
    ///
    /// Returns the execution's error after rollback has completed.
    ///
    /// # Panics
    ///
    /// Re-raises a [`RollbackFault`](crate::RollbackFault) (or any other
    /// panic) that occurred on the execution thread.
    pub fn join(self) -> Result<(), ExecutionError<E>> {
        match self.inner.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}
