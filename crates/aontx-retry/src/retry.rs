use std::error::Error;
use std::num::NonZeroU32;
use std::thread;

use tracing::{debug, warn};

use crate::backoff::{Backoff, BackoffPolicy};
use crate::error::RetryError;
use crate::unrecoverable::UnrecoverableErrors;

const DEFAULT_MAX_ATTEMPTS: NonZeroU32 = match NonZeroU32::new(3) {
    Some(attempts) => attempts,
    None => unreachable!(),
};

/// How an operation is retried.
#[derive(Debug, Clone)]
pub struct RetryOptions {
    max_attempts: NonZeroU32,
    backoff: BackoffPolicy,
    unrecoverable: UnrecoverableErrors,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
            unrecoverable: UnrecoverableErrors::new(),
        }
    }
}

impl RetryOptions {
    #[must_use]
    pub fn new(max_attempts: NonZeroU32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts,
            backoff,
            unrecoverable: UnrecoverableErrors::new(),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> NonZeroU32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    #[must_use]
    pub fn unrecoverable_errors(&self) -> &UnrecoverableErrors {
        &self.unrecoverable
    }

    pub fn unrecoverable_errors_mut(&mut self) -> &mut UnrecoverableErrors {
        &mut self.unrecoverable
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: NonZeroU32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Add an error value that stops retrying as soon as it is seen.
    #[must_use]
    pub fn unrecoverable<T>(mut self, error: T) -> Self
    where
        T: Error + PartialEq + Send + Sync + 'static,
    {
        self.unrecoverable.push(error);
        self
    }
}

/// Run `operation` until it succeeds or the options give up.
///
/// A fresh backoff sequence is started from the configured policy, so
/// concurrent callers sharing one `RetryOptions` never share backoff state.
///
/// # Errors
///
/// Returns `RetryError::Unrecoverable` as soon as an attempt fails with an
/// unrecoverable error, and `RetryError::Exhausted` with the last error once
/// every attempt has failed.
pub fn retry<T, E, F>(options: &RetryOptions, operation: F) -> Result<T, RetryError<E>>
where
    E: Error + 'static,
    F: FnMut() -> Result<T, E>,
{
    let mut backoff = options.backoff.start();
    retry_with_backoff(options, backoff.as_mut(), operation)
}

/// Like [`retry`], drawing intervals from a caller-supplied backoff.
///
/// The backoff is consulted once between consecutive attempts and never
/// after the last one.
///
/// # Errors
///
/// See [`retry`].
pub fn retry_with_backoff<T, E, F>(
    options: &RetryOptions,
    backoff: &mut dyn Backoff,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Error + 'static,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = options.max_attempts.get();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation() {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if options.unrecoverable.matches(&error) {
            warn!(attempt, error = %error, "unrecoverable error, not retrying");
            return Err(RetryError::Unrecoverable {
                attempts: attempt,
                source: error,
            });
        }

        if attempt >= max_attempts {
            warn!(attempts = attempt, error = %error, "retries exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                source: error,
            });
        }

        let delay = backoff.next_interval();
        debug!(
            attempt,
            max_attempts,
            delay = ?delay,
            error = %error,
            "attempt failed, backing off"
        );
        thread::sleep(delay);
    }
}
