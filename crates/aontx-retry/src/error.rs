use std::fmt::Debug;

use thiserror::Error;

/// Error from a retried operation that never succeeded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RetryError<E: Debug> {
    /// The operation failed with an error classified as unrecoverable.
    #[error("unrecoverable error on attempt {attempts}")]
    Unrecoverable {
        /// Attempts made, including the one that failed.
        attempts: u32,
        /// The error that stopped the retry loop.
        #[source]
        source: E,
    },

    /// Every allowed attempt failed.
    #[error("error after {attempts} attempt(s)")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// The error from the last attempt.
        #[source]
        source: E,
    },
}

impl<E: Debug> RetryError<E> {
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Unrecoverable { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable { .. })
    }

    /// The error returned by the operation's last attempt.
    #[must_use]
    pub fn inner(&self) -> &E {
        match self {
            Self::Unrecoverable { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }

    #[must_use]
    pub fn into_inner(self) -> E {
        match self {
            Self::Unrecoverable { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }
}
