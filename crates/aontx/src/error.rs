use std::error::Error;
use std::fmt::Debug;

use aontx_retry::RetryError;
use thiserror::Error;

/// Failure reported by a single step or operation tree.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StepError<E: Debug> {
    /// The action failed and retries were not enabled.
    #[error(transparent)]
    Action(E),

    /// The action failed under the retry executor.
    #[error(transparent)]
    Retry(RetryError<E>),
}

impl<E: Debug> StepError<E> {
    /// The error returned by the action itself.
    #[must_use]
    pub fn inner(&self) -> &E {
        match self {
            Self::Action(error) => error,
            Self::Retry(error) => error.inner(),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> E {
        match self {
            Self::Action(error) => error,
            Self::Retry(error) => error.into_inner(),
        }
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Action(_) => 1,
            Self::Retry(error) => error.attempts(),
        }
    }

    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Retry(error) if error.is_unrecoverable())
    }
}

/// Error returned when an execution fails and has been rolled back.
///
/// Which variant is produced depends on whether error wrapping is enabled
/// in the configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutionError<E: Debug> {
    /// The first reported failure, unwrapped.
    #[error(transparent)]
    Step(StepError<E>),

    /// The first reported failure with the index of the step that produced it.
    #[error("step {index} failed")]
    StepFailed {
        /// Index of the failed step or root operation.
        index: usize,
        /// The failure the step reported.
        #[source]
        source: StepError<E>,
    },
}

impl<E: Debug> ExecutionError<E> {
    #[must_use]
    pub fn step_error(&self) -> &StepError<E> {
        match self {
            Self::Step(error) | Self::StepFailed { source: error, .. } => error,
        }
    }

    #[must_use]
    pub fn into_step_error(self) -> StepError<E> {
        match self {
            Self::Step(error) | Self::StepFailed { source: error, .. } => error,
        }
    }

    /// The error returned by the failing action.
    #[must_use]
    pub fn inner(&self) -> &E {
        self.step_error().inner()
    }

    /// Index of the failed step, when error wrapping is enabled.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Step(_) => None,
            Self::StepFailed { index, .. } => Some(*index),
        }
    }
}

/// A compensation failed during rollback.
///
/// This is never returned as an error value. The rollback pass stops and
/// the fault is raised as a panic payload, because the state of everything
/// touched by the execution is no longer known.
#[derive(Debug, Error)]
#[error("compensation for step {step} failed, rollback aborted")]
pub struct RollbackFault {
    step: usize,
    #[source]
    source: Box<dyn Error + Send + Sync>,
}

impl RollbackFault {
    pub(crate) fn new<E>(step: usize, error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            step,
            source: Box::new(error),
        }
    }

    /// Index of the step whose compensation failed.
    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }

    /// The error returned by the compensation.
    #[must_use]
    pub fn compensation_error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

/// Error from loading a configuration document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to parse transaction config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}
