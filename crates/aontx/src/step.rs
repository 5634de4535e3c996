use std::error::Error;

use aontx_retry::RetryOptions;

use crate::error::StepError;

/// A fallible, repeatable unit of work supplied by the caller.
pub(crate) type Action<E> = Box<dyn Fn() -> Result<(), E> + Send + Sync>;

/// One registered action and the compensation that undoes it.
pub(crate) struct Step<E> {
    pub(crate) action: Action<E>,
    pub(crate) compensation: Action<E>,
}

impl<E> Step<E> {
    pub(crate) fn new<A, C>(action: A, compensation: C) -> Self
    where
        A: Fn() -> Result<(), E> + Send + Sync + 'static,
        C: Fn() -> Result<(), E> + Send + Sync + 'static,
    {
        Self {
            action: Box::new(action),
            compensation: Box::new(compensation),
        }
    }
}

/// Run `action` once, or through the retry executor when options are given.
pub(crate) fn invoke<E, F>(retry: Option<&RetryOptions>, action: &F) -> Result<(), StepError<E>>
where
    E: Error + 'static,
    F: Fn() -> Result<(), E> + ?Sized,
{
    match retry {
        Some(options) => aontx_retry::retry(options, action).map_err(StepError::Retry),
        None => action().map_err(StepError::Action),
    }
}
