//! Bounded retry for fallible operations.
//!
//! An operation is attempted up to a fixed number of times, waiting between
//! attempts according to a [`BackoffPolicy`]. Errors registered in
//! [`UnrecoverableErrors`] end the loop on the spot.

mod backoff;
mod error;
mod retry;
mod unrecoverable;

pub use backoff::{Backoff, BackoffPolicy, ConstantBackoff, ExponentialBackoff};
pub use error::RetryError;
pub use retry::{RetryOptions, retry, retry_with_backoff};
pub use unrecoverable::UnrecoverableErrors;
