//! All-or-nothing execution of fallible operations.
//!
//! A [`Transaction`] runs an ordered list of steps, each an action paired
//! with a compensation. Either every action succeeds, or the compensations
//! of the steps recorded so far run in reverse order. A [`Chain`] runs
//! fallback trees instead: each root [`Operation`] tries its alternatives
//! in turn, and only a root whose every alternative fails rolls the chain
//! back.
//!
//! Both run sequentially or concurrently and can route every action through
//! the retry executor from `aontx-retry`. A compensation that fails during
//! rollback is fatal and raised as a [`RollbackFault`] panic.

mod audit;
mod chain;
mod config;
mod dispatch;
mod error;
mod handle;
mod ledger;
mod step;
mod transaction;

pub use aontx_retry::{
    Backoff, BackoffPolicy, ConstantBackoff, ExponentialBackoff, RetryError, RetryOptions,
    UnrecoverableErrors,
};
pub use audit::{AuditLog, StepRecord, StepStatus};
pub use chain::{Chain, Operation};
pub use config::{ExecutionMode, TransactionConfig};
pub use error::{ConfigError, ExecutionError, RollbackFault, StepError};
pub use handle::ExecutionHandle;
pub use transaction::Transaction;
