use std::error::Error;
use std::fmt::Debug;
use std::sync::Arc;

use aontx_retry::RetryOptions;
use parking_lot::Mutex;
use tracing::debug;

use crate::audit::AuditLog;
use crate::config::{ExecutionMode, TransactionConfig};
use crate::dispatch::dispatch;
use crate::error::{ExecutionError, StepError};
use crate::handle::ExecutionHandle;
use crate::ledger::Ledger;
use crate::step::{Step, invoke};

/// An ordered set of steps that either all succeed or are all compensated.
///
/// Each step pairs an action with a compensation. When a step fails, the
/// compensations of every step whose completion was recorded in the current
/// pass (the failing one included) run in reverse registration order (LIFO).
///
/// Rollback is driven by the number of recorded completions, not by which
/// steps actually committed. In concurrent mode completions arrive in any
/// order, so the compensated range is the first `n` registered steps where
/// `n` is the completion count at the moment of the first failure.
///
/// A failing compensation aborts the rollback and raises a
/// [`RollbackFault`](crate::RollbackFault) panic; it is never reported as an
/// ordinary error.
///
/// Actions and compensations must not call back into the same transaction.
/// The execution lock is held for the whole call and the completion lock
/// for the whole rollback pass, so re-entering either deadlocks.
pub struct Transaction<E: Debug> {
    steps: Vec<Step<E>>,
    config: TransactionConfig,
    execution: Mutex<()>,
    ledger: Mutex<Ledger<E>>,
}

impl<E> Transaction<E>
where
    E: Error + Send + Sync + 'static,
{
    /// Create an empty transaction without retries.
    #[must_use]
    pub fn new(mode: ExecutionMode) -> Self {
        Self::with_config(TransactionConfig::new(mode))
    }

    #[must_use]
    pub fn with_config(config: TransactionConfig) -> Self {
        Self {
            steps: Vec::new(),
            config,
            execution: Mutex::new(()),
            ledger: Mutex::new(Ledger::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Retry settings, for registering further unrecoverable errors.
    pub fn retry_options_mut(&mut self) -> Option<&mut RetryOptions> {
        self.config.retry_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Register a step at the end of the transaction.
    pub fn append<A, C>(&mut self, action: A, compensation: C)
    where
        A: Fn() -> Result<(), E> + Send + Sync + 'static,
        C: Fn() -> Result<(), E> + Send + Sync + 'static,
    {
        self.steps.push(Step::new(action, compensation));
    }

    /// Run every registered step.
    ///
    /// The completion count and recorded error are reset first, so calling
    /// this repeatedly re-runs every step.
    ///
    /// # Errors
    ///
    /// Returns the first reported step failure, after rollback has finished.
    ///
    /// # Panics
    ///
    /// Panics with a [`RollbackFault`](crate::RollbackFault) payload if a
    /// compensation fails during rollback.
    pub fn execute_all(&self) -> Result<(), ExecutionError<E>> {
        let (result, _audit) = self.execute_internal();
        result
    }

    /// Run every registered step and return both the result and an audit log.
    ///
    /// # Panics
    ///
    /// See [`Transaction::execute_all`].
    pub fn execute_all_with_audit(&self) -> (Result<(), ExecutionError<E>>, AuditLog) {
        self.execute_internal()
    }

    /// Run `action` immediately as a one-off step.
    ///
    /// The step is registered with a no-op action in its slot and the given
    /// compensation, so a later rollback or re-execution accounts for it
    /// without running `action` again. The completion count is not reset:
    /// a failure here compensates the one-off step first, then the steps
    /// recorded by the previous pass. Registered steps that no pass has
    /// reached are left alone, so on a fresh transaction only the one-off
    /// step is compensated.
    ///
    /// # Errors
    ///
    /// Returns the failure of `action`, after rollback has finished.
    ///
    /// # Panics
    ///
    /// See [`Transaction::execute_all`].
    pub fn execute_one<A, C>(
        &mut self,
        action: A,
        compensation: C,
    ) -> Result<(), ExecutionError<E>>
    where
        A: Fn() -> Result<(), E> + Send + Sync + 'static,
        C: Fn() -> Result<(), E> + Send + Sync + 'static,
    {
        self.append(|| Ok(()), compensation);
        let index = self.steps.len() - 1;

        let _execution = self.execution.lock();
        let recorded = {
            let mut ledger = self.ledger.lock();
            ledger.clear_error();
            ledger.record_start(index);
            ledger.high_water_mark()
        };
        let result = invoke(self.config.retry(), &action);

        let mut ledger = self.ledger.lock();
        if ledger.record(index, result).is_some() {
            ledger.roll_back(index + 1, |step| {
                if step == index || step < recorded {
                    self.steps.get(step).map(|step| &step.compensation)
                } else {
                    None
                }
            });
        }
        let (result, _audit) = ledger.settle(self.config.wrap_errors());
        result
    }

    /// Run every registered step on a background thread.
    ///
    /// The returned handle settles once all steps have reported and any
    /// rollback has finished.
    pub fn spawn_execute_all(self: &Arc<Self>) -> ExecutionHandle<E> {
        let transaction = Arc::clone(self);
        ExecutionHandle::spawn(move || transaction.execute_all())
    }

    fn execute_internal(&self) -> (Result<(), ExecutionError<E>>, AuditLog) {
        let _execution = self.execution.lock();
        self.ledger.lock().reset(self.steps.len());

        debug!(
            steps = self.steps.len(),
            mode = ?self.config.mode(),
            "executing transaction"
        );
        dispatch(
            self.config.mode(),
            self.steps.len(),
            || self.ledger.lock().failed(),
            |index| self.run_step(index),
        );

        self.ledger.lock().settle(self.config.wrap_errors())
    }

    fn run_step(&self, index: usize) {
        self.ledger.lock().record_start(index);
        let result = invoke(self.config.retry(), &*self.steps[index].action);
        self.complete(index, result);
    }

    fn complete(&self, index: usize, result: Result<(), StepError<E>>) {
        let mut ledger = self.ledger.lock();
        if let Some(bound) = ledger.record(index, result) {
            let bound = bound.min(self.steps.len());
            ledger.roll_back(bound, |step| {
                self.steps.get(step).map(|step| &step.compensation)
            });
        }
    }
}
