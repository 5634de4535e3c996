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
use crate::step::{Action, invoke};

/// An action with an ordered list of alternatives tried when it fails.
///
/// `A.or_else(B).or_else(C)` tries `A`; if `A` fails it tries `B`; if `B`
/// fails it tries `C`; if `C` fails the whole operation fails. Each node
/// exclusively owns the next alternative.
pub struct Operation<E> {
    action: Action<E>,
    secondary: Option<Box<Operation<E>>>,
    compensation: Option<Action<E>>,
}

impl<E> Operation<E> {
    /// Create an operation whose failure falls through to `secondary`.
    pub fn new<A>(action: A, secondary: Option<Operation<E>>) -> Self
    where
        A: Fn() -> Result<(), E> + Send + Sync + 'static,
    {
        Self {
            action: Box::new(action),
            secondary: secondary.map(Box::new),
            compensation: None,
        }
    }

    /// Create an operation with no alternatives.
    pub fn from_action<A>(action: A) -> Self
    where
        A: Fn() -> Result<(), E> + Send + Sync + 'static,
    {
        Self::new(action, None)
    }

    /// Append `alternative` after the last alternative of this operation.
    #[must_use]
    pub fn or_else(mut self, alternative: Operation<E>) -> Self {
        let last = match self.secondary.take() {
            None => alternative,
            Some(next) => (*next).or_else(alternative),
        };
        self.secondary = Some(Box::new(last));
        self
    }

    /// Set the compensation run for this operation when the chain rolls back.
    ///
    /// Only compensations on root operations (those passed to
    /// [`Chain::append`]) are ever invoked. Roots without one are skipped
    /// during rollback.
    #[must_use]
    pub fn compensate_with<C>(mut self, compensation: C) -> Self
    where
        C: Fn() -> Result<(), E> + Send + Sync + 'static,
    {
        self.compensation = Some(Box::new(compensation));
        self
    }

    /// The alternative tried when this operation's action fails.
    #[must_use]
    pub fn secondary(&self) -> Option<&Operation<E>> {
        self.secondary.as_deref()
    }

    /// Number of actions in this fallback list, this one included.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.secondary.as_ref().map_or(0, |next| next.depth())
    }

    #[must_use]
    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }
}

/// Ordered fallback trees executed as one all-or-nothing unit.
///
/// Each root operation settles as soon as one of its alternatives succeeds.
/// A root whose every alternative fails is a terminal failure: the chain
/// records it and rolls back by invoking the compensations of the first
/// `n` roots in reverse order, `n` being the number of roots whose
/// completion had been recorded at that point (the failing root included).
///
/// As with [`Transaction`](crate::Transaction), actions and compensations
/// must not call back into the same chain: both locks are held across
/// them, so re-entry deadlocks.
pub struct Chain<E: Debug> {
    roots: Vec<Operation<E>>,
    config: TransactionConfig,
    execution: Mutex<()>,
    ledger: Mutex<Ledger<E>>,
}

impl<E> Chain<E>
where
    E: Error + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(mode: ExecutionMode) -> Self {
        Self::with_config(TransactionConfig::new(mode))
    }

    #[must_use]
    pub fn with_config(config: TransactionConfig) -> Self {
        Self {
            roots: Vec::new(),
            config,
            execution: Mutex::new(()),
            ledger: Mutex::new(Ledger::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    pub fn retry_options_mut(&mut self) -> Option<&mut RetryOptions> {
        self.config.retry_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Register a root operation at the end of the chain.
    pub fn append(&mut self, operation: Operation<E>) {
        self.roots.push(operation);
    }

    /// Execute one operation tree immediately, without registering it.
    ///
    /// The completion is recorded in the next free slot of the current pass.
    /// A terminal failure here runs the operation's own compensation first,
    /// then rolls back the roots recorded by the previous
    /// [`Chain::execute_all`]. Registered roots that no pass has reached are
    /// left alone.
    ///
    /// # Errors
    ///
    /// Returns the error of the last alternative when every alternative fails.
    ///
    /// # Panics
    ///
    /// Panics with a [`RollbackFault`](crate::RollbackFault) payload if a
    /// compensation fails during rollback.
    pub fn run(&self, operation: &Operation<E>) -> Result<(), ExecutionError<E>> {
        let _execution = self.execution.lock();
        let slot = {
            let mut ledger = self.ledger.lock();
            ledger.clear_error();
            let slot = ledger.high_water_mark();
            ledger.record_start(slot);
            slot
        };

        let outcome = self.settle_tree(operation);

        let mut ledger = self.ledger.lock();
        if Self::record_outcome(&mut ledger, slot, outcome).is_some() {
            ledger.roll_back(slot + 1, |root| {
                if root == slot {
                    operation.compensation.as_ref()
                } else {
                    self.roots
                        .get(root)
                        .and_then(|registered| registered.compensation.as_ref())
                }
            });
        }
        let (result, _audit) = ledger.settle(self.config.wrap_errors());
        result
    }

    /// Execute every registered root operation in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first terminal failure reported by a root, after rollback
    /// has finished.
    ///
    /// # Panics
    ///
    /// See [`Chain::run`].
    pub fn execute_all(&self) -> Result<(), ExecutionError<E>> {
        let (result, _audit) = self.execute_internal();
        result
    }

    /// Execute every root and return both the result and an audit log.
    ///
    /// # Panics
    ///
    /// See [`Chain::run`].
    pub fn execute_all_with_audit(&self) -> (Result<(), ExecutionError<E>>, AuditLog) {
        self.execute_internal()
    }

    /// Execute every root on a background thread.
    pub fn spawn_execute_all(self: &Arc<Self>) -> ExecutionHandle<E> {
        let chain = Arc::clone(self);
        ExecutionHandle::spawn(move || chain.execute_all())
    }

    fn execute_internal(&self) -> (Result<(), ExecutionError<E>>, AuditLog) {
        let _execution = self.execution.lock();
        self.ledger.lock().reset(self.roots.len());

        debug!(
            operations = self.roots.len(),
            mode = ?self.config.mode(),
            "executing chain"
        );
        dispatch(
            self.config.mode(),
            self.roots.len(),
            || self.ledger.lock().failed(),
            |index| {
                self.ledger.lock().record_start(index);
                let outcome = self.settle_tree(&self.roots[index]);
                self.complete(index, outcome);
            },
        );

        self.ledger.lock().settle(self.config.wrap_errors())
    }

    /// Walk the fallback list until an action succeeds.
    ///
    /// Returns the position of the alternative that succeeded.
    fn settle_tree(&self, operation: &Operation<E>) -> Result<usize, StepError<E>> {
        let mut current = operation;
        let mut alternative = 0;
        loop {
            match invoke(self.config.retry(), &*current.action) {
                Ok(()) => return Ok(alternative),
                Err(step_error) => match current.secondary() {
                    Some(next) => {
                        debug!(
                            alternative,
                            error = %step_error,
                            "operation failed, trying next alternative"
                        );
                        current = next;
                        alternative += 1;
                    }
                    None => {
                        debug!(alternative, "every alternative failed");
                        return Err(step_error);
                    }
                },
            }
        }
    }

    fn record_outcome(
        ledger: &mut Ledger<E>,
        index: usize,
        outcome: Result<usize, StepError<E>>,
    ) -> Option<usize> {
        let result = outcome.map(|alternative| {
            ledger.audit_mut().record_alternative(index, alternative);
        });
        ledger.record(index, result)
    }

    fn complete(&self, index: usize, outcome: Result<usize, StepError<E>>) {
        let mut ledger = self.ledger.lock();
        if let Some(bound) = Self::record_outcome(&mut ledger, index, outcome) {
            let bound = bound.min(self.roots.len());
            ledger.roll_back(bound, |root| {
                self.roots
                    .get(root)
                    .and_then(|operation| operation.compensation.as_ref())
            });
        }
    }
}
