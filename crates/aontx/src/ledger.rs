use std::error::Error;
use std::fmt::Debug;
use std::mem;
use std::panic;

use tracing::{debug, error, warn};

use crate::audit::AuditLog;
use crate::error::{ExecutionError, RollbackFault, StepError};
use crate::step::Action;

/// Completion bookkeeping for one execution pass.
///
/// Only ever touched while holding the owner's ledger lock.
pub(crate) struct Ledger<E: Debug> {
    high_water_mark: usize,
    first_error: Option<(usize, StepError<E>)>,
    audit: AuditLog,
}

impl<E> Ledger<E>
where
    E: Error + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            high_water_mark: 0,
            first_error: None,
            audit: AuditLog::new(),
        }
    }

    /// Start a fresh pass over `steps` registered steps.
    pub(crate) fn reset(&mut self, steps: usize) {
        self.high_water_mark = 0;
        self.first_error = None;
        self.audit = AuditLog::with_steps(steps);
    }

    /// Forget the previous error without rewinding the completion count.
    pub(crate) fn clear_error(&mut self) {
        self.first_error = None;
    }

    pub(crate) fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub(crate) fn failed(&self) -> bool {
        self.first_error.is_some()
    }

    pub(crate) fn audit_mut(&mut self) -> &mut AuditLog {
        &mut self.audit
    }

    pub(crate) fn record_start(&mut self, index: usize) {
        debug!(step = index, "running step");
        self.audit.record_start(index);
    }

    /// Record that step `index` finished.
    ///
    /// Returns the rollback bound when this completion is the first failure
    /// of the pass. Later failures are counted but never roll back again.
    pub(crate) fn record(
        &mut self,
        index: usize,
        result: Result<(), StepError<E>>,
    ) -> Option<usize> {
        self.high_water_mark += 1;
        match result {
            Ok(()) => {
                debug!(step = index, "step succeeded");
                self.audit.record_success(index);
                None
            }
            Err(step_error) => {
                self.audit.record_failure(index);
                if self.first_error.is_some() {
                    warn!(
                        step = index,
                        error = %step_error,
                        "step failed after rollback already ran"
                    );
                    return None;
                }
                warn!(step = index, error = %step_error, "step failed, rolling back");
                self.first_error = Some((index, step_error));
                Some(self.high_water_mark)
            }
        }
    }

    /// Invoke compensations for indices `bound - 1` down to `0`.
    ///
    /// `compensation_at` yields `None` for steps that have nothing to undo.
    ///
    /// # Panics
    ///
    /// Raises a [`RollbackFault`] as soon as a compensation fails.
    pub(crate) fn roll_back<'a, F>(&mut self, bound: usize, compensation_at: F)
    where
        F: Fn(usize) -> Option<&'a Action<E>>,
    {
        debug!(steps = bound, "starting rollback");
        for index in (0..bound).rev() {
            let Some(compensation) = compensation_at(index) else {
                debug!(step = index, "nothing to compensate");
                continue;
            };
            debug!(step = index, "compensating step");
            if let Err(compensation_error) = compensation() {
                error!(
                    step = index,
                    error = %compensation_error,
                    "compensation failed, state is unknown"
                );
                panic::panic_any(RollbackFault::new(index, compensation_error));
            }
            self.audit.record_compensated(index);
        }
        self.audit.mark_rolled_back();
    }

    /// Hand out the outcome of the pass and its audit log.
    pub(crate) fn settle(
        &mut self,
        wrap_errors: bool,
    ) -> (Result<(), ExecutionError<E>>, AuditLog) {
        let audit = mem::take(&mut self.audit);
        let result = match self.first_error.take() {
            None => Ok(()),
            Some((_, source)) if !wrap_errors => Err(ExecutionError::Step(source)),
            Some((index, source)) => Err(ExecutionError::StepFailed { index, source }),
        };
        (result, audit)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::panic::AssertUnwindSafe;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::audit::StepStatus;

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("{0}")]
    struct TestError(&'static str);

    fn failure() -> Result<(), StepError<TestError>> {
        Err(StepError::Action(TestError("boom")))
    }

    #[test]
    fn success_advances_mark_without_rollback() {
        let mut ledger = Ledger::<TestError>::new();
        ledger.reset(2);

        assert_eq!(ledger.record(0, Ok(())), None);
        assert_eq!(ledger.high_water_mark(), 1);
        assert!(!ledger.failed());
    }

    #[test]
    fn first_failure_requests_rollback_including_itself() {
        let mut ledger = Ledger::<TestError>::new();
        ledger.reset(3);
        ledger.record(0, Ok(()));

        assert_eq!(ledger.record(1, failure()), Some(2));
        assert!(ledger.failed());
    }

    #[test]
    fn later_failures_do_not_request_rollback() {
        let mut ledger = Ledger::<TestError>::new();
        ledger.reset(3);

        assert_eq!(ledger.record(0, failure()), Some(1));
        assert_eq!(ledger.record(1, failure()), None);
        assert_eq!(ledger.high_water_mark(), 2);
    }

    #[test]
    fn settle_reports_first_error_with_optional_index() {
        let mut ledger = Ledger::<TestError>::new();
        ledger.reset(2);
        ledger.record(0, Ok(()));
        ledger.record(1, failure());

        let (result, _) = ledger.settle(true);
        let err = result.expect_err("should fail");
        assert_eq!(err.index(), Some(1));
        assert_eq!(err.inner(), &TestError("boom"));

        let (result, _) = ledger.settle(false);
        assert!(result.is_ok());
    }

    #[test]
    fn reset_clears_previous_pass() {
        let mut ledger = Ledger::<TestError>::new();
        ledger.reset(1);
        ledger.record(0, failure());

        ledger.reset(1);

        assert_eq!(ledger.high_water_mark(), 0);
        assert!(!ledger.failed());
    }

    #[test]
    fn roll_back_walks_indices_in_reverse_and_skips_missing() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let compensations: Vec<Option<Action<TestError>>> = (0..3)
            .map(|index| {
                if index == 1 {
                    return None;
                }
                let order = Arc::clone(&order);
                let action: Action<TestError> = Box::new(move || {
                    order.lock().expect("lock").push(index);
                    Ok(())
                });
                Some(action)
            })
            .collect();
        let mut ledger = Ledger::<TestError>::new();
        ledger.reset(3);

        ledger.roll_back(3, |index| compensations[index].as_ref());

        assert_eq!(*order.lock().expect("lock"), vec![2, 0]);
        let (_, audit) = ledger.settle(false);
        assert!(audit.rolled_back());
        assert_eq!(audit.records()[0].status, StepStatus::Compensated);
        assert_eq!(audit.records()[1].status, StepStatus::Pending);
    }

    #[test]
    fn failing_compensation_raises_rollback_fault() {
        let reached = RefCell::new(Vec::new());
        let undo_first: Action<TestError> = Box::new(|| Ok(()));
        let undo_second: Action<TestError> = Box::new(|| Err(TestError("stuck")));
        let compensations = vec![undo_first, undo_second];
        let mut ledger = Ledger::<TestError>::new();
        ledger.reset(2);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            ledger.roll_back(2, |index| {
                reached.borrow_mut().push(index);
                compensations.get(index)
            });
        }));

        let payload = outcome.expect_err("rollback should panic");
        let fault = payload
            .downcast::<RollbackFault>()
            .expect("payload should be a rollback fault");
        assert_eq!(fault.step(), 1);
        assert_eq!(fault.compensation_error().to_string(), "stuck");
        assert_eq!(*reached.borrow(), vec![1]);
    }
}
