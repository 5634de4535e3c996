use std::panic;
use std::thread;

use crate::config::ExecutionMode;

/// Run `task` for every index in `0..count`.
///
/// Sequential mode runs indices in order and stops as soon as `should_stop`
/// reports true after a task. Concurrent mode launches one thread per index
/// in order and joins all of them before returning, so the caller never
/// observes a half-finished batch. A panic in any task (such as a rollback
/// fault) is re-raised once every thread has been joined.
pub(crate) fn dispatch<S, T>(mode: ExecutionMode, count: usize, should_stop: S, task: T)
where
    S: Fn() -> bool,
    T: Fn(usize) + Sync,
{
    match mode {
        ExecutionMode::Sequential => {
            for index in 0..count {
                task(index);
                if should_stop() {
                    break;
                }
            }
        }
        ExecutionMode::Concurrent => {
            let task = &task;
            let first_panic = thread::scope(|scope| {
                let handles: Vec<_> = (0..count)
                    .map(|index| scope.spawn(move || task(index)))
                    .collect();

                let mut first_panic = None;
                for handle in handles {
                    if let Err(payload) = handle.join() {
                        first_panic.get_or_insert(payload);
                    }
                }
                first_panic
            });
            if let Some(payload) = first_panic {
                panic::resume_unwind(payload);
            }
        }
    }
}
