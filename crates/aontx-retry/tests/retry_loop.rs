//! Integration tests for the retry loop and its use of backoff.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use aontx_retry::{Backoff, BackoffPolicy, RetryError, RetryOptions, retry, retry_with_backoff};

#[derive(Debug, PartialEq, thiserror::Error)]
enum TestError {
    #[error("transient")]
    Transient,
    #[error("permission denied")]
    Denied,
}

#[derive(Debug, thiserror::Error)]
#[error("call failed")]
struct CallError {
    #[source]
    source: TestError,
}

struct CountingBackoff {
    calls: u32,
}

impl Backoff for CountingBackoff {
    fn next_interval(&mut self) -> Duration {
        self.calls += 1;
        Duration::ZERO
    }
}

fn options(max_attempts: u32) -> RetryOptions {
    RetryOptions::new(
        NonZeroU32::new(max_attempts).expect("attempts must be non-zero"),
        BackoffPolicy::constant(Duration::ZERO),
    )
}

#[test]
fn succeeds_on_last_attempt_after_consulting_backoff_between_attempts() -> anyhow::Result<()> {
    for max_attempts in 1..=6 {
        let mut backoff = CountingBackoff { calls: 0 };
        let mut calls = 0;

        retry_with_backoff(&options(max_attempts), &mut backoff, || {
            calls += 1;
            if calls < max_attempts {
                Err(TestError::Transient)
            } else {
                Ok(())
            }
        })?;

        assert_eq!(calls, max_attempts);
        assert_eq!(backoff.calls, max_attempts - 1);
    }
    Ok(())
}

#[test]
fn unrecoverable_error_stops_after_one_attempt_regardless_of_limit() {
    for max_attempts in [1, 2, 10] {
        let options = options(max_attempts).unrecoverable(TestError::Denied);
        let mut backoff = CountingBackoff { calls: 0 };
        let mut calls = 0;

        let result: Result<(), _> = retry_with_backoff(&options, &mut backoff, || {
            calls += 1;
            Err(TestError::Denied)
        });

        let err = result.expect_err("should fail");
        assert!(matches!(
            err,
            RetryError::Unrecoverable {
                attempts: 1,
                source: TestError::Denied
            }
        ));
        assert_eq!(calls, 1);
        assert_eq!(backoff.calls, 0);
    }
}

#[test]
fn unrecoverable_error_is_found_inside_wrapping_error() {
    let options = options(4).unrecoverable(TestError::Denied);
    let mut calls = 0;

    let result: Result<(), _> = retry(&options, || {
        calls += 1;
        Err(CallError {
            source: TestError::Denied,
        })
    });

    let err = result.expect_err("should fail");
    assert!(err.is_unrecoverable());
    assert_eq!(calls, 1);
}

#[test]
fn recoverable_errors_use_every_attempt() {
    let options = options(4).unrecoverable(TestError::Denied);
    let mut calls = 0;

    let result: Result<(), _> = retry(&options, || {
        calls += 1;
        Err(TestError::Transient)
    });

    let err = result.expect_err("should fail");
    assert!(matches!(err, RetryError::Exhausted { attempts: 4, .. }));
    assert_eq!(calls, 4);
}

#[test]
fn sleeps_between_attempts_using_policy_intervals() {
    let options = RetryOptions::new(
        NonZeroU32::new(3).expect("non-zero"),
        BackoffPolicy::constant(Duration::from_millis(20)),
    );
    let started = Instant::now();

    let result: Result<(), _> = retry(&options, || Err(TestError::Transient));

    assert!(result.is_err());
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[test]
fn retry_error_exposes_source_chain() {
    let result: Result<(), _> = retry(&options(2), || Err(TestError::Transient));

    let err = result.expect_err("should fail");
    let source = std::error::Error::source(&err).expect("should have a source");
    assert_eq!(source.to_string(), "transient");
    assert_eq!(err.to_string(), "error after 2 attempt(s)");
}
