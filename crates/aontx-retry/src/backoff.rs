use std::time::Duration;

use rand::Rng;

/// Produces the wait interval between two retry attempts.
///
/// Implementations may carry state that advances on every call, so one
/// instance belongs to exactly one retry sequence. Use
/// [`BackoffPolicy::start`] to obtain a fresh instance per sequence.
pub trait Backoff: Send {
    /// Interval to wait before the next attempt.
    fn next_interval(&mut self) -> Duration;
}

/// Always waits the same interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff {
    interval: Duration,
}

impl ConstantBackoff {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Backoff for ConstantBackoff {
    fn next_interval(&mut self) -> Duration {
        self.interval
    }
}

/// Grows the interval geometrically, with optional symmetric jitter.
///
/// The first call yields the initial interval. Every later call multiplies
/// the previous interval by the multiplier, scales the result by
/// `1 + U(-1, 1) * random_factor` and clamps it to the maximum interval.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    random_factor: f64,
    current_interval: Option<Duration>,
}

impl ExponentialBackoff {
    /// Create a backoff doubling from `initial_interval` up to `max_interval`, without jitter.
    #[must_use]
    pub fn new(initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            initial_interval,
            max_interval,
            multiplier: 2.0,
            random_factor: 0.0,
            current_interval: None,
        }
    }

    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter factor. Zero disables jitter.
    #[must_use]
    pub fn with_random_factor(mut self, random_factor: f64) -> Self {
        self.random_factor = random_factor;
        self
    }

    /// The interval returned by the most recent call, if any.
    #[must_use]
    pub fn current_interval(&self) -> Option<Duration> {
        self.current_interval
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn grow(&self, current: Duration) -> Duration {
        let mut candidate = current.as_nanos() as f64 * self.multiplier;
        if self.random_factor > 0.0 {
            let jitter = rand::thread_rng().gen_range(-1.0..1.0) * self.random_factor;
            candidate *= 1.0 + jitter;
        }
        let max_nanos = self.max_interval.as_nanos() as f64;
        if !candidate.is_finite() || candidate >= max_nanos {
            return self.max_interval;
        }
        let candidate = candidate.max(0.0);
        if candidate < u64::MAX as f64 {
            return Duration::from_nanos(candidate as u64);
        }
        // Past u64 nanoseconds; only reachable with a max interval of centuries.
        Duration::try_from_secs_f64(candidate / 1e9)
            .map_or(self.max_interval, |interval| interval.min(self.max_interval))
    }
}

impl Backoff for ExponentialBackoff {
    fn next_interval(&mut self) -> Duration {
        let next = match self.current_interval {
            None => self.initial_interval,
            Some(current) => self.grow(current),
        };
        self.current_interval = Some(next);
        next
    }
}

/// Backoff configuration from which independent [`Backoff`] instances are started.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BackoffPolicy {
    Constant {
        interval: Duration,
    },
    Exponential {
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
        random_factor: f64,
    },
}

impl BackoffPolicy {
    #[must_use]
    pub fn constant(interval: Duration) -> Self {
        Self::Constant { interval }
    }

    #[must_use]
    pub fn exponential(
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
        random_factor: f64,
    ) -> Self {
        Self::Exponential {
            initial_interval,
            max_interval,
            multiplier,
            random_factor,
        }
    }

    /// Start a new backoff sequence with its own state.
    #[must_use]
    pub fn start(&self) -> Box<dyn Backoff> {
        match *self {
            Self::Constant { interval } => Box::new(ConstantBackoff::new(interval)),
            Self::Exponential {
                initial_interval,
                max_interval,
                multiplier,
                random_factor,
            } => Box::new(
                ExponentialBackoff::new(initial_interval, max_interval)
                    .with_multiplier(multiplier)
                    .with_random_factor(random_factor),
            ),
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), Duration::from_secs(30), 2.0, 0.2)
    }
}
