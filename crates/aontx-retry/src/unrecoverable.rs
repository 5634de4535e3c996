use std::error::Error;
use std::fmt;
use std::sync::Arc;

type Matcher = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// Errors that stop a retry loop immediately.
///
/// Matching walks the whole `source()` chain of a failure and compares by
/// type (and optionally value), never by message.
#[derive(Clone, Default)]
pub struct UnrecoverableErrors {
    matchers: Vec<Matcher>,
}

impl UnrecoverableErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat any error in the chain equal to `error` as unrecoverable.
    pub fn push<T>(&mut self, error: T)
    where
        T: Error + PartialEq + Send + Sync + 'static,
    {
        self.push_matching(move |candidate: &T| *candidate == error);
    }

    /// Treat any error of type `T` in the chain as unrecoverable.
    pub fn push_kind<T>(&mut self)
    where
        T: Error + 'static,
    {
        self.push_matching(|_: &T| true);
    }

    /// Treat any error of type `T` in the chain accepted by `predicate` as unrecoverable.
    pub fn push_matching<T, F>(&mut self, predicate: F)
    where
        T: Error + 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let matcher: Matcher = Arc::new(move |error: &(dyn Error + 'static)| {
            error
                .downcast_ref::<T>()
                .is_some_and(|candidate| predicate(candidate))
        });
        self.matchers.push(matcher);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Whether `error` or any error in its source chain is unrecoverable.
    #[must_use]
    pub fn matches(&self, error: &(dyn Error + 'static)) -> bool {
        if self.matchers.is_empty() {
            return false;
        }
        std::iter::successors(Some(error), |&link| link.source())
            .any(|link| self.matchers.iter().any(|matcher| matcher(link)))
    }
}

impl fmt::Debug for UnrecoverableErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnrecoverableErrors")
            .field("matchers", &self.matchers.len())
            .finish()
    }
}
