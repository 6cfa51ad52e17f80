//! The continuation protocol.
//!
//! Instead of receiving a `next` callback, every handler returns a [`Next`]
//! value describing how dispatch should proceed.

use crate::error::{BoxError, HandlerError};

/// Outcome of running a handler.
#[derive(Debug, Clone)]
pub enum Next {
    /// Continue with the next matching layer (`next()`).
    Continue,
    /// Skip the remaining handlers of the current route (`next('route')`).
    SkipRoute,
    /// Leave the current router and resume in its parent (`next('router')`).
    ExitRouter,
    /// Switch to error-handling mode (`next(err)`).
    Fail(HandlerError),
    /// The transaction was handled; stop dispatching.
    Done,
}

impl Next {
    /// Shorthand for [`Next::Fail`] from anything convertible into an error.
    pub fn fail(err: impl Into<BoxError>) -> Self {
        Next::Fail(HandlerError::from(err.into()))
    }

    /// Whether dispatch stopped because the transaction was handled.
    pub fn is_done(&self) -> bool {
        matches!(self, Next::Done)
    }

    /// The carried error, if this is a failure.
    pub fn error(&self) -> Option<&HandlerError> {
        match self {
            Next::Fail(err) => Some(err),
            _ => None,
        }
    }
}

/// Trait for converting a handler's output into a [`Next`].
///
/// # Default Implementations
///
/// - `()` → [`Next::Done`]
/// - `Next` → As is
/// - `Result<T, E>` → Delegates to inner `T`, or [`Next::Fail`]
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be converted into a dispatch outcome",
    label = "missing `IntoNext` implementation",
    note = "Handlers must return `Next`, `()` or a `Result` wrapping one of them."
)]
pub trait IntoNext {
    /// Convert the output into a dispatch outcome.
    fn into_next(self) -> Next;
}

impl IntoNext for Next {
    fn into_next(self) -> Next {
        self
    }
}

impl IntoNext for () {
    fn into_next(self) -> Next {
        Next::Done
    }
}

impl<T, E> IntoNext for Result<T, E>
where
    T: IntoNext,
    E: Into<BoxError>,
{
    fn into_next(self) -> Next {
        match self {
            Ok(t) => t.into_next(),
            Err(e) => Next::fail(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResponseError;

    #[test]
    fn results_map_to_failures() {
        let ok: Result<Next, ResponseError> = Ok(Next::Continue);
        assert!(matches!(ok.into_next(), Next::Continue));

        let err: Result<(), ResponseError> =
            Err(ResponseError::AlreadyFinalized { action: "end" });
        let next = err.into_next();
        assert_eq!(
            next.error().map(ToString::to_string).as_deref(),
            Some("cannot end after the response has finished")
        );
    }

    #[test]
    fn unit_means_handled() {
        assert!(().into_next().is_done());
    }
}
