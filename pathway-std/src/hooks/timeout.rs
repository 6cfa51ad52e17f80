//! Time-limited handlers.

use pathway_core::{Handler, HandlerError, IntoHandlers, Middleware, Next, Request, Response};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// The wrapped handler did not settle in time.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("handler did not finish within {0:?}")]
pub struct TimeoutError(pub Duration);

/// Fails the transaction with `503` when the wrapped middleware runs longer
/// than `duration`.
pub struct TimeoutMiddleware<M> {
    inner: M,
    duration: Duration,
}

impl<M> TimeoutMiddleware<M> {
    /// Wrap `inner` with a deadline.
    pub fn new(inner: M, duration: Duration) -> Self {
        Self { inner, duration }
    }
}

impl<M: Middleware> Middleware for TimeoutMiddleware<M> {
    async fn handle(&self, req: Request, res: Response) -> Next {
        match timeout(self.duration, self.inner.handle(req, res)).await {
            Ok(next) => next,
            Err(_) => {
                let err = HandlerError::new(TimeoutError(self.duration)).with_status(503);
                Next::Fail(err)
            }
        }
    }
}

impl<M: Middleware> IntoHandlers for TimeoutMiddleware<M> {
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::new(self)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleepy(Duration);

    impl Middleware for Sleepy {
        async fn handle(&self, _req: Request, _res: Response) -> Next {
            tokio::time::sleep(self.0).await;
            Next::Continue
        }
    }

    fn pair() -> (Request, Response) {
        let req = Request::new("GET", "/slow").unwrap();
        let res = Response::for_request(&req);
        (req, res)
    }

    #[tokio::test]
    async fn slow_handlers_fail_with_503() {
        let (req, res) = pair();
        let wrapped =
            TimeoutMiddleware::new(Sleepy(Duration::from_secs(5)), Duration::from_millis(10));
        let next = wrapped.handle(req, res).await;
        let err = next.error().unwrap();
        assert_eq!(err.status(), Some(503));
        assert!(err.downcast_ref::<TimeoutError>().is_some());
    }

    #[tokio::test]
    async fn fast_handlers_pass() {
        let (req, res) = pair();
        let wrapped =
            TimeoutMiddleware::new(Sleepy(Duration::from_millis(1)), Duration::from_secs(5));
        assert!(matches!(wrapped.handle(req, res).await, Next::Continue));
    }
}
