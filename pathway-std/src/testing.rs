//! Testing utilities for Pathway.
//!
//! Helpers that make exercising routers and middleware in tests shorter.
//!
//! # Features
//!
//! - [`RecordingHandler`]: records the urls each invocation saw
//! - [`CountingHandler`]: counts invocations
//! - [`send`]: build a transaction and run it through a handler

use pathway_core::{Handler, IntoHandlers, Middleware, Next, Request, RequestError, Response};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

// ============================================================================
// Recording Handler
// ============================================================================

/// What a [`RecordingHandler`] saw on one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    /// `req.url` at the time of the call.
    pub url: String,
    /// `req.base_url` at the time of the call.
    pub base_url: String,
}

/// A handler that records the `url`/`base_url` pair of every call.
///
/// Useful for verifying prefix stripping in mounted routers.
///
/// # Example
///
/// ```rust,ignore
/// let recorder = RecordingHandler::new();
/// router.mount("/api", recorder.clone())?;
///
/// send(&router, "GET", "/api/users").await?;
/// assert_eq!(recorder.visits()[0].url, "/users");
/// ```
pub struct RecordingHandler {
    visits: Arc<Mutex<Vec<Visit>>>,
    result: Next,
}

impl RecordingHandler {
    /// Create a recording handler that continues dispatch.
    pub fn new() -> Self {
        Self::with_result(Next::Continue)
    }

    /// Create a recording handler that returns a specific outcome.
    pub fn with_result(result: Next) -> Self {
        Self {
            visits: Arc::new(Mutex::new(Vec::new())),
            result,
        }
    }

    /// Recorded visits.
    pub fn visits(&self) -> Vec<Visit> {
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded visits.
    pub fn count(&self) -> usize {
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RecordingHandler {
    fn clone(&self) -> Self {
        Self {
            visits: self.visits.clone(),
            result: self.result.clone(),
        }
    }
}

impl Middleware for RecordingHandler {
    async fn handle(&self, req: Request, _res: Response) -> Next {
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Visit {
                url: req.url(),
                base_url: req.base_url(),
            });
        self.result.clone()
    }
}

impl IntoHandlers for RecordingHandler {
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::new(self)]
    }
}

// ============================================================================
// Counting Handler
// ============================================================================

/// A handler that counts invocations and continues.
///
/// # Example
///
/// ```rust,ignore
/// let counter = CountingHandler::new();
/// router.middleware(counter.clone())?;
///
/// send(&router, "GET", "/").await?;
/// assert_eq!(counter.count(), 1);
/// ```
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    /// Create a new counting handler.
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reset the counter.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

impl Default for CountingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CountingHandler {
    fn clone(&self) -> Self {
        Self {
            count: self.count.clone(),
        }
    }
}

impl Middleware for CountingHandler {
    async fn handle(&self, _req: Request, _res: Response) -> Next {
        self.count.fetch_add(1, Ordering::SeqCst);
        Next::Continue
    }
}

impl IntoHandlers for CountingHandler {
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::new(self)]
    }
}

// ============================================================================
// Dispatch Helper
// ============================================================================

/// Build a `method url` transaction and run it through `target`.
pub async fn send<M: Middleware>(
    target: &M,
    method: &str,
    url: &str,
) -> Result<(Request, Response, Next), RequestError> {
    let req = Request::new(method, url)?;
    let res = Response::for_request(&req);
    let next = target.handle(req.clone(), res.clone()).await;
    Ok((req, res, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Router;

    #[tokio::test]
    async fn recorder_sees_mount_relative_urls() {
        let recorder = RecordingHandler::new();
        let mut router = Router::new();
        router.mount("/api", recorder.clone()).unwrap();

        let (req, _res, next) = send(&router, "GET", "/api/users?page=2").await.unwrap();
        assert!(matches!(next, Next::Continue));
        assert_eq!(
            recorder.visits(),
            [Visit {
                url: "/users?page=2".to_owned(),
                base_url: "/api".to_owned(),
            }]
        );
        assert_eq!(req.url(), "/api/users?page=2");
    }

    #[tokio::test]
    async fn counter_resets() {
        let counter = CountingHandler::new();
        send(&counter, "GET", "/").await.unwrap();
        send(&counter, "POST", "/").await.unwrap();
        assert_eq!(counter.count(), 2);
        counter.reset();
        assert_eq!(counter.count(), 0);
    }
}
