//! Span instrumentation for middleware.

use pathway_core::{Handler, IntoHandlers, Middleware, Mountable, Next, Request, Response};
use tracing::{Instrument, info_span};

/// Runs the wrapped middleware inside an `info` span carrying the
/// transaction's method and url.
pub struct Traced<M> {
    inner: M,
    name: &'static str,
}

impl<M> Traced<M> {
    /// Wrap `inner`, naming the span field `handler` after `name`.
    pub const fn new(inner: M, name: &'static str) -> Self {
        Self { inner, name }
    }
}

impl<M: Clone> Clone for Traced<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            name: self.name,
        }
    }
}

impl<M: Middleware> Middleware for Traced<M> {
    async fn handle(&self, req: Request, res: Response) -> Next {
        let span = info_span!(
            "pathway_handler",
            handler = %self.name,
            method = %req.method(),
            url = %req.url(),
        );
        self.inner.handle(req, res).instrument(span).await
    }

    fn mountable(&self) -> Option<&dyn Mountable> {
        self.inner.mountable()
    }
}

impl<M: Middleware> IntoHandlers for Traced<M> {
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::new(self)]
    }
}
