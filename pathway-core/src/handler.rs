//! # Handlers
//!
//! The units a router dispatches to.
//!
//! Two kinds exist, and the kind is an explicit tag rather than something
//! inferred from a function signature:
//!
//! - [`Middleware`]: runs while no error is pending.
//! - [`ErrorMiddleware`]: runs only while an error is pending.
//!
//! Both use native `async fn` for static dispatch; [`DynMiddleware`] and
//! [`DynErrorMiddleware`] are the object-safe forms stored inside a
//! [`Handler`].

use crate::{
    context::AppContext,
    error::HandlerError,
    next::{IntoNext, Next},
    request::Request,
    response::Response,
};
use futures::{FutureExt, future::BoxFuture};
use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};

/// A handler invoked while no error is pending.
///
/// Implement this for types that carry configuration; for plain async
/// closures use [`handler`].
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Middleware`",
    label = "missing `Middleware` implementation",
    note = "wrap async closures with `pathway_core::handler`"
)]
pub trait Middleware: Send + Sync + 'static {
    /// Handle a transaction.
    fn handle(&self, req: Request, res: Response) -> impl Future<Output = Next> + Send;

    /// Mount hook for handlers that are themselves applications.
    fn mountable(&self) -> Option<&dyn Mountable> {
        None
    }
}

/// A handler invoked only while an error is pending.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an `ErrorMiddleware`",
    label = "missing `ErrorMiddleware` implementation",
    note = "wrap async closures with `pathway_core::error_handler`"
)]
pub trait ErrorMiddleware: Send + Sync + 'static {
    /// Handle a pending error.
    fn handle_error(
        &self,
        err: HandlerError,
        req: Request,
        res: Response,
    ) -> impl Future<Output = Next> + Send;
}

/// Dynamic object-safe version of [`Middleware`].
pub trait DynMiddleware: Send + Sync + 'static {
    /// Handle a transaction (dynamic dispatch version).
    fn handle_dyn(&self, req: Request, res: Response) -> BoxFuture<'_, Next>;

    /// See [`Middleware::mountable`].
    fn mountable_dyn(&self) -> Option<&dyn Mountable>;
}

impl<T: Middleware> DynMiddleware for T {
    fn handle_dyn(&self, req: Request, res: Response) -> BoxFuture<'_, Next> {
        Box::pin(self.handle(req, res))
    }

    fn mountable_dyn(&self) -> Option<&dyn Mountable> {
        self.mountable()
    }
}

/// Dynamic object-safe version of [`ErrorMiddleware`].
pub trait DynErrorMiddleware: Send + Sync + 'static {
    /// Handle a pending error (dynamic dispatch version).
    fn handle_error_dyn(
        &self,
        err: HandlerError,
        req: Request,
        res: Response,
    ) -> BoxFuture<'_, Next>;
}

impl<T: ErrorMiddleware> DynErrorMiddleware for T {
    fn handle_error_dyn(
        &self,
        err: HandlerError,
        req: Request,
        res: Response,
    ) -> BoxFuture<'_, Next> {
        Box::pin(self.handle_error(err, req, res))
    }
}

/// Something that wants to know when it is mounted under an application.
pub trait Mountable: Send + Sync {
    /// Called once per registration with the mounting application and the
    /// path it was mounted at.
    fn mounted(&self, parent: &Arc<dyn AppContext>, mount_path: &str);
}

/// A [`Middleware`] backed by an async closure.
pub struct FnMiddleware<F>(F);

impl<F, Fut, R> Middleware for FnMiddleware<F>
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
    R: IntoNext,
{
    async fn handle(&self, req: Request, res: Response) -> Next {
        (self.0)(req, res).await.into_next()
    }
}

/// An [`ErrorMiddleware`] backed by an async closure.
pub struct FnErrorMiddleware<F>(F);

impl<F, Fut, R> ErrorMiddleware for FnErrorMiddleware<F>
where
    F: Fn(HandlerError, Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
    R: IntoNext,
{
    async fn handle_error(&self, err: HandlerError, req: Request, res: Response) -> Next {
        (self.0)(err, req, res).await.into_next()
    }
}

/// Wrap an async closure as a normal handler.
pub fn handler<F, Fut, R>(f: F) -> Handler
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
    R: IntoNext,
{
    Handler::new(FnMiddleware(f))
}

/// Wrap an async closure as an error handler.
pub fn error_handler<F, Fut, R>(f: F) -> Handler
where
    F: Fn(HandlerError, Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
    R: IntoNext,
{
    Handler::error(FnErrorMiddleware(f))
}

/// Run a handler future, turning a panic into [`Next::Fail`].
pub async fn catch_panic<F>(fut: F) -> Next
where
    F: Future<Output = Next> + Send,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Next::Fail(HandlerError::from_panic(payload)))
}

/// A tagged handler as stored in a layer.
#[derive(Clone)]
pub enum Handler {
    /// Runs while no error is pending.
    Normal(Arc<dyn DynMiddleware>),
    /// Runs only while an error is pending.
    Error(Arc<dyn DynErrorMiddleware>),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Normal(_) => f.write_str("Handler::Normal"),
            Handler::Error(_) => f.write_str("Handler::Error"),
        }
    }
}

impl Handler {
    /// Tag a middleware as a normal handler.
    pub fn new<M: Middleware>(middleware: M) -> Self {
        Handler::Normal(Arc::new(middleware))
    }

    /// Tag an error middleware.
    pub fn error<M: ErrorMiddleware>(middleware: M) -> Self {
        Handler::Error(Arc::new(middleware))
    }

    /// Whether this handler only runs while an error is pending.
    pub fn is_error_handler(&self) -> bool {
        matches!(self, Handler::Error(_))
    }

    /// Mount hook of the wrapped middleware.
    pub fn mountable(&self) -> Option<&dyn Mountable> {
        match self {
            Handler::Normal(m) => m.mountable_dyn(),
            Handler::Error(_) => None,
        }
    }

    /// Run as a normal handler. Error handlers are skipped.
    pub async fn run(&self, req: Request, res: Response) -> Next {
        match self {
            Handler::Normal(m) => catch_panic(async move { m.handle_dyn(req, res).await }).await,
            Handler::Error(_) => Next::Continue,
        }
    }

    /// Run with a pending error. Normal handlers pass the error on.
    pub async fn run_error(&self, err: HandlerError, req: Request, res: Response) -> Next {
        match self {
            Handler::Error(m) => {
                catch_panic(async move { m.handle_error_dyn(err, req, res).await }).await
            }
            Handler::Normal(_) => Next::Fail(err),
        }
    }
}

/// Conversion into a flat list of handlers.
///
/// Registration methods accept anything implementing this, so single
/// handlers, arrays, vectors and tuples (nested arbitrarily) all flatten into
/// one ordered list.
pub trait IntoHandlers {
    /// Flatten into handlers, preserving order.
    fn into_handlers(self) -> Vec<Handler>;
}

impl IntoHandlers for Handler {
    fn into_handlers(self) -> Vec<Handler> {
        vec![self]
    }
}

impl<T: IntoHandlers> IntoHandlers for Vec<T> {
    fn into_handlers(self) -> Vec<Handler> {
        self.into_iter().flat_map(IntoHandlers::into_handlers).collect()
    }
}

impl<T: IntoHandlers, const N: usize> IntoHandlers for [T; N] {
    fn into_handlers(self) -> Vec<Handler> {
        self.into_iter().flat_map(IntoHandlers::into_handlers).collect()
    }
}

macro_rules! impl_into_handlers_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: IntoHandlers),+> IntoHandlers for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_handlers(self) -> Vec<Handler> {
                let ($($name,)+) = self;
                let mut handlers = Vec::new();
                $(handlers.extend($name.into_handlers());)+
                handlers
            }
        }
    };
}

impl_into_handlers_for_tuple!(A);
impl_into_handlers_for_tuple!(A, B);
impl_into_handlers_for_tuple!(A, B, C);
impl_into_handlers_for_tuple!(A, B, C, D);
impl_into_handlers_for_tuple!(A, B, C, D, E);
impl_into_handlers_for_tuple!(A, B, C, D, E, F);
impl_into_handlers_for_tuple!(A, B, C, D, E, F, G);
impl_into_handlers_for_tuple!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Request, Response) {
        let req = Request::new("GET", "/").unwrap();
        let res = Response::for_request(&req);
        (req, res)
    }

    #[tokio::test]
    async fn kinds_gate_execution() {
        let normal = handler(|_req, _res| async { Next::Continue });
        let error = error_handler(|_err, _req, _res| async { Next::Done });

        let (req, res) = pair();
        assert!(matches!(normal.run(req.clone(), res.clone()).await, Next::Continue));
        assert!(matches!(error.run(req.clone(), res.clone()).await, Next::Continue));

        let err = HandlerError::msg("boom");
        assert!(matches!(
            normal.run_error(err.clone(), req.clone(), res.clone()).await,
            Next::Fail(_)
        ));
        assert!(error.run_error(err, req, res).await.is_done());
    }

    #[tokio::test]
    async fn panics_become_failures() {
        fn explode() -> Next {
            panic!("kaboom")
        }
        let exploding = handler(|_req, _res| async { explode() });
        let (req, res) = pair();
        let next = exploding.run(req, res).await;
        assert_eq!(
            next.error().map(ToString::to_string).as_deref(),
            Some("handler panicked: kaboom")
        );
    }

    #[test]
    fn nested_lists_flatten() {
        let a = handler(|_req, _res| async { Next::Continue });
        let b = error_handler(|_err, _req, _res| async { Next::Continue });
        let list = (a.clone(), vec![b, a], [handler(|_req, _res| async {})]).into_handlers();
        assert_eq!(list.len(), 4);
        assert!(list[1].is_error_handler());
    }
}
