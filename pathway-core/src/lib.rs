//! # pathway-core
//!
//! Core types for the Pathway middleware engine.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! middleware authors that don't need the routing implementation in
//! `pathway-std`.
//!
//! # The Transaction
//!
//! A dispatch operates on a [`Request`] / [`Response`] pair. Both are shared
//! handles over in-memory state: routers rewrite `url`, `base_url` and
//! `params` on the request as it descends into mounted routers and restore
//! them on the way out, while the response buffers status, headers and body
//! and finishes exactly once.
//!
//! # The Continuation Protocol
//!
//! Handlers return a [`Next`] value rather than calling a continuation:
//!
//! - [`Next::Continue`] - proceed to the next matching layer
//! - [`Next::SkipRoute`] - skip the rest of the current route
//! - [`Next::ExitRouter`] - leave the current router
//! - [`Next::Fail`] - enter error-handling mode
//! - [`Next::Done`] - the transaction was handled
//!
//! # Handler Kinds
//!
//! [`Handler`] tags every handler as normal or error-handling. Routers only
//! run error handlers while an error is pending, and only normal handlers
//! otherwise.
//!
//! # Error Types
//!
//! - [`PathwayError`] - Top-level error type
//! - [`HandlerError`] - Failures travelling through [`Next::Fail`]
//! - [`PathMatchError`] - Undecodable path parameters (400)
//! - [`ResponseError`] - Response misuse
//! - [`ConfigError`] - Registration and setting errors

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod context;
mod error;
mod handler;
mod headers;
mod next;
mod params;
mod request;
mod response;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-exports
pub use context::{AppContext, RequestExtension, ResponseExtension, truthy};
pub use error::{
    BoxError, ConfigError, HandlerError, PathMatchError, PathwayError, RequestError,
    ResponseError,
};
pub use handler::{
    DynErrorMiddleware, DynMiddleware, ErrorMiddleware, FnErrorMiddleware, FnMiddleware,
    Handler, IntoHandlers, Middleware, Mountable, catch_panic, error_handler, handler,
};
pub use headers::Headers;
pub use http::Method;
pub use next::{IntoNext, Next};
pub use params::Params;
pub use request::{Request, RequestBuilder, url_pathname, url_query};
pub use response::{Completion, Response, WeakResponse};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Handler panics are caught and converted into failures, so a poisoned
/// transaction lock only means a handler died mid-update.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
