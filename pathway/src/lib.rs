//! # pathway - Express-Style Middleware Dispatch
//!
//! `pathway` runs the routing logic of an HTTP application against synthetic,
//! in-memory request/response transactions. Nothing here opens a socket: a
//! producer (a test, a navigation event, a transport adapter) builds a
//! [`Request`], pairs it with a [`Response`] and hands both to
//! [`Application::handle`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pathway::prelude::*;
//!
//! let mut app = Application::new();
//! app.get("/user/:id", handler(|req: Request, res: Response| async move {
//!     res.send(format!("user {}", req.param("id").unwrap_or_default()))
//! }))?;
//!
//! let req = Request::new("GET", "/user/42")?;
//! let res = Response::for_request(&req);
//! app.handle(&req, &res).await?;
//! assert_eq!(res.text().as_deref(), Some("user 42"));
//! ```
//!
//! ## Continuations
//!
//! Handlers return [`Next`] instead of calling `next()`. `Result` values
//! convert automatically: `Ok(())` finishes dispatch, `Err(e)` switches to
//! error handlers.

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod application;
mod final_handler;
pub mod view;

pub use application::{AppHandle, Application, ENV_VAR};
pub use final_handler::{FinalOptions, OnError, final_handler};
pub use view::{MemoryTemplates, TemplateSource, ViewEngine, ViewError};

pub use pathway_core::{
    // Application seam
    AppContext,
    // Error types
    BoxError,
    // Transaction
    Completion,
    ConfigError,
    // Handlers
    DynErrorMiddleware,
    DynMiddleware,
    ErrorMiddleware,
    Handler,
    HandlerError,
    Headers,
    IntoHandlers,
    // Continuation
    IntoNext,
    Method,
    Middleware,
    Mountable,
    Next,
    Params,
    PathMatchError,
    PathwayError,
    Request,
    RequestBuilder,
    RequestError,
    Response,
    ResponseError,
    WeakResponse,
    catch_panic,
    error_handler,
    handler,
};

// Routing
pub use pathway_std::{
    Body, PathMatch, PathPattern, PathSpec, PatternOptions, RequestExt, ResponseExt, Route,
    Router, RouterOptions, mime, query,
};

/// Standard middleware.
pub mod hooks {
    #![allow(clippy::wildcard_imports)]
    pub use pathway_std::hooks::*;
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use pathway_std::testing::*;
}

/// Prelude module - common imports for Pathway.
///
/// # Usage
///
/// ```rust,ignore
/// use pathway::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Application
        AppHandle,
        Application,
        // Errors
        BoxError,
        ConfigError,
        // Handlers
        Handler,
        HandlerError,
        Method,
        Middleware,
        // Continuation
        Next,
        // Transaction
        Request,
        RequestExt,
        Response,
        ResponseExt,
        Router,
        RouterOptions,
        error_handler,
        handler,
    };
}
