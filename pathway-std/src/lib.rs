//! # pathway-std
//!
//! Standard implementations for the Pathway middleware engine.
//!
//! This crate provides:
//! - **Path matching**: [`PathPattern`], [`PathSpec`]
//! - **Routing**: [`Router`], [`Route`], parameter interceptors
//! - **Query parsing**: [`query::QueryParser`], [`query::QueryMiddleware`]
//! - **Helpers**: [`RequestExt`], [`ResponseExt`]
//! - **Standard hooks**: Logging, Tracing, Timeout
//! - **Testing utilities**: [`testing`]

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use pathway_core;

// Modules
pub mod ext;
pub mod hooks;
mod layer;
pub mod mime;
pub mod pattern;
pub mod query;
pub mod route;
pub mod router;
pub mod testing;

pub use ext::{Body, RequestExt, ResponseExt};
pub use pattern::{PathMatch, PathPattern, PathSpec, PatternOptions};
pub use route::Route;
pub use router::{DynParamHandler, ParamNames, Router, RouterOptions};
