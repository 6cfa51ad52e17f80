//! Error types for Pathway.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`PathwayError`] - Top-level error type for all Pathway operations
//! - [`PathMatchError`] - A captured path segment could not be decoded
//! - [`HandlerError`] - A failure carried through the `next` protocol
//! - [`ResponseError`] - Misuse of a response (e.g. writing after `end`)
//! - [`ConfigError`] - Invalid registration or setting values
//! - [`RequestError`] - Invalid synthetic request construction

use std::{any::Any, error::Error as StdError, fmt, sync::Arc};
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Top-level error type for all Pathway operations.
#[derive(Error, Debug)]
pub enum PathwayError {
    /// A path parameter failed to decode.
    #[error("path match error: {0}")]
    PathMatch(#[from] PathMatchError),

    /// A handler failed.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// The response was misused.
    #[error("response error: {0}")]
    Response(#[from] ResponseError),

    /// The application or a router was misconfigured.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A synthetic request could not be built.
    #[error("request error: {0}")]
    Request(#[from] RequestError),

    /// A custom error occurred.
    #[error(transparent)]
    Custom(BoxError),
}

impl From<BoxError> for PathwayError {
    fn from(err: BoxError) -> Self {
        PathwayError::Custom(err)
    }
}

/// A captured path value contained malformed percent-encoding.
///
/// Classified as a client error: converting it into a [`HandlerError`]
/// carries status `400`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to decode param '{value}'")]
pub struct PathMatchError {
    /// The raw captured value.
    pub value: String,
}

impl PathMatchError {
    /// HTTP status associated with decode failures.
    pub const STATUS: u16 = 400;

    /// Create a decode error for `value`.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// An error propagated through the dispatch protocol.
///
/// Cheap to clone: the underlying error is shared, so the same failure can be
/// replayed from a parameter cache or handed to several error handlers.
#[derive(Clone)]
pub struct HandlerError {
    status: Option<u16>,
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

impl HandlerError {
    /// Wrap any error.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            status: None,
            inner: Arc::new(err),
        }
    }

    /// Create an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Attach an HTTP status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Build an error from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };
        Self::msg(format!("handler panicked: {detail}"))
    }

    /// The HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// The wrapped error.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.inner
    }

    /// Attempt to view the wrapped error as a concrete type.
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("status", &self.status)
            .field("inner", &self.inner)
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl StdError for HandlerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

impl From<BoxError> for HandlerError {
    fn from(err: BoxError) -> Self {
        let err = match err.downcast::<HandlerError>() {
            Ok(handler) => return *handler,
            Err(err) => err,
        };
        match err.downcast::<PathMatchError>() {
            Ok(decode) => (*decode).into(),
            Err(err) => Self {
                status: None,
                inner: Arc::from(err),
            },
        }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl From<PathMatchError> for HandlerError {
    fn from(err: PathMatchError) -> Self {
        Self::new(err).with_status(PathMatchError::STATUS)
    }
}

impl From<ResponseError> for HandlerError {
    fn from(err: ResponseError) -> Self {
        Self::new(err)
    }
}

impl From<ConfigError> for HandlerError {
    fn from(err: ConfigError) -> Self {
        Self::new(err)
    }
}

impl From<RequestError> for HandlerError {
    fn from(err: RequestError) -> Self {
        Self::new(err)
    }
}

/// Errors raised by response operations.
#[derive(Error, Debug)]
pub enum ResponseError {
    /// The response was already finished (or destroyed).
    #[error("cannot {action} after the response has finished")]
    AlreadyFinalized {
        /// What was attempted.
        action: &'static str,
    },

    /// A body could not be serialized.
    #[error("failed to serialize response body")]
    Serialize(#[from] serde_json::Error),

    /// No response extension with this name is registered.
    #[error("response extension '{0}' is not registered")]
    UnknownExtension(String),

    /// The operation requires an application bound to the response.
    #[error("no application is bound to this response")]
    NoApplication,
}

/// Errors raised while configuring routers and applications.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting holds a value that cannot be interpreted.
    #[error("unknown value for {setting} setting: {value}")]
    UnknownSettingValue {
        /// Setting name.
        setting: String,
        /// Offending value, rendered as text.
        value: String,
    },

    /// A registration call received no handlers.
    #[error("{caller}() requires at least one handler")]
    MissingHandler {
        /// Name of the registration method.
        caller: String,
    },

    /// A path pattern failed to compile.
    #[error("invalid path pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern as written.
        pattern: String,
        /// Why compilation failed.
        reason: String,
    },

    /// A parameter interceptor was registered for an empty name.
    #[error("param name must not be empty")]
    EmptyParamName,
}

/// Errors raised while building a synthetic request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The request path contains whitespace.
    #[error("request path contains unescaped characters")]
    UnescapedPath,

    /// The href could not be parsed.
    #[error("invalid request url '{0}'")]
    InvalidUrl(String),

    /// The method is not a valid HTTP token.
    #[error("invalid request method '{0}'")]
    InvalidMethod(String),

    /// No request extension with this name is registered.
    #[error("request extension '{0}' is not registered")]
    UnknownExtension(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_carry_bad_request() {
        let err: HandlerError = PathMatchError::new("%zz").into();
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.to_string(), "failed to decode param '%zz'");
    }

    #[test]
    fn boxed_handler_errors_unwrap() {
        let boxed: BoxError = Box::new(HandlerError::msg("boom").with_status(418));
        let err = HandlerError::from(boxed);
        assert_eq!(err.status(), Some(418));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn panic_payloads_are_described() {
        let err = HandlerError::from_panic(Box::new("oh no"));
        assert_eq!(err.to_string(), "handler panicked: oh no");
        assert!(err.status().is_none());
    }
}
