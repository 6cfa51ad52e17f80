//! The synthetic response.
//!
//! A [`Response`] buffers status, headers and body in memory and finishes
//! exactly once. Observers can register completion listeners or await
//! [`Response::completion`].

use crate::{
    context::AppContext,
    error::{BoxError, ResponseError},
    headers::Headers,
    lock,
    request::Request,
};
use futures::channel::oneshot;
use http::Method;
use serde_json::{Map, Value};
use std::{
    future::Future,
    sync::{Arc, Mutex, Weak},
};

/// How a response reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// `end` was called.
    Finished,
    /// The response was torn down without finishing.
    Destroyed,
}

type Listener = Box<dyn FnOnce(Completion) + Send + 'static>;

struct ResponseState {
    status: u16,
    headers: Headers,
    trailers: Headers,
    body: Vec<u8>,
    has_body: bool,
    text: Option<String>,
    data: Option<Value>,
    finished: bool,
    destroyed: bool,
    locals: Map<String, Value>,
    listeners: Vec<Listener>,
    req: Option<Request>,
    app: Option<Arc<dyn AppContext>>,
}

impl ResponseState {
    fn completion(&self) -> Option<Completion> {
        if self.finished {
            Some(Completion::Finished)
        } else if self.destroyed {
            Some(Completion::Destroyed)
        } else {
            None
        }
    }

    fn ensure_open(&self, action: &'static str) -> Result<(), ResponseError> {
        if self.finished || self.destroyed {
            Err(ResponseError::AlreadyFinalized { action })
        } else {
            Ok(())
        }
    }
}

/// An in-memory response paired with a [`Request`].
///
/// Like [`Request`], this is a shared handle. Once finished, further header
/// mutation and body writes fail with [`ResponseError::AlreadyFinalized`].
#[derive(Clone)]
pub struct Response {
    inner: Arc<Mutex<ResponseState>>,
}

/// A non-owning [`Response`] handle for completion listeners.
#[derive(Clone)]
pub struct WeakResponse {
    inner: Weak<Mutex<ResponseState>>,
}

impl WeakResponse {
    /// The response, if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<Response> {
        self.inner.upgrade().map(|inner| Response { inner })
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner);
        f.debug_struct("Response")
            .field("status", &state.status)
            .field("headers", &state.headers)
            .field("finished", &state.finished)
            .field("destroyed", &state.destroyed)
            .finish_non_exhaustive()
    }
}

impl Response {
    /// Create a detached response with status `200`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResponseState {
                status: 200,
                headers: Headers::new(),
                trailers: Headers::new(),
                body: Vec::new(),
                has_body: true,
                text: None,
                data: None,
                finished: false,
                destroyed: false,
                locals: Map::new(),
                listeners: Vec::new(),
                req: None,
                app: None,
            })),
        }
    }

    /// Create the response paired with `req`. `HEAD` requests never buffer
    /// body bytes.
    pub fn for_request(req: &Request) -> Self {
        let res = Self::new();
        {
            let mut state = lock(&res.inner);
            state.has_body = req.method() != Method::HEAD;
            state.req = Some(req.clone());
        }
        res
    }

    fn with<R>(&self, f: impl FnOnce(&ResponseState) -> R) -> R {
        f(&lock(&self.inner))
    }

    fn with_open<R>(
        &self,
        action: &'static str,
        f: impl FnOnce(&mut ResponseState) -> R,
    ) -> Result<R, ResponseError> {
        let mut state = lock(&self.inner);
        state.ensure_open(action)?;
        Ok(f(&mut state))
    }

    /// Whether two handles refer to the same response.
    pub fn ptr_eq(&self, other: &Response) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A handle that does not keep the response alive.
    pub fn downgrade(&self) -> WeakResponse {
        WeakResponse {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The request this response answers.
    pub fn request(&self) -> Option<Request> {
        self.with(|s| s.req.clone())
    }

    /// Application currently handling the response.
    pub fn app(&self) -> Option<Arc<dyn AppContext>> {
        self.with(|s| s.app.clone())
    }

    /// Swap the application, returning the previous one.
    pub fn set_app(&self, app: Option<Arc<dyn AppContext>>) -> Option<Arc<dyn AppContext>> {
        std::mem::replace(&mut lock(&self.inner).app, app)
    }

    /// Current status code.
    pub fn status(&self) -> u16 {
        self.with(|s| s.status)
    }

    /// Set the status code.
    pub fn set_status(&self, status: u16) -> Result<(), ResponseError> {
        self.with_open("set the status", |s| s.status = status)
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<String> {
        self.with(|s| s.headers.get(name).map(str::to_owned))
    }

    /// Snapshot of all headers.
    pub fn headers(&self) -> Headers {
        self.with(|s| s.headers.clone())
    }

    /// Replace a header.
    pub fn set_header(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ResponseError> {
        let (name, value) = (name.into(), value.into());
        self.with_open("set headers", |s| s.headers.set(name, value))
    }

    /// Replace a header with several values.
    pub fn set_header_values(
        &self,
        name: impl Into<String>,
        values: Vec<String>,
    ) -> Result<(), ResponseError> {
        let name = name.into();
        self.with_open("set headers", |s| s.headers.set_all(name, values))
    }

    /// Append a header value.
    pub fn append_header(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ResponseError> {
        let (name, value) = (name.into(), value.into());
        self.with_open("set headers", |s| s.headers.append(name, value))
    }

    /// Remove a header.
    pub fn remove_header(&self, name: &str) -> Result<bool, ResponseError> {
        self.with_open("remove headers", |s| s.headers.remove(name))
    }

    /// Add trailer fields.
    pub fn add_trailers<I, K, V>(&self, trailers: I) -> Result<(), ResponseError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.with_open("add trailers", |s| {
            for (k, v) in trailers {
                s.trailers.append(k, v);
            }
        })
    }

    /// Trailer fields added so far.
    pub fn trailers(&self) -> Headers {
        self.with(|s| s.trailers.clone())
    }

    /// Buffer a body chunk. Ignored for `HEAD` responses.
    pub fn write(&self, chunk: impl AsRef<[u8]>) -> Result<(), ResponseError> {
        self.with_open("write", |s| {
            if s.has_body {
                s.body.extend_from_slice(chunk.as_ref());
            }
        })
    }

    /// Finish the response.
    pub fn end(&self) -> Result<(), ResponseError> {
        self.end_with(b"")
    }

    /// Write a final chunk and finish the response.
    ///
    /// The first call snapshots the body as text, parses it as JSON when
    /// possible and notifies completion listeners. Later calls fail and leave
    /// the response unchanged.
    pub fn end_with(&self, chunk: impl AsRef<[u8]>) -> Result<(), ResponseError> {
        let listeners = {
            let mut state = lock(&self.inner);
            state.ensure_open("end")?;
            if state.has_body {
                state.body.extend_from_slice(chunk.as_ref());
            }
            let text = String::from_utf8_lossy(&state.body).into_owned();
            state.data = serde_json::from_str(&text).ok();
            state.text = Some(text);
            state.finished = true;
            std::mem::take(&mut state.listeners)
        };
        for listener in listeners {
            listener(Completion::Finished);
        }
        Ok(())
    }

    /// Tear the response down without finishing it. No-op once terminal.
    pub fn destroy(&self) {
        let listeners = {
            let mut state = lock(&self.inner);
            if state.completion().is_some() {
                return;
            }
            state.destroyed = true;
            std::mem::take(&mut state.listeners)
        };
        for listener in listeners {
            listener(Completion::Destroyed);
        }
    }

    /// Whether `end` has been called.
    pub fn is_finished(&self) -> bool {
        self.with(|s| s.finished)
    }

    /// Whether the response was destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.with(|s| s.destroyed)
    }

    /// Alias for [`Response::is_finished`].
    pub fn headers_sent(&self) -> bool {
        self.is_finished()
    }

    /// Buffered body bytes.
    pub fn body(&self) -> Vec<u8> {
        self.with(|s| s.body.clone())
    }

    /// Body text, available once finished.
    pub fn text(&self) -> Option<String> {
        self.with(|s| s.text.clone())
    }

    /// Body parsed as JSON, if it was valid JSON.
    pub fn data(&self) -> Option<Value> {
        self.with(|s| s.data.clone())
    }

    /// Response-scoped template locals.
    pub fn locals(&self) -> Map<String, Value> {
        self.with(|s| s.locals.clone())
    }

    /// Set a response local.
    pub fn set_local(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        lock(&self.inner).locals.insert(name, value);
    }

    /// Register a listener for the terminal state. Runs immediately when the
    /// response is already terminal.
    pub fn on_finish(&self, listener: impl FnOnce(Completion) + Send + 'static) {
        let done = {
            let mut state = lock(&self.inner);
            match state.completion() {
                Some(done) => done,
                None => {
                    state.listeners.push(Box::new(listener));
                    return;
                }
            }
        };
        listener(done);
    }

    /// Resolve once the response finishes or is destroyed. Dropping every
    /// handle to an unfinished response resolves as [`Completion::Destroyed`].
    pub fn completion(&self) -> impl Future<Output = Completion> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.on_finish(move |done| {
            let _ = tx.send(done);
        });
        async move { rx.await.unwrap_or(Completion::Destroyed) }
    }

    /// Invoke a response extension registered on the current application.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, BoxError> {
        let extension = self
            .app()
            .and_then(|app| app.response_extension(name))
            .ok_or_else(|| ResponseError::UnknownExtension(name.to_owned()))?;
        extension(self, args)
    }
}
