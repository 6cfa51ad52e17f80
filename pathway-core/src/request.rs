//! The synthetic request.

use crate::{
    context::AppContext,
    error::{BoxError, RequestError},
    headers::Headers,
    lock,
    params::Params,
};
use http::{Extensions, Method};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use url::Url;

const DEFAULT_HOSTNAME: &str = "localhost";
const DEFAULT_BASE: &str = "http://localhost/";

struct RequestState {
    method: Method,
    url: String,
    original_url: String,
    base_url: String,
    params: Params,
    query: Value,
    body: Value,
    headers: Headers,
    protocol: String,
    hostname: String,
    port: u16,
    hash: String,
    route: Option<String>,
    app: Option<Arc<dyn AppContext>>,
    extensions: Extensions,
}

/// An in-memory request flowing through a dispatch.
///
/// `Request` is a cheap handle: clones share the same underlying state, so a
/// router rewriting `url` and `base_url` is observed by every handler holding
/// the request. `original_url` never changes after construction.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Mutex<RequestState>>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner);
        f.debug_struct("Request")
            .field("method", &state.method)
            .field("url", &state.url)
            .field("base_url", &state.base_url)
            .field("params", &state.params)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Build a request for `method` and a path-plus-query `url` with default
    /// host and port.
    pub fn new(method: &str, url: &str) -> Result<Self, RequestError> {
        Self::builder(method, url).build()
    }

    /// Start building a request.
    pub fn builder(method: impl Into<String>, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            method: method.into(),
            url: url.into(),
            headers: Headers::new(),
            body: Value::Null,
            protocol: "http".to_owned(),
            hostname: DEFAULT_HOSTNAME.to_owned(),
            port: None,
            hash: String::new(),
        }
    }

    /// Build a request from an absolute or relative href, as produced by a
    /// navigation event. Relative hrefs resolve against `http://localhost/`.
    pub fn from_href(method: &str, href: &str) -> Result<Self, RequestError> {
        let invalid = || RequestError::InvalidUrl(href.to_owned());
        let base = Url::parse(DEFAULT_BASE).map_err(|_| invalid())?;
        let parsed = Url::options()
            .base_url(Some(&base))
            .parse(href)
            .map_err(|_| invalid())?;

        let mut url = parsed.path().to_owned();
        if let Some(query) = parsed.query() {
            url.push('?');
            url.push_str(query);
        }
        let mut builder = Self::builder(method, url)
            .protocol(parsed.scheme())
            .hostname(parsed.host_str().unwrap_or(DEFAULT_HOSTNAME));
        if let Some(port) = parsed.port_or_known_default() {
            builder = builder.port(port);
        }
        if let Some(fragment) = parsed.fragment() {
            builder = builder.hash(format!("#{fragment}"));
        }
        builder.build()
    }

    fn with<R>(&self, f: impl FnOnce(&RequestState) -> R) -> R {
        f(&lock(&self.inner))
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut RequestState) -> R) -> R {
        f(&mut lock(&self.inner))
    }

    /// Whether two handles refer to the same request.
    pub fn ptr_eq(&self, other: &Request) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The request method.
    pub fn method(&self) -> Method {
        self.with(|s| s.method.clone())
    }

    /// The url relative to the current mount point.
    pub fn url(&self) -> String {
        self.with(|s| s.url.clone())
    }

    /// Replace the url.
    pub fn set_url(&self, url: impl Into<String>) {
        let url = url.into();
        self.with_mut(|s| s.url = url);
    }

    /// The url as constructed.
    pub fn original_url(&self) -> String {
        self.with(|s| s.original_url.clone())
    }

    /// The accumulated mount prefix.
    pub fn base_url(&self) -> String {
        self.with(|s| s.base_url.clone())
    }

    /// Replace the mount prefix.
    pub fn set_base_url(&self, base_url: impl Into<String>) {
        let base_url = base_url.into();
        self.with_mut(|s| s.base_url = base_url);
    }

    /// Path portion of [`Request::url`].
    pub fn pathname(&self) -> String {
        self.with(|s| url_pathname(&s.url).to_owned())
    }

    /// Raw query string of [`Request::url`], without the leading `?`.
    pub fn query_string(&self) -> Option<String> {
        self.with(|s| url_query(&s.url).map(str::to_owned))
    }

    /// Parameters bound by the current layer.
    pub fn params(&self) -> Params {
        self.with(|s| s.params.clone())
    }

    /// A single named parameter.
    pub fn param(&self, name: &str) -> Option<String> {
        self.with(|s| s.params.get(name).map(str::to_owned))
    }

    /// Replace the parameters.
    pub fn set_params(&self, params: Params) {
        self.with_mut(|s| s.params = params);
    }

    /// Bind or replace one named parameter.
    pub fn set_param(&self, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.with_mut(|s| s.params.insert(name, value));
    }

    /// Parsed query, `Null` until a query parser ran.
    pub fn query(&self) -> Value {
        self.with(|s| s.query.clone())
    }

    /// Replace the parsed query.
    pub fn set_query(&self, query: Value) {
        self.with_mut(|s| s.query = query);
    }

    /// Request body.
    pub fn body(&self) -> Value {
        self.with(|s| s.body.clone())
    }

    /// Replace the request body.
    pub fn set_body(&self, body: Value) {
        self.with_mut(|s| s.body = body);
    }

    /// First value of a header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.with(|s| s.headers.get(name).map(str::to_owned))
    }

    /// Snapshot of all headers.
    pub fn headers(&self) -> Headers {
        self.with(|s| s.headers.clone())
    }

    /// Set a header.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        self.with_mut(|s| s.headers.set(name, value));
    }

    /// Scheme without the trailing colon.
    pub fn protocol(&self) -> String {
        self.with(|s| s.protocol.clone())
    }

    /// Hostname the request was built for.
    pub fn hostname(&self) -> String {
        self.with(|s| s.hostname.clone())
    }

    /// `hostname:port` the request was built for.
    pub fn host(&self) -> String {
        self.with(|s| format!("{}:{}", s.hostname, s.port))
    }

    /// Port the request was built for.
    pub fn port(&self) -> u16 {
        self.with(|s| s.port)
    }

    /// Fragment including the leading `#`, or empty.
    pub fn hash(&self) -> String {
        self.with(|s| s.hash.clone())
    }

    /// Path of the route currently dispatching this request.
    pub fn route(&self) -> Option<String> {
        self.with(|s| s.route.clone())
    }

    /// Record the route currently dispatching this request.
    pub fn set_route(&self, route: impl Into<String>) {
        let route = route.into();
        self.with_mut(|s| s.route = Some(route));
    }

    /// Application currently handling the request.
    pub fn app(&self) -> Option<Arc<dyn AppContext>> {
        self.with(|s| s.app.clone())
    }

    /// Swap the application handling the request, returning the previous one.
    pub fn set_app(&self, app: Option<Arc<dyn AppContext>>) -> Option<Arc<dyn AppContext>> {
        self.with_mut(|s| std::mem::replace(&mut s.app, app))
    }

    /// Attach typed data to the request.
    pub fn insert_extension<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.with_mut(|s| s.extensions.insert(value))
    }

    /// Typed data previously attached with [`Request::insert_extension`].
    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.with(|s| s.extensions.get::<T>().cloned())
    }

    /// Invoke a request extension registered on the current application.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, BoxError> {
        let extension = self
            .app()
            .and_then(|app| app.request_extension(name))
            .ok_or_else(|| RequestError::UnknownExtension(name.to_owned()))?;
        extension(self, args)
    }
}

/// Builder for [`Request`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: String,
    url: String,
    headers: Headers,
    body: Value,
    protocol: String,
    hostname: String,
    port: Option<u16>,
    hash: String,
}

impl RequestBuilder {
    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the body.
    pub fn body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Set the scheme (`http`, `https`).
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set the hostname.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the fragment, including `#`.
    pub fn hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    /// Validate and build the request.
    pub fn build(self) -> Result<Request, RequestError> {
        if self.url.contains(char::is_whitespace) {
            return Err(RequestError::UnescapedPath);
        }
        let upper = self.method.to_ascii_uppercase();
        let method = Method::from_bytes(upper.as_bytes())
            .map_err(|_| RequestError::InvalidMethod(self.method.clone()))?;

        let port = self
            .port
            .unwrap_or(if self.protocol == "https" { 443 } else { 80 });
        let mut headers = self.headers;
        if !headers.contains("host") {
            headers.set("Host", format!("{}:{}", self.hostname, port));
        }
        let url = if self.url.is_empty() {
            "/".to_owned()
        } else {
            self.url
        };

        Ok(Request {
            inner: Arc::new(Mutex::new(RequestState {
                method,
                original_url: url.clone(),
                url,
                base_url: String::new(),
                params: Params::new(),
                query: Value::Null,
                body: self.body,
                headers,
                protocol: self.protocol,
                hostname: self.hostname,
                port,
                hash: self.hash,
                route: None,
                app: None,
                extensions: Extensions::new(),
            })),
        })
    }
}

/// Path portion of a url, ignoring any scheme and host.
pub fn url_pathname(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    if path.starts_with('/') {
        return path;
    }
    match path.find("://") {
        Some(scheme_end) => {
            let rest = &path[scheme_end + 3..];
            rest.find('/').map_or("/", |slash| &rest[slash..])
        }
        None => path,
    }
}

/// Query portion of a url, without `?` or fragment.
pub fn url_query(url: &str) -> Option<&str> {
    let without_hash = url.split('#').next().unwrap_or(url);
    without_hash.split_once('?').map(|(_, query)| query)
}
