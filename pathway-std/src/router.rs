//! # Router
//!
//! An ordered stack of layers plus parameter interceptors.
//!
//! [`Router::dispatch`] scans the stack for the first layer matching the
//! request path, runs it, and keeps scanning according to the returned
//! [`Next`]. Entering a prefix layer rewrites `url` and `base_url` so the
//! mounted handler sees paths relative to its mount point; both are restored
//! before the next layer is considered and when the router returns.
//!
//! Layer selection depends on whether an error is pending: while it is, only
//! error-handling layers are considered; otherwise they are skipped.

use crate::{
    ext::{Body, ResponseExt},
    layer::{Layer, Target},
    pattern::{PathSpec, PatternOptions},
    route::Route,
};
use bitflags::bitflags;
use futures::future::BoxFuture;
use pathway_core::{
    ConfigError, Handler, HandlerError, IntoHandlers, IntoNext, Method, Middleware, Next,
    Params, Request, Response, catch_panic, url_pathname,
};
use std::{collections::HashMap, future::Future, sync::Arc};
use tracing::{debug, trace};

bitflags! {
    /// Router behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RouterOptions: u8 {
        /// Match paths case-sensitively.
        const CASE_SENSITIVE = 1;
        /// Treat trailing slashes as significant in routes.
        const STRICT = 1 << 1;
        /// Merge parameters captured by parent routers into this router's.
        const MERGE_PARAMS = 1 << 2;
    }
}

/// Object-safe parameter interceptor.
pub trait DynParamHandler: Send + Sync + 'static {
    /// Run for a bound parameter `name` with its decoded `value`.
    fn call(&self, req: Request, res: Response, value: String, name: String)
    -> BoxFuture<'_, Next>;
}

struct ParamFn<F>(F);

impl<F, Fut, R> DynParamHandler for ParamFn<F>
where
    F: Fn(Request, Response, String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
    R: IntoNext,
{
    fn call(
        &self,
        req: Request,
        res: Response,
        value: String,
        name: String,
    ) -> BoxFuture<'_, Next> {
        Box::pin(async move { (self.0)(req, res, value, name).await.into_next() })
    }
}

/// Parameter names accepted by [`Router::param`].
pub trait ParamNames {
    /// The names, in registration order.
    fn into_names(self) -> Vec<String>;
}

impl ParamNames for &str {
    fn into_names(self) -> Vec<String> {
        vec![self.to_owned()]
    }
}

impl ParamNames for String {
    fn into_names(self) -> Vec<String> {
        vec![self]
    }
}

impl<const N: usize> ParamNames for [&str; N] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|s| (*s).to_owned()).collect()
    }
}

impl ParamNames for Vec<String> {
    fn into_names(self) -> Vec<String> {
        self
    }
}

/// Cached outcome of running one parameter's interceptors.
#[derive(Clone)]
enum ParamOutcome {
    Proceed,
    SkipRoute,
    ExitRouter,
    Done,
    Fail(HandlerError),
}

#[derive(Clone)]
struct ParamCall {
    outcome: ParamOutcome,
    /// Value after the interceptors ran; they may rewrite it.
    value: String,
}

#[derive(Default)]
struct DispatchState {
    idx: usize,
    error: Option<HandlerError>,
    removed: String,
    slash_added: bool,
    called: HashMap<(String, String), ParamCall>,
    allowed: Vec<String>,
}

/// An ordered layer stack.
#[derive(Default)]
pub struct Router {
    stack: Vec<Layer>,
    routes: Vec<Route>,
    params: HashMap<String, Vec<Arc<dyn DynParamHandler>>>,
    options: RouterOptions,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("layers", &self.stack.len())
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

macro_rules! verb_shortcuts {
    ($($(#[$doc:meta])* $name:ident => $method:ident),+ $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(
                &mut self,
                path: impl Into<PathSpec>,
                handlers: impl IntoHandlers,
            ) -> Result<&mut Self, ConfigError> {
                self.method(Method::$method, path, handlers)
            }
        )+
    };
}

impl Router {
    /// Create a router with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router with the given options.
    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// The router's option flags.
    pub fn flags(&self) -> RouterOptions {
        self.options
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    fn case_sensitive(&self) -> bool {
        self.options.contains(RouterOptions::CASE_SENSITIVE)
    }

    /// Register handlers for every path.
    pub fn middleware(&mut self, handlers: impl IntoHandlers) -> Result<&mut Self, ConfigError> {
        self.mount("/", handlers)
    }

    /// Register handlers under a path prefix.
    pub fn mount(
        &mut self,
        path: impl Into<PathSpec>,
        handlers: impl IntoHandlers,
    ) -> Result<&mut Self, ConfigError> {
        let path = path.into();
        let handlers = handlers.into_handlers();
        if handlers.is_empty() {
            return Err(ConfigError::MissingHandler {
                caller: "Router.use".to_owned(),
            });
        }
        let options = PatternOptions {
            case_sensitive: self.case_sensitive(),
            strict: false,
            end: false,
        };
        for handler in handlers {
            debug!(
                path = %path,
                error_handler = handler.is_error_handler(),
                "registering middleware"
            );
            self.stack
                .push(Layer::new(&path, options, Target::Handler(handler))?);
        }
        Ok(self)
    }

    /// Create a route for `path` and return it for method registration.
    pub fn route(&mut self, path: impl Into<PathSpec>) -> Result<&mut Route, ConfigError> {
        let path = path.into();
        let options = PatternOptions {
            case_sensitive: self.case_sensitive(),
            strict: self.options.contains(RouterOptions::STRICT),
            end: true,
        };
        let index = self.routes.len();
        self.stack
            .push(Layer::new(&path, options, Target::Route(index))?);
        self.routes.push(Route::new(path.to_string()));
        Ok(&mut self.routes[index])
    }

    /// Register handlers for one method on a new route.
    pub fn method(
        &mut self,
        method: Method,
        path: impl Into<PathSpec>,
        handlers: impl IntoHandlers,
    ) -> Result<&mut Self, ConfigError> {
        self.route(path)?.method(method, handlers)?;
        Ok(self)
    }

    /// Register handlers for every method on a new route.
    pub fn all(
        &mut self,
        path: impl Into<PathSpec>,
        handlers: impl IntoHandlers,
    ) -> Result<&mut Self, ConfigError> {
        self.route(path)?.all(handlers)?;
        Ok(self)
    }

    verb_shortcuts! {
        /// Register `GET` handlers on a new route.
        get => GET,
        /// Register `POST` handlers on a new route.
        post => POST,
        /// Register `PUT` handlers on a new route.
        put => PUT,
        /// Register `DELETE` handlers on a new route.
        delete => DELETE,
        /// Register `PATCH` handlers on a new route.
        patch => PATCH,
        /// Register `HEAD` handlers on a new route.
        head => HEAD,
        /// Register `OPTIONS` handlers on a new route.
        options => OPTIONS,
    }

    /// Register an interceptor for one or more parameter names.
    ///
    /// Interceptors run before the handler of any layer binding the name, at
    /// most once per distinct value within one dispatch of this router. A
    /// leading `:` on a name is ignored.
    pub fn param<N, F, Fut, R>(&mut self, names: N, f: F) -> Result<&mut Self, ConfigError>
    where
        N: ParamNames,
        F: Fn(Request, Response, String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send,
        R: IntoNext,
    {
        let names = names.into_names();
        if names.iter().any(|n| n.trim_start_matches(':').is_empty()) {
            return Err(ConfigError::EmptyParamName);
        }
        let handler: Arc<dyn DynParamHandler> = Arc::new(ParamFn(f));
        for name in names {
            self.params
                .entry(name.trim_start_matches(':').to_owned())
                .or_default()
                .push(handler.clone());
        }
        Ok(self)
    }

    /// Dispatch a transaction through the stack.
    ///
    /// Returns [`Next::Continue`] when the stack is exhausted (or the router
    /// was exited) without error, [`Next::Fail`] when an error is still
    /// pending, and [`Next::Done`] when a handler completed the transaction.
    /// `base_url` and `params` are restored before returning.
    pub async fn dispatch(&self, req: &Request, res: &Response) -> Next {
        let url = req.url();
        let protohost = protohost(&url).to_owned();
        let parent_url = req.base_url();
        let parent_params = req.params();
        debug!(method = %req.method(), url = %url, base_url = %parent_url, "router dispatch");

        let mut state = DispatchState::default();
        let outcome = self
            .run(req, res, &protohost, &parent_url, &parent_params, &mut state)
            .await;

        req.set_base_url(parent_url);
        req.set_params(parent_params);

        match outcome {
            Next::Continue | Next::ExitRouter => self.finish(req, res, state),
            other => other,
        }
    }

    fn finish(&self, req: &Request, res: &Response, state: DispatchState) -> Next {
        if let Some(err) = state.error {
            return Next::Fail(err);
        }
        if req.method() == Method::OPTIONS && !state.allowed.is_empty() {
            return respond_with_allowed(res, &state.allowed).into_next();
        }
        Next::Continue
    }

    async fn run(
        &self,
        req: &Request,
        res: &Response,
        protohost: &str,
        parent_url: &str,
        parent_params: &Params,
        state: &mut DispatchState,
    ) -> Next {
        loop {
            restore_url(req, protohost, parent_url, state);

            let url = req.url();
            if url.is_empty() {
                return Next::Continue;
            }
            let path = url_pathname(&url).to_owned();
            let method = req.method();

            let mut found = None;
            while state.idx < self.stack.len() {
                let layer = &self.stack[state.idx];
                state.idx += 1;

                if state.error.is_some() != layer.handles_errors() {
                    continue;
                }
                let matched = match layer.matches(&path) {
                    Ok(Some(matched)) => matched,
                    Ok(None) => continue,
                    Err(err) => {
                        trace!(error = %err, "param decode failed");
                        state.error.get_or_insert(err.into());
                        continue;
                    }
                };
                if let Some(route) = self.route_of(layer) {
                    if !route.handles_method(&method) {
                        if method == Method::OPTIONS {
                            for allowed in route.allowed_methods() {
                                if !state.allowed.contains(&allowed) {
                                    state.allowed.push(allowed);
                                }
                            }
                        }
                        continue;
                    }
                }
                found = Some((layer, matched));
                break;
            }

            let Some((layer, matched)) = found else {
                return Next::Continue;
            };
            trace!(path = %path, matched = %matched.path, "layer matched");

            let params = if self.options.contains(RouterOptions::MERGE_PARAMS) {
                matched.params.merged_over(parent_params)
            } else {
                matched.params
            };
            req.set_params(params);

            match self.process_params(layer, req, res, state).await {
                ParamOutcome::Proceed => {}
                ParamOutcome::SkipRoute => {
                    continue;
                }
                ParamOutcome::ExitRouter => {
                    restore_url(req, protohost, parent_url, state);
                    state.error = None;
                    return Next::ExitRouter;
                }
                ParamOutcome::Done => {
                    restore_url(req, protohost, parent_url, state);
                    return Next::Done;
                }
                ParamOutcome::Fail(err) => {
                    state.error.get_or_insert(err);
                    continue;
                }
            }

            let outcome = match layer.target() {
                Target::Route(index) => match self.routes.get(*index) {
                    Some(route) => route.dispatch(req, res).await,
                    None => Next::Continue,
                },
                Target::Handler(handler) => {
                    let layer_path = matched.path;
                    if !layer_path.is_empty() {
                        if !path.starts_with(&layer_path) {
                            continue;
                        }
                        let boundary = path[layer_path.len()..].chars().next();
                        if boundary.is_some_and(|c| c != '/' && c != '.') {
                            continue;
                        }
                        trim_prefix(req, protohost, parent_url, &layer_path, state);
                    }
                    match state.error.take() {
                        Some(err) => handler.run_error(err, req.clone(), res.clone()).await,
                        None => handler.run(req.clone(), res.clone()).await,
                    }
                }
            };

            match outcome {
                Next::Continue | Next::SkipRoute => state.error = None,
                Next::Fail(err) => state.error = Some(err),
                Next::ExitRouter => {
                    restore_url(req, protohost, parent_url, state);
                    state.error = None;
                    return Next::ExitRouter;
                }
                Next::Done => {
                    restore_url(req, protohost, parent_url, state);
                    return Next::Done;
                }
            }
        }
    }

    fn route_of(&self, layer: &Layer) -> Option<&Route> {
        match layer.target() {
            Target::Route(index) => self.routes.get(*index),
            Target::Handler(_) => None,
        }
    }

    async fn process_params(
        &self,
        layer: &Layer,
        req: &Request,
        res: &Response,
        state: &mut DispatchState,
    ) -> ParamOutcome {
        for name in layer.param_names() {
            let Some(callbacks) = self.params.get(name) else {
                continue;
            };
            let Some(value) = req.param(name) else {
                continue;
            };

            let key = (name.to_owned(), value.clone());
            if let Some(call) = state.called.get(&key) {
                req.set_param(name, call.value.clone());
                match &call.outcome {
                    ParamOutcome::Proceed => continue,
                    outcome => return outcome.clone(),
                }
            }

            trace!(param = name, value = %value, "running param interceptors");
            let mut outcome = ParamOutcome::Proceed;
            for callback in callbacks {
                let next = catch_panic(callback.call(
                    req.clone(),
                    res.clone(),
                    value.clone(),
                    name.to_owned(),
                ))
                .await;
                match next {
                    Next::Continue => {}
                    Next::SkipRoute => outcome = ParamOutcome::SkipRoute,
                    Next::ExitRouter => outcome = ParamOutcome::ExitRouter,
                    Next::Done => outcome = ParamOutcome::Done,
                    Next::Fail(err) => outcome = ParamOutcome::Fail(err),
                }
                if !matches!(outcome, ParamOutcome::Proceed) {
                    break;
                }
            }

            let updated = req.param(name).unwrap_or_else(|| value.clone());
            state.called.insert(
                key,
                ParamCall {
                    outcome: outcome.clone(),
                    value: updated,
                },
            );
            if !matches!(outcome, ParamOutcome::Proceed) {
                return outcome;
            }
        }
        ParamOutcome::Proceed
    }
}

impl Middleware for Router {
    async fn handle(&self, req: Request, res: Response) -> Next {
        self.dispatch(&req, &res).await
    }
}

impl IntoHandlers for Router {
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::new(self)]
    }
}

/// Scheme and host of an absolute url, or empty for paths.
fn protohost(url: &str) -> &str {
    if url.is_empty() || url.starts_with('/') {
        return "";
    }
    let path_len = url.find('?').unwrap_or(url.len());
    match url[..path_len].find("://") {
        Some(fqdn) => match url[fqdn + 3..].find('/') {
            Some(slash) => &url[..fqdn + 3 + slash],
            None => "",
        },
        None => "",
    }
}

fn trim_prefix(
    req: &Request,
    protohost: &str,
    parent_url: &str,
    layer_path: &str,
    state: &mut DispatchState,
) {
    let url = req.url();
    let rest = url.get(protohost.len() + layer_path.len()..).unwrap_or("");
    let mut rewritten = format!("{protohost}{rest}");
    if protohost.is_empty() && !rewritten.starts_with('/') {
        rewritten.insert(0, '/');
        state.slash_added = true;
    }
    req.set_url(rewritten);
    state.removed = layer_path.to_owned();

    let removed = layer_path.strip_suffix('/').unwrap_or(layer_path);
    req.set_base_url(format!("{parent_url}{removed}"));
}

fn restore_url(req: &Request, protohost: &str, parent_url: &str, state: &mut DispatchState) {
    if state.slash_added {
        let url = req.url();
        req.set_url(url.get(1..).unwrap_or(""));
        state.slash_added = false;
    }
    if !state.removed.is_empty() {
        let url = req.url();
        let rest = url.get(protohost.len()..).unwrap_or("");
        req.set_url(format!("{protohost}{}{rest}", state.removed));
        req.set_base_url(parent_url);
        state.removed.clear();
    }
}

fn respond_with_allowed(res: &Response, allowed: &[String]) -> Result<Next, HandlerError> {
    let body = allowed.join(",");
    res.set_header("Allow", body.clone())?;
    res.send(Body::Text(body))?;
    Ok(Next::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathway_core::{error_handler, handler};
    use std::sync::Mutex;

    fn pair(method: &str, url: &str) -> (Request, Response) {
        let req = Request::new(method, url).unwrap();
        let res = Response::for_request(&req);
        (req, res)
    }

    fn unreachable() -> Handler {
        handler(|_req, _res| async { Next::fail("unreachable handler ran") })
    }

    #[test]
    fn protohost_extraction() {
        assert_eq!(protohost("/a/b"), "");
        assert_eq!(protohost("http://example.com/a?x=http://y"), "http://example.com");
        assert_eq!(protohost("http://example.com"), "");
    }

    #[tokio::test]
    async fn mounted_routers_see_relative_urls() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let mut inner = Router::new();
        inner
            .get("/b", handler(move |req: Request, _res| {
                let record = record.clone();
                async move {
                    record.lock().unwrap().push((req.base_url(), req.url()));
                    Next::Continue
                }
            }))
            .unwrap();

        let mut outer = Router::new();
        outer.mount("/a", inner).unwrap();

        let (req, res) = pair("GET", "/a/b?x=1");
        assert!(matches!(outer.dispatch(&req, &res).await, Next::Continue));
        assert_eq!(
            *seen.lock().unwrap(),
            [("/a".to_owned(), "/b?x=1".to_owned())]
        );
        assert_eq!(req.url(), "/a/b?x=1");
        assert_eq!(req.base_url(), "");
    }

    #[tokio::test]
    async fn fully_qualified_urls_keep_their_host() {
        let seen = Arc::new(Mutex::new(None));
        let record = seen.clone();
        let mut router = Router::new();
        router
            .mount("/blog", handler(move |req: Request, _res| {
                let record = record.clone();
                async move {
                    *record.lock().unwrap() = Some(req.url());
                    Next::Continue
                }
            }))
            .unwrap();

        let (req, res) = pair("GET", "http://example.com/blog/post/1");
        router.dispatch(&req, &res).await;
        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some("http://example.com/post/1")
        );
        assert_eq!(req.url(), "http://example.com/blog/post/1");
    }

    #[tokio::test]
    async fn errors_skip_to_error_handlers() {
        let mut router = Router::new();
        router
            .middleware(handler(|_req, _res| async { Next::fail("nope") }))
            .unwrap()
            .get("/", unreachable())
            .unwrap()
            .middleware(error_handler(|err, _req, res: Response| async move {
                res.send(format!("caught {err}"))?;
                Ok::<_, HandlerError>(Next::Done)
            }))
            .unwrap();

        let (req, res) = pair("GET", "/");
        assert!(router.dispatch(&req, &res).await.is_done());
        assert_eq!(res.text().as_deref(), Some("caught nope"));
    }

    #[tokio::test]
    async fn error_handlers_can_recover() {
        let mut router = Router::new();
        router
            .middleware(handler(|_req, _res| async { Next::fail("nope") }))
            .unwrap()
            .middleware(error_handler(|_err, _req, _res| async { Next::Continue }))
            .unwrap()
            .get("/", handler(|_req, res: Response| async move { res.send("ok") }))
            .unwrap();

        let (req, res) = pair("GET", "/");
        router.dispatch(&req, &res).await;
        assert_eq!(res.text().as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn skip_route_moves_to_the_next_route() {
        let mut router = Router::new();
        router
            .get("/x", (
                handler(|_req, _res| async { Next::SkipRoute }),
                unreachable(),
            ))
            .unwrap()
            .get("/x", handler(|_req, res: Response| async move { res.send("second") }))
            .unwrap();

        let (req, res) = pair("GET", "/x");
        router.dispatch(&req, &res).await;
        assert_eq!(res.text().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn exit_router_resumes_in_parent() {
        let mut inner = Router::new();
        inner
            .middleware(handler(|_req, _res| async { Next::ExitRouter }))
            .unwrap()
            .middleware(unreachable())
            .unwrap();

        let mut outer = Router::new();
        outer
            .middleware(inner)
            .unwrap()
            .middleware(handler(|_req, res: Response| async move { res.send("outer") }))
            .unwrap();

        let (req, res) = pair("GET", "/");
        outer.dispatch(&req, &res).await;
        assert_eq!(res.text().as_deref(), Some("outer"));
    }

    #[tokio::test]
    async fn param_interceptors_run_once_per_value() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let record = calls.clone();
        let mut router = Router::new();
        router
            .param("id", move |_req, _res, value: String, _name| {
                let record = record.clone();
                async move {
                    record.lock().unwrap().push(value);
                    Next::Continue
                }
            })
            .unwrap()
            .get("/user/:id", handler(|_req, _res| async { Next::Continue }))
            .unwrap()
            .get("/user/:id", handler(|_req, _res| async { Next::Continue }))
            .unwrap();

        let (req, res) = pair("GET", "/user/5");
        router.dispatch(&req, &res).await;
        assert_eq!(*calls.lock().unwrap(), ["5"]);
    }

    #[tokio::test]
    async fn param_interceptors_rerun_for_new_values() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let record = calls.clone();
        let mut router = Router::new();
        router
            .param(":id", move |_req, _res, value: String, _name| {
                let record = record.clone();
                async move {
                    record.lock().unwrap().push(value);
                    Next::Continue
                }
            })
            .unwrap()
            .mount("/user/:id", handler(|_req, _res| async { Next::Continue }))
            .unwrap()
            .get("/user/:id/:other", handler(|req: Request, _res| async move {
                assert_eq!(req.param("id").as_deref(), Some("5"));
                Next::Continue
            }))
            .unwrap()
            .get("/user/7", handler(|_req, _res| async { Next::Continue }))
            .unwrap()
            .mount("/:id", handler(|_req, _res| async { Next::Continue }))
            .unwrap();

        let (req, res) = pair("GET", "/user/5/7");
        router.dispatch(&req, &res).await;
        assert_eq!(*calls.lock().unwrap(), ["5", "user"]);
    }

    #[tokio::test]
    async fn param_interceptors_can_rewrite_values() {
        let mut router = Router::new();
        router
            .param("id", |req: Request, _res, value: String, name: String| async move {
                req.set_param(&name, format!("user-{value}"));
                Next::Continue
            })
            .unwrap()
            .get("/user/:id", handler(|req: Request, res: Response| async move {
                res.send(req.param("id").unwrap_or_default())
            }))
            .unwrap();

        let (req, res) = pair("GET", "/user/9");
        router.dispatch(&req, &res).await;
        assert_eq!(res.text().as_deref(), Some("user-9"));
    }

    #[tokio::test]
    async fn param_failures_enter_error_mode() {
        let mut router = Router::new();
        router
            .param("id", |_req, _res, _value, _name| async {
                Next::Fail(HandlerError::msg("bad id").with_status(422))
            })
            .unwrap()
            .get("/user/:id", unreachable())
            .unwrap();

        let (req, res) = pair("GET", "/user/1");
        let next = router.dispatch(&req, &res).await;
        assert_eq!(next.error().and_then(HandlerError::status), Some(422));
    }

    #[tokio::test]
    async fn merge_params_exposes_parent_captures() {
        let mut inner = Router::with_options(RouterOptions::MERGE_PARAMS);
        inner
            .get("/posts/:post", handler(|req: Request, res: Response| async move {
                let params = req.params();
                res.send(format!(
                    "{}:{}",
                    params.get("user").unwrap_or("-"),
                    params.get("post").unwrap_or("-")
                ))
            }))
            .unwrap();

        let mut outer = Router::new();
        outer.mount("/users/:user", inner).unwrap();

        let (req, res) = pair("GET", "/users/tj/posts/3");
        outer.dispatch(&req, &res).await;
        assert_eq!(res.text().as_deref(), Some("tj:3"));
        assert!(req.params().is_empty());
    }

    #[tokio::test]
    async fn decode_failures_become_bad_requests() {
        let mut router = Router::new();
        router
            .get("/user/:id", unreachable())
            .unwrap();

        let (req, res) = pair("GET", "/user/%zz");
        let next = router.dispatch(&req, &res).await;
        assert_eq!(next.error().and_then(HandlerError::status), Some(400));
    }

    #[tokio::test]
    async fn options_lists_allowed_methods() {
        let mut router = Router::new();
        router
            .get("/items", handler(|_req, _res| async {}))
            .unwrap()
            .post("/items", handler(|_req, _res| async {}))
            .unwrap();

        let (req, res) = pair("OPTIONS", "/items");
        assert!(router.dispatch(&req, &res).await.is_done());
        assert_eq!(res.header("Allow").as_deref(), Some("GET,HEAD,POST"));
        assert_eq!(res.text().as_deref(), Some("GET,HEAD,POST"));
    }

    #[tokio::test]
    async fn unmatched_methods_fall_through() {
        let mut router = Router::new();
        router.post("/only-post", handler(|_req, _res| async {})).unwrap();

        let (req, res) = pair("GET", "/only-post");
        assert!(matches!(router.dispatch(&req, &res).await, Next::Continue));
        assert!(!res.is_finished());
    }
}
