//! Per-path method chains.

use pathway_core::{
    ConfigError, Handler, HandlerError, IntoHandlers, Method, Next, Request, Response,
};

struct Entry {
    /// `None` for handlers registered through [`Route::all`].
    method: Option<Method>,
    handler: Handler,
}

/// Ordered handler chains bound to one path.
///
/// Handlers registered for a specific method and through [`Route::all`] are
/// kept in one list, so their relative registration order is preserved.
pub struct Route {
    path: String,
    stack: Vec<Entry>,
    methods: Vec<Method>,
    all: bool,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("all", &self.all)
            .field("handlers", &self.stack.len())
            .finish()
    }
}

macro_rules! method_shortcuts {
    ($($(#[$doc:meta])* $name:ident => $method:ident),+ $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self, handlers: impl IntoHandlers) -> Result<&mut Self, ConfigError> {
                self.method(Method::$method, handlers)
            }
        )+
    };
}

impl Route {
    /// Create an empty route for `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stack: Vec::new(),
            methods: Vec::new(),
            all: false,
        }
    }

    /// The path this route was registered for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Register handlers for every method.
    pub fn all(&mut self, handlers: impl IntoHandlers) -> Result<&mut Self, ConfigError> {
        let handlers = non_empty(handlers, "Route.all")?;
        self.all = true;
        self.stack.extend(handlers.into_iter().map(|handler| Entry {
            method: None,
            handler,
        }));
        Ok(self)
    }

    /// Register handlers for one method.
    pub fn method(
        &mut self,
        method: Method,
        handlers: impl IntoHandlers,
    ) -> Result<&mut Self, ConfigError> {
        let caller = format!("Route.{}", method.as_str().to_ascii_lowercase());
        let handlers = non_empty(handlers, &caller)?;
        if !self.methods.contains(&method) {
            self.methods.push(method.clone());
        }
        self.stack.extend(handlers.into_iter().map(|handler| Entry {
            method: Some(method.clone()),
            handler,
        }));
        Ok(self)
    }

    method_shortcuts! {
        /// Register `GET` handlers.
        get => GET,
        /// Register `POST` handlers.
        post => POST,
        /// Register `PUT` handlers.
        put => PUT,
        /// Register `DELETE` handlers.
        delete => DELETE,
        /// Register `PATCH` handlers.
        patch => PATCH,
        /// Register `HEAD` handlers.
        head => HEAD,
        /// Register `OPTIONS` handlers.
        options => OPTIONS,
    }

    /// Whether the route has a chain for `method`. `HEAD` falls back to `GET`.
    pub fn handles_method(&self, method: &Method) -> bool {
        self.all || self.methods.contains(&self.effective_method(method))
    }

    /// Methods with a chain, as advertised in an `Allow` header.
    pub fn allowed_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.methods.iter().map(|m| m.as_str().to_owned()).collect();
        if self.methods.contains(&Method::GET) && !self.methods.contains(&Method::HEAD) {
            methods.push(Method::HEAD.as_str().to_owned());
        }
        methods
    }

    fn effective_method(&self, method: &Method) -> Method {
        if *method == Method::HEAD && !self.methods.contains(&Method::HEAD) {
            Method::GET
        } else {
            method.clone()
        }
    }

    /// Run the chain for the request's method.
    ///
    /// [`Next::SkipRoute`] ends the chain and resumes the router normally; a
    /// failure skips the remaining normal handlers in favour of the route's
    /// error handlers.
    pub async fn dispatch(&self, req: &Request, res: &Response) -> Next {
        let method = self.effective_method(&req.method());
        req.set_route(self.path.clone());

        let mut error: Option<HandlerError> = None;
        for entry in &self.stack {
            if entry.method.as_ref().is_some_and(|m| *m != method) {
                continue;
            }
            let outcome = match error.take() {
                Some(err) => entry.handler.run_error(err, req.clone(), res.clone()).await,
                None => entry.handler.run(req.clone(), res.clone()).await,
            };
            match outcome {
                Next::Continue => {}
                Next::Fail(err) => error = Some(err),
                Next::SkipRoute => return Next::Continue,
                Next::ExitRouter => return Next::ExitRouter,
                Next::Done => return Next::Done,
            }
        }
        match error {
            Some(err) => Next::Fail(err),
            None => Next::Continue,
        }
    }
}

fn non_empty(handlers: impl IntoHandlers, caller: &str) -> Result<Vec<Handler>, ConfigError> {
    let handlers = handlers.into_handlers();
    if handlers.is_empty() {
        return Err(ConfigError::MissingHandler {
            caller: caller.to_owned(),
        });
    }
    Ok(handlers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathway_core::{error_handler, handler};
    use std::sync::{Arc, Mutex};

    fn pair(method: &str) -> (Request, Response) {
        let req = Request::new(method, "/").unwrap();
        let res = Response::for_request(&req);
        (req, res)
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str, next: Next) -> Handler {
        let log = log.clone();
        handler(move |_req, _res| {
            let log = log.clone();
            let next = next.clone();
            async move {
                log.lock().unwrap().push(label);
                next
            }
        })
    }

    #[tokio::test]
    async fn runs_matching_method_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut route = Route::new("/");
        route
            .get(recorder(&log, "get-1", Next::Continue))
            .unwrap()
            .all(recorder(&log, "all", Next::Continue))
            .unwrap()
            .post(recorder(&log, "post", Next::Continue))
            .unwrap()
            .get(recorder(&log, "get-2", Next::Continue))
            .unwrap();

        let (req, res) = pair("GET");
        assert!(matches!(route.dispatch(&req, &res).await, Next::Continue));
        assert_eq!(*log.lock().unwrap(), ["get-1", "all", "get-2"]);
        assert_eq!(req.route().as_deref(), Some("/"));
    }

    #[tokio::test]
    async fn skip_route_stops_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut route = Route::new("/");
        route
            .get((
                recorder(&log, "first", Next::SkipRoute),
                recorder(&log, "second", Next::Continue),
            ))
            .unwrap();

        let (req, res) = pair("GET");
        assert!(matches!(route.dispatch(&req, &res).await, Next::Continue));
        assert_eq!(*log.lock().unwrap(), ["first"]);
    }

    #[tokio::test]
    async fn failures_reach_route_error_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        let mut route = Route::new("/");
        route
            .get((
                handler(|_req, _res| async { Next::fail("broken") }),
                recorder(&log, "skipped", Next::Continue),
                error_handler(move |err, _req, _res| {
                    let seen = seen.clone();
                    async move {
                        assert_eq!(err.to_string(), "broken");
                        seen.lock().unwrap().push("recovered");
                        Next::Done
                    }
                }),
            ))
            .unwrap();

        let (req, res) = pair("GET");
        assert!(route.dispatch(&req, &res).await.is_done());
        assert_eq!(*log.lock().unwrap(), ["recovered"]);
    }

    #[test]
    fn head_falls_back_to_get() {
        let mut route = Route::new("/");
        route.get(handler(|_req, _res| async {})).unwrap();
        assert!(route.handles_method(&Method::HEAD));
        assert!(!route.handles_method(&Method::POST));
        assert_eq!(route.allowed_methods(), ["GET", "HEAD"]);
    }

    #[test]
    fn empty_registration_is_rejected() {
        let mut route = Route::new("/");
        let err = route.get(Vec::<Handler>::new()).unwrap_err();
        assert_eq!(err.to_string(), "Route.get() requires at least one handler");
    }
}
