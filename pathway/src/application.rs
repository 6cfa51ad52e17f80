//! # Application
//!
//! An [`Application`] is a lazily created root [`Router`] plus a settings map,
//! view engines, template locals and per-application request/response
//! extensions.
//!
//! Applications nest: passing one to [`Application::mount`] moves it into the
//! parent's stack. The first mount records a non-owning back-reference to the
//! parent, the mount path, and fires the child's [`Application::on_mount`]
//! listeners. Settings, engines and extensions the child does not define
//! itself are looked up through that back-reference.

use crate::{
    final_handler::{FinalOptions, OnError, final_handler},
    view::{self, MemoryTemplates, TemplateSource, View, ViewEngine, ViewError},
};
use pathway_core::{
    AppContext, BoxError, ConfigError, Handler, HandlerError, IntoHandlers, IntoNext, Method,
    Middleware, Mountable, Next, Request, RequestExtension, Response, ResponseExtension,
};
use pathway_std::{
    ParamNames, PathSpec, Route, Router, RouterOptions,
    query::{QueryMiddleware, QueryParser},
};
use serde_json::{Map, Value};
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        Weak,
    },
};
use tracing::{debug, error};

/// Environment variable consulted for the default `env` setting.
pub const ENV_VAR: &str = "PATHWAY_ENV";

const POWERED_BY: &str = "Pathway";

type MountListener = Box<dyn FnOnce(&AppHandle) + Send + 'static>;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn default_settings() -> Map<String, Value> {
    let env = std::env::var(ENV_VAR).unwrap_or_else(|_| "development".to_owned());
    let mut defaults = Map::new();
    defaults.insert("env".to_owned(), Value::String(env));
    defaults.insert("query parser".to_owned(), Value::from("extended"));
    defaults.insert("subdomain offset".to_owned(), Value::from(2));
    defaults.insert("x-powered-by".to_owned(), Value::Bool(true));
    defaults.insert("views".to_owned(), Value::from("views"));
    defaults
}

/// Shared application state, reachable from requests via [`AppContext`].
pub(crate) struct AppCore {
    settings: RwLock<Map<String, Value>>,
    defaults: Map<String, Value>,
    locals: RwLock<Map<String, Value>>,
    engines: RwLock<HashMap<String, Arc<dyn ViewEngine>>>,
    templates: RwLock<Option<Arc<dyn TemplateSource>>>,
    query_fn: RwLock<Option<pathway_std::query::QueryFn>>,
    request_extensions: RwLock<HashMap<String, RequestExtension>>,
    response_extensions: RwLock<HashMap<String, ResponseExtension>>,
    on_error: RwLock<Option<OnError>>,
    parent: OnceLock<Weak<AppCore>>,
    mountpath: OnceLock<String>,
    mount_listeners: Mutex<Vec<MountListener>>,
}

impl AppCore {
    fn new() -> Self {
        Self {
            settings: RwLock::new(Map::new()),
            defaults: default_settings(),
            locals: RwLock::new(Map::new()),
            engines: RwLock::new(HashMap::new()),
            templates: RwLock::new(None),
            query_fn: RwLock::new(None),
            request_extensions: RwLock::new(HashMap::new()),
            response_extensions: RwLock::new(HashMap::new()),
            on_error: RwLock::new(None),
            parent: OnceLock::new(),
            mountpath: OnceLock::new(),
            mount_listeners: Mutex::new(Vec::new()),
        }
    }

    fn parent(&self) -> Option<Arc<AppCore>> {
        self.parent.get()?.upgrade()
    }

    /// A setting defined on this application or one of its ancestors.
    fn explicit(&self, name: &str) -> Option<Value> {
        let own = read(&self.settings).get(name).cloned();
        own.or_else(|| self.parent()?.explicit(name))
    }

    fn engine(&self, ext: &str) -> Option<Arc<dyn ViewEngine>> {
        let own = read(&self.engines).get(ext).cloned();
        own.or_else(|| self.parent()?.engine(ext))
    }

    fn template_source(&self) -> Option<Arc<dyn TemplateSource>> {
        let own = read(&self.templates).clone();
        own.or_else(|| self.parent()?.template_source())
    }

    fn query_parser(&self) -> Result<QueryParser, ConfigError> {
        if let Some(custom) = read(&self.query_fn).clone() {
            return Ok(QueryParser::Custom(custom));
        }
        QueryParser::from_setting(&self.setting("query parser").unwrap_or(Value::Null))
    }

    fn env(&self) -> String {
        match self.setting("env") {
            Some(Value::String(env)) => env,
            _ => "development".to_owned(),
        }
    }

    fn mountpath(&self) -> String {
        self.mountpath.get().cloned().unwrap_or_else(|| "/".to_owned())
    }

    fn path(&self) -> String {
        match self.parent() {
            Some(parent) => format!("{}{}", parent.path(), self.mountpath()),
            None => String::new(),
        }
    }

    fn error_logger(&self) -> OnError {
        if let Some(on_error) = read(&self.on_error).clone() {
            return on_error;
        }
        let quiet = self.env() == "test";
        Arc::new(move |err: &HandlerError, req: &Request, _res: &Response| {
            if !quiet {
                error!(
                    error = %err,
                    status = err.status(),
                    method = %req.method(),
                    url = %req.original_url(),
                    "unhandled error"
                );
            }
        })
    }

    fn render_view(&self, name: &str, locals: &Map<String, Value>) -> Result<String, ViewError> {
        let default_engine = match self.setting("view engine") {
            Some(Value::String(engine)) => Some(engine),
            _ => None,
        };
        let source = self
            .template_source()
            .unwrap_or_else(|| Arc::new(MemoryTemplates::new()));
        let view = View::resolve(
            name,
            default_engine.as_deref(),
            &view::roots(self.setting("views")),
            |ext| self.engine(ext),
            source.as_ref(),
        )?;
        debug!(view = %view.identifier, "rendering view");
        view.render(locals)
    }

    fn mounted(&self, parent: &Arc<dyn AppContext>, mount_path: &str) {
        let Ok(parent) = parent.clone().into_any().downcast::<AppCore>() else {
            return;
        };
        if self.parent.set(Arc::downgrade(&parent)).is_err() {
            return;
        }
        let _ = self.mountpath.set(mount_path.to_owned());
        debug!(mountpath = mount_path, "application mounted");

        let listeners = std::mem::take(&mut *lock(&self.mount_listeners));
        let parent = AppHandle { core: parent };
        for listener in listeners {
            listener(&parent);
        }
    }
}

impl AppContext for AppCore {
    fn setting(&self, name: &str) -> Option<Value> {
        self.explicit(name)
            .or_else(|| self.defaults.get(name).cloned())
    }

    fn locals(&self) -> Map<String, Value> {
        read(&self.locals).clone()
    }

    fn request_extension(&self, name: &str) -> Option<RequestExtension> {
        let own = read(&self.request_extensions).get(name).cloned();
        own.or_else(|| self.parent()?.request_extension(name))
    }

    fn response_extension(&self, name: &str) -> Option<ResponseExtension> {
        let own = read(&self.response_extensions).get(name).cloned();
        own.or_else(|| self.parent()?.response_extension(name))
    }

    fn render(&self, name: &str, locals: Map<String, Value>) -> Result<String, BoxError> {
        Ok(self.render_view(name, &locals)?)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A cheap, read-only handle to an application.
///
/// Obtain one from [`Application::context`] before mounting, or from a
/// request's [`Request::app`] with [`AppHandle::from_context`].
#[derive(Clone)]
pub struct AppHandle {
    core: Arc<AppCore>,
}

impl AppHandle {
    /// Recover the handle behind a request's application context.
    pub fn from_context(context: &Arc<dyn AppContext>) -> Option<Self> {
        context
            .clone()
            .into_any()
            .downcast::<AppCore>()
            .ok()
            .map(|core| Self { core })
    }

    /// Value of a setting.
    pub fn setting(&self, name: &str) -> Option<Value> {
        self.core.setting(name)
    }

    /// Whether a setting is truthy.
    pub fn enabled(&self, name: &str) -> bool {
        self.core.enabled(name)
    }

    /// Whether a setting is falsy or unset.
    pub fn disabled(&self, name: &str) -> bool {
        !self.core.enabled(name)
    }

    /// Path of the first mount, `/` for unmounted applications.
    pub fn mountpath(&self) -> String {
        self.core.mountpath()
    }

    /// Mount paths joined up to the root, empty for the root.
    pub fn path(&self) -> String {
        self.core.path()
    }

    /// The mounting application.
    pub fn parent(&self) -> Option<AppHandle> {
        self.core.parent().map(|core| AppHandle { core })
    }

    /// Application-wide template locals.
    pub fn locals(&self) -> Map<String, Value> {
        self.core.locals()
    }

    /// Whether two handles refer to the same application.
    pub fn ptr_eq(&self, other: &AppHandle) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppHandle")
            .field("mountpath", &self.core.mountpath())
            .finish_non_exhaustive()
    }
}

/// Installs the application on the transaction, parses the query string and
/// sets `X-Powered-By`.
struct AppInit {
    core: Arc<AppCore>,
}

impl Middleware for AppInit {
    async fn handle(&self, req: Request, res: Response) -> Next {
        let context: Arc<dyn AppContext> = self.core.clone();
        req.set_app(Some(context.clone()));
        res.set_app(Some(context));

        let parser = match self.core.query_parser() {
            Ok(parser) => parser,
            Err(err) => return Next::Fail(err.into()),
        };
        let next = QueryMiddleware::new(parser)
            .handle(req, res.clone())
            .await;
        if !matches!(next, Next::Continue) {
            return next;
        }

        if self.core.enabled("x-powered-by") {
            if let Err(err) = res.set_header("X-Powered-By", POWERED_BY) {
                return Next::Fail(err.into());
            }
        }
        Next::Continue
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

/// The root of a dispatch tree.
pub struct Application {
    core: Arc<AppCore>,
    router: Option<Router>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("settings", &*read(&self.core.settings))
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Create an application with default settings.
    pub fn new() -> Self {
        Self {
            core: Arc::new(AppCore::new()),
            router: None,
        }
    }

    /// A handle that stays valid after this application is mounted.
    pub fn context(&self) -> AppHandle {
        AppHandle {
            core: self.core.clone(),
        }
    }

    // ---- settings ----

    /// Assign a setting.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        if name == "query parser" {
            *write(&self.core.query_fn) = None;
        }
        write(&self.core.settings).insert(name.to_owned(), value.into());
        self
    }

    /// Value of a setting, falling back to the parent and then defaults.
    pub fn setting(&self, name: &str) -> Option<Value> {
        self.core.setting(name)
    }

    /// Set a setting to `true`.
    pub fn enable(&mut self, name: &str) -> &mut Self {
        self.set(name, true)
    }

    /// Set a setting to `false`.
    pub fn disable(&mut self, name: &str) -> &mut Self {
        self.set(name, false)
    }

    /// Whether a setting is truthy.
    pub fn enabled(&self, name: &str) -> bool {
        self.core.enabled(name)
    }

    /// Whether a setting is falsy or unset.
    pub fn disabled(&self, name: &str) -> bool {
        !self.enabled(name)
    }

    /// Parse query strings with a custom function. Assigning the
    /// `query parser` setting afterwards replaces it.
    pub fn query_parser_fn(
        &mut self,
        parser: impl Fn(&str) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        *write(&self.core.query_fn) = Some(Arc::new(parser));
        self
    }

    /// Replace the callback that receives unhandled errors. The default logs
    /// them unless `env` is `"test"`.
    pub fn on_error(
        &mut self,
        on_error: impl Fn(&HandlerError, &Request, &Response) + Send + Sync + 'static,
    ) -> &mut Self {
        *write(&self.core.on_error) = Some(Arc::new(on_error));
        self
    }

    // ---- locals, views, extensions ----

    /// Set an application-wide template local.
    pub fn set_local(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        write(&self.core.locals).insert(name.into(), value.into());
        self
    }

    /// Application-wide template locals.
    pub fn locals(&self) -> Map<String, Value> {
        self.core.locals()
    }

    /// Register a view engine for a file extension (`"html"` or `".html"`).
    pub fn engine(&mut self, ext: &str, engine: impl ViewEngine) -> &mut Self {
        let ext = if ext.starts_with('.') {
            ext.to_owned()
        } else {
            format!(".{ext}")
        };
        write(&self.core.engines).insert(ext, Arc::new(engine));
        self
    }

    /// Set where view templates are read from.
    pub fn templates(&mut self, source: impl TemplateSource) -> &mut Self {
        *write(&self.core.templates) = Some(Arc::new(source));
        self
    }

    /// Render a view with the application locals merged under `locals`.
    pub fn render(&self, name: &str, locals: Map<String, Value>) -> Result<String, ViewError> {
        let mut merged = self.core.locals();
        merged.extend(locals);
        self.core.render_view(name, &merged)
    }

    /// Register a method callable as `req.call(name, args)` on requests
    /// handled by this application or its mounted children.
    pub fn extend_request(
        &mut self,
        name: impl Into<String>,
        extension: impl Fn(&Request, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    ) -> &mut Self {
        write(&self.core.request_extensions).insert(name.into(), Arc::new(extension));
        self
    }

    /// Register a method callable as `res.call(name, args)`.
    pub fn extend_response(
        &mut self,
        name: impl Into<String>,
        extension: impl Fn(&Response, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    ) -> &mut Self {
        write(&self.core.response_extensions).insert(name.into(), Arc::new(extension));
        self
    }

    // ---- mounting ----

    /// Run `listener` once, when this application is first mounted. It
    /// receives the parent.
    pub fn on_mount(&mut self, listener: impl FnOnce(&AppHandle) + Send + 'static) -> &mut Self {
        lock(&self.core.mount_listeners).push(Box::new(listener));
        self
    }

    /// Path of the first mount, `/` for unmounted applications.
    pub fn mountpath(&self) -> String {
        self.core.mountpath()
    }

    /// Mount paths joined up to the root.
    pub fn path(&self) -> String {
        self.core.path()
    }

    /// The mounting application.
    pub fn parent(&self) -> Option<AppHandle> {
        self.context().parent()
    }

    // ---- registration ----

    fn lazy_router(&mut self) -> Result<&mut Router, ConfigError> {
        let router = match self.router.take() {
            Some(router) => router,
            None => {
                let mut options = RouterOptions::empty();
                options.set(
                    RouterOptions::CASE_SENSITIVE,
                    self.enabled("case sensitive routing"),
                );
                options.set(RouterOptions::STRICT, self.enabled("strict routing"));
                let mut router = Router::with_options(options);
                router.middleware(Handler::new(AppInit {
                    core: self.core.clone(),
                }))?;
                router
            }
        };
        Ok(self.router.insert(router))
    }

    /// Register handlers for every path.
    pub fn middleware(&mut self, handlers: impl IntoHandlers) -> Result<&mut Self, ConfigError> {
        self.mount("/", handlers)
    }

    /// Register handlers under a path prefix. Applications among them are
    /// notified of the mount.
    pub fn mount(
        &mut self,
        path: impl Into<PathSpec>,
        handlers: impl IntoHandlers,
    ) -> Result<&mut Self, ConfigError> {
        let path = path.into();
        let handlers = handlers.into_handlers();
        if handlers.is_empty() {
            return Err(ConfigError::MissingHandler {
                caller: "app.use".to_owned(),
            });
        }
        let mount_path = first_pattern(&path);
        self.lazy_router()?.mount(path, handlers.clone())?;

        let parent: Arc<dyn AppContext> = self.core.clone();
        for handler in &handlers {
            if let Some(child) = handler.mountable() {
                child.mounted(&parent, &mount_path);
            }
        }
        Ok(self)
    }

    /// Create a route for `path`.
    pub fn route(&mut self, path: impl Into<PathSpec>) -> Result<&mut Route, ConfigError> {
        self.lazy_router()?.route(path)
    }

    /// Register handlers for one method on a new route.
    pub fn method(
        &mut self,
        method: Method,
        path: impl Into<PathSpec>,
        handlers: impl IntoHandlers,
    ) -> Result<&mut Self, ConfigError> {
        self.lazy_router()?.method(method, path, handlers)?;
        Ok(self)
    }

    /// Register handlers for every method on a new route.
    pub fn all(
        &mut self,
        path: impl Into<PathSpec>,
        handlers: impl IntoHandlers,
    ) -> Result<&mut Self, ConfigError> {
        self.lazy_router()?.all(path, handlers)?;
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

    /// Register a parameter interceptor, see [`Router::param`].
    pub fn param<N, F, Fut, R>(&mut self, names: N, f: F) -> Result<&mut Self, ConfigError>
    where
        N: ParamNames,
        F: Fn(Request, Response, String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send,
        R: IntoNext,
    {
        self.lazy_router()?.param(names, f)?;
        Ok(self)
    }

    // ---- dispatch ----

    /// Run a transaction through the router without the final handler.
    pub async fn dispatch(&self, req: &Request, res: &Response) -> Next {
        match &self.router {
            Some(router) => router.dispatch(req, res).await,
            None => Next::Continue,
        }
    }

    /// Handle a transaction end to end.
    ///
    /// An unusable `query parser` setting is reported before dispatch starts.
    /// Transactions no handler completes reach the final handler: 404 without
    /// an error, the error's status otherwise.
    pub async fn handle(&self, req: &Request, res: &Response) -> Result<(), ConfigError> {
        self.core.query_parser()?;
        let err = match self.dispatch(req, res).await {
            Next::Done => return Ok(()),
            Next::Fail(err) => Some(err),
            Next::Continue | Next::SkipRoute | Next::ExitRouter => None,
        };
        let options = FinalOptions {
            env: self.core.env(),
            on_error: Some(self.core.error_logger()),
        };
        final_handler(err.as_ref(), req, res, &options);
        Ok(())
    }
}

fn first_pattern(spec: &PathSpec) -> String {
    match spec {
        PathSpec::Many(specs) => specs.first().map_or_else(|| "/".to_owned(), first_pattern),
        other => other.to_string(),
    }
}

/// An application mounted inside another stack.
struct MountedApp {
    app: Application,
}

impl Middleware for MountedApp {
    async fn handle(&self, req: Request, res: Response) -> Next {
        let req_app = req.app();
        let res_app = res.app();
        let next = self.app.dispatch(&req, &res).await;
        if !next.is_done() {
            req.set_app(req_app);
            res.set_app(res_app);
        }
        next
    }

    fn mountable(&self) -> Option<&dyn Mountable> {
        Some(self)
    }
}

impl Mountable for MountedApp {
    fn mounted(&self, parent: &Arc<dyn AppContext>, mount_path: &str) {
        self.app.core.mounted(parent, mount_path);
    }
}

impl IntoHandlers for Application {
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::new(MountedApp { app: self })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        let app = Application::new();
        assert_eq!(app.setting("query parser"), Some(json!("extended")));
        assert_eq!(app.setting("subdomain offset"), Some(json!(2)));
        assert!(app.enabled("x-powered-by"));
        assert!(app.disabled("strict routing"));
        assert_eq!(app.mountpath(), "/");
        assert_eq!(app.path(), "");
    }

    #[test]
    fn set_query_parser_clears_custom_fn() {
        let mut app = Application::new();
        app.query_parser_fn(|_| json!({"custom": true}));
        assert!(matches!(app.core.query_parser(), Ok(QueryParser::Custom(_))));
        app.set("query parser", "simple");
        assert!(matches!(app.core.query_parser(), Ok(QueryParser::Simple)));
    }

    #[test]
    fn first_patterns() {
        assert_eq!(first_pattern(&PathSpec::from("/blog")), "/blog");
        assert_eq!(first_pattern(&PathSpec::from(["/a", "/b"])), "/a");
    }

    #[test]
    fn empty_mounts_are_rejected() {
        let mut app = Application::new();
        let err = app.mount("/", Vec::<Handler>::new()).unwrap_err();
        assert_eq!(err.to_string(), "app.use() requires at least one handler");
    }
}
