//! Application: route registration, context pooling and error responses

use std::mem;
use std::path::PathBuf;
use std::sync::Arc;

use doppio_core::{
    handler_fn,
    request::{self, Request},
    Config, Context, Error, Handler, HandlerFuture, Method, Middleware, RequestError, Response,
    ResponseWriter, Route, Router, RouterError, SharedHandler,
};
use http::header::{self, HeaderValue};
use http::uri::{PathAndQuery, Uri};
use http::StatusCode;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::pool::Pool;
use crate::r#static::FileServer;
use crate::serve::ServerHandle;

/// Top-level application instance
///
/// Cloning is cheap; clones share the router, the context pool and the
/// server slot. A clone is what gets passed to [`App::mount`] and into every
/// connection task.
#[derive(Clone)]
pub struct App {
    pub(crate) inner: Arc<AppInner>,
}

pub(crate) struct AppInner {
    config: Arc<Config>,
    router: Router,
    pool: Pool<Box<Context>>,
    pub(crate) server: Mutex<Option<ServerHandle>>,
}

impl App {
    /// Application with the default configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Application whose default configuration is adjusted by `configure`
    ///
    /// ```
    /// use doppio_server::App;
    ///
    /// let app = App::configure(|config| config.max_body_size = 4096);
    /// assert_eq!(app.config().max_body_size, 4096);
    /// ```
    pub fn configure<F>(configure: F) -> Self
    where
        F: FnOnce(&mut Config),
    {
        let mut config = Config::default();
        configure(&mut config);
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Self {
        let config = Arc::new(config);
        let owner = config.clone();
        Self {
            inner: Arc::new(AppInner {
                config,
                router: Router::new(),
                pool: Pool::new(move || Box::new(Context::new(owner.clone()))),
                server: Mutex::new(None),
            }),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    #[inline]
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Context bound to `request` and `response` outside of the pool
    pub fn new_context(&self, request: Request, response: ResponseWriter) -> Context {
        let mut c = Context::new(self.inner.config.clone());
        c.reset(request, response);
        c
    }

    /// Take an unbound context from the pool
    ///
    /// It must be handed back with [`release_context`](App::release_context).
    pub fn acquire_context(&self) -> Box<Context> {
        self.inner.pool.acquire()
    }

    /// Return a context to the pool, dropping its request and response
    pub fn release_context(&self, mut c: Box<Context>) {
        c.clear();
        self.inner.pool.release(c);
    }

    // Registration

    pub fn get<F>(&self, path: &str, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.route(Method::GET, path, handler_fn(handler));
    }

    pub fn head<F>(&self, path: &str, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.route(Method::HEAD, path, handler_fn(handler));
    }

    pub fn post<F>(&self, path: &str, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.route(Method::POST, path, handler_fn(handler));
    }

    pub fn put<F>(&self, path: &str, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.route(Method::PUT, path, handler_fn(handler));
    }

    pub fn patch<F>(&self, path: &str, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.route(Method::PATCH, path, handler_fn(handler));
    }

    pub fn delete<F>(&self, path: &str, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.route(Method::DELETE, path, handler_fn(handler));
    }

    pub fn connect<F>(&self, path: &str, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.route(Method::CONNECT, path, handler_fn(handler));
    }

    pub fn options<F>(&self, path: &str, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.route(Method::OPTIONS, path, handler_fn(handler));
    }

    pub fn trace<F>(&self, path: &str, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.route(Method::TRACE, path, handler_fn(handler));
    }

    /// Register `handler` for the method named `method`
    ///
    /// # Panics
    ///
    /// If `method` is not a recognized method token, if `path` is empty or if
    /// the pair is already registered.
    pub fn handle<F>(&self, method: &str, path: &str, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        let method: Method = match method.parse() {
            Ok(method) => method,
            Err(err) => panic!("{err}"),
        };
        self.route(method, path, handler_fn(handler));
    }

    /// Register a handler object; panics like [`handle`](App::handle)
    pub fn route(&self, method: Method, path: &str, handler: SharedHandler) {
        self.inner.router.handle(Route::new(method, path, handler));
    }

    /// Fallible form of [`route`](App::route)
    pub fn try_route(
        &self,
        method: Method,
        path: &str,
        handler: SharedHandler,
    ) -> std::result::Result<(), RouterError> {
        self.inner.router.try_handle(Route::new(method, path, handler))
    }

    /// Register `handler` for every recognized method
    pub fn all<F>(&self, path: &str, handler: F)
    where
        F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        self.route_all(path, handler_fn(handler));
    }

    fn route_all(&self, path: &str, handler: SharedHandler) {
        for method in Method::ALL {
            self.route(method, path, handler.clone());
        }
    }

    /// Serve the files below `root` on `GET path` and everything under it
    pub fn static_files<P: Into<PathBuf>>(&self, path: &str, root: P) {
        self.route(Method::GET, path, Arc::new(FileServer::new(path, root)));
    }

    /// Append a middleware; middlewares run in registration order
    pub fn use_middleware(&self, middleware: Middleware) {
        self.inner.router.use_middleware(middleware);
    }

    /// Delegate every request below `prefix` to `group`
    ///
    /// The prefix is stripped from the path before `group` dispatches the
    /// request; the query string is kept. `group` serves with the context of
    /// this application, including its configuration.
    pub fn mount(&self, prefix: &str, group: App) {
        let mount = Mount {
            prefix: prefix.to_string(),
            group,
        };
        self.route_all(prefix, Arc::new(mount));
    }

    // Dispatch

    /// Serve one request on a pooled context and return its writer
    ///
    /// The writer has been finished: for a channel writer the response has
    /// been delivered, a buffered writer still holds it.
    pub async fn dispatch(&self, request: Request, response: ResponseWriter) -> ResponseWriter {
        let mut c = self.acquire_context();
        c.reset(request, response);
        self.run(&mut c).await;
        let response = mem::replace(&mut c.response, ResponseWriter::buffered());
        self.release_context(c);
        response
    }

    /// Serve the request bound to `c`, a context owned by an enclosing
    /// application
    ///
    /// The context is rebound to its own request, so parameters are parsed
    /// again from the (possibly rewritten) URI. It is not returned to any pool.
    pub async fn dispatch_delegated(&self, c: &mut Context) {
        let request = mem::replace(&mut c.request, Request::new(request::empty()));
        let response = mem::replace(&mut c.response, ResponseWriter::buffered());
        c.reset(request, response);
        self.run(c).await;
    }

    async fn run(&self, c: &mut Context) {
        if let Err(err) = self.inner.router.serve(c).await {
            self.handle_error(c, err);
        }
        if let Err(err) = c.response.finish().await {
            debug!(error = %err, path = %c.path(), "response was not delivered");
        }
    }

    /// Serve `request` in-process and return the buffered response
    pub async fn respond(&self, request: Request) -> Response {
        self.dispatch(request, ResponseWriter::buffered())
            .await
            .into_response()
    }

    /// Centralized error responder
    ///
    /// A [`RequestError`] is written as its code and message; anything else is
    /// logged and answered with `500 Internal Server Error`. The body is plain
    /// text and `X-Content-Type-Options: nosniff` is set. Once the status line
    /// has been committed nothing can be written any more and the error is
    /// only logged.
    pub fn handle_error(&self, c: &mut Context, err: Error) {
        let re = match err {
            Error::Request(re) => re,
            Error::Internal(err) => {
                error!(method = %c.method(), path = %c.path(), error = %err, "internal error");
                RequestError::from_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };

        if c.response.wrote_header() {
            warn!(
                method = %c.method(),
                path = %c.path(),
                code = re.code.as_u16(),
                message = %re.message,
                "error after response was committed"
            );
            return;
        }

        let headers = c.response.headers_mut();
        headers.remove(header::CONTENT_LENGTH);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(doppio_core::context::TEXT_PLAIN_UTF_8),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        c.response.write_header(re.code);
        if let Err(err) = c.response.write(re.message.as_bytes()) {
            debug!(code = re.code.as_u16(), error = %err, "error message dropped");
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.inner.config)
            .field("routes", &self.inner.router.len())
            .finish()
    }
}

/// Handler delegating a path prefix to another application
struct Mount {
    prefix: String,
    group: App,
}

impl Mount {
    /// `uri` with the prefix removed from its path
    fn strip(&self, uri: &Uri) -> Option<Uri> {
        let rest = uri.path().strip_prefix(self.prefix.as_str())?;
        let path = if rest.is_empty() { "/" } else { rest };
        let path_and_query = match uri.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };

        let mut parts = uri.clone().into_parts();
        parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
        Uri::from_parts(parts).ok()
    }
}

impl Handler for Mount {
    fn serve<'a>(&'a self, c: &'a mut Context) -> HandlerFuture<'a> {
        Box::pin(async move {
            let Some(uri) = self.strip(c.request.uri()) else {
                return Err(c.not_found());
            };
            *c.request.uri_mut() = uri;
            self.group.dispatch_delegated(c).await;
            Ok(())
        })
    }
}
