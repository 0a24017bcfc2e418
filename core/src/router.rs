//! Route registry, matcher and dispatch entry
//!
//! Resolution of a request target happens in a fixed order:
//!
//! 1. an empty path is treated as `/`
//! 2. the path is canonicalized, except for `CONNECT`
//! 3. a `301` is issued when only the trailing-slash twin of the path is
//!    registered
//! 4. a `301` to the canonical path is issued when canonicalization changed it
//! 5. an exact route is used if registered
//! 6. otherwise the longest registered prefix wins, ties going to the route
//!    registered first
//! 7. otherwise the request is not found
//!
//! Middlewares are folded around whatever handler was selected, including
//! redirects and the not-found fallback.

use std::sync::Arc;

use ahash::AHashMap;
use http::{header, HeaderValue, StatusCode, Uri, Version};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{RequestError, Result, RouterError};
use crate::handler::{not_found_handler, Redirect, SharedHandler};
use crate::method::Method;
use crate::middleware::{compose, Middleware};
use crate::path::canonical;
use crate::route::Route;

/// Routes registered for one method
#[derive(Default)]
struct MethodTable {
    exact: AHashMap<String, Arc<Route>>,
    /// Ordered by path length descending, registration order within a length
    by_length: Vec<Arc<Route>>,
}

impl MethodTable {
    #[inline]
    fn contains(&self, path: &str) -> bool {
        self.exact.contains_key(path)
    }

    fn insert(&mut self, route: Arc<Route>) {
        let len = route.path().len();
        let at = self.by_length.partition_point(|r| r.path().len() >= len);
        self.by_length.insert(at, route.clone());
        self.exact.insert(route.path().to_string(), route);
    }

    fn lookup(&self, path: &str) -> Option<&Arc<Route>> {
        self.exact.get(path).or_else(|| {
            self.by_length
                .iter()
                .find(|route| path.starts_with(route.path()))
        })
    }

    /// Path to redirect to when only the trailing-slash twin is registered
    fn redirect_target(&self, path: &str) -> Option<String> {
        if path.is_empty() || self.contains(path) {
            return None;
        }
        match path.strip_suffix('/') {
            None => {
                let with_slash = format!("{}/", path);
                self.contains(&with_slash).then_some(with_slash)
            }
            Some(without_slash) => self
                .contains(without_slash)
                .then(|| without_slash.to_string()),
        }
    }
}

#[derive(Default)]
struct Registry {
    tables: AHashMap<Method, MethodTable>,
    order: Vec<Arc<Route>>,
    middlewares: Vec<Middleware>,
}

/// HTTP request multiplexer
///
/// Registration and lookup share one reader/writer lock, so routes may be
/// added while requests are being served. Handlers are cloned out of the
/// registry before they run; no lock is held while a request is processed.
#[derive(Default)]
pub struct Router {
    registry: RwLock<Registry>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `route`
    ///
    /// Fails if the path is empty or the `(method, path)` pair is taken. The
    /// registry is left untouched on failure.
    pub fn try_handle(&self, route: Route) -> std::result::Result<(), RouterError> {
        if route.path().is_empty() {
            return Err(RouterError::EmptyPath);
        }

        let mut registry = self.registry.write();
        let table = registry.tables.entry(route.method()).or_default();
        if table.contains(route.path()) {
            return Err(RouterError::DuplicateRoute {
                method: route.method().to_string(),
                path: route.path().to_string(),
            });
        }

        debug!(method = %route.method(), path = route.path(), "route registered");
        let route = Arc::new(route);
        table.insert(route.clone());
        registry.order.push(route);
        Ok(())
    }

    /// Register `route`, panicking on an invalid registration
    pub fn handle(&self, route: Route) {
        if let Err(err) = self.try_handle(route) {
            panic!("{}", err);
        }
    }

    /// Append a middleware; see [`compose`] for the execution order
    pub fn use_middleware(&self, middleware: Middleware) {
        self.registry.write().middlewares.push(middleware);
    }

    /// Route registered for `method` that matches `path` exactly or by the
    /// longest prefix
    pub fn lookup(&self, method: Method, path: &str) -> Option<Arc<Route>> {
        let registry = self.registry.read();
        registry.tables.get(&method)?.lookup(path).cloned()
    }

    /// Select the handler for a request target, without middlewares
    pub fn resolve(&self, method: &http::Method, uri: &Uri) -> SharedHandler {
        let Ok(method) = Method::try_from(method) else {
            return not_found_handler();
        };

        let raw = match uri.path() {
            "" => "/",
            path => path,
        };

        let registry = self.registry.read();
        let table = registry.tables.get(&method);

        let path = if method == Method::CONNECT {
            raw.to_string()
        } else {
            canonical(raw)
        };

        if let Some(target) = table.and_then(|t| t.redirect_target(&path)) {
            return redirect(&target, uri.query());
        }
        if method != Method::CONNECT && path != raw {
            return redirect(&path, uri.query());
        }

        match table.and_then(|t| t.lookup(&path)) {
            Some(route) => route.handler().clone(),
            None => not_found_handler(),
        }
    }

    /// Dispatch the request bound to `c`
    ///
    /// Asterisk-form targets (`OPTIONS *`) are rejected with `400`. Otherwise
    /// the resolved handler is wrapped with every registered middleware and
    /// invoked.
    pub async fn serve(&self, c: &mut Context) -> Result<()> {
        if c.request.uri().path() == "*" {
            if c.request.version() >= Version::HTTP_11 {
                c.response
                    .headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
            }
            return Err(RequestError::from_status(StatusCode::BAD_REQUEST).into());
        }

        let handler = self.resolve(c.request.method(), c.request.uri());
        let middlewares = self.registry.read().middlewares.clone();
        let handler = compose(handler, &middlewares);
        handler.serve(c).await
    }

    /// Registered `(method, path)` pairs in registration order
    pub fn routes(&self) -> Vec<(Method, String)> {
        self.registry
            .read()
            .order
            .iter()
            .map(|route| (route.method(), route.path().to_string()))
            .collect()
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.registry.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn redirect(path: &str, query: Option<&str>) -> SharedHandler {
    let location = match query {
        Some(query) if !query.is_empty() => format!("{}?{}", path, query),
        _ => path.to_string(),
    };
    debug!(location = %location, "redirecting to canonical path");
    match Redirect::permanent(&location) {
        Ok(redirect) => Arc::new(redirect),
        Err(err) => {
            warn!(location = %location, error = %err, "unusable redirect location");
            not_found_handler()
        }
    }
}
