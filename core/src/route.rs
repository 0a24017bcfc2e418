//! Route binding

use std::fmt;

use crate::context::Context;
use crate::handler::{HandlerFuture, SharedHandler};
use crate::method::Method;

/// An immutable `(method, path, handler)` binding
///
/// Identity is the `(method, path)` pair.
#[derive(Clone)]
pub struct Route {
    method: Method,
    path: String,
    handler: SharedHandler,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handler: SharedHandler) -> Self {
        Self {
            method,
            path: path.into(),
            handler,
        }
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn handler(&self) -> &SharedHandler {
        &self.handler
    }

    /// Run the route's handler
    #[inline]
    pub fn serve<'a>(&'a self, c: &'a mut Context) -> HandlerFuture<'a> {
        self.handler.serve(c)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
