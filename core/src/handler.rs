//! Handler contract
//!
//! A handler receives the per-request [`Context`], writes its response through
//! it and returns `Ok(())`, or fails with an [`Error`](crate::Error) that the
//! application's error responder turns into a response.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::{header, HeaderValue, StatusCode};

use crate::context::Context;
use crate::error::{RequestError, Result};

/// Future returned by [`Handler::serve`]
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Request-processing unit
pub trait Handler: Send + Sync + 'static {
    fn serve<'a>(&'a self, c: &'a mut Context) -> HandlerFuture<'a>;
}

/// Handler shared between the registry and in-flight requests
pub type SharedHandler = Arc<dyn Handler>;

/// Adapter turning a closure or fn item into a [`Handler`]
///
/// ```
/// use doppio_core::handler_fn;
/// use http::StatusCode;
///
/// let hello = handler_fn(|c| Box::pin(async move { c.text(StatusCode::OK, "Hello, world!") }));
/// # let _ = hello;
/// ```
pub struct HandlerFn<F>(F);

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
{
    #[inline]
    fn serve<'a>(&'a self, c: &'a mut Context) -> HandlerFuture<'a> {
        (self.0)(c)
    }
}

/// Wrap a closure into a [`SharedHandler`]
pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync + 'static,
{
    Arc::new(HandlerFn(f))
}

struct NotFound;

impl Handler for NotFound {
    fn serve<'a>(&'a self, _c: &'a mut Context) -> HandlerFuture<'a> {
        Box::pin(async { Err(RequestError::not_found().into()) })
    }
}

/// Handler that always fails with `404 Not Found`
pub fn not_found_handler() -> SharedHandler {
    Arc::new(NotFound)
}

/// Handler answering every request with a redirect to a fixed location
#[derive(Debug, Clone)]
pub struct Redirect {
    location: HeaderValue,
    code: StatusCode,
}

impl Redirect {
    /// Redirect to `location` with `code`
    ///
    /// Fails if `location` is not a valid header value.
    pub fn new(location: &str, code: StatusCode) -> Result<Self> {
        Ok(Self {
            location: HeaderValue::from_str(location)?,
            code,
        })
    }

    pub fn permanent(location: &str) -> Result<Self> {
        Self::new(location, StatusCode::MOVED_PERMANENTLY)
    }

    pub fn location(&self) -> &HeaderValue {
        &self.location
    }
}

impl Handler for Redirect {
    fn serve<'a>(&'a self, c: &'a mut Context) -> HandlerFuture<'a> {
        Box::pin(async move {
            c.response
                .headers_mut()
                .insert(header::LOCATION, self.location.clone());
            c.write_header(self.code);
            Ok(())
        })
    }
}
