//! # DoppioCore
//!
//! Transport-independent request dispatch for the Doppio HTTP framework.
//!
//! ## Features
//! - Literal route registry keyed by method and path
//! - Deterministic longest-prefix fallback matching
//! - Trailing-slash and canonical-path redirects
//! - Middleware folded around the selected handler on every request
//! - Reusable per-request [`Context`] with parameter, header, cookie and
//!   strict JSON body helpers
//! - Two-tier error model: client-facing [`RequestError`]s and opaque
//!   internal failures
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use doppio_core::{handler_fn, request, Config, Context, Method, ResponseWriter, Route, Router};
//! use http::StatusCode;
//!
//! # tokio_test::block_on(async {
//! let router = Router::new();
//! router.handle(Route::new(
//!     Method::GET,
//!     "/hello",
//!     handler_fn(|c| Box::pin(async move { c.text(StatusCode::OK, "Hello, world!") })),
//! ));
//!
//! let mut c = Context::new(Arc::new(Config::default()));
//! let req = http::Request::get("/hello").body(request::empty()).unwrap();
//! c.reset(req, ResponseWriter::buffered());
//! router.serve(&mut c).await.unwrap();
//!
//! assert_eq!(c.status(), StatusCode::OK);
//! assert_eq!(c.response.body(), b"Hello, world!");
//! # });
//! ```

pub mod config;
pub mod context;
pub mod cookie;
pub mod error;
pub mod handler;
pub mod method;
pub mod middleware;
pub mod params;
pub mod path;
pub mod request;
pub mod response;
pub mod route;
pub mod router;

pub use config::{Config, DEFAULT_MAX_BODY_SIZE};
pub use context::Context;
pub use cookie::{Cookie, SameSite};
pub use error::{BoxError, Error, RequestError, Result, RouterError, SinkError};
pub use handler::{handler_fn, not_found_handler, Handler, HandlerFn, HandlerFuture, Redirect, SharedHandler};
pub use method::Method;
pub use middleware::{compose, middleware_fn, Middleware};
pub use params::Params;
pub use path::{canonical, format_size_iec};
pub use response::{Response, ResponseBody, ResponseWriter};
pub use route::Route;
pub use router::Router;
