//! # Doppio
//!
//! Application layer of the Doppio HTTP framework: route registration
//! shortcuts, pooled request contexts, mounting of sub-applications, static
//! files and a hyper-backed HTTP/1.1 listener with graceful shutdown.
//!
//! ## Features
//! - Per-method registration helpers and catch-all routes
//! - Middleware applied in registration order
//! - Context reuse through a free-list pool
//! - Sub-applications mounted below a path prefix
//! - Centralized plain-text error responses
//! - Streaming responses and connection upgrades
//! - Optional TLS listeners (`tls` feature)
//!
//! ## Quick Start
//!
//! ```no_run
//! use doppio_server::App;
//! use http::StatusCode;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = App::new();
//!     app.get("/", |c| Box::pin(async move { c.text(StatusCode::OK, "Hello, World!") }));
//!     app.get("/api/users", |c| {
//!         Box::pin(async move {
//!             let name = c.param_or("name", "John Doe").to_string();
//!             c.json(StatusCode::OK, &json!({ "name": name }))
//!         })
//!     });
//!     app.static_files("/assets", "./public");
//!
//!     app.listen("127.0.0.1:3000").await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod pool;
pub mod serve;
pub mod r#static;

pub use app::App;
pub use config::{ServerConfig, StaticFileConfig, StaticFileOptions};
pub use error::{ConfigError, ConfigResult, ServeError, ServeResult};
pub use pool::Pool;
pub use r#static::{FileServer, StaticOptions};

// Re-export the dispatch core so applications need a single dependency
pub use doppio_core::{
    handler_fn, middleware_fn, request, Config, Context, Cookie, Error, Handler, HandlerFuture,
    Method, Middleware, Params, Redirect, RequestError, Response, ResponseWriter, Result,
    SameSite, SharedHandler,
};
