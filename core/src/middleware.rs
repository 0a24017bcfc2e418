//! Middleware composition
//!
//! A middleware is a function from handler to handler. The router keeps them
//! in registration order and, for every request, wraps the resolved handler
//! so that the first registered middleware runs outermost: its code before
//! `next.serve(c)` executes first and its code after executes last.

use std::sync::Arc;

use crate::handler::SharedHandler;

/// Handler-to-handler transformation
pub type Middleware = Arc<dyn Fn(SharedHandler) -> SharedHandler + Send + Sync>;

/// Wrap a closure into a [`Middleware`]
pub fn middleware_fn<F>(f: F) -> Middleware
where
    F: Fn(SharedHandler) -> SharedHandler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Fold `middlewares` around `handler`, last to first
///
/// For `[m1, m2]` this yields `m1(m2(handler))`.
pub fn compose(handler: SharedHandler, middlewares: &[Middleware]) -> SharedHandler {
    middlewares
        .iter()
        .rev()
        .fold(handler, |next, middleware| middleware(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Context;
    use crate::handler::{handler_fn, Handler, HandlerFuture};
    use crate::request;
    use crate::response::ResponseWriter;
    use http::StatusCode;
    use parking_lot::Mutex;

    type Trace = Arc<Mutex<Vec<String>>>;

    struct Tagged {
        tag: &'static str,
        trace: Trace,
        next: SharedHandler,
    }

    impl Handler for Tagged {
        fn serve<'a>(&'a self, c: &'a mut Context) -> HandlerFuture<'a> {
            Box::pin(async move {
                self.trace.lock().push(format!("{} before", self.tag));
                let result = self.next.serve(c).await;
                self.trace.lock().push(format!("{} after", self.tag));
                result
            })
        }
    }

    fn tagged(tag: &'static str, trace: &Trace) -> Middleware {
        let trace = trace.clone();
        middleware_fn(move |next| {
            let wrapped: SharedHandler = Arc::new(Tagged {
                tag,
                trace: trace.clone(),
                next,
            });
            wrapped
        })
    }

    #[tokio::test]
    async fn test_first_registered_runs_outermost() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let inner = trace.clone();
        let handler = handler_fn(move |c| {
            let inner = inner.clone();
            Box::pin(async move {
                inner.lock().push("handler".to_string());
                c.text(StatusCode::OK, "ok")
            })
        });

        let composed = compose(handler, &[tagged("m1", &trace), tagged("m2", &trace)]);

        let mut c = Context::new(Arc::new(Config::default()));
        let req = http::Request::builder().uri("/").body(request::empty()).unwrap();
        c.reset(req, ResponseWriter::buffered());
        composed.serve(&mut c).await.unwrap();

        assert_eq!(
            *trace.lock(),
            ["m1 before", "m2 before", "handler", "m2 after", "m1 after"]
        );
    }

    #[tokio::test]
    async fn test_compose_without_middlewares_is_identity() {
        let handler = handler_fn(|c| Box::pin(async move { c.text(StatusCode::CREATED, "") }));
        let composed = compose(handler.clone(), &[]);
        assert!(Arc::ptr_eq(&handler, &composed));
    }
}
