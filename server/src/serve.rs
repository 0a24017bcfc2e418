//! Listener lifecycle: accepting connections and graceful shutdown

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use doppio_core::context::TEXT_PLAIN_UTF_8;
use doppio_core::{request, Response, ResponseWriter};
use http::header::{self, HeaderValue};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::app::App;
use crate::error::{ServeError, ServeResult};

/// Pause after a failed `accept` before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

static NEXT_SERVER_ID: AtomicU64 = AtomicU64::new(1);

/// The active server of an application
#[derive(Clone)]
pub(crate) struct ServerHandle {
    id: u64,
    token: CancellationToken,
    tracker: TaskTracker,
    local_addr: SocketAddr,
}

/// Clears the server slot when the accept loop ends or is dropped
struct Running<'a> {
    app: &'a App,
    id: u64,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        let mut slot = self.app.inner.server.lock();
        if slot.as_ref().is_some_and(|handle| handle.id == self.id) {
            *slot = None;
        }
    }
}

impl App {
    /// Bind `addr` and serve on it until [`shutdown`](App::shutdown)
    pub async fn listen<A: ToSocketAddrs>(&self, addr: A) -> ServeResult<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve HTTP/1.1 connections accepted on `listener`
    ///
    /// Returns once [`shutdown`](App::shutdown) has been called and every
    /// connection has closed. An application runs at most one server at a
    /// time.
    pub async fn serve(&self, listener: TcpListener) -> ServeResult<()> {
        self.accept_loop(listener, |stream| std::future::ready(Ok(stream)))
            .await
    }

    /// Serve TLS connections accepted on `listener`
    #[cfg(feature = "tls")]
    pub async fn serve_tls(
        &self,
        listener: TcpListener,
        acceptor: tokio_rustls::TlsAcceptor,
    ) -> ServeResult<()> {
        self.accept_loop(listener, move |stream| acceptor.accept(stream))
            .await
    }

    /// Bind `addr` and serve TLS connections with `config`
    #[cfg(feature = "tls")]
    pub async fn listen_tls<A: ToSocketAddrs>(
        &self,
        addr: A,
        config: std::sync::Arc<tokio_rustls::rustls::ServerConfig>,
    ) -> ServeResult<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_tls(listener, tokio_rustls::TlsAcceptor::from(config))
            .await
    }

    /// Stop accepting connections and wait for open ones to finish
    ///
    /// Idle connections are closed right away, busy ones after their current
    /// response. Connections taken over with `hijack` are not waited for.
    pub async fn shutdown(&self) -> ServeResult<()> {
        let handle = self
            .inner
            .server
            .lock()
            .clone()
            .ok_or(ServeError::NotRunning)?;

        info!(addr = %handle.local_addr, "initiating graceful shutdown");
        handle.token.cancel();
        handle.tracker.close();
        handle.tracker.wait().await;
        Ok(())
    }

    /// [`shutdown`](App::shutdown) bounded by `timeout`
    pub async fn shutdown_timeout(&self, timeout: Duration) -> ServeResult<()> {
        tokio::time::timeout(timeout, self.shutdown())
            .await
            .map_err(|_| ServeError::Timeout)?
    }

    /// Address of the active listener
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .server
            .lock()
            .as_ref()
            .map(|handle| handle.local_addr)
    }

    fn start(&self, local_addr: SocketAddr) -> ServeResult<ServerHandle> {
        let mut slot = self.inner.server.lock();
        if slot.is_some() {
            return Err(ServeError::AlreadyRunning);
        }
        let handle = ServerHandle {
            id: NEXT_SERVER_ID.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            local_addr,
        };
        *slot = Some(handle.clone());
        Ok(handle)
    }

    async fn accept_loop<F, Fut, I>(&self, listener: TcpListener, handshake: F) -> ServeResult<()>
    where
        F: Fn(TcpStream) -> Fut,
        Fut: Future<Output = io::Result<I>> + Send + 'static,
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let handle = self.start(listener.local_addr()?)?;
        let _running = Running {
            app: self,
            id: handle.id,
        };
        // Keeps `shutdown` waiting until the listener is gone
        let accepting = handle.tracker.token();

        info!(addr = %handle.local_addr, routes = self.router().len(), "server listening");

        loop {
            tokio::select! {
                _ = handle.token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        self.spawn_connection(&handle, remote, handshake(stream));
                    }
                    Err(err) => {
                        error!(error = %err, "failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        drop(accepting);
        handle.tracker.close();
        handle.tracker.wait().await;
        info!(addr = %handle.local_addr, "server stopped");
        Ok(())
    }

    fn spawn_connection<Fut, I>(&self, handle: &ServerHandle, remote: SocketAddr, handshake: Fut)
    where
        Fut: Future<Output = io::Result<I>> + Send + 'static,
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let app = self.clone();
        let token = handle.token.clone();

        handle.tracker.spawn(async move {
            let io = match handshake.await {
                Ok(io) => io,
                Err(err) => {
                    debug!(%remote, error = %err, "connection handshake failed");
                    return;
                }
            };

            let service = service_fn(move |req| {
                let app = app.clone();
                async move { Ok::<_, Infallible>(app.service(req).await) }
            });
            let conn = http1::Builder::new()
                .serve_connection(TokioIo::new(io), service)
                .with_upgrades();
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = token.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(err) = result {
                debug!(%remote, error = %err, "error serving connection");
            }
        });
    }

    /// Answer one request from the transport
    ///
    /// The request is dispatched on its own task; the response head is
    /// returned as soon as the handler commits it, so streamed bodies and
    /// upgrades proceed while the handler keeps running.
    async fn service(self, req: http::Request<Incoming>) -> Response {
        let request = req.map(request::boxed);
        let (writer, head) = ResponseWriter::channel();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        tokio::spawn(async move {
            self.dispatch(request, writer).await;
        });

        match head.await {
            Ok(response) => response,
            Err(_) => {
                error!(%method, %path, "request ended without a response");
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    let body = Full::new(Bytes::from_static(b"Internal Server Error")).boxed_unsync();
    let mut response = http::Response::new(body);
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN_UTF_8));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}
