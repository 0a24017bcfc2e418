use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use doppio_server::{App, ServeError, ServeResult};
use http::header::{self, HeaderMap};
use http::StatusCode;
use http_body_util::{BodyExt, Empty, Full};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

async fn start(app: &App) -> (SocketAddr, JoinHandle<ServeResult<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = {
        let app = app.clone();
        tokio::spawn(async move { app.serve(listener).await })
    };
    while app.local_addr().is_none() {
        tokio::task::yield_now().await;
    }
    (addr, server)
}

async fn send(
    addr: SocketAddr,
    req: http::Request<Full<Bytes>>,
) -> http::Response<hyper::body::Incoming> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = conn.with_upgrades().await;
    });
    sender.send_request(req).await.unwrap()
}

async fn fetch(addr: SocketAddr, path: &str) -> (StatusCode, HeaderMap, Bytes) {
    let req = http::Request::get(path)
        .header(header::HOST, addr.to_string())
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = send(addr, req).await;
    let (parts, body) = response.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    (parts.status, parts.headers, body)
}

#[tokio::test]
async fn test_serves_requests_over_tcp() {
    let app = App::new();
    app.get("/hello", |c| Box::pin(async move { c.text(StatusCode::OK, "Hello, world!") }));
    let (addr, server) = start(&app).await;
    assert_eq!(app.local_addr(), Some(addr));

    let (status, headers, body) = fetch(addr, "/hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(&body[..], b"Hello, world!");

    let (status, _, _) = fetch(addr, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.shutdown().await.unwrap();
    server.await.unwrap().unwrap();
    assert_eq!(app.local_addr(), None);
}

#[tokio::test]
async fn test_reads_request_body() {
    let app = App::new();
    app.post("/echo", |c| {
        Box::pin(async move {
            let value: serde_json::Value = c.decode_json().await?;
            c.json(StatusCode::OK, &value)
        })
    });
    let (addr, server) = start(&app).await;

    let req = http::Request::post("/echo")
        .header(header::HOST, addr.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(br#"{"id":7}"#)))
        .unwrap();
    let response = send(addr, req).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], br#"{"id":7}"#);

    app.shutdown().await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_streams_flushed_chunks() {
    let app = App::new();
    app.get("/stream", |c| {
        Box::pin(async move {
            c.write_header(StatusCode::OK);
            c.write(b"hello ")?;
            c.flush().await?;
            tokio::time::sleep(Duration::from_millis(20)).await;
            c.write(b"world")?;
            Ok(())
        })
    });
    let (addr, server) = start(&app).await;

    let (status, _, body) = fetch(addr, "/stream").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"hello world");

    app.shutdown().await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_hijacked_connection() {
    let app = App::new();
    app.get("/echo", |c| {
        Box::pin(async move {
            let on_upgrade = c.hijack()?;
            tokio::spawn(async move {
                if let Ok(upgraded) = on_upgrade.await {
                    let mut io = TokioIo::new(upgraded);
                    let mut buf = [0u8; 4];
                    if io.read_exact(&mut buf).await.is_ok() {
                        let _ = io.write_all(&buf).await;
                    }
                }
            });
            Ok(())
        })
    });
    let (addr, server) = start(&app).await;

    let req = http::Request::get("/echo")
        .header(header::HOST, addr.to_string())
        .header(header::CONNECTION, "upgrade")
        .header(header::UPGRADE, "echo")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = send(addr, req).await;
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

    let upgraded = hyper::upgrade::on(response).await.unwrap();
    let mut io = TokioIo::new(upgraded);
    io.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    io.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    app.shutdown().await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_panicking_handler_yields_500() {
    let app = App::new();
    app.get("/panic", |c| {
        Box::pin(async move {
            let id = c.param("id").expect("id parameter").to_string();
            c.text(StatusCode::OK, id)
        })
    });
    let (addr, server) = start(&app).await;

    let (status, _, body) = fetch(addr, "/panic").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(&body[..], b"Internal Server Error");

    app.shutdown().await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_request() {
    let started = Arc::new(Notify::new());
    let app = App::new();
    let signal = started.clone();
    app.get("/slow", move |c| {
        let signal = signal.clone();
        Box::pin(async move {
            signal.notify_one();
            tokio::time::sleep(Duration::from_millis(200)).await;
            c.text(StatusCode::OK, "done")
        })
    });
    let (addr, server) = start(&app).await;

    let pending = tokio::spawn(async move { fetch(addr, "/slow").await });
    started.notified().await;

    app.shutdown().await.unwrap();
    let (status, _, body) = pending.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"done");

    server.await.unwrap().unwrap();
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_shutdown_without_server() {
    let app = App::new();
    assert!(matches!(app.shutdown().await, Err(ServeError::NotRunning)));
}

#[tokio::test]
async fn test_second_serve_is_rejected() {
    let app = App::new();
    let (_, server) = start(&app).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    assert!(matches!(
        app.serve(listener).await,
        Err(ServeError::AlreadyRunning)
    ));

    app.shutdown().await.unwrap();
    server.await.unwrap().unwrap();

    // The slot is free again once the first server has stopped
    let (_, server) = start(&app).await;
    app.shutdown().await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_timeout() {
    let app = App::new();
    app.get("/stuck", |c| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            c.no_content()
        })
    });
    let (addr, server) = start(&app).await;

    let _pending = tokio::spawn(async move {
        let req = http::Request::get("/stuck")
            .header(header::HOST, addr.to_string())
            .body(Empty::<Bytes>::new())
            .unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);
        sender.send_request(req).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(
        app.shutdown_timeout(Duration::from_millis(100)).await,
        Err(ServeError::Timeout)
    ));
    server.abort();
}

#[cfg(feature = "tls")]
mod tls {
    use super::*;
    use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
    use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
    use tokio_rustls::{TlsAcceptor, TlsConnector};

    fn self_signed() -> (CertificateDer<'static>, Arc<ServerConfig>) {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert.clone()], key)
            .unwrap();
        (cert, Arc::new(config))
    }

    async fn fetch_tls(
        addr: SocketAddr,
        ca: CertificateDer<'static>,
        path: &str,
    ) -> (StatusCode, Bytes) {
        let mut roots = RootCertStore::empty();
        roots.add(ca).unwrap();
        let client = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(client));

        let stream = TcpStream::connect(addr).await.unwrap();
        let domain = ServerName::try_from("localhost").unwrap();
        let stream = connector.connect(domain, stream).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);

        let req = http::Request::get(path)
            .header(header::HOST, "localhost")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let response = sender.send_request(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    #[tokio::test]
    async fn test_serves_requests_over_tls() {
        let (ca, config) = self_signed();
        let app = App::new();
        app.get("/hello", |c| Box::pin(async move { c.text(StatusCode::OK, "Hello, TLS!") }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = {
            let app = app.clone();
            let acceptor = TlsAcceptor::from(config.clone());
            tokio::spawn(async move { app.serve_tls(listener, acceptor).await })
        };
        while app.local_addr().is_none() {
            tokio::task::yield_now().await;
        }

        let (status, body) = fetch_tls(addr, ca, "/hello").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"Hello, TLS!");

        assert!(matches!(
            app.listen_tls("127.0.0.1:0", config).await,
            Err(ServeError::AlreadyRunning)
        ));

        app.shutdown().await.unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(app.local_addr(), None);
    }
}
