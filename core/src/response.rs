//! Response sink
//!
//! A [`ResponseWriter`] collects the status line, headers and body a handler
//! produces. How the response leaves the process depends on the sink it was
//! created with:
//!
//! - [`ResponseWriter::buffered`] keeps everything in memory until
//!   [`ResponseWriter::into_response`]. It cannot flush or hijack.
//! - [`ResponseWriter::channel`] hands the response head to the transport
//!   through a oneshot channel. The head goes out when the handler flushes,
//!   hijacks the connection or finishes; after a flush the body is streamed
//!   through a bounded channel.

use std::convert::Infallible;
use std::fmt;
use std::mem;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Frame;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::SinkError;

/// Body type of every response produced by the dispatcher
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// Response handed to the transport
pub type Response = http::Response<ResponseBody>;

/// Number of body chunks that may be queued ahead of the connection
const STREAM_CAPACITY: usize = 16;

enum Sink {
    Buffered,
    Deferred(oneshot::Sender<Response>),
    Streaming(mpsc::Sender<Bytes>),
    Hijacked,
    Finished,
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sink::Buffered => "Buffered",
            Sink::Deferred(_) => "Deferred",
            Sink::Streaming(_) => "Streaming",
            Sink::Hijacked => "Hijacked",
            Sink::Finished => "Finished",
        };
        f.write_str(name)
    }
}

/// Writer for a single HTTP response
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    buf: BytesMut,
    wrote_header: bool,
    sink: Sink,
}

impl ResponseWriter {
    /// In-memory writer without streaming capabilities
    pub fn buffered() -> Self {
        Self::with_sink(Sink::Buffered)
    }

    /// Writer delivering its response head through the returned receiver
    pub fn channel() -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (Self::with_sink(Sink::Deferred(tx)), rx)
    }

    fn with_sink(sink: Sink) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            buf: BytesMut::new(),
            wrote_header: false,
            sink,
        }
    }

    /// Status that was (or will be) sent
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Whether the status line has been committed
    #[inline]
    pub fn wrote_header(&self) -> bool {
        self.wrote_header
    }

    /// Body bytes written but not yet handed to the transport
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.buf
    }

    /// Whether `flush` and `hijack` are available on this writer
    pub fn can_stream(&self) -> bool {
        matches!(self.sink, Sink::Deferred(_) | Sink::Streaming(_))
    }

    /// Commit the response status
    ///
    /// Only the first call has an effect.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.wrote_header {
            warn!(
                current = %self.status,
                ignored = %status,
                "superfluous write_header call"
            );
            return;
        }
        self.status = status;
        self.wrote_header = true;
    }

    /// Append `data` to the body, committing a `200 OK` status first if none
    /// was written
    pub fn write(&mut self, data: &[u8]) -> Result<usize, SinkError> {
        match self.sink {
            Sink::Hijacked => return Err(SinkError::Completed("hijacked")),
            Sink::Finished => return Err(SinkError::Completed("finished")),
            _ => {}
        }
        if !self.wrote_header {
            self.write_header(StatusCode::OK);
        }
        if !body_allowed(self.status) {
            return Err(SinkError::BodyNotAllowed);
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    /// Send the response head (on first call) and all buffered body bytes
    pub async fn flush(&mut self) -> Result<(), SinkError> {
        if let Sink::Deferred(_) = self.sink {
            if !self.wrote_header {
                self.write_header(StatusCode::OK);
            }
            let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
            let head = self.build(ChannelBody { rx }.boxed_unsync());
            let Sink::Deferred(deliver) = mem::replace(&mut self.sink, Sink::Finished) else {
                return Err(SinkError::Completed("finished"));
            };
            deliver.send(head).map_err(|_| SinkError::Closed)?;
            self.sink = Sink::Streaming(tx);
        }

        match &self.sink {
            Sink::Streaming(tx) => {
                if !self.buf.is_empty() {
                    let chunk = self.buf.split().freeze();
                    tx.send(chunk).await.map_err(|_| SinkError::Closed)?;
                }
                Ok(())
            }
            Sink::Buffered => Err(SinkError::Unsupported("flush")),
            Sink::Hijacked => Err(SinkError::Completed("hijacked")),
            Sink::Deferred(_) | Sink::Finished => Err(SinkError::Completed("finished")),
        }
    }

    /// Send a `101 Switching Protocols` head and give up the response
    ///
    /// The caller is expected to have set the `Upgrade` and `Connection`
    /// headers. Afterwards nothing more can be written.
    pub fn hijack(&mut self) -> Result<(), SinkError> {
        match self.sink {
            Sink::Deferred(_) => {}
            Sink::Buffered => return Err(SinkError::Unsupported("hijack")),
            Sink::Streaming(_) => return Err(SinkError::Completed("streaming")),
            Sink::Hijacked => return Err(SinkError::Completed("hijacked")),
            Sink::Finished => return Err(SinkError::Completed("finished")),
        }

        if !self.wrote_header {
            self.write_header(StatusCode::SWITCHING_PROTOCOLS);
        }
        self.buf.clear();
        let head = self.build(Full::new(Bytes::new()).boxed_unsync());
        match mem::replace(&mut self.sink, Sink::Hijacked) {
            Sink::Deferred(deliver) => deliver.send(head).map_err(|_| SinkError::Closed),
            _ => Err(SinkError::Completed("finished")),
        }
    }

    /// Complete the response
    ///
    /// Sends the whole response if nothing was flushed yet, otherwise the
    /// remaining body bytes. Calling it again is a no-op.
    pub async fn finish(&mut self) -> Result<(), SinkError> {
        match mem::replace(&mut self.sink, Sink::Finished) {
            Sink::Deferred(deliver) => {
                if !self.wrote_header {
                    self.write_header(StatusCode::OK);
                }
                let body = self.buf.split().freeze();
                let response = self.build(Full::new(body).boxed_unsync());
                deliver.send(response).map_err(|_| SinkError::Closed)
            }
            Sink::Streaming(tx) => {
                if !self.buf.is_empty() {
                    let chunk = self.buf.split().freeze();
                    tx.send(chunk).await.map_err(|_| SinkError::Closed)?;
                }
                Ok(())
            }
            Sink::Buffered => {
                self.sink = Sink::Buffered;
                Ok(())
            }
            Sink::Hijacked => {
                self.sink = Sink::Hijacked;
                Ok(())
            }
            Sink::Finished => Ok(()),
        }
    }

    /// Build a response from the current state
    ///
    /// Intended for buffered writers; bytes already streamed are not part of
    /// the result.
    pub fn into_response(mut self) -> Response {
        let body = self.buf.split().freeze();
        self.build(Full::new(body).boxed_unsync())
    }

    fn build(&self, body: ResponseBody) -> Response {
        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        response
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::buffered()
    }
}

fn body_allowed(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// Streaming body fed by the response writer
struct ChannelBody {
    rx: mpsc::Receiver<Bytes>,
}

impl hyper::body::Body for ChannelBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        self.rx
            .poll_recv(cx)
            .map(|chunk| chunk.map(|data| Ok(Frame::data(data))))
    }
}
