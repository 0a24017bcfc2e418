//! Request body type shared by the transport and the context

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};

use crate::error::BoxError;

/// Type-erased request body
///
/// hyper's `Incoming` and in-memory bodies used in tests both convert into
/// this type.
pub type Body = BoxBody<Bytes, BoxError>;

/// Request as seen by handlers
pub type Request = http::Request<Body>;

/// An empty request body
pub fn empty() -> Body {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

/// A request body holding `data` in memory
pub fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into()).map_err(|never| match never {}).boxed()
}

/// Erase the concrete type of any body whose errors convert into [`BoxError`]
pub fn boxed<B>(body: B) -> Body
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed()
}
