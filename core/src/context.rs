//! Per-request context
//!
//! A [`Context`] carries the request being served, the writer for its
//! response and the parsed query parameters. Applications keep instances in a
//! pool and rebind them with [`Context::reset`] for every request, so a
//! context never outlives the request it is bound to in any meaningful way.

use std::mem;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, AsHeaderName, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body as _;
use hyper::upgrade::OnUpgrade;
use mime::Mime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::cookie::{parse_cookies, Cookie};
use crate::error::{BoxError, Error, RequestError, Result, SinkError};
use crate::params::Params;
use crate::path::format_size_iec;
use crate::request::{self, Request};
use crate::response::ResponseWriter;

/// Content type written by [`Context::text`]
pub const TEXT_PLAIN_UTF_8: &str = "text/plain; charset=utf-8";

/// State of the request currently being served
pub struct Context {
    config: Arc<Config>,
    /// Request bound by the last [`reset`](Context::reset)
    pub request: Request,
    /// Writer for the response to `request`
    pub response: ResponseWriter,
    /// Query parameters, re-parsed on every reset
    pub params: Params,
}

impl Context {
    /// Unbound context for the application owning `config`
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            request: Request::new(request::empty()),
            response: ResponseWriter::buffered(),
            params: Params::new(),
        }
    }

    /// Configuration of the owning application
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind the context to a new request/response pair
    ///
    /// Parameters are re-parsed from the request's query string; changes made
    /// to them for the previous request are discarded.
    pub fn reset(&mut self, request: Request, response: ResponseWriter) {
        self.params = Params::parse(request.uri().query().unwrap_or(""));
        self.request = request;
        self.response = response;
    }

    /// Drop the bound request and response
    pub fn clear(&mut self) {
        self.request = Request::new(request::empty());
        self.response = ResponseWriter::buffered();
        self.params.clear();
    }

    #[inline]
    pub fn method(&self) -> &http::Method {
        self.request.method()
    }

    #[inline]
    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    // Query parameters

    /// First value of the query parameter `key`
    #[inline]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    /// First value of `key`, or `default` when missing or empty
    pub fn param_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.params.get(key) {
            Some(value) if !value.is_empty() => value,
            _ => default,
        }
    }

    #[inline]
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.set(key, value);
    }

    pub fn add_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.add(key, value);
    }

    pub fn delete_param(&mut self, key: &str) {
        self.params.delete(key);
    }

    // Headers

    /// First value of the request header `key`, if it is visible ASCII
    pub fn header<K: AsHeaderName>(&self, key: K) -> Option<&str> {
        self.request.headers().get(key)?.to_str().ok()
    }

    /// Replace the response header `key` with `value`
    pub fn set_header<K, V>(&mut self, key: K, value: V) -> Result<()>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<BoxError>,
        V: TryInto<HeaderValue>,
        V::Error: Into<BoxError>,
    {
        let (key, value) = header_pair(key, value)?;
        self.response.headers_mut().insert(key, value);
        Ok(())
    }

    /// Append `value` to the response header `key`
    pub fn add_header<K, V>(&mut self, key: K, value: V) -> Result<()>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<BoxError>,
        V: TryInto<HeaderValue>,
        V::Error: Into<BoxError>,
    {
        let (key, value) = header_pair(key, value)?;
        self.response.headers_mut().append(key, value);
        Ok(())
    }

    /// Parsed `Content-Type` of the request
    pub fn media_type(&self) -> Option<Mime> {
        self.header(header::CONTENT_TYPE)?.parse().ok()
    }

    // Cookies

    /// First request cookie named `name`
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.cookies().into_iter().find(|cookie| cookie.name == name)
    }

    /// Every cookie sent with the request, in order
    pub fn cookies(&self) -> Vec<Cookie> {
        self.request
            .headers()
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(parse_cookies)
            .collect()
    }

    /// Add a `Set-Cookie` header; cookies with an invalid name are dropped
    pub fn set_cookie(&mut self, cookie: &Cookie) -> Result<()> {
        match cookie.to_header_value() {
            Some(value) => self.add_header(header::SET_COOKIE, value),
            None => {
                debug!(name = %cookie.name, "dropping cookie with invalid name");
                Ok(())
            }
        }
    }

    // Response

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn write_header(&mut self, code: StatusCode) {
        self.response.write_header(code);
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.response.write(data)?)
    }

    /// Send everything written so far to the client
    pub async fn flush(&mut self) -> Result<()> {
        Ok(self.response.flush().await?)
    }

    /// Take over the connection
    ///
    /// Sends a `101 Switching Protocols` head with the response headers set
    /// so far and returns the future resolving to the upgraded connection.
    pub fn hijack(&mut self) -> Result<OnUpgrade> {
        if !self.response.can_stream() {
            return Err(SinkError::Unsupported("hijack").into());
        }
        let on_upgrade = self
            .request
            .extensions_mut()
            .remove::<OnUpgrade>()
            .ok_or(SinkError::NoUpgrade)?;
        self.response.hijack()?;
        Ok(on_upgrade)
    }

    /// Structured error carrying the canonical reason of `code`
    pub fn error(&self, code: StatusCode) -> Error {
        RequestError::from_status(code).into()
    }

    /// Structured error with a custom message
    pub fn errorf(&self, code: StatusCode, message: impl ToString) -> Error {
        RequestError::new(code, message.to_string()).into()
    }

    pub fn not_found(&self) -> Error {
        self.error(StatusCode::NOT_FOUND)
    }

    /// Respond with `204 No Content`
    pub fn no_content(&mut self) -> Result<()> {
        self.write_header(StatusCode::NO_CONTENT);
        Ok(())
    }

    /// Respond with `code` and a plain-text body
    pub fn text(&mut self, code: StatusCode, value: impl AsRef<str>) -> Result<()> {
        self.response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(TEXT_PLAIN_UTF_8),
        );
        self.write_header(code);
        self.write(value.as_ref().as_bytes())?;
        Ok(())
    }

    /// Respond with `code` and `value` encoded as JSON
    ///
    /// The value is encoded before anything is written, so an encoding
    /// failure leaves the response untouched.
    pub fn json<T: Serialize + ?Sized>(&mut self, code: StatusCode, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.write_header(code);
        self.write(&body)?;
        Ok(())
    }

    /// Respond with the contents of the file at `path`
    ///
    /// Fails with `404 Not Found` unless `path` is a regular file.
    pub async fn file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(self.not_found()),
        }

        let contents = tokio::fs::read(path).await?;
        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        self.set_header(header::CONTENT_TYPE, content_type.as_ref())?;
        self.write_header(StatusCode::OK);
        if self.method() != http::Method::HEAD {
            self.write(&contents)?;
        }
        Ok(())
    }

    /// Decode the request body as a single JSON value
    ///
    /// The request must declare `Content-Type: application/json` and carry a
    /// non-empty body no larger than the configured maximum. Decoding is
    /// strict: a key the target type does not consume, at any depth, is an
    /// error. Failures a client can fix come back as `RequestError`s:
    ///
    /// | condition                    | status |
    /// |------------------------------|--------|
    /// | wrong content type           | 415    |
    /// | empty body                   | 400    |
    /// | body over the size limit     | 413    |
    /// | malformed JSON               | 400    |
    /// | value of the wrong type      | 400    |
    /// | unknown field                | 400    |
    /// | more than one JSON value     | 400    |
    pub async fn decode_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let is_json = self
            .media_type()
            .is_some_and(|mt| mt.essence_str() == mime::APPLICATION_JSON.essence_str());
        if !is_json {
            return Err(RequestError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!(
                    "Request header for `{}` is not set to `{}`",
                    "Content-Type",
                    mime::APPLICATION_JSON
                ),
            )
            .into());
        }

        let body = mem::replace(self.request.body_mut(), request::empty());
        if body.is_end_stream() {
            return Err(empty_body());
        }

        let bytes = match self.config.body_limit() {
            Some(limit) => {
                let declared = self
                    .header(header::CONTENT_LENGTH)
                    .and_then(|len| len.parse::<u64>().ok());
                if declared.is_some_and(|len| len > limit as u64) {
                    return Err(self.too_large());
                }
                match collect_limited(body, limit).await {
                    Ok(collected) => collected.to_bytes(),
                    Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                        return Err(self.too_large());
                    }
                    Err(err) => return Err(Error::Internal(err)),
                }
            }
            None => body.collect().await.map_err(Error::Internal)?.to_bytes(),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(empty_body());
        }
        decode_strict(&bytes)
    }

    fn too_large(&self) -> Error {
        RequestError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "Request body must not be larger than {}",
                format_size_iec(self.config.max_body_size)
            ),
        )
        .into()
    }
}

fn header_pair<K, V>(key: K, value: V) -> Result<(HeaderName, HeaderValue)>
where
    K: TryInto<HeaderName>,
    K::Error: Into<BoxError>,
    V: TryInto<HeaderValue>,
    V::Error: Into<BoxError>,
{
    let key = key.try_into().map_err(Error::internal)?;
    let value = value.try_into().map_err(Error::internal)?;
    Ok((key, value))
}

// Named future type keeps the handler future provably `Send`
fn collect_limited(
    body: request::Body,
    limit: usize,
) -> impl std::future::Future<Output = std::result::Result<http_body_util::Collected<Bytes>, BoxError>> + Send
{
    Limited::new(body, limit).collect()
}

fn empty_body() -> Error {
    RequestError::bad_request("Request body must not be empty").into()
}

fn decode_strict<T: DeserializeOwned>(bytes: &Bytes) -> Result<T> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let mut unknown: Option<String> = None;
    let decoded = {
        let mut on_ignored = |path: serde_ignored::Path<'_>| {
            if unknown.is_none() {
                unknown = Some(field_name(&path));
            }
        };
        let tracked = serde_ignored::Deserializer::new(&mut de, &mut on_ignored);
        serde_path_to_error::deserialize(tracked)
    };

    // The first unknown key wins over any later failure in the same body
    if let Some(name) = unknown {
        return Err(unknown_field(&name));
    }
    let value = match decoded {
        Ok(value) => value,
        Err(err) => {
            let field = err.path().to_string();
            return Err(classify(bytes, &field, err.into_inner()));
        }
    };

    if de.end().is_err() {
        return Err(
            RequestError::bad_request("Request body must only contain a single JSON object").into(),
        );
    }
    Ok(value)
}

/// Key of the innermost map entry in an ignored path
fn field_name(path: &serde_ignored::Path<'_>) -> String {
    match path {
        serde_ignored::Path::Map { key, .. } => key.to_string(),
        other => other.to_string(),
    }
}

fn unknown_field(name: &str) -> Error {
    RequestError::bad_request(format!("Request body contains unknown field \"{}\"", name)).into()
}

fn classify(bytes: &[u8], field: &str, err: serde_json::Error) -> Error {
    use serde_json::error::Category;

    let position = offset(bytes, err.line(), err.column());
    match err.classify() {
        Category::Syntax => RequestError::bad_request(format!(
            "Request body contains badly-formed JSON (at position {})",
            position
        ))
        .into(),
        Category::Eof => {
            RequestError::bad_request("Request body contains badly-formed JSON").into()
        }
        Category::Data => {
            let message = err.to_string();
            let message = message
                .split(" at line ")
                .next()
                .unwrap_or(message.as_str());

            if let Some(rest) = message.strip_prefix("unknown field `") {
                unknown_field(rest.split('`').next().unwrap_or_default())
            } else if message.starts_with("invalid type")
                || message.starts_with("invalid value")
                || message.starts_with("invalid length")
            {
                RequestError::bad_request(format!(
                    "Request body contains an invalid value for the \"{}\" field (at position {})",
                    field, position
                ))
                .into()
            } else {
                Error::internal(err)
            }
        }
        Category::Io => Error::internal(err),
    }
}

/// Byte offset of a 1-based line/column position in `bytes`
fn offset(bytes: &[u8], line: usize, column: usize) -> usize {
    let line_start: usize = bytes
        .split(|&b| b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    line_start + column
}
