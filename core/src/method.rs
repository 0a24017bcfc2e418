//! The fixed set of HTTP methods a route may be registered for

use std::fmt;
use std::str::FromStr;

use crate::error::RouterError;

/// HTTP method enumeration
///
/// Only the methods of RFC 7231 and RFC 5789 are recognized. Requests using
/// any other method never match a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Method {
    GET = 0,
    HEAD = 1,
    POST = 2,
    PUT = 3,
    PATCH = 4,
    DELETE = 5,
    CONNECT = 6,
    OPTIONS = 7,
    TRACE = 8,
}

impl Method {
    /// Every recognized method, in the order `App::all` registers them
    pub const ALL: [Method; 9] = [
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::CONNECT,
        Method::OPTIONS,
        Method::TRACE,
    ];

    /// Parse method from its exact (case-sensitive) token
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"GET" => Some(Method::GET),
            b"HEAD" => Some(Method::HEAD),
            b"POST" => Some(Method::POST),
            b"PUT" => Some(Method::PUT),
            b"PATCH" => Some(Method::PATCH),
            b"DELETE" => Some(Method::DELETE),
            b"CONNECT" => Some(Method::CONNECT),
            b"OPTIONS" => Some(Method::OPTIONS),
            b"TRACE" => Some(Method::TRACE),
            _ => None,
        }
    }

    /// Get method as static string slice
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::from_bytes(s.as_bytes()).ok_or_else(|| RouterError::InvalidMethod(s.to_string()))
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = RouterError;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => http::Method::GET,
            Method::HEAD => http::Method::HEAD,
            Method::POST => http::Method::POST,
            Method::PUT => http::Method::PUT,
            Method::PATCH => http::Method::PATCH,
            Method::DELETE => http::Method::DELETE,
            Method::CONNECT => http::Method::CONNECT,
            Method::OPTIONS => http::Method::OPTIONS,
            Method::TRACE => http::Method::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::GET);
        assert_eq!("TRACE".parse::<Method>().unwrap(), Method::TRACE);
        assert_eq!(
            "get".parse::<Method>(),
            Err(RouterError::InvalidMethod("get".to_string()))
        );
        assert!("".parse::<Method>().is_err());
        assert!("PURGE".parse::<Method>().is_err());
    }

    #[test]
    fn test_http_method_conversion() {
        assert_eq!(Method::try_from(&http::Method::PATCH).unwrap(), Method::PATCH);
        let custom = http::Method::from_bytes(b"PURGE").unwrap();
        assert!(Method::try_from(&custom).is_err());
        assert_eq!(http::Method::from(Method::CONNECT), http::Method::CONNECT);
    }

    #[test]
    fn test_all_methods_round_trip_names() {
        for method in Method::ALL {
            assert_eq!(method.as_str().parse::<Method>().unwrap(), method);
        }
        assert_eq!(Method::ALL.len(), 9);
    }

    #[test]
    fn test_method_display() {
        assert_eq!(Method::POST.to_string(), "POST");
    }
}
