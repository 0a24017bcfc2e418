//! Multi-valued query parameters

use ahash::AHashMap;

/// Query parameters of a request
///
/// Every key maps to one or more values in the order they appeared in the
/// query string. Keys and values are stored percent-decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    inner: AHashMap<String, Vec<String>>,
}

impl Params {
    /// Create new empty parameters container
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` query string
    ///
    /// Malformed escapes are decoded leniently, so this never fails.
    pub fn parse(query: &str) -> Self {
        let mut params = Self::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.add(key.into_owned(), value.into_owned());
        }
        params
    }

    /// First value associated with `key`
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key)?.first().map(String::as_str)
    }

    /// All values associated with `key`
    pub fn get_all(&self, key: &str) -> &[String] {
        self.inner.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace any existing values of `key` with `value`
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), vec![value.into()]);
    }

    /// Append `value` to the values of `key`
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    /// Remove every value of `key`
    pub fn delete(&mut self, key: &str) {
        self.inner.remove(key);
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Number of distinct keys
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Iterate over keys and their values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}
