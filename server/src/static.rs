//! Static file serving

use std::path::PathBuf;

use doppio_core::{canonical, Context, Handler, HandlerFuture, Result};
use http::header;

/// Static file serving options
#[derive(Debug, Clone)]
pub struct StaticOptions {
    /// Cache-Control header value
    pub cache_control: Option<String>,
    /// Extra response headers
    pub headers: Vec<(String, String)>,
}

impl Default for StaticOptions {
    fn default() -> Self {
        Self {
            cache_control: Some("public, max-age=3600".to_string()),
            headers: Vec::new(),
        }
    }
}

/// Handler serving the files below a directory
///
/// The route prefix is stripped from the request path and the remainder,
/// percent-decoded and canonicalized, is looked up under `root`. Anything
/// that is not a regular file is reported as `404 Not Found`.
#[derive(Debug, Clone)]
pub struct FileServer {
    prefix: String,
    root: PathBuf,
    options: StaticOptions,
}

impl FileServer {
    pub fn new<P: Into<PathBuf>>(prefix: &str, root: P) -> Self {
        Self::with_options(prefix, root, StaticOptions::default())
    }

    pub fn with_options<P: Into<PathBuf>>(prefix: &str, root: P, options: StaticOptions) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// File below the root addressed by a request path
    fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let rest = request_path.strip_prefix(self.prefix.as_str())?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        let decoded = urlencoding::decode(rest).ok()?;
        let relative = canonical(&decoded);
        Some(self.root.join(relative.trim_start_matches('/')))
    }

    async fn serve_file(&self, c: &mut Context) -> Result<()> {
        let Some(path) = self.resolve(c.path()) else {
            return Err(c.not_found());
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(c.not_found()),
        }

        if let Some(cache_control) = &self.options.cache_control {
            c.set_header(header::CACHE_CONTROL, cache_control.as_str())?;
        }
        for (key, value) in &self.options.headers {
            c.set_header(key.as_str(), value.as_str())?;
        }
        c.file(&path).await
    }
}

impl Handler for FileServer {
    fn serve<'a>(&'a self, c: &'a mut Context) -> HandlerFuture<'a> {
        Box::pin(self.serve_file(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_resolve_strips_prefix() {
        let fs = FileServer::new("/static", "/srv/public");
        assert_eq!(fs.resolve("/static/app.js").unwrap(), Path::new("/srv/public/app.js"));
        assert_eq!(fs.resolve("/static/css/site.css").unwrap(), Path::new("/srv/public/css/site.css"));
        assert_eq!(fs.resolve("/static").unwrap(), Path::new("/srv/public/"));
        assert!(fs.resolve("/staticfoo").is_none());
        assert!(fs.resolve("/other/app.js").is_none());
    }

    #[test]
    fn test_resolve_stays_below_root() {
        let fs = FileServer::new("/", "/srv/public");
        assert_eq!(fs.resolve("/../../etc/passwd").unwrap(), Path::new("/srv/public/etc/passwd"));
        assert_eq!(fs.resolve("/a/%2e%2e/%2e%2e/b").unwrap(), Path::new("/srv/public/b"));
        assert_eq!(fs.resolve("/my%20file.txt").unwrap(), Path::new("/srv/public/my file.txt"));
    }
}
