//! Path canonicalization and size formatting helpers

/// Returns the canonical form of `path`
///
/// A leading slash is enforced, empty, `.` and `..` segments are resolved
/// lexically (`..` never climbs above the root) and a trailing slash present
/// in the input is kept unless the result is the bare root.
pub fn canonical(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() {
        return "/".to_string();
    }

    if path.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}

/// Formats a byte count with binary (IEC) units, e.g. `1.0 MiB`
pub fn format_size_iec(bytes: i64) -> String {
    const BASE: i64 = 1024;
    const UNITS: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

    if bytes < BASE {
        return format!("{} B", bytes);
    }

    let mut div = BASE;
    let mut exp = 0;
    let mut n = bytes / BASE;
    while n >= BASE && exp < UNITS.len() - 1 {
        div *= BASE;
        exp += 1;
        n /= BASE;
    }
    format!("{:.1} {}iB", bytes as f64 / div as f64, UNITS[exp])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_root_forms() {
        assert_eq!(canonical(""), "/");
        assert_eq!(canonical("."), "/");
        assert_eq!(canonical(".."), "/");
        assert_eq!(canonical("/"), "/");
        assert_eq!(canonical("//"), "/");
        assert_eq!(canonical("/../.."), "/");
    }

    #[test]
    fn test_canonical_trailing_slash() {
        assert_eq!(canonical("test/"), "/test/");
        assert_eq!(canonical("/test/./"), "/test/");
        assert_eq!(canonical("/test/../"), "/");
        assert_eq!(canonical("/a/b/../c/"), "/a/c/");
    }

    #[test]
    fn test_canonical_without_trailing_slash() {
        assert_eq!(canonical("test"), "/test");
        assert_eq!(canonical("/a//b"), "/a/b");
        assert_eq!(canonical("/a/./b/."), "/a/b");
        assert_eq!(canonical("/a/b/.."), "/a");
        assert_eq!(canonical("/../a"), "/a");
    }

    #[test]
    fn test_canonical_is_identity_on_canonical_paths() {
        for path in ["/", "/a", "/a/", "/a/b/c", "/static/app.js"] {
            assert_eq!(canonical(path), path);
        }
    }

    #[test]
    fn test_format_size_iec() {
        assert_eq!(format_size_iec(0), "0 B");
        assert_eq!(format_size_iec(1023), "1023 B");
        assert_eq!(format_size_iec(1024), "1.0 KiB");
        assert_eq!(format_size_iec(1536), "1.5 KiB");
        assert_eq!(format_size_iec(1_048_576), "1.0 MiB");
        assert_eq!(format_size_iec(5 * 1024 * 1024 * 1024), "5.0 GiB");
    }
}
