//! Redirect-following policy

use http::{Method, StatusCode};

pub(crate) const DEFAULT_MAX_REDIRECTS: usize = 20;

pub(crate) fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// 301/302/303 responses re-issue as GET without a body, unless the
/// original method already was GET or HEAD; 307/308 preserve both
pub(crate) fn rewrites_to_get(status: StatusCode, method: &Method) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303)
        && *method != Method::GET
        && *method != Method::HEAD
}

/// Resolves a `Location` header value against the path of the request that
/// produced it, returning a new request target (path plus optional query).
///
/// The harness has no real host, so the authority of an absolute location
/// is dropped and only its path and query are kept.
pub(crate) fn resolve_location(current_path: &str, location: &str) -> String {
    if let Some(rest) = strip_authority(location) {
        return if rest.is_empty() { "/".to_owned() } else { rest.to_owned() };
    }
    if location.starts_with('/') {
        return location.to_owned();
    }

    let (location_path, query) = match location.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (location, None),
    };

    let current = current_path.split('?').next().unwrap_or("/");
    let base = match current.rfind('/') {
        Some(idx) => &current[..=idx],
        None => "/",
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(location_path.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut resolved = String::from("/");
    resolved.push_str(&segments.join("/"));
    if location_path.ends_with('/') && resolved.len() > 1 {
        resolved.push('/');
    }
    if let Some(query) = query {
        resolved.push('?');
        resolved.push_str(query);
    }
    resolved
}

/// Strips `scheme://authority` or a protocol-relative `//authority` prefix,
/// returning the remaining path and query
fn strip_authority(location: &str) -> Option<&str> {
    let after_scheme = match location.split_once("://") {
        Some((scheme, rest)) if scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) => rest,
        _ => location.strip_prefix("//")?,
    };
    let idx = after_scheme.find('/').unwrap_or(after_scheme.len());
    Some(&after_scheme[idx..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_classifies_redirect_statuses() {
        assert!(is_redirect(StatusCode::MOVED_PERMANENTLY));
        assert!(is_redirect(StatusCode::PERMANENT_REDIRECT));
        assert!(!is_redirect(StatusCode::OK));
        assert!(!is_redirect(StatusCode::NOT_MODIFIED));
    }

    #[test]
    fn it_rewrites_non_safe_methods_to_get() {
        assert!(rewrites_to_get(StatusCode::SEE_OTHER, &Method::POST));
        assert!(!rewrites_to_get(StatusCode::SEE_OTHER, &Method::GET));
        assert!(!rewrites_to_get(StatusCode::SEE_OTHER, &Method::HEAD));
        assert!(!rewrites_to_get(StatusCode::TEMPORARY_REDIRECT, &Method::POST));
    }

    #[test]
    fn it_keeps_absolute_paths() {
        assert_eq!(resolve_location("/old", "/new"), "/new");
        assert_eq!(resolve_location("/old", "/new?a=1"), "/new?a=1");
    }

    #[test]
    fn it_drops_the_authority_of_absolute_urls() {
        assert_eq!(resolve_location("/old", "http://localhost/next"), "/next");
        assert_eq!(resolve_location("/old", "https://example.com"), "/");
        assert_eq!(resolve_location("/old", "//example.com/next?x=2"), "/next?x=2");
    }

    #[test]
    fn it_resolves_relative_locations() {
        assert_eq!(resolve_location("/a/b/c", "d"), "/a/b/d");
        assert_eq!(resolve_location("/a/b/c", "../d"), "/a/d");
        assert_eq!(resolve_location("/a/b/c", "./d?q=1"), "/a/b/d?q=1");
        assert_eq!(resolve_location("/a", "b/"), "/b/");
    }
}
