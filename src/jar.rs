//! Cookie persistence across exchanges

use std::time::{SystemTime, UNIX_EPOCH};

use cookie::{Cookie, Expiration};
use http::header::{HeaderMap, SET_COOKIE};

use crate::scope::DEFAULT_HOST;

struct Entry {
    domain: String,
    path: String,
    cookie: Cookie<'static>,
}

impl Entry {
    fn key(&self) -> (&str, &str, &str) {
        (&self.domain, &self.path, self.cookie.name())
    }
}

/// Stores cookies between exchanges and matches them by domain and path.
///
/// At most one live cookie exists per `(domain, path, name)` key; a later
/// write for the same key overwrites the earlier one and takes its place at
/// the end of the insertion order.
#[derive(Default)]
pub struct Jar {
    entries: Vec<Entry>,
}

impl Jar {
    /// Creates an empty [`Jar`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts `cookie`, keyed by its own domain/path attributes
    pub fn set(&mut self, cookie: Cookie<'static>) {
        self.set_in_context(cookie, DEFAULT_HOST, "/");
    }

    /// Upserts `cookie` received in a response for `host` and `request_path`
    fn set_in_context(&mut self, cookie: Cookie<'static>, host: &str, request_path: &str) {
        let domain = cookie
            .domain()
            .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
            .unwrap_or_else(|| host.to_ascii_lowercase());
        let path = cookie
            .path()
            .map(str::to_owned)
            .unwrap_or_else(|| default_path(request_path));

        let entry = Entry { domain, path, cookie };
        self.entries.retain(|existing| existing.key() != entry.key());
        self.entries.push(entry);
    }

    /// Parses every `Set-Cookie` header of a response into the jar.
    ///
    /// Malformed headers are skipped; a bad cookie never fails the exchange.
    pub(crate) fn store_response(&mut self, headers: &HeaderMap, host: &str, request_path: &str) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                tracing::warn!("skipping non-ascii set-cookie header");
                continue;
            };
            match Cookie::parse_encoded(raw.to_owned()) {
                Ok(cookie) => self.set_in_context(cookie, host, request_path),
                Err(err) => tracing::warn!(error = %err, "skipping malformed set-cookie header"),
            }
        }
    }

    /// Serializes all live cookies matching `host` and `path` into a
    /// `Cookie` header value, in insertion order of last write
    pub fn header_for(&self, host: &str, path: &str) -> Option<String> {
        let host = host.to_ascii_lowercase();
        let serialized = self.entries
            .iter()
            .filter(|entry| {
                !is_expired(&entry.cookie)
                    && domain_match(&host, &entry.domain)
                    && path_match(path, &entry.path)
            })
            .map(|entry| entry.cookie.stripped().encoded().to_string())
            .collect::<Vec<_>>();

        if serialized.is_empty() {
            None
        } else {
            Some(serialized.join("; "))
        }
    }

    /// Returns the first live cookie with the given name, if any
    pub fn get(&self, name: &str) -> Option<&Cookie<'static>> {
        self.entries
            .iter()
            .find(|entry| entry.cookie.name() == name && !is_expired(&entry.cookie))
            .map(|entry| &entry.cookie)
    }

    /// Drops every expired entry
    pub fn sweep(&mut self) {
        self.entries.retain(|entry| !is_expired(&entry.cookie));
    }

    /// Removes all cookies
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates over all stored cookies, expired ones included
    pub fn iter(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.entries.iter().map(|entry| &entry.cookie)
    }
}

/// Serializes explicit override pairs into a `Cookie` header value
pub(crate) fn header_from_pairs(pairs: &[(String, String)]) -> Option<String> {
    if pairs.is_empty() {
        return None;
    }
    let serialized = pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>();
    Some(serialized.join("; "))
}

fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(idx) => request_path[..idx].to_owned(),
    }
}

fn domain_match(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn path_match(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || request_path
            .strip_prefix(cookie_path)
            .is_some_and(|rest| cookie_path.ends_with('/') || rest.starts_with('/'))
}

fn is_expired(cookie: &Cookie<'_>) -> bool {
    if cookie.max_age().is_some_and(|age| age.is_zero() || age.is_negative()) {
        return true;
    }
    matches!(
        cookie.expires(),
        Some(Expiration::DateTime(at)) if at.unix_timestamp() <= now_unix()
    )
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn it_keeps_the_last_write_per_key() {
        let mut jar = Jar::new();
        jar.set(Cookie::new("session", "first"));
        jar.set(Cookie::new("session", "second"));

        assert_eq!(jar.iter().count(), 1);
        assert_eq!(jar.get("session").unwrap().value(), "second");
    }

    #[test]
    fn it_serializes_in_last_write_order() {
        let mut jar = Jar::new();
        jar.set(Cookie::new("a", "1"));
        jar.set(Cookie::new("b", "2"));
        jar.set(Cookie::new("a", "3"));

        assert_eq!(jar.header_for("localhost", "/").unwrap(), "b=2; a=3");
    }

    #[test]
    fn it_matches_domains_on_dot_boundaries() {
        let mut jar = Jar::new();
        let mut cookie = Cookie::new("site", "1");
        cookie.set_domain("example.com");
        jar.set(cookie);

        assert!(jar.header_for("example.com", "/").is_some());
        assert!(jar.header_for("api.example.com", "/").is_some());
        assert!(jar.header_for("notexample.com", "/").is_none());
    }

    #[test]
    fn it_matches_paths_on_segment_boundaries() {
        let mut jar = Jar::new();
        let mut cookie = Cookie::new("scoped", "1");
        cookie.set_path("/admin");
        jar.set(cookie);

        assert!(jar.header_for("localhost", "/admin").is_some());
        assert!(jar.header_for("localhost", "/admin/users").is_some());
        assert!(jar.header_for("localhost", "/administrator").is_none());
    }

    #[test]
    fn it_excludes_expired_cookies() {
        let mut jar = Jar::new();
        let mut gone = Cookie::new("gone", "1");
        gone.set_max_age(cookie::time::Duration::ZERO);
        jar.set(gone);
        jar.set(Cookie::new("live", "2"));

        assert_eq!(jar.header_for("localhost", "/").unwrap(), "live=2");

        jar.sweep();
        assert_eq!(jar.iter().count(), 1);
    }

    #[test]
    fn it_ignores_malformed_set_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("no-equals-sign"));
        headers.append(SET_COOKIE, HeaderValue::from_static("good=yes"));

        let mut jar = Jar::new();
        jar.store_response(&headers, "localhost", "/");

        assert_eq!(jar.iter().count(), 1);
        assert_eq!(jar.get("good").unwrap().value(), "yes");
    }

    #[test]
    fn it_defaults_the_path_to_the_request_directory() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("deep=1"));

        let mut jar = Jar::new();
        jar.store_response(&headers, "localhost", "/account/settings");

        assert!(jar.header_for("localhost", "/account/profile").is_some());
        assert!(jar.header_for("localhost", "/").is_none());
    }

    #[test]
    fn it_clears() {
        let mut jar = Jar::new();
        jar.set(Cookie::new("a", "1"));
        jar.clear();

        assert!(jar.header_for("localhost", "/").is_none());
    }
}
