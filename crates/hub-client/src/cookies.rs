//! Cookie forwarding.
//!
//! The cookies of the originating request are replayed on the WebSocket
//! upgrade so the hub sees the caller's authenticated session.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

/// Read access to the cookie set of the current request.
pub trait CookieSource {
    /// Returns every `(name, value)` pair on the request.
    fn request_cookies(&self) -> Vec<(String, String)>;
}

impl CookieSource for Vec<(String, String)> {
    fn request_cookies(&self) -> Vec<(String, String)> {
        self.clone()
    }
}

impl CookieSource for HashMap<String, String> {
    fn request_cookies(&self) -> Vec<(String, String)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl CookieSource for BTreeMap<String, String> {
    fn request_cookies(&self) -> Vec<(String, String)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// A cookie bound to a domain and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

impl Cookie {
    /// Returns `true` if this cookie should be sent to `host` at `path`.
    pub fn matches(&self, host: &str, path: &str) -> bool {
        domain_matches(&self.domain, host) && path_matches(&self.path, path)
    }
}

fn domain_matches(domain: &str, host: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    if host.eq_ignore_ascii_case(domain) {
        return true;
    }
    host.len() > domain.len()
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
        && host.as_bytes()[host.len() - domain.len()..].eq_ignore_ascii_case(domain.as_bytes())
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path == request_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

const SEPARATORS: &[char] = &[
    '(', ')', '<', '>', '@', ',', ';', ':', '\\', '"', '/', '[', ']', '?', '=', '{', '}',
];

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('$')
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && !SEPARATORS.contains(&c))
}

fn valid_value(value: &str) -> bool {
    value
        .chars()
        .all(|c| !c.is_control() && c != ';' && c != ',')
}

/// Cookies to send with the hub connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every request cookie into a jar scoped to `host` and path `/`.
    ///
    /// Cookies whose name or value cannot be carried in a `Cookie` header are
    /// skipped with a warning.
    pub fn scoped_to(host: &str, source: &dyn CookieSource) -> Self {
        let mut jar = Self::new();
        for (name, value) in source.request_cookies() {
            jar.add(Cookie {
                name,
                value,
                domain: host.to_string(),
                path: "/".into(),
            });
        }
        debug!(host, count = jar.len(), "request cookies copied");
        jar
    }

    /// Adds a cookie, replacing one with the same name, domain and path.
    ///
    /// Returns `false` if the cookie was rejected.
    pub fn add(&mut self, cookie: Cookie) -> bool {
        if !valid_name(&cookie.name) || !valid_value(&cookie.value) {
            warn!(name = %cookie.name, "skipping cookie with invalid name or value");
            return false;
        }
        self.cookies.retain(|c| {
            !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
        });
        self.cookies.push(cookie);
        true
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Builds the `Cookie` header value for a request to `host` at `path`.
    ///
    /// Returns `None` when no cookie applies.
    pub fn header_for(&self, host: &str, path: &str) -> Option<String> {
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.matches(host, path))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}
