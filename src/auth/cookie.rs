//! Cookie parsing and Set-Cookie construction for authentication.

use axum::http::header;

/// Cookie name for the access token (short-lived, 1 hour by default).
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh token (long-lived, 7 days by default).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = value.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

/// Attributes shared by every cookie the server sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieSettings {
    /// Add the `Secure` flag (HTTPS deployments)
    pub secure: bool,
}

impl CookieSettings {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    /// Build a Set-Cookie value. SameSite=Lax so the cookies survive the
    /// redirect back from a third-party login.
    pub fn set(&self, name: &str, value: &str, max_age_secs: u64) -> String {
        self.build(name, value, "/", max_age_secs)
    }

    /// Build a Set-Cookie value scoped to `path`.
    pub fn set_with_path(&self, name: &str, value: &str, path: &str, max_age_secs: u64) -> String {
        self.build(name, value, path, max_age_secs)
    }

    /// Build a Set-Cookie value that removes the cookie.
    pub fn clear(&self, name: &str) -> String {
        self.build(name, "", "/", 0)
    }

    pub fn clear_with_path(&self, name: &str, path: &str) -> String {
        self.build(name, "", path, 0)
    }

    fn build(&self, name: &str, value: &str, path: &str, max_age_secs: u64) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}; HttpOnly; SameSite=Lax; Path={}; Max-Age={}{}",
            name, value, path, max_age_secs, secure
        )
    }
}

/// Name of the cookie a Set-Cookie value refers to.
pub fn set_cookie_name(set_cookie: &str) -> Option<&str> {
    set_cookie
        .split_once('=')
        .map(|(name, _)| name.trim())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_get_cookie_simple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("access_token=abc123"),
        );

        assert_eq!(get_cookie(&headers, "access_token"), Some("abc123"));
    }

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; access_token=abc123; refresh_token=xyz789"),
        );

        assert_eq!(get_cookie(&headers, "access_token"), Some("abc123"));
        assert_eq!(get_cookie(&headers, "refresh_token"), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_across_headers() {
        let mut headers = axum::http::HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("foo=bar"));
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("refresh_token=xyz789"),
        );

        assert_eq!(get_cookie(&headers, "refresh_token"), Some("xyz789"));
    }

    #[test]
    fn test_get_cookie_not_found() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("foo=bar"));

        assert_eq!(get_cookie(&headers, "access_token"), None);
    }

    #[test]
    fn test_get_cookie_no_header() {
        let headers = axum::http::HeaderMap::new();
        assert_eq!(get_cookie(&headers, "access_token"), None);
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("  access_token = abc123  ; foo=bar"),
        );

        assert_eq!(get_cookie(&headers, "access_token"), Some("abc123"));
    }

    #[test]
    fn test_set_and_clear_cookie() {
        let insecure = CookieSettings::new(false);
        assert_eq!(
            insecure.set(ACCESS_COOKIE_NAME, "tok", 3600),
            "access_token=tok; HttpOnly; SameSite=Lax; Path=/; Max-Age=3600"
        );
        assert_eq!(
            insecure.clear(REFRESH_COOKIE_NAME),
            "refresh_token=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0"
        );

        let secure = CookieSettings::new(true);
        assert!(secure.set(ACCESS_COOKIE_NAME, "tok", 3600).ends_with("; Secure"));
    }

    #[test]
    fn test_set_cookie_name() {
        assert_eq!(set_cookie_name("access_token=x; Path=/"), Some("access_token"));
        assert_eq!(set_cookie_name("=x"), None);
        assert_eq!(set_cookie_name("garbage"), None);
    }
}
