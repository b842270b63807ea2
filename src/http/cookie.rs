//! Cookie model shared by requests and responses.
//!
//! Request cookies only carry a name and value; the remaining attributes are
//! emitted on `Set-Cookie` lines.

use std::fmt;
use std::time::SystemTime;

/// A single HTTP cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    max_age: Option<i64>,
    expires: Option<SystemTime>,
    secure: bool,
    http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            max_age: None,
            expires: None,
            secure: false,
            http_only: false,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn with_expires(mut self, at: SystemTime) -> Self {
        self.expires = Some(at);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn max_age(&self) -> Option<i64> {
        self.max_age
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }
}

/// Renders the `Set-Cookie` header value.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={}", domain)?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={}", path)?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age)?;
        }
        if let Some(expires) = self.expires {
            write!(f, "; Expires={}", httpdate::fmt_http_date(expires))?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        Ok(())
    }
}

/// Parse the value of a `Cookie` request header.
///
/// Entries are separated by `"; "`; each entry splits on its first `=`.
/// An entry without `=` becomes a cookie with an empty value.
pub fn parse_cookie_header(text: &str) -> Vec<Cookie> {
    text.split("; ")
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) => Cookie::new(name.trim_end(), value.trim_start()),
            None => Cookie::new(entry, ""),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn parses_pairs_in_order() {
        let cookies = parse_cookie_header("a=1; b=2");
        assert_eq!(cookies, vec![Cookie::new("a", "1"), Cookie::new("b", "2")]);
    }

    #[test]
    fn value_may_contain_equals() {
        let cookies = parse_cookie_header("token=abc=def");
        assert_eq!(cookies[0].value(), "abc=def");
    }

    #[test]
    fn skips_empty_entries() {
        let cookies = parse_cookie_header("a=1; ");
        assert_eq!(cookies.len(), 1);
    }

    #[test]
    fn renders_attributes() {
        let cookie = Cookie::new("sid", "42")
            .with_path("/app")
            .with_max_age(60)
            .with_expires(UNIX_EPOCH + Duration::from_secs(784111777))
            .secure(true)
            .http_only(true);
        assert_eq!(
            cookie.to_string(),
            "sid=42; Path=/app; Max-Age=60; Expires=Sun, 06 Nov 1994 08:49:37 GMT; Secure; HttpOnly"
        );
    }
}
