//! Response under construction.
//!
//! # Responsibilities
//! - Collect status, headers, cookies and body produced by components
//! - Stay mutable until the connector renders it
//!
//! # Design Decisions
//! - Status defaults to 200
//! - Body is buffered; the connector writes it after the rendered head

use crate::http::cookie::Cookie;
use crate::http::headers::MultiMap;

/// A mutable response, rendered by the wire codec once dispatch returns.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: MultiMap,
    cookies: Vec<Cookie>,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: MultiMap::new(),
            cookies: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A bodiless response carrying only a status code.
    pub fn with_status(status: u16) -> Self {
        let mut response = Self::new();
        response.status = status;
        response
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Append a header value, keeping any existing values.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.append(name, value);
    }

    /// Replace all values of a header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn contains_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    pub fn header_map(&self) -> &MultiMap {
        &self.headers
    }

    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Append bytes to the body buffer.
    pub fn write(&mut self, bytes: impl AsRef<[u8]>) {
        self.body.extend_from_slice(bytes.as_ref());
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    /// Set an error status and drop whatever was buffered so far.
    pub fn send_error(&mut self, status: u16) {
        self.reset();
        self.status = status;
    }

    /// Return to the freshly created state.
    pub fn reset(&mut self) {
        self.status = 200;
        self.headers.clear();
        self.cookies.clear();
        self.body.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ok() {
        let response = Response::new();
        assert_eq!(response.status(), 200);
        assert!(response.body().is_empty());
    }

    #[test]
    fn send_error_discards_buffered_output() {
        let mut response = Response::new();
        response.add_header("X-Trace", "1");
        response.write("partial");
        response.send_error(500);
        assert_eq!(response.status(), 500);
        assert!(response.body().is_empty());
        assert!(!response.contains_header("X-Trace"));
    }
}
