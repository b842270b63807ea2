//! Wire codec: request heads in, response heads out.
//!
//! # Responsibilities
//! - Parse a request line and header section from any `BufRead`
//! - Locate the end of a head inside a byte buffer (reactor framing)
//! - Render a response status line, default headers and cookies
//!
//! # Design Decisions
//! - Stateless free functions; connectors own the sockets
//! - Lines end in CRLF or bare LF
//! - The body is never read here; see [`Request::has_unconsumed_body`]
//! - Malformed input is a [`ProtocolError`], never a partially filled request

use std::fmt::Write as _;
use std::io::BufRead;
use std::net::SocketAddr;
use std::time::SystemTime;

use crate::http::cookie::parse_cookie_header;
use crate::http::headers::MultiMap;
use crate::http::request::{Request, RequestHead};
use crate::http::response::Response;

/// Value of the default `Server` header.
pub const SERVER_IDENTIFIER: &str = concat!("app-router/", env!("CARGO_PKG_VERSION"));

/// Upper bound for a request head (request line plus headers).
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Client-side framing errors. Connectors answer these with `400`.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("stream ended before the blank line terminating the headers")]
    UnterminatedHeaders,

    #[error("request head is not valid UTF-8")]
    InvalidEncoding,

    #[error("request head exceeds {MAX_HEAD_BYTES} bytes")]
    HeadTooLarge,

    #[error("failed to read request: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse one request head from `reader`.
///
/// Reads until the first empty line. Leading empty lines are skipped.
pub fn parse_request<R: BufRead>(
    reader: &mut R,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
) -> Result<Request, ProtocolError> {
    let mut consumed = 0usize;
    let mut line = Vec::with_capacity(128);
    let mut head: Option<RequestHead> = None;

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            return Err(ProtocolError::UnterminatedHeaders);
        }
        consumed += read;
        if consumed > MAX_HEAD_BYTES {
            return Err(ProtocolError::HeadTooLarge);
        }

        let text = std::str::from_utf8(trim_line_ending(&line)).map_err(|_| ProtocolError::InvalidEncoding)?;

        match head.as_mut() {
            None if text.is_empty() => continue,
            None => head = Some(parse_request_line(text)?),
            Some(_) if text.is_empty() => break,
            Some(head) => parse_header_line(text, head)?,
        }
    }

    // The loop only breaks once a request line has been parsed.
    let head = head.ok_or(ProtocolError::UnterminatedHeaders)?;
    Ok(Request::from_head(head, local_addr, remote_addr))
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_request_line(line: &str) -> Result<RequestHead, ProtocolError> {
    let tokens: Vec<&str> = line.split(' ').collect();
    let [method, target, protocol] = tokens.as_slice() else {
        return Err(ProtocolError::MalformedRequestLine(line.to_string()));
    };
    if method.is_empty() || target.is_empty() || protocol.is_empty() {
        return Err(ProtocolError::MalformedRequestLine(line.to_string()));
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (*target, None),
    };

    let mut parameters = MultiMap::new();
    if let Some(query) = query {
        parse_query(query, &mut parameters);
    }

    Ok(RequestHead {
        method: method.to_string(),
        path: path.to_string(),
        query: query.map(str::to_string),
        protocol: protocol.to_string(),
        headers: MultiMap::new(),
        parameters,
        cookies: Vec::new(),
    })
}

fn parse_header_line(line: &str, head: &mut RequestHead) -> Result<(), ProtocolError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
    let name = name.trim_end();
    let value = value.trim_start();
    if name.is_empty() {
        return Err(ProtocolError::MalformedHeader(line.to_string()));
    }

    if name.eq_ignore_ascii_case("Cookie") {
        head.cookies.extend(parse_cookie_header(value));
    } else {
        head.headers.append(name, value);
    }
    Ok(())
}

/// Split `a=1&b=2&b=3` into an ordered multi-valued map.
///
/// A pair without `=` gets an empty value.
pub fn parse_query(query: &str, into: &mut MultiMap) {
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((name, value)) => into.append(name, value),
            None => into.append(pair, ""),
        }
    }
}

/// Offset just past the blank line ending the head, if `buf` holds one.
///
/// Blank lines before the request line are not terminators, matching
/// [`parse_request`].
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    let mut seen_content = false;
    for (index, byte) in buf.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        let line = &buf[line_start..index];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if !line.is_empty() {
            seen_content = true;
        } else if seen_content {
            return Some(index + 1);
        }
        line_start = index + 1;
    }
    None
}

/// Render the status line and header section of `response`.
///
/// `Date`, `Server` and `Content-Length` are added only when the response
/// does not already carry them. The body is written separately.
pub fn render_response(response: &Response) -> Vec<u8> {
    render_response_at(response, SystemTime::now())
}

fn render_response_at(response: &Response, now: SystemTime) -> Vec<u8> {
    let headers = response.header_map();
    let mut out = String::with_capacity(256);

    // Writing into a String cannot fail.
    let _ = write!(out, "HTTP/1.1 {} OK\r\n", response.status());
    if !headers.contains_ignore_case("Date") {
        let _ = write!(out, "Date: {}\r\n", httpdate::fmt_http_date(now));
    }
    if !headers.contains_ignore_case("Server") {
        let _ = write!(out, "Server: {}\r\n", SERVER_IDENTIFIER);
    }
    if !headers.contains_ignore_case("Content-Length") {
        let _ = write!(out, "Content-Length: {}\r\n", response.body().len());
    }
    for cookie in response.cookies() {
        let _ = write!(out, "Set-Cookie: {}\r\n", cookie);
    }
    for (name, value) in headers.iter() {
        let _ = write!(out, "{}: {}\r\n", name, value);
    }
    out.push_str("\r\n");
    out.into_bytes()
}
