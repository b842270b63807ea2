//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use app_router::component::ComponentRegistry;
use app_router::config::{ConnectorKind, ServerConfig};
use app_router::server::{Server, ServerError};

/// Write `<parent>/<name>/WEB-INF/web.xml` and return the application root.
pub fn write_app(parent: &Path, name: &str, descriptor: &str) -> PathBuf {
    let root = parent.join(name);
    let web_inf = root.join("WEB-INF");
    fs::create_dir_all(&web_inf).unwrap();
    fs::write(web_inf.join("web.xml"), descriptor).unwrap();
    root
}

/// Descriptor with one `builtin.TextServlet` answering `body` on `pattern`.
pub fn text_descriptor(pattern: &str, body: &str) -> String {
    format!(
        r#"<web-app>
  <servlet>
    <servlet-name>text</servlet-name>
    <servlet-class>builtin.TextServlet</servlet-class>
    <init-param>
      <param-name>body</param-name>
      <param-value>{body}</param-value>
    </init-param>
  </servlet>
  <servlet-mapping>
    <servlet-name>text</servlet-name>
    <url-pattern>{pattern}</url-pattern>
  </servlet-mapping>
</web-app>
"#
    )
}

/// Descriptor mapping each `(name, class, pattern)` servlet without parameters.
pub fn servlets_descriptor(servlets: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from("<web-app>\n");
    for (name, class, pattern) in servlets {
        xml.push_str(&format!(
            "  <servlet><servlet-name>{name}</servlet-name><servlet-class>{class}</servlet-class></servlet>\n  \
             <servlet-mapping><servlet-name>{name}</servlet-name><url-pattern>{pattern}</url-pattern></servlet-mapping>\n"
        ));
    }
    xml.push_str("</web-app>\n");
    xml
}

/// Server on an ephemeral loopback port using `kind`.
pub fn build_server(kind: ConnectorKind, registry: ComponentRegistry) -> Arc<Server> {
    build_server_with_workers(kind, registry, 4)
}

pub fn build_server_with_workers(kind: ConnectorKind, registry: ComponentRegistry, workers: usize) -> Arc<Server> {
    let mut config = ServerConfig::default();
    config.server.name = "it".to_string();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.connector.kind = kind;
    config.connector.worker_threads = workers;
    config.connector.queue_depth = 8;
    config.connector.drain_timeout_secs = 5;
    Arc::new(Server::from_config(&config, Arc::new(registry)))
}

/// A server whose `start` runs on a background thread.
pub struct Running {
    pub server: Arc<Server>,
    pub addr: SocketAddr,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl Running {
    /// Stop the server and wait for `start` to return.
    pub fn shutdown(self) -> Result<(), ServerError> {
        self.server.stop().unwrap();
        self.wait()
    }

    /// Wait for `start` to return after someone else stopped the server.
    pub fn wait(self) -> Result<(), ServerError> {
        self.handle.join().unwrap()
    }
}

pub fn run(server: Arc<Server>) -> Running {
    let runner = Arc::clone(&server);
    let handle = thread::spawn(move || runner.start());
    let addr = wait_for_addr(&server);
    Running { server, addr, handle }
}

pub fn wait_for_addr(server: &Server) -> SocketAddr {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(addr) = server.local_addr() {
            return addr;
        }
        assert!(Instant::now() < deadline, "server never bound");
        thread::sleep(Duration::from_millis(10));
    }
}

/// Write `raw`, close the write half, read until the server closes.
pub fn send(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(raw).unwrap();
    read_to_close(stream)
}

/// Send a GET for `path` without waiting for the reply.
pub fn open_get(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .write_all(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
        .unwrap();
    stream
}

pub fn read_to_close(mut stream: TcpStream) -> String {
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).unwrap();
    String::from_utf8_lossy(&reply).into_owned()
}

/// Poll `condition` every few milliseconds for up to five seconds.
pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

pub struct Reply {
    pub status: u16,
    pub head: String,
    pub body: String,
}

pub fn parse_reply(raw: &str) -> Reply {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
    let status = head
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    Reply {
        status,
        head: head.to_string(),
        body: body.to_string(),
    }
}

pub fn get(addr: SocketAddr, path: &str) -> Reply {
    let raw = send(addr, format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes());
    parse_reply(&raw)
}
