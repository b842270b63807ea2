//! End-to-end requests over real sockets, run against both connectors.

mod common;

use app_router::component::{ComponentError, ComponentRegistry, Servlet};
use app_router::config::ConnectorKind;
use app_router::http::{Request, Response};
use tempfile::TempDir;

use common::{build_server, get, parse_reply, run, send, servlets_descriptor, text_descriptor, write_app};

const CONNECTORS: [ConnectorKind; 2] = [ConnectorKind::Blocking, ConnectorKind::Reactor];

struct Failing;

impl Servlet for Failing {
    fn service(&self, _request: &Request, _response: &mut Response) -> Result<(), ComponentError> {
        Err(ComponentError::failed("backend unavailable"))
    }
}

struct Panicking;

impl Servlet for Panicking {
    fn service(&self, _request: &Request, _response: &mut Response) -> Result<(), ComponentError> {
        panic!("servlet bug");
    }
}

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::with_builtins();
    registry
        .register_servlet("it.Failing", || Box::new(Failing))
        .register_servlet("it.Panicking", || Box::new(Panicking));
    registry
}

#[test]
fn serves_installed_application() {
    for kind in CONNECTORS {
        let dir = TempDir::new().unwrap();
        let root = write_app(dir.path(), "shop", &text_descriptor("/catalog/*", "catalog"));
        let server = build_server(kind, registry());
        server.add_app(&root).unwrap();

        let running = run(server);
        let reply = get(running.addr, "/shop/catalog/42");
        assert_eq!(reply.status, 200, "{kind}");
        assert_eq!(reply.body, "catalog", "{kind}");
        assert!(reply.head.contains("Content-Length: 7"), "{kind}");
        assert!(reply.head.contains("Server: "), "{kind}");
        running.shutdown().unwrap();
    }
}

#[test]
fn unclaimed_path_is_404() {
    for kind in CONNECTORS {
        let dir = TempDir::new().unwrap();
        let root = write_app(dir.path(), "shop", &text_descriptor("/catalog/*", "catalog"));
        let server = build_server(kind, registry());
        server.add_app(&root).unwrap();

        let running = run(server);
        assert_eq!(get(running.addr, "/nowhere").status, 404, "{kind}");
        assert_eq!(get(running.addr, "/shop/cart").status, 404, "{kind}");
        running.shutdown().unwrap();
    }
}

#[test]
fn root_application_catches_the_rest() {
    for kind in CONNECTORS {
        let dir = TempDir::new().unwrap();
        let shop = write_app(dir.path(), "shop", &text_descriptor("/catalog/*", "catalog"));
        let root = write_app(dir.path(), "ROOT", &text_descriptor("/", "home"));
        let server = build_server(kind, registry());
        server.add_app(&shop).unwrap();
        server.add_app(&root).unwrap();

        let running = run(server);
        assert_eq!(get(running.addr, "/").body, "home", "{kind}");
        assert_eq!(get(running.addr, "/favicon.ico").body, "home", "{kind}");
        assert_eq!(get(running.addr, "/shop/cart").body, "home", "{kind}");
        assert_eq!(get(running.addr, "/shop/catalog/1").body, "catalog", "{kind}");
        running.shutdown().unwrap();
    }
}

#[test]
fn malformed_request_is_400() {
    for kind in CONNECTORS {
        let server = build_server(kind, registry());
        let running = run(server);
        let reply = parse_reply(&send(running.addr, b"NONSENSE\r\n\r\n"));
        assert_eq!(reply.status, 400, "{kind}");
        let reply = parse_reply(&send(running.addr, b"GET / HTTP/1.1\r\nno colon here\r\n\r\n"));
        assert_eq!(reply.status, 400, "{kind}");
        running.shutdown().unwrap();
    }
}

#[test]
fn failing_and_panicking_servlets_are_500() {
    let descriptor = servlets_descriptor(&[
        ("failing", "it.Failing", "/fail"),
        ("panicking", "it.Panicking", "/panic"),
    ]);
    for kind in CONNECTORS {
        let dir = TempDir::new().unwrap();
        let root = write_app(dir.path(), "api", &descriptor);
        let server = build_server(kind, registry());
        server.add_app(&root).unwrap();

        let running = run(server);
        let reply = get(running.addr, "/api/fail");
        assert_eq!(reply.status, 500, "{kind}");
        assert!(reply.body.is_empty(), "{kind}");
        assert_eq!(get(running.addr, "/api/panic").status, 500, "{kind}");
        // The connector keeps serving after a panic.
        assert_eq!(get(running.addr, "/api/fail").status, 500, "{kind}");
        running.shutdown().unwrap();
    }
}

#[test]
fn request_body_is_discarded() {
    for kind in CONNECTORS {
        let dir = TempDir::new().unwrap();
        let root = write_app(dir.path(), "echo", &text_descriptor("/*", "ok"));
        let server = build_server(kind, registry());
        server.add_app(&root).unwrap();

        let running = run(server);
        let raw = b"POST /echo/upload HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world";
        let reply = parse_reply(&send(running.addr, raw));
        assert_eq!(reply.status, 200, "{kind}");
        assert_eq!(reply.body, "ok", "{kind}");
        running.shutdown().unwrap();
    }
}

#[test]
fn filters_and_error_pages_apply_over_the_wire() {
    let descriptor = r#"<web-app>
  <servlet>
    <servlet-name>page</servlet-name>
    <servlet-class>builtin.TextServlet</servlet-class>
    <init-param><param-name>body</param-name><param-value>page</param-value></init-param>
  </servlet>
  <servlet>
    <servlet-name>gone</servlet-name>
    <servlet-class>builtin.TextServlet</servlet-class>
    <init-param><param-name>status</param-name><param-value>404</param-value></init-param>
  </servlet>
  <servlet>
    <servlet-name>missing</servlet-name>
    <servlet-class>builtin.TextServlet</servlet-class>
    <init-param><param-name>body</param-name><param-value>custom not found</param-value></init-param>
  </servlet>
  <servlet-mapping><servlet-name>page</servlet-name><url-pattern>/page</url-pattern></servlet-mapping>
  <servlet-mapping><servlet-name>gone</servlet-name><url-pattern>/gone</url-pattern></servlet-mapping>
  <servlet-mapping><servlet-name>missing</servlet-name><url-pattern>/missing</url-pattern></servlet-mapping>
  <filter>
    <filter-name>tag</filter-name>
    <filter-class>builtin.HeaderFilter</filter-class>
    <init-param><param-name>name</param-name><param-value>X-App</param-value></init-param>
    <init-param><param-name>value</param-name><param-value>site</param-value></init-param>
  </filter>
  <filter-mapping><filter-name>tag</filter-name><url-pattern>/*</url-pattern></filter-mapping>
  <error-page><error-code>404</error-code><location>/missing</location></error-page>
</web-app>
"#;
    for kind in CONNECTORS {
        let dir = TempDir::new().unwrap();
        let root = write_app(dir.path(), "site", descriptor);
        let server = build_server(kind, registry());
        server.add_app(&root).unwrap();

        let running = run(server);
        let reply = get(running.addr, "/site/page");
        assert_eq!(reply.body, "page", "{kind}");
        assert!(reply.head.contains("X-App: site"), "{kind}");

        let reply = get(running.addr, "/site/gone");
        assert_eq!(reply.status, 404, "{kind}");
        assert_eq!(reply.body, "custom not found", "{kind}");
        running.shutdown().unwrap();
    }
}
