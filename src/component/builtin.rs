//! Components available to every descriptor without registration.
//!
//! | Reference                  | Kind     | Init parameters                  |
//! |----------------------------|----------|----------------------------------|
//! | `builtin.TextServlet`      | servlet  | `body`, `content-type`, `status` |
//! | `builtin.HeaderFilter`     | filter   | `name`, `value`                  |
//! | `builtin.LifecycleLogger`  | listener |                                  |

use crate::component::{ComponentConfig, ComponentError, Filter, FilterChain, Servlet};
use crate::context::listener::ContextListener;
use crate::context::AppContext;
use crate::http::{Request, Response};

/// Answers every request with a fixed body.
#[derive(Debug, Clone)]
pub struct TextServlet {
    body: String,
    content_type: String,
    status: u16,
}

impl TextServlet {
    pub const CLASS: &'static str = "builtin.TextServlet";
}

impl Default for TextServlet {
    fn default() -> Self {
        Self {
            body: String::new(),
            content_type: "text/plain; charset=utf-8".to_string(),
            status: 200,
        }
    }
}

impl Servlet for TextServlet {
    fn init(&mut self, config: &ComponentConfig) -> Result<(), ComponentError> {
        if let Some(body) = config.init_parameter("body") {
            self.body = body.to_string();
        }
        if let Some(content_type) = config.init_parameter("content-type") {
            self.content_type = content_type.to_string();
        }
        if let Some(status) = config.init_parameter("status") {
            self.status = status
                .parse()
                .map_err(|_| ComponentError::failed(format!("invalid status `{status}` for {}", config.name)))?;
        }
        Ok(())
    }

    fn service(&self, _request: &Request, response: &mut Response) -> Result<(), ComponentError> {
        response.set_status(self.status);
        response.set_header("Content-Type", self.content_type.as_str());
        response.write(self.body.as_bytes());
        Ok(())
    }
}

/// Adds one response header, then continues the chain.
#[derive(Debug, Clone, Default)]
pub struct HeaderFilter {
    name: String,
    value: String,
}

impl HeaderFilter {
    pub const CLASS: &'static str = "builtin.HeaderFilter";
}

impl Filter for HeaderFilter {
    fn init(&mut self, config: &ComponentConfig) -> Result<(), ComponentError> {
        self.name = config.require("name")?.to_string();
        self.value = config.init_parameter("value").unwrap_or_default().to_string();
        Ok(())
    }

    fn do_filter(
        &self,
        request: &Request,
        response: &mut Response,
        chain: FilterChain<'_>,
    ) -> Result<(), ComponentError> {
        response.add_header(self.name.as_str(), self.value.as_str());
        chain.proceed(request, response)
    }
}

/// Logs context initialization and teardown.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleLogger;

impl LifecycleLogger {
    pub const CLASS: &'static str = "builtin.LifecycleLogger";
}

impl ContextListener for LifecycleLogger {
    fn context_initialized(&self, context: &AppContext) {
        tracing::info!(app = %context.id(), context_path = %context.context_path(), "Context initialized");
    }

    fn context_destroyed(&self, context: &AppContext) {
        tracing::info!(app = %context.id(), context_path = %context.context_path(), "Context destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_servlet_uses_init_params() {
        let mut servlet = TextServlet::default();
        servlet
            .init(&ComponentConfig::new(
                "hello",
                vec![
                    ("body".into(), "hi".into()),
                    ("content-type".into(), "text/html".into()),
                    ("status".into(), "201".into()),
                ],
            ))
            .unwrap();

        let request = Request::from_bytes(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let mut response = Response::new();
        servlet.service(&request, &mut response).unwrap();

        assert_eq!(response.status(), 201);
        assert_eq!(response.header("Content-Type"), Some("text/html"));
        assert_eq!(response.body(), b"hi");
    }

    #[test]
    fn text_servlet_rejects_bad_status() {
        let mut servlet = TextServlet::default();
        let config = ComponentConfig::new("bad", vec![("status".into(), "abc".into())]);
        assert!(servlet.init(&config).is_err());
    }

    #[test]
    fn header_filter_requires_name() {
        let mut filter = HeaderFilter::default();
        assert!(matches!(
            filter.init(&ComponentConfig::default()),
            Err(ComponentError::MissingParameter(_))
        ));
    }
}
