//! Seams between connectors, the server, and the fallback handler.

use crate::http::{Request, Response};

/// Receives every decoded request from a connector.
pub trait HttpDispatcher: Send + Sync {
    fn handle_http(&self, request: &Request, response: &mut Response);
}

/// Handles requests no installed application claims.
pub trait DefaultHandler: Send + Sync {
    fn handle(&self, request: &Request, response: &mut Response);
}

/// Answers `404` with an empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFoundHandler;

impl DefaultHandler for NotFoundHandler {
    fn handle(&self, request: &Request, response: &mut Response) {
        tracing::debug!(method = %request.method(), path = %request.path(), "No application claimed request");
        response.send_error(404);
    }
}
