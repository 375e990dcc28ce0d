//! Request middleware run before decoding and matching.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Method, Response, Uri};

/// An incoming request as seen by middleware, with its body already collected.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl MockRequest {
    /// Path and query of the request, as recorded in completed URLs.
    pub fn url(&self) -> String {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| self.uri.path().to_string())
    }
}

/// What the server does after a middleware ran.
#[derive(Debug)]
pub enum MiddlewareAction {
    /// Hand the (possibly rewritten) request to the next middleware
    Continue,
    /// Answer immediately, skipping matching
    Respond(Response<Full<Bytes>>),
}

/// Hook applied to every request in registration order.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, request: &mut MockRequest) -> MiddlewareAction;
}

impl<F> Middleware for F
where
    F: Fn(&mut MockRequest) -> MiddlewareAction + Send + Sync + 'static,
{
    fn handle(&self, request: &mut MockRequest) -> MiddlewareAction {
        self(request)
    }
}

/// Run `middlewares` in order until one responds.
pub(crate) fn run_chain(
    middlewares: &[std::sync::Arc<dyn Middleware>],
    request: &mut MockRequest,
) -> Option<Response<Full<Bytes>>> {
    for middleware in middlewares {
        if let MiddlewareAction::Respond(response) = middleware.handle(request) {
            return Some(response);
        }
    }
    None
}
