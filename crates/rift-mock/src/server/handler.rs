//! Request handling for the mock server.
//!
//! Collects the body, runs the middleware chain, decodes the request into a
//! fingerprint, resolves it against the registry, and turns the outcome into
//! a response.

use super::middleware::{run_chain, MockRequest};
use super::ServerState;
use crate::error::MockError;
use crate::fingerprint::RequestFingerprint;
use crate::registry::MatchOutcome;
use crate::reply::{build_response, build_response_with_headers, dispatch};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Header set on responses produced by a matcher rejection.
pub const MISMATCH_HEADER: &str = "x-rift-mock-mismatch";

/// Handle a request to the mock server
pub async fn handle_mock_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
    client_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body from {}: {}", client_addr, e);
            return Ok(build_response(StatusCode::BAD_REQUEST, "Unreadable request body"));
        }
    };

    let mut request = MockRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    };

    if let Some(response) = run_chain(&state.middlewares, &mut request) {
        debug!("{} {} answered by middleware", request.method, request.uri);
        return Ok(response);
    }

    Ok(respond(&state, request).await)
}

/// Resolve a request against the registry and build the response.
pub(crate) async fn respond(state: &ServerState, request: MockRequest) -> Response<Full<Bytes>> {
    let path = request.uri.path().to_string();
    let url = request.url();

    let fingerprint =
        match RequestFingerprint::from_parts(&request.uri, &request.headers, &request.body) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!("{} {}: {}", request.method, url, e);
                return build_response(StatusCode::BAD_REQUEST, e.to_string());
            }
        };

    match state.registry.resolve(&request.method, &path, &fingerprint) {
        MatchOutcome::Matched(expectation) => {
            debug!("{} matched {}", url, expectation.route());
            dispatch(expectation, url).await
        }
        MatchOutcome::Rejected(mismatch) => {
            let error = MockError::MatchFailed(mismatch);
            warn!("Rejected {} {}: {}", request.method, url, error);
            build_response_with_headers(
                StatusCode::INTERNAL_SERVER_ERROR,
                [(MISMATCH_HEADER, "true")],
                error.to_string(),
            )
        }
        MatchOutcome::Unmatched => {
            debug!("No expectation accepted {} {}", request.method, url);
            build_response(
                StatusCode::NOT_FOUND,
                format!("No expectation matched {} {}", request.method, path),
            )
        }
        MatchOutcome::NoRoute => {
            let error = MockError::NoRoute {
                method: request.method.to_string(),
                path,
            };
            debug!("{}", error);
            build_response(StatusCode::NOT_FOUND, error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::ExpectationBuilder;
    use crate::registry::ExpectationRegistry;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::{HeaderMap, Method};
    use serde_json::json;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn state() -> ServerState {
        ServerState {
            registry: Arc::new(ExpectationRegistry::new()),
            middlewares: Vec::new(),
            error_handler: None,
        }
    }

    fn expect(state: &ServerState, method: Method, path: &str) -> ExpectationBuilder {
        ExpectationBuilder::new(
            Arc::clone(&state.registry),
            method,
            path,
            Duration::from_millis(2000),
        )
    }

    fn json_request(method: Method, uri: &str, body: &str) -> MockRequest {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        MockRequest {
            method,
            uri: uri.parse().unwrap(),
            headers,
            body: Bytes::from(body.to_string()),
        }
    }

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_respond_matched() {
        let state = state();
        let signal = expect(&state, Method::POST, "/get")
            .send(json!({"foo": "bar"}))
            .reply(200, "ok");

        let response = respond(&state, json_request(Method::POST, "/get?x=1", r#"{"foo":"bar"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
        assert_eq!(signal.completed_urls(), vec!["/get?x=1"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_respond_rejected_is_logged() {
        let state = state();
        let signal = expect(&state, Method::POST, "/get")
            .send(json!({"foo": "bar"}))
            .reply(200, ());

        let response = respond(&state, json_request(Method::POST, "/get", r#"{"foo":"baz"}"#)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[MISMATCH_HEADER], "true");
        assert!(body_string(response).await.contains("body mismatch"));
        assert!(logs_contain("Rejected POST /get"));
        assert!(!signal.is_done());
    }

    #[tokio::test]
    async fn test_respond_no_route() {
        let state = state();
        let response = respond(&state, json_request(Method::GET, "/missing", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_string(response).await,
            "No expectation registered for GET /missing"
        );
    }

    #[tokio::test]
    async fn test_respond_unmatched_fallthrough() {
        let state = state();
        expect(&state, Method::GET, "/route")
            .query("id=1")
            .skip_unmatched_requests()
            .reply(200, ());

        let response = respond(&state, json_request(Method::GET, "/route?id=3", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_respond_invalid_json() {
        let state = state();
        expect(&state, Method::POST, "/get").reply(200, ());

        let response = respond(&state, json_request(Method::POST, "/get", "{oops")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // The expectation is still pending
        assert_eq!(state.registry.len(), 1);
    }
}
