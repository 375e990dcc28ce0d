//! Reply scheduling for matched expectations.
//!
//! The reply body is resolved at send time, so lazy producers run once per
//! match. A delayed reply runs on its own task: it completes and records the
//! match even if the client gave up waiting.

use crate::expectation::{Expectation, Payload, ReplySpec};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, error};

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Build an HTTP response with the given status and body.
///
/// This function handles the unlikely case where Response::builder() fails
/// by returning a minimal 500 error response.
pub fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    build_response_with_headers(status, std::iter::empty::<(&str, &str)>(), body)
}

/// Build an HTTP response with headers.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder
        .body(Full::new(body.into()))
        .unwrap_or_else(|_| internal_error("Response build error"))
}

fn internal_error(message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message)));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Render a reply into a response, resolving the body now.
pub fn render_reply(reply: &ReplySpec) -> Response<Full<Bytes>> {
    let has_content_type = reply
        .headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));

    let (default_content_type, body) = match reply.body.resolve() {
        None => (None, Bytes::new()),
        Some(Payload::Text(text)) => (Some(TEXT_CONTENT_TYPE), Bytes::from(text)),
        Some(Payload::Json(value)) => match serde_json::to_vec(&value) {
            Ok(bytes) => (Some(JSON_CONTENT_TYPE), Bytes::from(bytes)),
            Err(e) => {
                error!("Failed to serialize reply body: {}", e);
                return internal_error("Reply body serialization error");
            }
        },
    };

    let mut builder = Response::builder().status(reply.status);
    for (name, value) in &reply.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let (Some(content_type), false) = (default_content_type, has_content_type) {
        builder = builder.header(CONTENT_TYPE, content_type);
    }

    builder.body(Full::new(body)).unwrap_or_else(|e| {
        error!("Invalid reply (status {}): {}", reply.status, e);
        internal_error("Response build error")
    })
}

/// Send the reply for a matched expectation, honoring its delay.
///
/// The match is recorded on the expectation's completion signal right before
/// the response is handed back.
pub async fn dispatch(expectation: Arc<Expectation>, url: String) -> Response<Full<Bytes>> {
    let Some(delay) = expectation.delay else {
        return send_now(&expectation, &url);
    };

    debug!("Delaying reply for {} by {:?}", expectation.route(), delay);
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        send_now(&expectation, &url)
    });

    match task.await {
        Ok(response) => response,
        Err(e) => {
            error!("Delayed reply task failed: {}", e);
            internal_error("Delayed reply failed")
        }
    }
}

fn send_now(expectation: &Expectation, url: &str) -> Response<Full<Bytes>> {
    let response = render_reply(&expectation.reply);
    expectation.signal.record_match(url);
    response
}
