//! Type definitions for expectations.
//!
//! An [`Expectation`] is immutable once registered. All configuration goes
//! through [`super::ExpectationBuilder`] and is frozen by `reply`.

use crate::signal::CompletionSignal;
use hyper::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Payloads
// ============================================================================

/// A body value, either plain text or JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// Expected request body.
///
/// The representation is chosen once, when the expectation is finalized, and
/// must agree with the representation of the decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyMatcher {
    /// Compared against the text of a `text/*` request
    Raw(String),
    /// Compared against JSON or form data
    Structured(Value),
}

// ============================================================================
// Reply
// ============================================================================

/// Producer invoked on every match of an expectation with a lazy body.
pub type BodyProducer = Arc<dyn Fn() -> Payload + Send + Sync>;

/// Body of the reply sent for a matched expectation.
#[derive(Clone, Default)]
pub enum ReplyBody {
    #[default]
    Empty,
    Literal(Payload),
    /// Re-evaluated for every match, never cached
    Lazy(BodyProducer),
}

impl ReplyBody {
    /// A body computed by `producer` each time the expectation is matched.
    pub fn lazy<F, P>(producer: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Into<Payload>,
    {
        ReplyBody::Lazy(Arc::new(move || producer().into()))
    }

    /// Resolve the payload for one reply.
    pub fn resolve(&self) -> Option<Payload> {
        match self {
            ReplyBody::Empty => None,
            ReplyBody::Literal(payload) => Some(payload.clone()),
            ReplyBody::Lazy(producer) => Some(producer()),
        }
    }
}

impl fmt::Debug for ReplyBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyBody::Empty => f.write_str("Empty"),
            ReplyBody::Literal(payload) => f.debug_tuple("Literal").field(payload).finish(),
            ReplyBody::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl From<()> for ReplyBody {
    fn from(_: ()) -> Self {
        ReplyBody::Empty
    }
}

impl From<&str> for ReplyBody {
    fn from(text: &str) -> Self {
        ReplyBody::Literal(text.into())
    }
}

impl From<String> for ReplyBody {
    fn from(text: String) -> Self {
        ReplyBody::Literal(text.into())
    }
}

impl From<Value> for ReplyBody {
    fn from(value: Value) -> Self {
        ReplyBody::Literal(value.into())
    }
}

impl From<Payload> for ReplyBody {
    fn from(payload: Payload) -> Self {
        ReplyBody::Literal(payload)
    }
}

/// Status, body and headers sent back for a matched expectation.
#[derive(Debug, Clone)]
pub struct ReplySpec {
    pub status: u16,
    pub body: ReplyBody,
    /// Response headers in insertion order
    pub headers: Vec<(String, String)>,
}

// ============================================================================
// Expectation
// ============================================================================

/// What happens to a request that reaches an expectation it does not match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    /// Reject the request with a failing response
    #[default]
    Fail,
    /// Let the next expectation for the route try, 404 when none is left
    Fallthrough,
}

/// A finalized, matchable rule.
#[derive(Debug)]
pub struct Expectation {
    pub method: Method,
    pub path: String,
    pub query: Option<HashMap<String, String>>,
    /// Header names are lower-cased
    pub headers: HashMap<String, String>,
    pub body: Option<BodyMatcher>,
    pub reply: ReplySpec,
    pub delay: Option<Duration>,
    pub persist: bool,
    pub on_unmatched: UnmatchedPolicy,
    pub signal: CompletionSignal,
}

impl Expectation {
    /// `METHOD /path`, used in logs and error messages.
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}
