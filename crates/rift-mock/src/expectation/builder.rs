//! Chainable configuration of an expectation.

use super::types::{BodyMatcher, Expectation, Payload, ReplyBody, ReplySpec, UnmatchedPolicy};
use crate::fingerprint::{parse_query_string, string_map_to_value};
use crate::registry::ExpectationRegistry;
use crate::signal::CompletionSignal;
use hyper::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Values accepted by [`ExpectationBuilder::query`].
///
/// Query strings are decoded, key/value collections and JSON objects have
/// their values coerced to strings. `None` means the value has no query form
/// (a JSON array, number, bool or null) and adds no constraint.
pub trait IntoQuery {
    fn into_query(self) -> Option<Vec<(String, String)>>;
}

impl IntoQuery for &str {
    fn into_query(self) -> Option<Vec<(String, String)>> {
        Some(parse_query_string(Some(self)).into_iter().collect())
    }
}

impl IntoQuery for String {
    fn into_query(self) -> Option<Vec<(String, String)>> {
        self.as_str().into_query()
    }
}

impl IntoQuery for Value {
    fn into_query(self) -> Option<Vec<(String, String)>> {
        match self {
            Value::Object(map) => Some(
                map.into_iter()
                    .map(|(k, v)| (k, coerce_to_string(v)))
                    .collect(),
            ),
            Value::String(qs) => qs.into_query(),
            _ => None,
        }
    }
}

impl<K, V> IntoQuery for HashMap<K, V>
where
    K: Into<String>,
    V: ToString,
{
    fn into_query(self) -> Option<Vec<(String, String)>> {
        Some(
            self.into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }
}

impl<K, V> IntoQuery for Vec<(K, V)>
where
    K: Into<String>,
    V: ToString,
{
    fn into_query(self) -> Option<Vec<(String, String)>> {
        Some(
            self.into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }
}

impl<K, V, const N: usize> IntoQuery for [(K, V); N]
where
    K: Into<String>,
    V: ToString,
{
    fn into_query(self) -> Option<Vec<(String, String)>> {
        Vec::from(self).into_query()
    }
}

/// String form of a JSON value as it appears in a query string.
fn coerce_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Builder for one expectation, created by the server's registration methods.
///
/// Nothing is registered until [`reply`](Self::reply) is called.
#[must_use = "an expectation is only registered once `reply` is called"]
pub struct ExpectationBuilder {
    registry: Arc<ExpectationRegistry>,
    method: Method,
    path: String,
    data: Option<Payload>,
    query: Option<HashMap<String, String>>,
    headers: HashMap<String, String>,
    delay: Option<Duration>,
    persist: bool,
    on_unmatched: UnmatchedPolicy,
    wait_timeout: Duration,
}

impl ExpectationBuilder {
    pub(crate) fn new(
        registry: Arc<ExpectationRegistry>,
        method: Method,
        path: impl Into<String>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            method,
            path: path.into(),
            data: None,
            query: None,
            headers: HashMap::new(),
            delay: None,
            persist: false,
            on_unmatched: UnmatchedPolicy::default(),
            wait_timeout,
        }
    }

    /// Expect this request body.
    ///
    /// JSON is matched structurally. Text is matched verbatim when a
    /// `content-type` header is expected, otherwise it is read as form data.
    /// Verbatim text only ever matches `text/*` requests: JSON and form
    /// requests are decoded before matching, so send a JSON value for those.
    pub fn send(mut self, data: impl Into<Payload>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Expect these query parameters. Repeated calls merge, later values win.
    ///
    /// An empty query string or collection requires the request to carry no
    /// parameters. JSON values other than objects and strings are ignored.
    pub fn query(mut self, query: impl IntoQuery) -> Self {
        match query.into_query() {
            Some(pairs) => self.query.get_or_insert_with(HashMap::new).extend(pairs),
            None => warn!(
                "Ignoring query for {} {}: not an object or string",
                self.method, self.path
            ),
        }
        self
    }

    /// Expect a request header. The name is matched case-insensitively.
    pub fn set(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    /// Wait `ms` milliseconds before sending the reply.
    pub fn delay(mut self, ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(ms));
        self
    }

    /// Keep the expectation after it has been matched.
    pub fn persist(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Let non-matching requests fall through to the next expectation.
    pub fn skip_unmatched_requests(mut self) -> Self {
        self.on_unmatched = UnmatchedPolicy::Fallthrough;
        self
    }

    /// Reject non-matching requests. This is the default.
    pub fn raise_unmatched_requests(mut self) -> Self {
        self.on_unmatched = UnmatchedPolicy::Fail;
        self
    }

    /// Finalize and register the expectation.
    pub fn reply(self, status: u16, body: impl Into<ReplyBody>) -> CompletionSignal {
        self.reply_with_headers(status, body, Vec::<(String, String)>::new())
    }

    /// Finalize and register the expectation with response headers.
    pub fn reply_with_headers<H, K, V>(
        self,
        status: u16,
        body: impl Into<ReplyBody>,
        headers: H,
    ) -> CompletionSignal
    where
        H: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let reply = ReplySpec {
            status,
            body: body.into(),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        };
        let (registry, expectation) = self.finalize(reply);
        let signal = expectation.signal.clone();
        debug!(
            "Registered expectation {} (persist={}, policy={:?})",
            expectation.route(),
            expectation.persist,
            expectation.on_unmatched
        );
        registry.register(expectation);
        signal
    }

    fn finalize(self, reply: ReplySpec) -> (Arc<ExpectationRegistry>, Expectation) {
        let body = self.body_matcher();
        let signal = CompletionSignal::new(&self.method, &self.path, self.wait_timeout);
        let expectation = Expectation {
            method: self.method,
            path: self.path,
            query: self.query,
            headers: self.headers,
            body,
            reply,
            delay: self.delay,
            persist: self.persist,
            on_unmatched: self.on_unmatched,
            signal,
        };
        (self.registry, expectation)
    }

    /// The representation is fixed here, so `set` and `send` may come in any order.
    fn body_matcher(&self) -> Option<BodyMatcher> {
        match self.data.as_ref()? {
            Payload::Json(value) => Some(BodyMatcher::Structured(value.clone())),
            Payload::Text(text) => match self.headers.get("content-type") {
                Some(content_type) => {
                    if !content_type.trim_start().to_ascii_lowercase().starts_with("text/") {
                        warn!(
                            "{} {} expects a verbatim body with content-type {}; \
                             only text/* requests can match it",
                            self.method, self.path, content_type
                        );
                    }
                    Some(BodyMatcher::Raw(text.clone()))
                }
                None => Some(BodyMatcher::Structured(string_map_to_value(
                    parse_query_string(Some(text.as_str())),
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;

    fn builder(registry: &Arc<ExpectationRegistry>) -> ExpectationBuilder {
        ExpectationBuilder::new(
            Arc::clone(registry),
            Method::POST,
            "/get",
            Duration::from_millis(2000),
        )
    }

    fn registered(registry: &ExpectationRegistry) -> Arc<Expectation> {
        registry
            .expectations(&Method::POST, "/get")
            .pop()
            .expect("expectation registered")
    }

    #[test]
    fn test_query_calls_merge() {
        let registry = Arc::new(ExpectationRegistry::new());
        builder(&registry)
            .query(json!({"total": 10, "limit": 1}))
            .query([("foo", "bar")])
            .query("a=b&c=d")
            .query("x=y")
            .query(json!({"limit": "2", "flag": true, "none": null}))
            .reply(200, ());

        let exp = registered(&registry);
        let query = exp.query.as_ref().unwrap();
        let expected: HashMap<String, String> = [
            ("total", "10"),
            ("limit", "2"),
            ("foo", "bar"),
            ("a", "b"),
            ("c", "d"),
            ("x", "y"),
            ("flag", "true"),
            ("none", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(query, &expected);
    }

    #[test]
    fn test_headers_lower_cased() {
        let registry = Arc::new(ExpectationRegistry::new());
        builder(&registry)
            .set("Content-Type", "application/json")
            .reply(200, ());

        let exp = registered(&registry);
        assert_eq!(
            exp.headers.get("content-type"),
            Some(&"application/json".to_string())
        );
    }

    #[test]
    fn test_text_body_without_content_type_is_form() {
        let registry = Arc::new(ExpectationRegistry::new());
        builder(&registry).send("foobar").reply(200, ());

        let exp = registered(&registry);
        assert_eq!(exp.body, Some(BodyMatcher::Structured(json!({"foobar": ""}))));
    }

    #[test]
    fn test_text_body_with_content_type_is_raw() {
        let registry = Arc::new(ExpectationRegistry::new());
        // Header set after the body still selects the raw representation
        builder(&registry)
            .send("lalalala")
            .set("Content-Type", "text/plain")
            .reply(200, ());

        let exp = registered(&registry);
        assert_eq!(exp.body, Some(BodyMatcher::Raw("lalalala".to_string())));
    }

    #[test]
    #[traced_test]
    fn test_text_body_with_json_content_type_warns() {
        let registry = Arc::new(ExpectationRegistry::new());
        builder(&registry)
            .send(r#"{"a":1}"#)
            .set("Content-Type", "application/json")
            .reply(200, ());

        let exp = registered(&registry);
        assert_eq!(exp.body, Some(BodyMatcher::Raw(r#"{"a":1}"#.to_string())));
        assert!(logs_contain("only text/* requests can match it"));
    }

    #[test]
    #[traced_test]
    fn test_text_body_with_text_content_type_does_not_warn() {
        let registry = Arc::new(ExpectationRegistry::new());
        builder(&registry)
            .send("lalalala")
            .set("Content-Type", "text/plain; charset=utf-8")
            .reply(200, ());

        assert!(!logs_contain("only text/* requests can match it"));
    }

    #[test]
    fn test_non_object_json_query_is_ignored() {
        let registry = Arc::new(ExpectationRegistry::new());
        builder(&registry)
            .query(json!(["id", 1]))
            .query(json!(42))
            .reply(200, ());
        assert!(registered(&registry).query.is_none());

        // Ignored values leave earlier parameters untouched
        builder(&registry)
            .query("id=1")
            .query(Value::Null)
            .reply(200, ());
        let exp = registered(&registry);
        assert_eq!(exp.query.as_ref().map(HashMap::len), Some(1));
    }

    #[test]
    fn test_empty_query_string_requires_no_parameters() {
        let registry = Arc::new(ExpectationRegistry::new());
        builder(&registry).query("").reply(200, ());
        assert_eq!(registered(&registry).query, Some(HashMap::new()));
    }

    #[test]
    fn test_json_body_is_structured() {
        let registry = Arc::new(ExpectationRegistry::new());
        builder(&registry)
            .send(json!({"foo": "bar"}))
            .reply(200, ());

        let exp = registered(&registry);
        assert_eq!(exp.body, Some(BodyMatcher::Structured(json!({"foo": "bar"}))));
    }

    #[test]
    fn test_lifecycle_flags() {
        let registry = Arc::new(ExpectationRegistry::new());
        let signal = builder(&registry)
            .delay(30)
            .persist()
            .raise_unmatched_requests()
            .skip_unmatched_requests()
            .reply_with_headers(201, "created", [("x-id", "7")]);

        let exp = registered(&registry);
        assert_eq!(exp.delay, Some(Duration::from_millis(30)));
        assert!(exp.persist);
        assert_eq!(exp.on_unmatched, UnmatchedPolicy::Fallthrough);
        assert_eq!(exp.reply.status, 201);
        assert_eq!(exp.reply.headers, vec![("x-id".to_string(), "7".to_string())]);
        assert!(!signal.is_done());
    }

    #[test]
    fn test_defaults() {
        let registry = Arc::new(ExpectationRegistry::new());
        builder(&registry).reply(200, ());

        let exp = registered(&registry);
        assert!(!exp.persist);
        assert_eq!(exp.on_unmatched, UnmatchedPolicy::Fail);
        assert!(exp.query.is_none());
        assert!(exp.body.is_none());
        assert!(exp.delay.is_none());
    }
}
