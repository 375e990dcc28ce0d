//! Normalized view of an incoming request used for matching.
//!
//! The fingerprint carries only the fields expectations can match on:
//! decoded query parameters, lower-cased headers, and the body decoded
//! according to its content type.

use crate::error::MockError;
use hyper::header::CONTENT_TYPE;
use hyper::{HeaderMap, Uri};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON, form data, or the empty object when nothing was decodable.
    Structured(Value),
    /// Body of a `text/*` request.
    Raw(String),
}

impl RequestBody {
    /// The body of a request that carried nothing decodable.
    pub fn empty() -> Self {
        RequestBody::Structured(Value::Object(Map::new()))
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::empty()
    }
}

/// Matchable fields of an incoming request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFingerprint {
    pub query: HashMap<String, String>,
    /// Header names are lower-cased
    pub headers: HashMap<String, String>,
    pub body: RequestBody,
}

impl RequestFingerprint {
    /// Build a fingerprint from the raw parts of a request.
    ///
    /// Fails only when the request declares a JSON body that does not parse.
    pub fn from_parts(uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Result<Self, MockError> {
        Ok(Self {
            query: parse_query_string(uri.query()),
            headers: header_map_to_hashmap(headers),
            body: decode_body(headers, body)?,
        })
    }
}

/// Parse a query string (or form body) into a map.
///
/// `+` decodes to a space and repeated keys keep the last value.
pub fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some(q) = query else {
        return params;
    };
    for pair in q.split('&').filter(|s| !s.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(decode_component(key), decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Convert a hyper HeaderMap to a map keyed by lower-case name.
/// Repeated headers are joined with `", "`.
pub fn header_map_to_hashmap(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

/// Media type of the request without parameters, lower-cased.
fn media_type(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let essence = raw.split(';').next().unwrap_or("").trim();
    Some(essence.to_ascii_lowercase())
}

/// Decode a request body according to its declared content type.
pub fn decode_body(headers: &HeaderMap, body: &[u8]) -> Result<RequestBody, MockError> {
    let Some(media_type) = media_type(headers) else {
        return Ok(RequestBody::empty());
    };

    if media_type.starts_with("text/") {
        return Ok(RequestBody::Raw(String::from_utf8_lossy(body).into_owned()));
    }

    if media_type == "application/json" || media_type.ends_with("+json") {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(RequestBody::empty());
        }
        return serde_json::from_slice(body)
            .map(RequestBody::Structured)
            .map_err(|e| MockError::InvalidBody(e.to_string()));
    }

    if media_type == "application/x-www-form-urlencoded" {
        let text = String::from_utf8_lossy(body);
        return Ok(RequestBody::Structured(string_map_to_value(
            parse_query_string(Some(&*text)),
        )));
    }

    Ok(RequestBody::empty())
}

/// Turn a string map into a JSON object of strings.
pub fn string_map_to_value(map: HashMap<String, String>) -> Value {
    Value::Object(map.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;
    use serde_json::json;

    fn headers_with_content_type(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_query_string_parsing() {
        let params = parse_query_string(Some("total=10&limit=1&name=hello%20world&q=a+b"));
        assert_eq!(params.get("total"), Some(&"10".to_string()));
        assert_eq!(params.get("limit"), Some(&"1".to_string()));
        assert_eq!(params.get("name"), Some(&"hello world".to_string()));
        assert_eq!(params.get("q"), Some(&"a b".to_string()));

        assert!(parse_query_string(None).is_empty());
        assert!(parse_query_string(Some("")).is_empty());
    }

    #[test]
    fn test_query_string_flag_and_repeat() {
        let params = parse_query_string(Some("flag&id=1&id=2"));
        assert_eq!(params.get("flag"), Some(&String::new()));
        assert_eq!(params.get("id"), Some(&"2".to_string()));
    }

    #[test]
    fn test_headers_are_lower_cased_and_joined() {
        let mut headers = HeaderMap::new();
        headers.append("x-trace", HeaderValue::from_static("a"));
        headers.append("x-trace", HeaderValue::from_static("b"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let map = header_map_to_hashmap(&headers);
        assert_eq!(map.get("x-trace"), Some(&"a, b".to_string()));
        assert_eq!(map.get("content-type"), Some(&"application/json".to_string()));
    }

    #[test]
    fn test_decode_json_body() {
        let headers = headers_with_content_type("application/json; charset=utf-8");
        let body = decode_body(&headers, br#"{"foo":"bar"}"#).unwrap();
        assert_eq!(body, RequestBody::Structured(json!({"foo": "bar"})));

        let empty = decode_body(&headers, b"").unwrap();
        assert_eq!(empty, RequestBody::empty());
    }

    #[test]
    fn test_decode_invalid_json_body() {
        let headers = headers_with_content_type("application/json");
        let result = decode_body(&headers, b"{not json");
        assert!(matches!(result, Err(MockError::InvalidBody(_))));
    }

    #[test]
    fn test_decode_text_body() {
        let headers = headers_with_content_type("text/plain");
        let body = decode_body(&headers, b"lalalala").unwrap();
        assert_eq!(body, RequestBody::Raw("lalalala".to_string()));
    }

    #[test]
    fn test_decode_form_body() {
        let headers = headers_with_content_type("application/x-www-form-urlencoded");
        let body = decode_body(&headers, b"a=b&c=d+e").unwrap();
        assert_eq!(body, RequestBody::Structured(json!({"a": "b", "c": "d e"})));
    }

    #[test]
    fn test_decode_without_content_type() {
        let body = decode_body(&HeaderMap::new(), b"ignored bytes").unwrap();
        assert_eq!(body, RequestBody::empty());

        let octets = headers_with_content_type("application/octet-stream");
        assert_eq!(decode_body(&octets, b"\x00\x01").unwrap(), RequestBody::empty());
    }

    #[test]
    fn test_fingerprint_from_parts() {
        let uri: Uri = "/route?id=1".parse().unwrap();
        let headers = headers_with_content_type("application/json");
        let fingerprint = RequestFingerprint::from_parts(&uri, &headers, br#"{"a":1}"#).unwrap();

        assert_eq!(fingerprint.query.get("id"), Some(&"1".to_string()));
        assert_eq!(
            fingerprint.headers.get("content-type"),
            Some(&"application/json".to_string())
        );
        assert_eq!(fingerprint.body, RequestBody::Structured(json!({"a": 1})));
    }
}
