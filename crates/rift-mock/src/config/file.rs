//! Declarative expectation files (YAML or JSON).

use super::MockServerConfig;
use crate::error::MockError;
use crate::expectation::{Payload, ReplyBody, UnmatchedPolicy};
use crate::server::MockServer;
use crate::signal::CompletionSignal;
use hyper::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Contents of an expectation file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockFile {
    #[serde(default)]
    pub server: MockServerConfig,
    #[serde(default)]
    pub expectations: Vec<ExpectationSpec>,
}

/// One expectation as written in a file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectationSpec {
    pub method: String,
    pub path: String,
    /// Query string or object of parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Strings are sent as text, anything else as JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub persist: bool,
    #[serde(default)]
    pub on_unmatched: UnmatchedPolicy,
    #[serde(default)]
    pub reply: ReplyConfig,
}

/// Reply part of an [`ExpectationSpec`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyConfig {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn default_status() -> u16 {
    200
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            status: default_status(),
            body: None,
            headers: BTreeMap::new(),
        }
    }
}

fn payload(value: &Value) -> Payload {
    match value {
        Value::String(text) => Payload::Text(text.clone()),
        other => Payload::Json(other.clone()),
    }
}

impl MockFile {
    /// Load and validate a file. `.json` files are parsed as JSON, anything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MockError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let file: MockFile = if is_json {
            serde_json::from_str(&content).map_err(|e| MockError::Config(e.to_string()))?
        } else {
            serde_yaml::from_str(&content).map_err(|e| MockError::Config(e.to_string()))?
        };
        file.validate()?;
        Ok(file)
    }

    /// Check every expectation without registering anything.
    pub fn validate(&self) -> Result<(), MockError> {
        for spec in &self.expectations {
            spec.parsed_method()?;
            if !spec.path.starts_with('/') {
                return Err(MockError::Config(format!(
                    "path '{}' must start with '/'",
                    spec.path
                )));
            }
        }
        Ok(())
    }

    /// Register all expectations on `server`, in file order.
    pub fn register_all(&self, server: &MockServer) -> Result<Vec<CompletionSignal>, MockError> {
        let signals = self
            .expectations
            .iter()
            .map(|spec| spec.register(server))
            .collect::<Result<Vec<_>, _>>()?;
        info!("Registered {} expectation(s)", signals.len());
        Ok(signals)
    }
}

impl ExpectationSpec {
    fn parsed_method(&self) -> Result<Method, MockError> {
        Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| MockError::Config(format!("invalid method '{}'", self.method)))
    }

    /// Register this expectation on `server`.
    pub fn register(&self, server: &MockServer) -> Result<CompletionSignal, MockError> {
        let mut builder = server.expect(self.parsed_method()?, &self.path);

        if let Some(query) = &self.query {
            builder = builder.query(query.clone());
        }
        for (name, value) in &self.headers {
            builder = builder.set(name, value.clone());
        }
        if let Some(body) = &self.body {
            builder = builder.send(payload(body));
        }
        if let Some(ms) = self.delay_ms {
            builder = builder.delay(ms);
        }
        if self.persist {
            builder = builder.persist();
        }
        builder = match self.on_unmatched {
            UnmatchedPolicy::Fail => builder.raise_unmatched_requests(),
            UnmatchedPolicy::Fallthrough => builder.skip_unmatched_requests(),
        };

        let body = self
            .reply
            .body
            .as_ref()
            .map(|b| ReplyBody::Literal(payload(b)))
            .unwrap_or_default();
        Ok(builder.reply_with_headers(self.reply.status, body, self.reply.headers.clone()))
    }
}
