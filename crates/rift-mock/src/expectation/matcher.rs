//! Request matching for expectations.
//!
//! Matching is all-or-nothing: every configured sub-matcher (query, body,
//! headers) must pass, unset ones pass vacuously. The first failing field is
//! reported as a [`Mismatch`].

use super::types::{BodyMatcher, Expectation};
use crate::fingerprint::{RequestBody, RequestFingerprint};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The request field a matcher rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchField {
    Query,
    Body,
    Header(String),
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchField::Query => f.write_str("query"),
            MatchField::Body => f.write_str("body"),
            MatchField::Header(name) => write!(f, "header '{name}'"),
        }
    }
}

/// Why a request did not match an expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// `METHOD /path` of the expectation
    pub route: String,
    pub field: MatchField,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} mismatch, expected {} but got {}",
            self.route, self.field, self.expected, self.actual
        )
    }
}

impl std::error::Error for Mismatch {}

impl Expectation {
    /// Check a request against this expectation's matchers.
    pub fn evaluate(&self, fingerprint: &RequestFingerprint) -> Result<(), Mismatch> {
        if let Some(expected) = &self.query {
            if expected != &fingerprint.query {
                return Err(self.mismatch(
                    MatchField::Query,
                    render_map(expected),
                    render_map(&fingerprint.query),
                ));
            }
        }

        if let Some(expected) = &self.body {
            if !body_matches(expected, &fingerprint.body) {
                return Err(self.mismatch(
                    MatchField::Body,
                    render_expected_body(expected),
                    render_actual_body(&fingerprint.body),
                ));
            }
        }

        // Sorted so the reported header is stable across runs
        let expected_headers: BTreeMap<_, _> = self.headers.iter().collect();
        for (name, expected) in expected_headers {
            let actual = fingerprint.headers.get(name);
            if actual != Some(expected) {
                return Err(self.mismatch(
                    MatchField::Header(name.clone()),
                    format!("{expected:?}"),
                    actual.map_or_else(|| "nothing".to_string(), |v| format!("{v:?}")),
                ));
            }
        }

        Ok(())
    }

    /// True when every configured matcher accepts the request.
    pub fn matches(&self, fingerprint: &RequestFingerprint) -> bool {
        self.evaluate(fingerprint).is_ok()
    }

    fn mismatch(&self, field: MatchField, expected: String, actual: String) -> Mismatch {
        Mismatch {
            route: self.route(),
            field,
            expected,
            actual,
        }
    }
}

/// Representations must agree; a structured matcher never accepts raw text.
fn body_matches(expected: &BodyMatcher, actual: &RequestBody) -> bool {
    match (expected, actual) {
        (BodyMatcher::Raw(expected), RequestBody::Raw(actual)) => expected == actual,
        (BodyMatcher::Structured(expected), RequestBody::Structured(actual)) => expected == actual,
        _ => false,
    }
}

fn render_map(map: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<_, _> = map.iter().collect();
    format!("{sorted:?}")
}

fn render_expected_body(body: &BodyMatcher) -> String {
    match body {
        BodyMatcher::Raw(text) => format!("text {text:?}"),
        BodyMatcher::Structured(value) => value.to_string(),
    }
}

fn render_actual_body(body: &RequestBody) -> String {
    match body {
        RequestBody::Raw(text) => format!("text {text:?}"),
        RequestBody::Structured(value) => value.to_string(),
    }
}
