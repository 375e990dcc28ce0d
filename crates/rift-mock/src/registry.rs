//! Expectation registry: per-route ordered expectations and request resolution.
//!
//! Expectations are kept per method and exact path in registration order,
//! which is also evaluation order. Resolution and the removal of a matched
//! non-persistent expectation happen under one write lock, so a one-shot
//! expectation can satisfy at most one request even under concurrent delivery.

use crate::expectation::{Expectation, Mismatch, UnmatchedPolicy};
use crate::fingerprint::RequestFingerprint;
use hyper::Method;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of resolving a request against the registry.
#[derive(Debug)]
pub enum MatchOutcome {
    /// First expectation whose matchers all passed
    Matched(Arc<Expectation>),
    /// Nothing matched and no candidate allowed fallthrough
    Rejected(Mismatch),
    /// Nothing matched and the chain was allowed to fall through
    Unmatched,
    /// No expectation registered for the route
    NoRoute,
}

type RouteTable = HashMap<Method, HashMap<String, Vec<Arc<Expectation>>>>;

/// Registered expectations of one mock server.
#[derive(Debug, Default)]
pub struct ExpectationRegistry {
    routes: RwLock<RouteTable>,
}

impl ExpectationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an expectation to its route. Duplicates are allowed.
    pub fn register(&self, expectation: Expectation) -> Arc<Expectation> {
        let expectation = Arc::new(expectation);
        let mut routes = self.routes.write();
        routes
            .entry(expectation.method.clone())
            .or_default()
            .entry(expectation.path.clone())
            .or_default()
            .push(Arc::clone(&expectation));
        expectation
    }

    /// Resolve a request to at most one expectation.
    ///
    /// The first expectation in registration order whose matchers all pass
    /// wins and, unless persistent, is removed before returning. When none
    /// pass, the request falls through (404) if any candidate declared
    /// [`UnmatchedPolicy::Fallthrough`], and is rejected with the first
    /// mismatch otherwise.
    pub fn resolve(
        &self,
        method: &Method,
        path: &str,
        fingerprint: &RequestFingerprint,
    ) -> MatchOutcome {
        let mut routes = self.routes.write();
        let Some(by_path) = routes.get_mut(method) else {
            return MatchOutcome::NoRoute;
        };
        let Some(candidates) = by_path.get_mut(path) else {
            return MatchOutcome::NoRoute;
        };
        if candidates.is_empty() {
            return MatchOutcome::NoRoute;
        }

        let mut first_mismatch = None;
        let mut fallthrough = false;
        let mut matched = None;

        for (index, expectation) in candidates.iter().enumerate() {
            match expectation.evaluate(fingerprint) {
                Ok(()) => {
                    matched = Some(index);
                    break;
                }
                Err(mismatch) => {
                    if expectation.on_unmatched == UnmatchedPolicy::Fallthrough {
                        fallthrough = true;
                    }
                    first_mismatch.get_or_insert(mismatch);
                }
            }
        }

        if let Some(index) = matched {
            let expectation = if candidates[index].persist {
                Arc::clone(&candidates[index])
            } else {
                candidates.remove(index)
            };
            if candidates.is_empty() {
                by_path.remove(path);
            }
            return MatchOutcome::Matched(expectation);
        }

        match first_mismatch {
            Some(mismatch) if !fallthrough => MatchOutcome::Rejected(mismatch),
            _ => MatchOutcome::Unmatched,
        }
    }

    /// Remove every expectation for every route.
    pub fn reset(&self) {
        self.routes.write().clear();
    }

    /// Pending expectations for a route, in evaluation order.
    pub fn expectations(&self, method: &Method, path: &str) -> Vec<Arc<Expectation>> {
        self.routes
            .read()
            .get(method)
            .and_then(|by_path| by_path.get(path))
            .cloned()
            .unwrap_or_default()
    }

    /// Routes with at least one pending expectation.
    pub fn routes(&self) -> Vec<(Method, String)> {
        let routes = self.routes.read();
        let mut keys: Vec<(Method, String)> = routes
            .iter()
            .flat_map(|(method, by_path)| {
                by_path
                    .iter()
                    .filter(|(_, candidates)| !candidates.is_empty())
                    .map(move |(path, _)| (method.clone(), path.clone()))
            })
            .collect();
        keys.sort_by(|a, b| (a.0.as_str(), &a.1).cmp(&(b.0.as_str(), &b.1)));
        keys
    }

    /// Number of pending expectations across all routes.
    pub fn len(&self) -> usize {
        self.routes
            .read()
            .values()
            .flat_map(|by_path| by_path.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
