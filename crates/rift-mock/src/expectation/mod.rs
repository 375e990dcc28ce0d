//! Expectations: registered request patterns with their reply and lifecycle.
//!
//! ## Module Structure
//!
//! - `types`: expectation, payload, reply and policy types
//! - `matcher`: evaluation of a request fingerprint against an expectation
//! - `builder`: chainable configuration finalized by `reply`

mod builder;
mod matcher;
mod types;

pub use builder::{ExpectationBuilder, IntoQuery};
pub use matcher::{MatchField, Mismatch};
pub use types::{
    BodyMatcher, BodyProducer, Expectation, Payload, ReplyBody, ReplySpec, UnmatchedPolicy,
};
