//! Rift Mock: an embeddable HTTP mock server for tests.
//!
//! Register expected requests with the reply to send, point a real HTTP
//! client at the server, then check the returned [`CompletionSignal`]s.
//!
//! ```no_run
//! # async fn example() -> Result<(), rift_mock::MockError> {
//! use rift_mock::MockServer;
//! use serde_json::json;
//!
//! let mock = MockServer::start().await?;
//! let signal = mock
//!     .post("/users")
//!     .send(json!({"name": "ada"}))
//!     .reply(201, json!({"id": 1}));
//!
//! // ... exercise the client under test against mock.url("/users") ...
//!
//! signal.wait(None).await?;
//! signal.assert_done()?;
//! mock.clean();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod expectation;
pub mod fingerprint;
pub mod registry;
pub mod reply;
pub mod server;
pub mod signal;

pub use config::{ExpectationSpec, MockFile, MockServerConfig, ReplyConfig};
pub use error::MockError;
pub use expectation::{
    BodyMatcher, Expectation, ExpectationBuilder, IntoQuery, MatchField, Mismatch, Payload,
    ReplyBody, ReplySpec, UnmatchedPolicy,
};
pub use fingerprint::{RequestBody, RequestFingerprint};
pub use registry::{ExpectationRegistry, MatchOutcome};
pub use server::{
    ErrorHandler, Middleware, MiddlewareAction, MockRequest, MockServer, MockServerBuilder,
    MISMATCH_HEADER,
};
pub use signal::CompletionSignal;
