//! The mock HTTP server.
//!
//! A [`MockServer`] owns its listener and its expectation registry. Tests
//! register expectations through the per-method helpers, exercise a real
//! HTTP client against [`MockServer::url`], and call [`MockServer::clean`]
//! between cases. Dropping the server stops its accept loop.

mod handler;
mod middleware;

pub use handler::MISMATCH_HEADER;
pub use middleware::{Middleware, MiddlewareAction, MockRequest};

use crate::config::MockServerConfig;
use crate::error::MockError;
use crate::expectation::ExpectationBuilder;
use crate::registry::ExpectationRegistry;
use handler::handle_mock_request;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Method;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Pause after a failed accept, e.g. on file descriptor exhaustion.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Callback for listener and connection errors.
pub type ErrorHandler = Arc<dyn Fn(&MockError) + Send + Sync>;

/// State shared by the accept loop and every connection.
pub(crate) struct ServerState {
    pub(crate) registry: Arc<ExpectationRegistry>,
    pub(crate) middlewares: Vec<Arc<dyn Middleware>>,
    error_handler: Option<ErrorHandler>,
}

impl ServerState {
    fn report(&self, err: MockError) {
        match &self.error_handler {
            Some(handler) => handler(&err),
            None => debug!("Mock server error: {}", err),
        }
    }
}

/// Configures and starts a [`MockServer`].
#[derive(Default)]
pub struct MockServerBuilder {
    config: MockServerConfig,
    middlewares: Vec<Arc<dyn Middleware>>,
    error_handler: Option<ErrorHandler>,
}

impl MockServerBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: MockServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Bind a specific port instead of an ephemeral one.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    /// Default timeout for `wait` calls made without one.
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Append a middleware. Middlewares run in the order they were added.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Receive accept and connection errors instead of having them logged.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&MockError) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Bind the listener and start serving.
    pub async fn start(self) -> Result<MockServer, MockError> {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| MockError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;
        info!("Mock server listening on {}", addr);

        let state = Arc::new(ServerState {
            registry: Arc::new(ExpectationRegistry::new()),
            middlewares: self.middlewares,
            error_handler: self.error_handler,
        });

        let (shutdown_tx, _) = broadcast::channel(1);
        tokio::spawn(accept_loop(
            listener,
            Arc::clone(&state),
            shutdown_tx.subscribe(),
        ));

        Ok(MockServer {
            addr,
            state,
            wait_timeout: self.config.wait_timeout(),
            shutdown_tx,
        })
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let port = listener.local_addr().map(|a| a.port()).unwrap_or(0);
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service_state = Arc::clone(&state);
                            let service = service_fn(move |req| {
                                let state = Arc::clone(&service_state);
                                async move { handle_mock_request(req, state, addr).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                state.report(MockError::Connection(e));
                            }
                        });
                    }
                    Err(e) => accept_failed(&state, port, e).await,
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Mock server on port {} shutting down", port);
                break;
            }
        }
    }
}

async fn accept_failed(state: &ServerState, port: u16, err: std::io::Error) {
    error!("Accept error on port {}: {}", port, err);
    state.report(MockError::Io(err));
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

/// A running mock server.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    wait_timeout: Duration,
    shutdown_tx: broadcast::Sender<()>,
}

impl MockServer {
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::default()
    }

    /// Start a server on an ephemeral localhost port.
    pub async fn start() -> Result<Self, MockError> {
        Self::builder().start().await
    }

    /// Start a server on a specific port.
    pub async fn start_on(port: u16) -> Result<Self, MockError> {
        Self::builder().port(port).start().await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Absolute URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// The registry holding this server's pending expectations.
    pub fn registry(&self) -> &ExpectationRegistry {
        &self.state.registry
    }

    /// Start an expectation for `method` and `path`.
    pub fn expect(&self, method: Method, path: &str) -> ExpectationBuilder {
        ExpectationBuilder::new(
            Arc::clone(&self.state.registry),
            method,
            path,
            self.wait_timeout,
        )
    }

    pub fn get(&self, path: &str) -> ExpectationBuilder {
        self.expect(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> ExpectationBuilder {
        self.expect(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> ExpectationBuilder {
        self.expect(Method::PUT, path)
    }

    pub fn patch(&self, path: &str) -> ExpectationBuilder {
        self.expect(Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> ExpectationBuilder {
        self.expect(Method::DELETE, path)
    }

    pub fn head(&self, path: &str) -> ExpectationBuilder {
        self.expect(Method::HEAD, path)
    }

    pub fn options(&self, path: &str) -> ExpectationBuilder {
        self.expect(Method::OPTIONS, path)
    }

    pub fn trace(&self, path: &str) -> ExpectationBuilder {
        self.expect(Method::TRACE, path)
    }

    /// Remove every registered expectation. Run between test cases.
    pub fn clean(&self) {
        debug!("Cleaning {} expectation(s)", self.state.registry.len());
        self.state.registry.reset();
    }

    /// Stop accepting connections. Also happens on drop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockServer")
            .field("addr", &self.addr)
            .field("expectations", &self.state.registry.len())
            .finish()
    }
}
