//! Completion signal: the match history of one expectation and a way to wait for it.
//!
//! Every match increments the count, appends the request URL, and wakes all
//! waiters registered before it. A waiter that timed out has dropped its
//! receiver and is skipped.

use crate::error::MockError;
use hyper::Method;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle returned by `reply`, shared with the registered expectation.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    inner: Arc<SignalState>,
}

#[derive(Debug)]
struct SignalState {
    method: String,
    path: String,
    default_timeout: Duration,
    record: Mutex<MatchRecord>,
}

#[derive(Debug, Default)]
struct MatchRecord {
    count: u64,
    urls: Vec<String>,
    waiters: Vec<oneshot::Sender<()>>,
}

impl CompletionSignal {
    pub(crate) fn new(method: &Method, path: &str, default_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(SignalState {
                method: method.to_string(),
                path: path.to_string(),
                default_timeout,
                record: Mutex::new(MatchRecord::default()),
            }),
        }
    }

    /// Record a match for `url` and wake every pending waiter.
    pub(crate) fn record_match(&self, url: &str) {
        let waiters = {
            let mut record = self.inner.record.lock();
            record.count += 1;
            record.urls.push(url.to_string());
            std::mem::take(&mut record.waiters)
        };

        debug!(
            "{} {} matched by {} ({} waiter(s))",
            self.inner.method,
            self.inner.path,
            url,
            waiters.len()
        );
        for waiter in waiters {
            // Closed when the waiter already timed out
            let _ = waiter.send(());
        }
    }

    /// Whether the expectation has been matched at least once.
    pub fn is_done(&self) -> bool {
        self.count() > 0
    }

    /// Fail with [`MockError::NotYetInvoked`] if the expectation was never matched.
    pub fn assert_done(&self) -> Result<(), MockError> {
        if self.is_done() {
            Ok(())
        } else {
            Err(MockError::NotYetInvoked {
                method: self.inner.method.clone(),
                path: self.inner.path.clone(),
            })
        }
    }

    /// Number of requests matched so far.
    pub fn count(&self) -> u64 {
        self.inner.record.lock().count
    }

    /// URLs of the matched requests, in match order.
    pub fn completed_urls(&self) -> Vec<String> {
        self.inner.record.lock().urls.clone()
    }

    /// Wait for the next match.
    ///
    /// Interest is registered when `wait` is called, not when the future is
    /// first polled, so a match between the two still resolves it. Without a
    /// timeout the server's default (2000ms unless configured) applies.
    pub fn wait(
        &self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<(), MockError>> + Send + 'static {
        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        let (tx, rx) = oneshot::channel();
        {
            let mut record = self.inner.record.lock();
            record.waiters.retain(|waiter| !waiter.is_closed());
            record.waiters.push(tx);
        }

        // Holding the state keeps the sender alive for the whole wait
        let state = Arc::clone(&self.inner);
        async move {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(())) => Ok(()),
                _ => Err(MockError::WaitTimeout {
                    method: state.method.clone(),
                    path: state.path.clone(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            }
        }
    }

    /// Callback flavour of [`wait`](Self::wait).
    ///
    /// `callback` runs exactly once on a spawned task, with `Ok(())` on the
    /// next match or the timeout error. Must be called within a tokio runtime.
    pub fn on_done<F>(&self, timeout: Option<Duration>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<(), MockError>) + Send + 'static,
    {
        let wait = self.wait(timeout);
        tokio::spawn(async move {
            callback(wait.await);
        })
    }
}
