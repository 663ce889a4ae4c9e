//! Mock transport for testing.
//!
//! [`MockTransport`] implements [`Transport`] without touching the network,
//! so the dispatcher and session can be exercised deterministically.
//!
//! # Features
//!
//! - **Request capture**: every request is recorded in submission order
//! - **Scripted outcomes**: queue exact results for upcoming requests
//! - **Failure injection**: fail always, or a set number of times before succeeding
//! - **Latency simulation**: delay each response
//! - **Hold/release**: park requests until the test lets them complete

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::transport::{Transport, TransportError, UploadRequest};

/// A scripted transport that records what it was asked to send.
///
/// # Example
///
/// ```
/// use lifelog_bridge::mock::MockTransport;
/// use lifelog_bridge::transport::{Transport, UploadRequest};
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::new();
///     transport.set_transient_failures(1);
///
///     let request = UploadRequest {
///         seq: 1,
///         key: "k1".to_string(),
///         url: "https://example.org".to_string(),
///         fields: vec![("data".to_string(), "line".to_string())],
///     };
///     assert!(transport.post(&request).await.is_err());
///     assert!(transport.post(&request).await.is_ok());
///     assert_eq!(transport.request_count(), 2);
/// }
/// ```
pub struct MockTransport {
    requests: Mutex<Vec<UploadRequest>>,
    /// Results returned in order before falling back to the failure flags.
    outcomes: Mutex<VecDeque<Result<(), TransportError>>>,
    should_fail: AtomicBool,
    fail_status: AtomicU32,
    /// Number of upcoming requests to fail before succeeding again.
    remaining_failures: AtomicU32,
    /// Simulated response latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    held: watch::Sender<bool>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("request_count", &self.request_count())
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a transport that accepts every request.
    pub fn new() -> Self {
        let (held, _) = watch::channel(false);
        Self {
            requests: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
            should_fail: AtomicBool::new(false),
            fail_status: AtomicU32::new(500),
            remaining_failures: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
            held,
        }
    }

    /// Queue the result of an upcoming request.
    pub fn push_outcome(&self, outcome: Result<(), TransportError>) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
    }

    /// Make every request fail with the given HTTP status.
    pub fn set_should_fail(&self, fail: bool, status: u16) {
        self.should_fail.store(fail, Ordering::SeqCst);
        self.fail_status.store(u32::from(status), Ordering::SeqCst);
    }

    /// Fail the next `count` requests, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::SeqCst);
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Park new and in-flight requests until [`MockTransport::release`].
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    /// Let parked requests complete.
    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// All requests seen so far, in submission order.
    pub fn requests(&self) -> Vec<UploadRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next_outcome(&self) -> Result<(), TransportError> {
        if let Some(outcome) = self.outcomes.lock().ok().and_then(|mut o| o.pop_front()) {
            return outcome;
        }

        let transient = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if transient {
            return Err(TransportError::Request("Mock transient failure".to_string()));
        }

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: self.fail_status.load(Ordering::SeqCst) as u16,
                body: "Mock failure".to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, request: &UploadRequest) -> Result<(), TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let mut held = self.held.subscribe();
        let _ = held.wait_for(|h| !*h).await;

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        self.next_outcome()
    }
}
