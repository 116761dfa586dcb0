//! Resilient outbound HTTP: a single shared retry/backoff/timeout wrapper.
//!
//! Every collaborator that calls out to an upstream goes through
//! [`Fetcher::fetch_with_retry`] rather than re-implementing retry logic per
//! call site. Transient failures (5xx, 429, timeouts, connection errors) are
//! retried with exponential backoff and jitter; anything else — including
//! non-429 client errors — is handed back to the caller as a normal
//! [`FetchOutcome`] for interpretation.

mod error;
mod transport;

pub use error::FetchError;
pub use transport::{HttpTransport, ReqwestTransport};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::Method;

/// Upper bound (exclusive) of the random jitter added to each backoff delay,
/// spreading retries across concurrent callers.
const JITTER_MS: u64 = 1000;

/// An immutable description of one outbound request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl FetchRequest {
    /// Create a GET request for the given URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Attach a header, replacing any previous value for the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach an `Authorization: Bearer <token>` header.
    pub fn bearer_auth(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }
}

/// A raw HTTP response the retry loop chose not to retry.
///
/// Carries client errors (4xx other than 429) as well as successes; callers
/// inspect [`FetchOutcome::is_success`] and the status themselves.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl FetchOutcome {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Observer invoked before each backoff wait with the 1-indexed retry number
/// and the error that triggered it. Must not block; panics are not caught.
pub type RetryObserver = Arc<dyn Fn(u32, &FetchError) + Send + Sync>;

/// Retry behavior for one call. All fields have defaults; override any subset.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries permitted beyond the first attempt (`max_retries + 1` tries total).
    pub max_retries: u32,
    /// Base delay before the first retry; doubles each retry.
    pub initial_delay: Duration,
    /// Cap applied to every computed delay, jitter included.
    pub max_delay: Duration,
    /// Hard deadline per attempt; expiry aborts the in-flight request.
    pub timeout: Duration,
    pub on_retry: Option<RetryObserver>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            timeout: Duration::from_millis(15_000),
            on_retry: None,
        }
    }
}

impl RetryPolicy {
    /// Policy for a fetch whose failure loses the whole result (page 1).
    pub fn strict() -> Self {
        Self::default()
    }

    /// Lighter policy for continuation fetches, where failure only truncates
    /// an already-useful partial result.
    pub fn continuation() -> Self {
        Self {
            max_retries: 2,
            ..Self::default()
        }
    }

    /// Override the retry observer.
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.on_retry = Some(observer);
        self
    }

    /// Delay before retry `attempt` (1-indexed): exponential in the attempt
    /// number plus uniform jitter, capped at `max_delay`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt - 1));
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MS));
        (base + jitter).min(self.max_delay)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("timeout", &self.timeout)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<observer>"))
            .finish()
    }
}

/// Shared resilient HTTP fetcher.
///
/// Cheap to clone; concurrent calls share the transport but nothing else —
/// each call owns its own timer and attempt counter.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
}

impl Fetcher {
    /// Fetcher backed by a real `reqwest` client.
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()))
    }

    /// Fetcher over an arbitrary transport (used by tests).
    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Execute `request` with retry, backoff and per-attempt timeout.
    ///
    /// Returns the first response whose status is not retryable (5xx / 429),
    /// or [`FetchError::Exhausted`] wrapping the last error once the retry
    /// budget is spent.
    pub async fn fetch_with_retry(
        &self,
        request: &FetchRequest,
        policy: &RetryPolicy,
    ) -> Result<FetchOutcome, FetchError> {
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=policy.max_retries {
            let error = match self.attempt(request, policy.timeout).await {
                Ok(outcome) => {
                    if attempt > 0 {
                        tracing::info!(
                            url = %request.url,
                            retries = attempt,
                            "request succeeded after retry"
                        );
                    }
                    return Ok(outcome);
                }
                Err(e) => e,
            };

            // Final attempt: surface immediately, no wait.
            if attempt == policy.max_retries {
                last_error = Some(error);
                break;
            }

            let delay = policy.backoff_delay(attempt + 1);
            tracing::warn!(
                url = %request.url,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "attempt failed, retrying"
            );

            if let Some(observer) = &policy.on_retry {
                observer(attempt + 1, &error);
            }

            last_error = Some(error);
            tokio::time::sleep(delay).await;
        }

        // At least one attempt always runs, so last_error is populated.
        let source = last_error.unwrap_or_else(|| FetchError::Network("no attempts made".into()));
        Err(FetchError::Exhausted {
            attempts: policy.max_retries + 1,
            source: Box::new(source),
        })
    }

    /// One attempt: transport call under a hard timeout, with retryable
    /// statuses converted into synthetic errors.
    async fn attempt(
        &self,
        request: &FetchRequest,
        timeout: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        let outcome = tokio::time::timeout(timeout, self.transport.execute(request))
            .await
            .map_err(|_| FetchError::Timeout(timeout))??;

        if let Some(err) = FetchError::from_status(outcome.status, outcome.body.clone()) {
            return Err(err);
        }
        Ok(outcome)
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// One scripted transport result.
    pub enum Script {
        Respond(u16, String),
        Fail(FetchError),
        Hang,
    }

    /// Transport that replays a fixed script and counts calls.
    pub struct MockTransport {
        script: Mutex<Vec<Script>>,
        pub calls: AtomicU32,
        pub urls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        pub fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
                urls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn execute(&self, request: &FetchRequest) -> Result<FetchOutcome, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(request.url.clone());

            let next = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() {
                    None
                } else {
                    Some(script.remove(0))
                }
            };

            match next {
                Some(Script::Respond(status, body)) => Ok(FetchOutcome {
                    status,
                    headers: HashMap::new(),
                    body,
                }),
                Some(Script::Fail(err)) => Err(err),
                Some(Script::Hang) | None => {
                    // Longer than any test timeout; the retry loop's deadline
                    // cancels this sleep.
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(FetchError::Network("unreachable".into()))
                }
            }
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            ..RetryPolicy::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt_no_delay() {
        let transport = MockTransport::new(vec![Script::Respond(200, "ok".into())]);
        let fetcher = Fetcher::with_transport(transport.clone());

        let started = tokio::time::Instant::now();
        let outcome = fetcher
            .fetch_with_retry(&FetchRequest::get("http://upstream/x"), &fast_policy(3))
            .await
            .unwrap();

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body, "ok");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let transport = MockTransport::new(vec![
            Script::Respond(500, "boom".into()),
            Script::Respond(503, "still down".into()),
            Script::Respond(200, "recovered".into()),
        ]);
        let fetcher = Fetcher::with_transport(transport.clone());

        let started = tokio::time::Instant::now();
        let outcome = fetcher
            .fetch_with_retry(&FetchRequest::get("http://upstream/x"), &fast_policy(3))
            .await
            .unwrap();

        assert_eq!(outcome.body, "recovered");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);

        // Two backoffs: 1000 + 2000 ms base, each with < 1000 ms jitter.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3000), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(5000), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_never_makes_extra_attempt() {
        let transport = MockTransport::new(vec![
            Script::Respond(500, "a".into()),
            Script::Respond(500, "b".into()),
            Script::Respond(500, "c".into()),
            Script::Respond(502, "last".into()),
            Script::Respond(200, "never reached".into()),
        ]);
        let fetcher = Fetcher::with_transport(transport.clone());

        let started = tokio::time::Instant::now();
        let err = fetcher
            .fetch_with_retry(&FetchRequest::get("http://upstream/x"), &fast_policy(3))
            .await
            .unwrap_err();

        // maxRetries=3 means exactly 4 tries, never a 5th.
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
        match err {
            FetchError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 4);
                match *source {
                    FetchError::TransientStatus { status, .. } => assert_eq!(status, 502),
                    other => panic!("unexpected source: {:?}", other),
                }
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // Three backoffs: 1000 + 2000 + 4000 ms base, jitter < 3000 ms total,
        // no wait after the final failure.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(7000), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(10_000), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_capped_at_max_delay() {
        let transport = MockTransport::new(vec![
            Script::Respond(500, "a".into()),
            Script::Respond(500, "b".into()),
            Script::Respond(500, "c".into()),
            Script::Respond(500, "d".into()),
            Script::Respond(500, "e".into()),
            Script::Respond(500, "f".into()),
        ]);
        let fetcher = Fetcher::with_transport(transport.clone());

        let started = tokio::time::Instant::now();
        let _ = fetcher
            .fetch_with_retry(&FetchRequest::get("http://upstream/x"), &fast_policy(5))
            .await;

        // Uncapped the backoffs would be 1+2+4+8+16 s; the 10 s cap bounds
        // the total below 1+2+4+10+10 s plus jitter.
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(30_000), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_returned_not_retried() {
        let transport = MockTransport::new(vec![Script::Respond(404, "not found".into())]);
        let fetcher = Fetcher::with_transport(transport.clone());

        let outcome = fetcher
            .fetch_with_retry(&FetchRequest::get("http://upstream/x"), &fast_policy(3))
            .await
            .unwrap();

        // Business-level errors are the caller's to interpret.
        assert_eq!(outcome.status, 404);
        assert!(!outcome.is_success());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_is_retried() {
        let transport = MockTransport::new(vec![
            Script::Respond(429, "rate limited".into()),
            Script::Respond(200, "ok".into()),
        ]);
        let fetcher = Fetcher::with_transport(transport.clone());

        let outcome = fetcher
            .fetch_with_retry(&FetchRequest::get("http://upstream/x"), &fast_policy(3))
            .await
            .unwrap();

        assert_eq!(outcome.status, 200);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_attempt_becomes_timeout() {
        let transport = MockTransport::new(vec![
            Script::Hang,
            Script::Respond(200, "ok".into()),
        ]);
        let fetcher = Fetcher::with_transport(transport.clone());

        let policy = RetryPolicy {
            max_retries: 1,
            timeout: Duration::from_millis(500),
            ..RetryPolicy::default()
        };
        let outcome = fetcher
            .fetch_with_retry(&FetchRequest::get("http://upstream/x"), &policy)
            .await
            .unwrap();

        // The timed-out attempt is aborted and retried, not fatal.
        assert_eq!(outcome.status, 200);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_surfaces_when_exhausted() {
        let transport = MockTransport::new(vec![Script::Hang]);
        let fetcher = Fetcher::with_transport(transport);

        let policy = RetryPolicy {
            max_retries: 0,
            timeout: Duration::from_millis(500),
            ..RetryPolicy::default()
        };
        let err = fetcher
            .fetch_with_retry(&FetchRequest::get("http://upstream/x"), &policy)
            .await
            .unwrap_err();

        match err {
            FetchError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 1);
                assert!(matches!(*source, FetchError::Timeout(_)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_is_retried() {
        let transport = MockTransport::new(vec![
            Script::Fail(FetchError::Network("connection refused".into())),
            Script::Respond(200, "ok".into()),
        ]);
        let fetcher = Fetcher::with_transport(transport.clone());

        let outcome = fetcher
            .fetch_with_retry(&FetchRequest::get("http://upstream/x"), &fast_policy(3))
            .await
            .unwrap();

        assert_eq!(outcome.status, 200);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_observer_sees_each_attempt() {
        let transport = MockTransport::new(vec![
            Script::Respond(500, "a".into()),
            Script::Respond(500, "b".into()),
            Script::Respond(200, "ok".into()),
        ]);
        let fetcher = Fetcher::with_transport(transport);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let policy = fast_policy(3).with_observer(Arc::new(move |attempt, error| {
            seen_clone
                .lock()
                .unwrap()
                .push((attempt, error.to_string()));
        }));

        fetcher
            .fetch_with_retry(&FetchRequest::get("http://upstream/x"), &policy)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[1].0, 2);
        assert!(seen[0].1.contains("500"));
    }

    #[test]
    fn test_request_builder_headers() {
        let req = FetchRequest::get("http://upstream/x")
            .header("Content-Type", "application/json")
            .bearer_auth("sk-admin-123");

        assert_eq!(req.method, Method::GET);
        assert_eq!(
            req.headers.get("Authorization").map(String::as_str),
            Some("Bearer sk-admin-123")
        );
        assert_eq!(
            req.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert!(req.body.is_none());
    }
}
