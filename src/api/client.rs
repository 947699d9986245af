use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::token_store::LocalStore;

type ApiResult = Result<Value, ApiError>;
type InFlight = Shared<BoxFuture<'static, ApiResult>>;

/// Retry and timeout settings for backend requests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        RequestPolicy::from(&ApiConfig::default())
    }
}

impl From<&ApiConfig> for RequestPolicy {
    fn from(config: &ApiConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

impl RequestPolicy {
    /// Delay after the given zero-based attempt: `retry_delay * 2^attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay * 2u32.saturating_pow(attempt)
    }
}

struct ClientInner {
    http: reqwest::Client,
    origin: String,
    policy: RequestPolicy,
    store: Arc<LocalStore>,
    pending: Mutex<HashMap<String, InFlight>>,
}

/// JSON client for the monitoring backend.
///
/// Identical requests (same method and endpoint) that overlap share one
/// in-flight request and its result.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        origin: &str,
        policy: RequestPolicy,
        store: Arc<LocalStore>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http,
                origin: origin.trim_end_matches('/').to_string(),
                policy,
                store,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[allow(dead_code)]
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.inner.store
    }

    pub async fn get(&self, endpoint: &str) -> ApiResult {
        self.request(Method::GET, endpoint, None).await
    }

    pub async fn post(&self, endpoint: &str, body: Value) -> ApiResult {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    pub async fn put(&self, endpoint: &str, body: Value) -> ApiResult {
        self.request(Method::PUT, endpoint, Some(body)).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, endpoint: &str) -> ApiResult {
        self.request(Method::DELETE, endpoint, None).await
    }

    pub async fn request(&self, method: Method, endpoint: &str, body: Option<Value>) -> ApiResult {
        let key = format!("{}_{}", method, endpoint);

        let in_flight = {
            let mut pending = self.inner.lock_pending();
            match pending.get(&key) {
                Some(existing) => {
                    debug!("🔁 Joining in-flight request {}", key);
                    existing.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let endpoint = endpoint.to_string();
                    let fut = async move { inner.execute(method, &endpoint, body).await }
                        .boxed()
                        .shared();
                    pending.insert(key.clone(), fut.clone());
                    fut
                }
            }
        };

        let _cleanup = PendingEntry {
            inner: &self.inner,
            key,
            fut: in_flight.clone(),
        };
        in_flight.await
    }
}

impl ClientInner {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn execute(&self, method: Method, endpoint: &str, body: Option<Value>) -> ApiResult {
        let url = format!("{}{}", self.origin, endpoint);
        let mut last_error = ApiError::Network("request was never attempted".to_string());

        for attempt in 0..=self.policy.max_retries {
            match self.send_once(method.clone(), &url, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!("❌ {} {} failed (attempt {}): {}", method, endpoint, attempt + 1, e);
                    last_error = e;
                    if attempt < self.policy.max_retries {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    async fn send_once(&self, method: Method, url: &str, body: Option<&Value>) -> ApiResult {
        let mut request = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache");
        if let Some(token) = self.store.auth_token() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        // Dropping the in-flight future on timeout aborts the request.
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if let Err(e) = self.store.clear_auth_token() {
                    warn!("Failed to clear auth token: {}", e);
                }
                warn!("🔒 Unauthorized access to {}", url);
                return Err(ApiError::Unauthorized);
            }
            if !status.is_success() {
                return Err(ApiError::Status(status.as_u16()));
            }

            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            let value: Value = serde_json::from_slice(&bytes)?;
            Ok::<Value, ApiError>(value)
        };

        match tokio::time::timeout(self.policy.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.policy.timeout)),
        }
    }
}

/// Removes a settled (or abandoned) request from the in-flight map, unless a
/// newer request already took its key.
struct PendingEntry<'a> {
    inner: &'a ClientInner,
    key: String,
    fut: InFlight,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        let mut pending = self.inner.lock_pending();
        let ours = pending
            .get(&self.key)
            .map(|current| current.ptr_eq(&self.fut))
            .unwrap_or(false);
        // With a single waiter left the clones are the map entry, this
        // guard's copy and the caller's awaited `in_flight`. Any other waiter
        // adds two more.
        if ours && (self.fut.peek().is_some() || self.fut.strong_count() <= Some(3)) {
            pending.remove(&self.key);
        }
    }
}
