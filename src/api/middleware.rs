//! Request guards for a shared deployment and the caller-context extractor.
//!
//! Configuration is via environment variables:
//! - `ROADMAPPER_API_KEY` - bearer key required on every route but `/health` (optional)
//! - `ROADMAPPER_CORS_ORIGINS` - comma-separated allowed origins (default: any)
//! - `ROADMAPPER_RATE_LIMIT` - requests per caller per minute (default: 100
//!   when an API key is set, otherwise unlimited)
//!
//! Budgets are counted per caller: the `X-Caller-Id` header when present,
//! otherwise the client address.

use std::{
    collections::HashMap,
    convert::Infallible,
    fmt,
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use super::handlers::ErrorBody;
use crate::caller::CallerContext;
use crate::config::{self, ConfigError};

/// Opaque caller identity, used for logging and request budgets.
pub const CALLER_ID_HEADER: &str = "X-Caller-Id";
/// Token forwarded to the repository service when fetching commit evidence.
pub const REPOSITORY_TOKEN_HEADER: &str = "X-Repository-Token";

pub const DEFAULT_RATE_LIMIT: u32 = 100;
const BUDGET_WINDOW: Duration = Duration::from_secs(60);
/// Tracked callers above which finished windows are swept.
const SWEEP_THRESHOLD: usize = 1024;

/// Who may call the API and how often.
#[derive(Clone, Debug, Default)]
pub struct AccessConfig {
    pub api_key: Option<String>,
    /// `None` allows any origin.
    pub cors_origins: Option<Vec<String>>,
    pub budget: Option<RequestBudget>,
}

impl AccessConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = var("ROADMAPPER_API_KEY").map(|k| k.trim().to_string());

        let cors_origins = var("ROADMAPPER_CORS_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect()
        });

        let limit = match var("ROADMAPPER_RATE_LIMIT") {
            Some(value) => {
                let limit: u32 = config::parse("ROADMAPPER_RATE_LIMIT", &value)?;
                if limit == 0 {
                    return Err(ConfigError::Zero("ROADMAPPER_RATE_LIMIT"));
                }
                Some(limit)
            }
            // A keyed deployment is shared, so it gets a budget by default
            None => api_key.as_ref().map(|_| DEFAULT_RATE_LIMIT),
        };

        Ok(Self {
            api_key,
            cors_origins,
            budget: limit.map(|l| RequestBudget::new(l, BUDGET_WINDOW)),
        })
    }

    /// No key, no budget, any origin.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_budget(mut self, limit: u32, window: Duration) -> Self {
        self.budget = Some(RequestBudget::new(limit, window));
        self
    }
}

/// Whose budget a request is charged to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    Caller(String),
    Address(IpAddr),
}

impl ClientKey {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match caller_from_headers(headers).caller_id {
            Some(id) => Self::Caller(id),
            None => Self::Address(client_address(headers)),
        }
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller(id) => write!(f, "caller {}", id),
            Self::Address(ip) => write!(f, "address {}", ip),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    used: u32,
}

/// Fixed-window request counter per [`ClientKey`].
#[derive(Clone, Debug)]
pub struct RequestBudget {
    limit: u32,
    window: Duration,
    windows: Arc<Mutex<HashMap<ClientKey, Window>>>,
}

impl RequestBudget {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Charge one request to `key` at `now`. When the budget is spent,
    /// returns how long until the caller's window resets.
    pub fn charge(&self, key: ClientKey, now: Instant) -> Result<(), Duration> {
        let mut windows = self.lock();
        if windows.len() > SWEEP_THRESHOLD {
            let span = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < span);
        }

        let window = windows.entry(key).or_insert(Window {
            started: now,
            used: 0,
        });
        let elapsed = now.duration_since(window.started);
        if elapsed >= self.window {
            *window = Window {
                started: now,
                used: 0,
            };
        }

        if window.used < self.limit {
            window.used += 1;
            Ok(())
        } else {
            Err(self.window.saturating_sub(elapsed))
        }
    }

    fn tracked(&self) -> usize {
        self.lock().len()
    }

    /// Counters stay usable after a panic elsewhere.
    fn lock(&self) -> MutexGuard<'_, HashMap<ClientKey, Window>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn rejection(status: StatusCode, tag: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: tag.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Reject requests without the deployment's bearer key, if one is set.
pub async fn require_api_key(
    State(config): State<AccessConfig>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = config.api_key.as_deref() else {
        return next.run(request).await;
    };

    let presented = bearer_token(request.headers()).map(str::to_string);
    if presented.as_deref() == Some(expected) {
        return next.run(request).await;
    }

    let caller = caller_from_headers(request.headers());
    warn!(
        caller = caller.caller(),
        presented = presented.is_some(),
        "Rejected request without a valid API key"
    );
    rejection(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "a valid bearer API key is required",
    )
}

/// Charge each request to its caller's budget.
pub async fn enforce_budget(
    State(budget): State<RequestBudget>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = ClientKey::from_headers(request.headers());

    match budget.charge(key.clone(), Instant::now()) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            warn!(client = %key, "Request budget exhausted");
            let mut response = rejection(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "request budget exhausted; retry later",
            );
            // Whole seconds, rounded up
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
            response
        }
    }
}

/// First address of `X-Forwarded-For`, then `X-Real-IP`, then loopback.
fn client_address(headers: &HeaderMap) -> IpAddr {
    let header_ip = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse().ok())
    };

    header_ip("X-Forwarded-For")
        .or_else(|| header_ip("X-Real-IP"))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn caller_from_headers(headers: &HeaderMap) -> CallerContext {
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    CallerContext {
        caller_id: value(CALLER_ID_HEADER),
        repository_token: value(REPOSITORY_TOKEN_HEADER),
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallerContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(caller_from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    #[test]
    fn unset_environment_is_open() {
        let config = AccessConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.api_key.is_none());
        assert!(config.cors_origins.is_none());
        assert!(config.budget.is_none());
    }

    #[test]
    fn api_key_brings_a_default_budget() {
        let config =
            AccessConfig::from_lookup(lookup(&[("ROADMAPPER_API_KEY", " secret ")])).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.budget.unwrap().limit, DEFAULT_RATE_LIMIT);
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let config = AccessConfig::from_lookup(lookup(&[(
            "ROADMAPPER_CORS_ORIGINS",
            "https://a.example, ,https://b.example",
        )]))
        .unwrap();
        assert_eq!(
            config.cors_origins.unwrap(),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn invalid_rate_limit_is_an_error() {
        assert_eq!(
            AccessConfig::from_lookup(lookup(&[("ROADMAPPER_RATE_LIMIT", "0")])).unwrap_err(),
            ConfigError::Zero("ROADMAPPER_RATE_LIMIT")
        );
        assert!(matches!(
            AccessConfig::from_lookup(lookup(&[("ROADMAPPER_RATE_LIMIT", "lots")])),
            Err(ConfigError::NotANumber { .. })
        ));
    }

    #[test]
    fn budget_resets_after_the_window() {
        let budget = RequestBudget::new(2, Duration::from_secs(60));
        let key = ClientKey::Caller("dana".to_string());
        let start = Instant::now();

        assert!(budget.charge(key.clone(), start).is_ok());
        assert!(budget.charge(key.clone(), start).is_ok());
        let wait = budget
            .charge(key.clone(), start + Duration::from_secs(20))
            .unwrap_err();
        assert_eq!(wait, Duration::from_secs(40));

        assert!(budget.charge(key, start + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn finished_windows_are_swept() {
        let budget = RequestBudget::new(1, Duration::from_secs(1));
        let start = Instant::now();
        for i in 0..=SWEEP_THRESHOLD {
            budget
                .charge(ClientKey::Caller(i.to_string()), start)
                .unwrap();
        }
        assert_eq!(budget.tracked(), SWEEP_THRESHOLD + 1);

        budget
            .charge(ClientKey::Caller("late".to_string()), start + Duration::from_secs(2))
            .unwrap();
        assert_eq!(budget.tracked(), 1);
    }

    #[test]
    fn caller_id_takes_precedence_over_address() {
        let key = ClientKey::from_headers(&headers(&[
            ("x-caller-id", "dana"),
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
        ]));
        assert_eq!(key, ClientKey::Caller("dana".to_string()));

        let key = ClientKey::from_headers(&headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]));
        assert_eq!(key, ClientKey::Address("203.0.113.7".parse().unwrap()));

        let key = ClientKey::from_headers(&headers(&[("x-real-ip", "198.51.100.2")]));
        assert_eq!(key, ClientKey::Address("198.51.100.2".parse().unwrap()));

        assert_eq!(
            ClientKey::from_headers(&HeaderMap::new()),
            ClientKey::Address(IpAddr::V4(Ipv4Addr::LOCALHOST))
        );
    }

    #[test]
    fn bearer_token_requires_the_scheme() {
        assert_eq!(
            bearer_token(&headers(&[("authorization", "Bearer abc")])),
            Some("abc")
        );
        assert_eq!(bearer_token(&headers(&[("authorization", "Basic abc")])), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn caller_context_reads_headers() {
        let request = Request::builder()
            .header(CALLER_ID_HEADER, "dana")
            .header(REPOSITORY_TOKEN_HEADER, " ghp_secret ")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let caller = CallerContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(caller.caller(), "dana");
        assert_eq!(caller.repository_token.as_deref(), Some("ghp_secret"));
    }

    #[tokio::test]
    async fn caller_context_defaults_to_anonymous() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let caller = CallerContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(caller, CallerContext::anonymous());
    }
}
