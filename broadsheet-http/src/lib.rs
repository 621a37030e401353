//! HTTP fetch layer for article pages and JSON service calls.
//!
//! - Page fetches: desktop browser headers, optional authenticated cookies,
//!   redirect tracking so callers can spot paywall bounces
//! - Retries transient failures (connect errors, 429, 5xx) with exponential
//!   backoff and `Retry-After` support; everything else fails fast
//! - JSON helpers for the LLM and archive service clients
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), broadsheet_http::FetchError> {
//! let client = broadsheet_http::FetchClient::new()?;
//! let page = client
//!     .get_page("https://example.com/story", broadsheet_http::PageOpts::default())
//!     .await?;
//! assert!(page.status.is_success());
//! # Ok(()) }
//! ```
//!
//! Security: cookie values from a [`SessionState`] are attached to the request
//! but never logged; events only carry the cookie count and the auth kind.
//!
//! Observability: structured `tracing` events are emitted for request start,
//! retries, response status, and final errors (`http.request.start`,
//! `http.retrying`, `http.response`, `http.error`).

use broadsheet_common::SessionState;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Default desktop profile for direct page fetches. Sites that block obvious
/// bot user agents get a plausible browser signature instead.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("client build failed: {0}")]
    Build(String),
    /// Transient transport failure; the retry budget was already spent.
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    /// 401/403 on an article URL: almost always a subscription wall, not a
    /// broken link. Callers may retry with authenticated cookies.
    #[error("access blocked with status {status}")]
    Blocked { status: StatusCode },
    /// Non-retryable status (4xx other than 401/403/429, or a 5xx after the
    /// retry budget). The strategy should advance, not retry.
    #[error("fatal status {status}: {message}")]
    Fatal { status: StatusCode, message: String },
}

impl FetchError {
    /// True for errors worth retrying at a higher level (a later strategy may
    /// still hit the same transient fault).
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }
}

// ==============================
// Request options & results
// ==============================

/// Per-request tuning knobs for a page fetch.
#[derive(Clone, Debug, Default)]
pub struct PageOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    /// Attach the live cookies from this session to the request.
    pub session: Option<&'a SessionState>,
    pub headers: Option<HeaderMap>,
}

/// A fetched page plus enough metadata to spot paywall redirects.
#[derive(Clone, Debug)]
pub struct FetchedPage {
    pub requested: Url,
    pub final_url: Url,
    pub status: StatusCode,
    pub body: String,
}

impl FetchedPage {
    /// A successful, unredirected page; used by fakes in cascade tests.
    pub fn ok(url: Url, body: String) -> Self {
        Self {
            requested: url.clone(),
            final_url: url,
            status: StatusCode::OK,
            body,
        }
    }

    /// True when the server bounced us somewhere other than the article.
    pub fn was_redirected(&self) -> bool {
        self.requested.path() != self.final_url.path()
            || self.requested.host_str() != self.final_url.host_str()
    }

    /// A 200 that landed on a subscription or login page instead of the
    /// article. Sites that soft-paywall redirect rather than returning 401.
    pub fn looks_like_paywall_redirect(&self) -> bool {
        if !self.was_redirected() {
            return false;
        }
        let path = self.final_url.path().to_ascii_lowercase();
        ["subscribe", "subscription", "login", "signin", "sign-in", "account", "offers", "paywall"]
            .iter()
            .any(|marker| path.contains(marker))
    }
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct FetchClient {
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
    user_agent: String,
}

impl FetchClient {
    /// Construct a client with browser-like defaults.
    ///
    /// ```no_run
    /// use broadsheet_http::{FetchClient, FetchError};
    /// use std::time::Duration;
    ///
    /// let client = FetchClient::new()?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(20));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), FetchError>(())
    /// ```
    pub fn new() -> Result<Self, FetchError> {
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::limited(8))
            .build()
            .map_err(|e| FetchError::Build(e.to_string()))?;
        Ok(Self {
            inner,
            default_timeout: Duration::from_secs(20),
            max_retries: 2,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    // ==============================
    // Page fetches
    // ==============================

    /// GET an article page as text, with retries and optional session cookies.
    pub async fn get_page(&self, url: &str, opts: PageOpts<'_>) -> Result<FetchedPage, FetchError> {
        let requested = Url::parse(url).map_err(|e| FetchError::Url(e.to_string()))?;

        let mut attempt = 0usize;
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);

        let cookie_header = opts
            .session
            .map(|s| s.cookie_header(Utc::now()))
            .filter(|h| !h.is_empty());
        let cookie_count = opts
            .session
            .map(|s| s.credentials.len())
            .unwrap_or_default();

        loop {
            let mut rb = self
                .inner
                .request(Method::GET, requested.clone())
                .timeout(timeout)
                .header(USER_AGENT, self.user_agent.as_str())
                .header(ACCEPT, DEFAULT_ACCEPT)
                .header(ACCEPT_LANGUAGE, DEFAULT_ACCEPT_LANGUAGE);

            if let Some(cookies) = &cookie_header {
                match HeaderValue::from_str(cookies) {
                    Ok(value) => rb = rb.header(COOKIE, value),
                    Err(e) => return Err(FetchError::Build(format!("invalid cookie header: {e}"))),
                }
            }
            if let Some(hdrs) = &opts.headers {
                rb = rb.headers(hdrs.clone());
            }

            let req_id = request_id();
            tracing::debug!(
                req_id=%req_id,
                attempt=attempt + 1,
                max_retries,
                host_path=%format!("{}{}", requested.domain().unwrap_or("-"), requested.path()),
                timeout_ms=timeout.as_millis() as u64,
                cookie_count,
                authed=cookie_header.is_some(),
                "http.request.start"
            );

            let t0 = std::time::Instant::now();
            let resp = match rb.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    let message = err.to_string();
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff_delay(attempt);
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            message=%message,
                            "http.retrying.network"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(req_id=%req_id, attempt, message=%message, "http.error.network");
                    return Err(FetchError::Network(message));
                }
            };

            let status = resp.status();
            let final_url = resp.url().clone();
            let headers = resp.headers().clone();
            let body = match resp.text().await {
                Ok(body) => body,
                Err(err) => {
                    let message = err.to_string();
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff_delay(attempt);
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            backoff_ms=delay.as_millis() as u64,
                            message=%message,
                            "http.retrying.body"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    return Err(FetchError::Network(message));
                }
            };

            tracing::debug!(
                req_id=%req_id,
                %status,
                duration_ms=t0.elapsed().as_millis() as u64,
                body_len=body.len(),
                final_host=%final_url.domain().unwrap_or("-"),
                redirected=%(final_url != requested),
                "http.response"
            );

            if status.is_success() {
                return Ok(FetchedPage {
                    requested,
                    final_url,
                    status,
                    body,
                });
            }

            let is_429 = status == StatusCode::TOO_MANY_REQUESTS;
            if (is_429 || status.is_server_error()) && attempt < max_retries {
                attempt += 1;
                let delay = if let Some(secs) = retry_after_delay_secs(&headers) {
                    Duration::from_secs(secs)
                } else {
                    let exp = backoff_delay(attempt);
                    if is_429 {
                        // default floor for 429 when no Retry-After is present
                        exp.max(Duration::from_millis(1100))
                    } else {
                        exp
                    }
                };
                tracing::warn!(
                    req_id=%req_id,
                    %status,
                    attempt,
                    max_retries,
                    backoff_ms=delay.as_millis() as u64,
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            let snippet = snip_body(body.as_bytes());
            tracing::warn!(req_id=%req_id, %status, body_snippet=%snippet, "http.error");

            return Err(
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    FetchError::Blocked { status }
                } else if is_429 || status.is_server_error() {
                    FetchError::Network(format!("status {status} after {attempt} retries"))
                } else {
                    FetchError::Fatal {
                        status,
                        message: snippet,
                    }
                },
            );
        }
    }

    // ==============================
    // JSON service calls
    // ==============================

    /// POST JSON to an absolute URL, optionally with Bearer auth.
    pub async fn post_json<B, T>(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(Method::POST, url, bearer, Some(body)).await
    }

    /// GET JSON from an absolute URL, optionally with Bearer auth.
    pub async fn get_json<T>(&self, url: &str, bearer: Option<&str>) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        self.request_json::<(), T>(Method::GET, url, bearer, None)
            .await
    }

    async fn request_json<B, T>(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        body: Option<&B>,
    ) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = Url::parse(url).map_err(|e| FetchError::Url(e.to_string()))?;
        let mut attempt = 0usize;

        loop {
            let mut rb = self
                .inner
                .request(method.clone(), url.clone())
                .timeout(self.default_timeout);
            if let Some(token) = bearer {
                rb = rb.bearer_auth(sanitize_token(token)?);
            }
            if let Some(b) = body {
                rb = rb.json(b);
            }

            let req_id = request_id();
            tracing::debug!(
                req_id=%req_id,
                method=%method,
                host_path=%format!("{}{}", url.domain().unwrap_or("-"), url.path()),
                auth_kind=if bearer.is_some() { "bearer" } else { "none" },
                "http.request.start"
            );

            let resp = match rb.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt < self.max_retries {
                        attempt += 1;
                        sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Network(err.to_string()));
                }
            };

            let status = resp.status();
            let headers = resp.headers().clone();
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            let snippet = snip_body(&bytes);

            if status.is_success() {
                return serde_json::from_slice::<T>(&bytes).map_err(|e| {
                    tracing::warn!(
                        req_id=%req_id,
                        serde_err=%e.to_string(),
                        body_snippet=%snippet,
                        "http.response.decode_error"
                    );
                    FetchError::Decode(e.to_string(), snippet)
                });
            }

            if (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                && attempt < self.max_retries
            {
                attempt += 1;
                let delay = retry_after_delay_secs(&headers)
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| backoff_delay(attempt));
                tracing::warn!(req_id=%req_id, %status, attempt, "http.retrying");
                sleep(delay).await;
                continue;
            }

            tracing::warn!(req_id=%req_id, %status, body_snippet=%snippet, "http.error");
            return Err(FetchError::Fatal {
                status,
                message: snippet,
            });
        }
    }
}

// ==============================
// Helpers
// ==============================

fn backoff_delay(attempt: usize) -> Duration {
    Duration::from_millis(200u64.saturating_mul(1 << (attempt.saturating_sub(1)).min(8)))
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .parse()
        .ok()
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > 500 {
        snip.truncate(500);
        snip.push_str("...");
    }
    snip
}

/// Lightweight request id without extra deps.
fn request_id() -> String {
    format!(
        "r{:x}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    )
}

fn sanitize_token(raw: &str) -> Result<String, FetchError> {
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();
    s.retain(|ch| !ch.is_ascii_whitespace());

    if !s.is_ascii() || s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(FetchError::Build(
            "API token contains non-printable bytes".into(),
        ));
    }
    HeaderValue::from_str(&format!("Bearer {}", s))
        .map_err(|e| FetchError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(s)
}
