use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock};

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use tokio::time::Instant;
use url::Url;

use crate::{
    decode::parse_body,
    executor::{flatten_headers, request_id, Attempt, AttemptFailure, Executor, RawResponse},
    hooks::{ErrorEvent, Observer, Observers, RequestContext, ResponseEvent, RetryEvent},
    sanitize::{sanitize_parsed, sanitize_url},
    ClientProfile, ConfigError, ErrorCategory, ProfileKind, RequestOptions, RequestResult,
    RetryDecision, RetryPolicy, StructuredError, TimeoutOverride,
};

static SHARED_LLM_API: OnceLock<ResilientClient> = OnceLock::new();
static SHARED_DATABASE: OnceLock<ResilientClient> = OnceLock::new();
static SHARED_GENERIC_API: OnceLock<ResilientClient> = OnceLock::new();
static SHARED_SCRAPER: OnceLock<ResilientClient> = OnceLock::new();

#[derive(Clone)]
/// HTTP client that applies one [`ClientProfile`] to every call.
///
/// Cloning is cheap and clones share the connection pool. Calls hold no
/// shared mutable state, so one client can serve any number of tasks.
pub struct ResilientClient {
    executor: Executor,
    profile: Arc<ClientProfile>,
    default_headers: HeaderMap,
    observers: Observers,
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("profile", &self.profile)
            // Names only: values may carry credentials.
            .field(
                "default_headers",
                &self.default_headers.keys().collect::<Vec<_>>(),
            )
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ResilientClient {
    /// Builds a client with its own connection pool.
    ///
    /// Redirects are handled by the client itself, so the pool is built with
    /// transport-level redirects disabled.
    ///
    /// # Example
    ///
    /// ```
    /// use resilient_http::{ProfileKind, ResilientClient};
    ///
    /// let profile = ProfileKind::LlmApi.profile().with_service_name("summarizer");
    /// let client = ResilientClient::new(profile).expect("client must build");
    /// assert_eq!(client.profile().service_name, "summarizer");
    /// ```
    pub fn new(profile: ClientProfile) -> Result<Self, ConfigError> {
        let user_agent = format!(
            "resilient-http/{} ({})",
            env!("CARGO_PKG_VERSION"),
            profile.service_name
        );
        let http = reqwest::Client::builder()
            .connect_timeout(profile.timeouts.connect())
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(user_agent)
            .build()
            .map_err(ConfigError::HttpClient)?;
        Ok(Self::with_http_client(profile, http))
    }

    /// Builds a client from a canonical profile with environment overrides.
    pub fn from_kind(kind: ProfileKind) -> Result<Self, ConfigError> {
        Self::new(ClientProfile::from_env(kind)?)
    }

    /// Builds a client around an existing `reqwest::Client`.
    ///
    /// The supplied client should have redirects disabled; otherwise it
    /// follows them before this client's redirect policy sees them.
    pub fn with_http_client(profile: ClientProfile, http: reqwest::Client) -> Self {
        let mut observers = Observers::default();
        if profile.logging_enabled {
            register_logging(&mut observers);
        }
        Self {
            executor: Executor::new(http),
            profile: Arc::new(profile),
            default_headers: HeaderMap::new(),
            observers,
        }
    }

    /// Process-wide client for `kind`, built on first use with environment
    /// overrides applied and never modified afterwards.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use resilient_http::{ProfileKind, ResilientClient};
    ///
    /// let db = ResilientClient::shared(ProfileKind::Database)?;
    /// assert!(std::ptr::eq(db, ResilientClient::shared(ProfileKind::Database)?));
    /// # Ok::<(), resilient_http::ConfigError>(())
    /// ```
    pub fn shared(kind: ProfileKind) -> Result<&'static ResilientClient, ConfigError> {
        let slot = match kind {
            ProfileKind::LlmApi => &SHARED_LLM_API,
            ProfileKind::Database => &SHARED_DATABASE,
            ProfileKind::GenericApi => &SHARED_GENERIC_API,
            ProfileKind::Scraper => &SHARED_SCRAPER,
        };
        if let Some(client) = slot.get() {
            return Ok(client);
        }
        let client = Self::from_kind(kind)?;
        Ok(slot.get_or_init(|| client))
    }

    /// Registers an additional observer.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Adds a header sent with every request. Per-call headers of the same
    /// name replace it.
    pub fn with_default_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, ConfigError> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())
            .map_err(|reason| ConfigError::InvalidPolicy {
                field: "default_header",
                reason,
            })?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Profile this client was built with, environment overrides included.
    pub fn profile(&self) -> &ClientProfile {
        &self.profile
    }

    /// `GET` shorthand for [`ResilientClient::request`].
    pub async fn get(&self, url: &str, options: RequestOptions) -> RequestResult {
        self.request(Method::GET, url, options).await
    }

    /// `POST` shorthand for [`ResilientClient::request`].
    pub async fn post(&self, url: &str, options: RequestOptions) -> RequestResult {
        self.request(Method::POST, url, options).await
    }

    /// `PUT` shorthand for [`ResilientClient::request`].
    pub async fn put(&self, url: &str, options: RequestOptions) -> RequestResult {
        self.request(Method::PUT, url, options).await
    }

    /// `DELETE` shorthand for [`ResilientClient::request`].
    pub async fn delete(&self, url: &str, options: RequestOptions) -> RequestResult {
        self.request(Method::DELETE, url, options).await
    }

    /// `PATCH` shorthand for [`ResilientClient::request`].
    pub async fn patch(&self, url: &str, options: RequestOptions) -> RequestResult {
        self.request(Method::PATCH, url, options).await
    }

    /// Sends a request, retrying per the profile, and returns the terminal
    /// outcome. Expected failures are reported in [`RequestResult::error`];
    /// this never panics on network or protocol errors.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use resilient_http::{ErrorCategory, Method, ProfileKind, RequestOptions, ResilientClient};
    /// use serde_json::json;
    ///
    /// # async fn run() -> Result<(), resilient_http::ConfigError> {
    /// let client = ResilientClient::from_kind(ProfileKind::GenericApi)?;
    /// let result = client
    ///     .request(
    ///         Method::POST,
    ///         "https://api.example.com/jobs",
    ///         RequestOptions::new()
    ///             .header("Authorization", "Bearer token")
    ///             .json(json!({"name": "nightly"})),
    ///     )
    ///     .await;
    ///
    /// match result.error() {
    ///     None => println!("created: {:?}", result.body()),
    ///     Some(err) if err.category == ErrorCategory::RateLimited => {
    ///         println!("retry in {:?}s", err.retry_after_seconds)
    ///     }
    ///     Some(err) => println!("failed: {err}"),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> RequestResult {
        let started = Instant::now();
        let deadline = started + self.profile.timeouts.total();

        let target = build_url(url, &options.query);
        let sanitized = match &target {
            Ok(target) => sanitize_parsed(target),
            Err(_) => sanitize_url(url),
        };
        let ctx = RequestContext {
            service: &self.profile.service_name,
            method: method.as_str(),
            url: &sanitized,
            trace_token: options.trace_token.as_deref(),
        };
        self.observers.request_start(&ctx);

        let prepared = target.and_then(|target| {
            self.merge_headers(&options.headers)
                .map(|headers| (target, headers))
        });
        let (target, headers) = match prepared {
            Ok(prepared) => prepared,
            Err(reason) => {
                let error =
                    StructuredError::new(ErrorCategory::ClientError, ctx.method, ctx.url, reason);
                return self.finish_failure(&ctx, HeaderMap::new(), error, 0, started);
            }
        };

        let policy = if options.retry_enabled {
            Cow::Borrowed(&self.profile.retry)
        } else {
            Cow::Owned(RetryPolicy::disabled())
        };
        let attempt_budget = options
            .timeout
            .unwrap_or_else(|| TimeoutOverride::from(&self.profile.timeouts))
            .attempt_budget();

        let mut attempt_no = 0u32;
        loop {
            attempt_no += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let attempt = Attempt {
                method: &method,
                url: &target,
                headers: &headers,
                body: &options.body,
                timeout: attempt_budget.min(remaining),
                redirects: self.profile.redirects,
            };

            let failure = match self.executor.attempt(&attempt).await {
                Ok(raw) => return self.finish_response(&ctx, raw, attempt_no, started),
                Err(failure) => failure,
            };
            // An attempt cut short by the overall deadline ends the call.
            if failure.error.category == ErrorCategory::Timeout && Instant::now() >= deadline {
                return self.deadline_exceeded(&ctx, failure, attempt_no, started);
            }

            match policy.decide(&failure.error, attempt_no) {
                RetryDecision::Stop => {
                    return self.finish_failure(
                        &ctx,
                        failure.headers,
                        failure.error,
                        attempt_no,
                        started,
                    );
                }
                RetryDecision::Retry(wait) => {
                    // No time for another attempt: the last error stands as-is,
                    // keeping its status and any server-requested delay.
                    if wait >= deadline.saturating_duration_since(Instant::now()) {
                        return self.finish_failure(
                            &ctx,
                            failure.headers,
                            failure.error,
                            attempt_no,
                            started,
                        );
                    }
                    self.observers.retry(
                        &ctx,
                        &RetryEvent {
                            attempt: attempt_no,
                            category: failure.error.category,
                            status: failure.error.http_status,
                            wait,
                            error: &failure.error,
                        },
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn merge_headers(&self, extra: &[(String, String)]) -> Result<HeaderMap, String> {
        let mut headers = self.default_headers.clone();
        let mut replaced: Vec<HeaderName> = Vec::with_capacity(extra.len());
        for (name, value) in extra {
            let (name, value) = parse_header(name, value)?;
            if replaced.contains(&name) {
                headers.append(name, value);
            } else {
                headers.insert(name.clone(), value);
                replaced.push(name);
            }
        }
        Ok(headers)
    }

    fn finish_response(
        &self,
        ctx: &RequestContext<'_>,
        raw: RawResponse,
        attempts: u32,
        started: Instant,
    ) -> RequestResult {
        let content_type = raw
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());

        match parse_body(content_type, &raw.body) {
            Ok(body) => {
                self.observers.response(
                    ctx,
                    &ResponseEvent {
                        status: raw.status,
                        elapsed: started.elapsed(),
                        attempts,
                    },
                );
                RequestResult::success(
                    ctx.method,
                    ctx.url,
                    raw.status,
                    flatten_headers(&raw.headers),
                    body,
                    attempts,
                )
            }
            Err(err) => {
                let error = StructuredError::new(
                    ErrorCategory::DeserializationFailure,
                    ctx.method,
                    ctx.url,
                    format!("response declared JSON but did not parse: {err}"),
                )
                .with_status(raw.status)
                .with_request_id(request_id(&raw.headers));
                self.finish_failure(ctx, raw.headers, error, attempts, started)
            }
        }
    }

    fn deadline_exceeded(
        &self,
        ctx: &RequestContext<'_>,
        last: AttemptFailure,
        attempts: u32,
        started: Instant,
    ) -> RequestResult {
        let error = StructuredError::new(
            ErrorCategory::Timeout,
            ctx.method,
            ctx.url,
            format!(
                "deadline of {:.1}s exhausted after {attempts} attempt(s); last: {}",
                self.profile.timeouts.total().as_secs_f64(),
                last.error.summary
            ),
        )
        .with_request_id(last.error.request_id);
        self.finish_failure(ctx, last.headers, error, attempts, started)
    }

    fn finish_failure(
        &self,
        ctx: &RequestContext<'_>,
        headers: HeaderMap,
        error: StructuredError,
        attempts: u32,
        started: Instant,
    ) -> RequestResult {
        self.observers.error(
            ctx,
            &ErrorEvent {
                error: &error,
                elapsed: started.elapsed(),
                attempts,
            },
        );
        RequestResult::failure(flatten_headers(&headers), error, attempts)
    }
}

#[cfg(feature = "tracing")]
fn register_logging(observers: &mut Observers) {
    observers.push(Arc::new(crate::TracingObserver));
}

// Without the `tracing` feature there is nothing to log to.
#[cfg(not(feature = "tracing"))]
fn register_logging(_observers: &mut Observers) {}

fn build_url(raw: &str, query: &[(String, String)]) -> Result<Url, String> {
    let mut url = Url::parse(raw.trim()).map_err(|err| format!("invalid URL: {err}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported URL scheme '{}'", url.scheme()));
    }
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(name, value)| (name.as_str(), value.as_str())));
    }
    Ok(url)
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), String> {
    let header_name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| format!("invalid header name '{name}'"))?;
    // The value is never echoed: it may be a credential.
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| format!("invalid value for header '{header_name}'"))?;
    Ok((header_name, header_value))
}

#[cfg(test)]
mod tests {
    use super::{build_url, parse_header, ResilientClient};
    use crate::ProfileKind;

    #[test]
    fn query_options_are_appended_to_existing_query() {
        let url = build_url(
            "https://api.example.com/search?q=rust",
            &[("page".to_owned(), "2".to_owned())],
        )
        .expect("valid url");
        assert_eq!(url.as_str(), "https://api.example.com/search?q=rust&page=2");
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        assert!(build_url("ftp://example.com/file", &[]).is_err());
        assert!(build_url("not a url", &[]).is_err());
    }

    #[test]
    fn invalid_header_value_is_not_echoed() {
        let err = parse_header("Authorization", "Bearer secret\n").expect_err("must reject");
        assert!(!err.contains("secret"));
    }

    #[test]
    fn debug_redacts_default_header_values() {
        let client = ResilientClient::new(ProfileKind::GenericApi.profile())
            .expect("client")
            .with_default_header("Authorization", "Bearer secret-token")
            .expect("valid header");
        let debug = format!("{client:?}");
        assert!(debug.contains("authorization"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn shared_client_is_built_once_per_kind() {
        let first = ResilientClient::shared(ProfileKind::Database).expect("shared client");
        let again = ResilientClient::shared(ProfileKind::Database).expect("shared client");
        let other = ResilientClient::shared(ProfileKind::Scraper).expect("shared client");

        assert!(std::ptr::eq(first, again));
        assert!(!std::ptr::eq(first, other));
        assert_eq!(first.profile().service_name, "database");
        assert_eq!(other.profile().service_name, "scraper");
    }

    #[test]
    fn building_a_client_does_not_change_its_profile() {
        let profile = ProfileKind::Scraper.profile();
        let client = ResilientClient::new(profile.clone()).expect("client");
        assert_eq!(client.profile(), &profile);
    }
}
