use std::collections::{HashMap, HashSet};
use std::error::Error as _;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{self, HeaderMap, HeaderName};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::sanitize::sanitize_parsed;
use crate::{ErrorCategory, RedirectPolicy, RequestBody, StructuredError};

const REQUEST_ID_HEADERS: [&str; 4] = [
    "x-request-id",
    "request-id",
    "x-amzn-requestid",
    "x-correlation-id",
];

const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

// Reset values above this are not plausible epoch seconds (year ~5138);
// they are almost certainly milliseconds and are rejected.
const MAX_EPOCH_SECONDS: u64 = 100_000_000_000;

const CROSS_ORIGIN_STRIPPED: [HeaderName; 3] = [
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Everything needed for one network attempt.
pub(crate) struct Attempt<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub headers: &'a HeaderMap,
    pub body: &'a RequestBody,
    /// Budget for the whole attempt, redirect hops and body read included.
    pub timeout: Duration,
    pub redirects: RedirectPolicy,
}

/// A response the client should parse: 2xx, or 3xx that was not followed.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// A classified failed attempt, with the response headers when one arrived.
#[derive(Debug)]
pub(crate) struct AttemptFailure {
    pub error: StructuredError,
    pub headers: HeaderMap,
}

impl AttemptFailure {
    fn bare(error: StructuredError) -> Self {
        Self {
            error,
            headers: HeaderMap::new(),
        }
    }
}

/// Performs single HTTP attempts over a shared connection pool. Never retries.
#[derive(Clone, Debug)]
pub(crate) struct Executor {
    http: reqwest::Client,
}

impl Executor {
    pub(crate) fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub(crate) async fn attempt(
        &self,
        attempt: &Attempt<'_>,
    ) -> Result<RawResponse, AttemptFailure> {
        match tokio::time::timeout(attempt.timeout, self.follow(attempt)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AttemptFailure::bare(StructuredError::new(
                ErrorCategory::Timeout,
                attempt.method.as_str(),
                sanitize_parsed(attempt.url),
                format!(
                    "no complete response within {:.3}s",
                    attempt.timeout.as_secs_f64()
                ),
            ))),
        }
    }

    async fn follow(&self, attempt: &Attempt<'_>) -> Result<RawResponse, AttemptFailure> {
        let mut method = attempt.method.clone();
        let mut url = attempt.url.clone();
        let mut headers = attempt.headers.clone();
        let mut send_body = true;
        let mut visited = HashSet::from([url.to_string()]);
        let mut hops = 0u32;

        loop {
            let body = if send_body {
                attempt.body
            } else {
                &RequestBody::Empty
            };
            let response = self
                .send(&method, &url, &headers, body)
                .await
                .map_err(|err| AttemptFailure::bare(transport_error(&err, attempt)))?;
            let status = response.status();

            if status.is_redirection() && attempt.redirects.follows() {
                if let Some(next) = redirect_target(&url, response.headers()) {
                    // Same category reqwest's own redirect errors map to.
                    if !matches!(next.scheme(), "http" | "https") {
                        return Err(AttemptFailure::bare(StructuredError::new(
                            ErrorCategory::TooManyRedirects,
                            attempt.method.as_str(),
                            sanitize_parsed(attempt.url),
                            format!("redirect to unsupported scheme '{}'", next.scheme()),
                        )));
                    }
                    if !visited.insert(next.to_string()) {
                        return Err(AttemptFailure::bare(StructuredError::new(
                            ErrorCategory::TooManyRedirects,
                            attempt.method.as_str(),
                            sanitize_parsed(attempt.url),
                            format!("redirect loop back to {}", sanitize_parsed(&next)),
                        )));
                    }
                    if hops >= attempt.redirects.max_redirects() {
                        return Err(AttemptFailure::bare(StructuredError::new(
                            ErrorCategory::TooManyRedirects,
                            attempt.method.as_str(),
                            sanitize_parsed(attempt.url),
                            format!(
                                "more than {} redirects",
                                attempt.redirects.max_redirects()
                            ),
                        )));
                    }
                    hops += 1;

                    if rewrites_to_get(status, &method) {
                        method = Method::GET;
                        send_body = false;
                        headers.remove(header::CONTENT_TYPE);
                        headers.remove(header::CONTENT_LENGTH);
                    }
                    if !same_origin(&url, &next) {
                        for name in &CROSS_ORIGIN_STRIPPED {
                            headers.remove(name);
                        }
                    }

                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        status = status.as_u16(),
                        hop = hops,
                        location = %sanitize_parsed(&next),
                        "following redirect"
                    );

                    url = next;
                    continue;
                }
            }

            let response_headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|err| AttemptFailure::bare(transport_error(&err, attempt)))?
                .to_vec();

            return match ErrorCategory::from_status(status.as_u16()) {
                None => Ok(RawResponse {
                    status: status.as_u16(),
                    headers: response_headers,
                    body,
                }),
                Some(category) => {
                    let error = StructuredError::new(
                        category,
                        attempt.method.as_str(),
                        sanitize_parsed(attempt.url),
                        status_summary(status),
                    )
                    .with_status(status.as_u16())
                    .with_request_id(request_id(&response_headers))
                    .with_retry_after(retry_after_seconds(
                        &response_headers,
                        SystemTime::now(),
                    ));
                    Err(AttemptFailure {
                        error,
                        headers: response_headers,
                    })
                }
            };
        }
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: &RequestBody,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let builder = self
            .http
            .request(method.clone(), url.clone())
            .headers(headers.clone());
        let builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Raw(bytes) => builder.body(bytes.clone()),
        };
        builder.send().await
    }
}

fn transport_error(err: &reqwest::Error, attempt: &Attempt<'_>) -> StructuredError {
    let category = ErrorCategory::from_transport(err);
    let what = match category {
        ErrorCategory::Timeout => "timed out",
        ErrorCategory::TooManyRedirects => "redirect failed",
        _ if err.is_connect() => "connection failed",
        _ if err.is_body() || err.is_decode() => "response body read failed",
        _ => "request failed",
    };
    StructuredError::new(
        category,
        attempt.method.as_str(),
        sanitize_parsed(attempt.url),
        match root_cause(err) {
            Some(cause) => format!("{what}: {cause}"),
            None => what.to_owned(),
        },
    )
}

// reqwest's own Display embeds the full URL, query included; the innermost
// source does not.
fn root_cause(err: &reqwest::Error) -> Option<String> {
    let mut current = err.source()?;
    while let Some(next) = current.source() {
        current = next;
    }
    Some(current.to_string())
}

fn status_summary(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}

fn redirect_target(current: &Url, headers: &HeaderMap) -> Option<Url> {
    let location = headers.get(header::LOCATION)?.to_str().ok()?;
    current.join(location.trim()).ok()
}

fn rewrites_to_get(status: StatusCode, method: &Method) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
    ) && *method != Method::GET
        && *method != Method::HEAD
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

pub(crate) fn request_id(headers: &HeaderMap) -> Option<String> {
    REQUEST_ID_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    })
}

/// Server-requested delay in whole seconds, relative to `now`.
///
/// `Retry-After` (delta-seconds or HTTP-date) wins over `X-RateLimit-Reset`
/// (integer Unix epoch seconds). Values in any other format are ignored.
pub(crate) fn retry_after_seconds(headers: &HeaderMap, now: SystemTime) -> Option<u64> {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
    };

    if let Some(value) = header_str(header::RETRY_AFTER.as_str()) {
        if let Ok(seconds) = value.parse::<u64>() {
            return Some(seconds);
        }
        if let Ok(at) = httpdate::parse_http_date(value) {
            return Some(ceil_secs(at.duration_since(now).unwrap_or(Duration::ZERO)));
        }
    }

    let reset = header_str(RATE_LIMIT_RESET_HEADER)?.parse::<u64>().ok()?;
    if reset > MAX_EPOCH_SECONDS {
        return None;
    }
    let now_secs = now.duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(reset.saturating_sub(now_secs))
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Lower-cased header names; repeated headers joined with `", "`.
pub(crate) fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flat: HashMap<String, String> = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}
