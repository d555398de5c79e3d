use serde::Serialize;

use crate::ErrorCategory;

/// Longest `summary` a [`StructuredError`] carries, in characters.
pub const SUMMARY_MAX_CHARS: usize = 120;

/// Configuration-time error. Request-time failures never use this type.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Profile name is not one of the canonical service classes.
    #[error("unknown profile '{0}' (expected one of: llm-api, database, generic-api, scraper)")]
    UnknownProfile(String),
    /// A policy value violates its constraint.
    #[error("invalid {field}: {reason}")]
    InvalidPolicy {
        /// Dotted path of the offending field, e.g. `retry.max_wait`.
        field: &'static str,
        reason: String,
    },
    /// An environment override could not be parsed.
    #[error("invalid value '{value}' for {var}: {reason}")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Raw value as read.
        value: String,
        reason: String,
    },
    /// The underlying transport could not be built.
    #[error("http client construction failed: {0}")]
    HttpClient(reqwest::Error),
}

/// The only record through which failure detail leaves the client.
///
/// `url` is always sanitized: no query string, fragment or userinfo.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{category}: {summary}")]
pub struct StructuredError {
    pub category: ErrorCategory,
    /// Status of the response that failed, when one arrived.
    pub http_status: Option<u16>,
    /// Sanitized request URL.
    pub url: String,
    /// Request method as sent, e.g. `"GET"`.
    pub method: String,
    /// First of `x-request-id`, `request-id`, `x-amzn-requestid`,
    /// `x-correlation-id` present on the response.
    pub request_id: Option<String>,
    /// Human-readable, at most [`SUMMARY_MAX_CHARS`] characters.
    pub summary: String,
    /// Server-requested delay; only set for [`ErrorCategory::RateLimited`].
    pub retry_after_seconds: Option<u64>,
}

impl StructuredError {
    pub(crate) fn new(
        category: ErrorCategory,
        method: impl Into<String>,
        sanitized_url: impl Into<String>,
        summary: impl AsRef<str>,
    ) -> Self {
        Self {
            category,
            http_status: None,
            url: sanitized_url.into(),
            method: method.into(),
            request_id: None,
            summary: truncate_summary(summary.as_ref()),
            retry_after_seconds: None,
        }
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub(crate) fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub(crate) fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        if self.category == ErrorCategory::RateLimited {
            self.retry_after_seconds = seconds;
        }
        self
    }

    pub fn is_retryable_by_default(&self) -> bool {
        self.category.is_retryable_by_default()
    }
}

pub(crate) fn truncate_summary(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= SUMMARY_MAX_CHARS {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(SUMMARY_MAX_CHARS - 1).collect();
    out.push('…');
    out
}
