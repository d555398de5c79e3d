use std::time::Duration;

use crate::{ConfigError, TimeoutPolicy};

/// Request payload. Kept owned so it can be replayed on every attempt.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Serialized as JSON with `Content-Type: application/json`.
    Json(serde_json::Value),
    /// Sent as-is; set a `Content-Type` header yourself if needed.
    Raw(Vec<u8>),
}

/// Per-call replacement for the profile's connect/read pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutOverride {
    pub connect: Duration,
    pub read: Duration,
}

impl TimeoutOverride {
    pub fn new(connect_secs: f64, read_secs: f64) -> Result<Self, ConfigError> {
        // Validated through the same rules as the profile policy.
        let policy = TimeoutPolicy::new(connect_secs, read_secs, connect_secs + read_secs)?;
        Ok(Self {
            connect: policy.connect(),
            read: policy.read(),
        })
    }

    pub(crate) fn attempt_budget(&self) -> Duration {
        self.connect.saturating_add(self.read)
    }
}

impl From<&TimeoutPolicy> for TimeoutOverride {
    fn from(policy: &TimeoutPolicy) -> Self {
        Self {
            connect: policy.connect(),
            read: policy.read(),
        }
    }
}

/// Optional per-call settings for [`crate::ResilientClient::request`].
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    /// Appended to the URL's existing query string.
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Option<TimeoutOverride>,
    /// `false` limits the call to a single attempt.
    pub retry_enabled: bool,
    /// Correlation token handed to observers; never sent on the wire.
    pub trace_token: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
            retry_enabled: true,
            trace_token: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn raw(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = RequestBody::Raw(body.into());
        self
    }

    pub fn timeout(mut self, timeout: TimeoutOverride) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_enabled(mut self, enabled: bool) -> Self {
        self.retry_enabled = enabled;
        self
    }

    pub fn trace_token(mut self, token: impl Into<String>) -> Self {
        self.trace_token = Some(token.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{RequestBody, RequestOptions, TimeoutOverride};

    #[test]
    fn defaults_enable_retry_with_no_body() {
        let options = RequestOptions::default();
        assert!(options.retry_enabled);
        assert_eq!(options.body, RequestBody::Empty);
        assert!(options.timeout.is_none());
    }

    #[test]
    fn timeout_override_validates_and_sums_budget() {
        let timeout = TimeoutOverride::new(0.5, 2.0).expect("valid override");
        assert_eq!(timeout.attempt_budget(), Duration::from_millis(2500));
        assert!(TimeoutOverride::new(0.0, 1.0).is_err());
    }
}
