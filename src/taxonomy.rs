use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// Closed classification of every failure the client can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Attempt or overall deadline elapsed.
    Timeout,
    /// DNS, refused connection, TLS handshake or a broken stream.
    ConnectionFailure,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    ServerError,
    /// HTTP 4xx other than 429.
    ClientError,
    /// Redirect hop limit reached or a redirect loop detected.
    TooManyRedirects,
    /// Successful status whose body did not match its declared format.
    DeserializationFailure,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 7] = [
        ErrorCategory::Timeout,
        ErrorCategory::ConnectionFailure,
        ErrorCategory::RateLimited,
        ErrorCategory::ServerError,
        ErrorCategory::ClientError,
        ErrorCategory::TooManyRedirects,
        ErrorCategory::DeserializationFailure,
    ];

    /// Maps an HTTP status to a category. Returns `None` for statuses that
    /// are not failures (2xx, 3xx and anything outside 400..=599).
    pub fn from_status(status: u16) -> Option<Self> {
        if status == 429 {
            return Some(Self::RateLimited);
        }
        match status {
            500..=599 => Some(Self::ServerError),
            400..=499 => Some(Self::ClientError),
            _ => None,
        }
    }

    /// Maps a transport failure reported by `reqwest`.
    ///
    /// Only one predicate decides each category, so the order of checks has
    /// no effect on the outcome for errors reqwest produces.
    pub(crate) fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_redirect() {
            Self::TooManyRedirects
        } else {
            // connect, request, body, decompression: the wire failed.
            Self::ConnectionFailure
        }
    }

    /// Whether the category is retried when a policy does not narrow it.
    pub fn is_retryable_by_default(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailure | Self::ServerError | Self::RateLimited
        )
    }

    /// The default retryable set; policies may only narrow it.
    pub fn default_retryable() -> BTreeSet<ErrorCategory> {
        Self::ALL
            .into_iter()
            .filter(|category| category.is_retryable_by_default())
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailure => "connection_failure",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::TooManyRedirects => "too_many_redirects",
            Self::DeserializationFailure => "deserialization_failure",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCategory;

    #[test]
    fn status_429_is_rate_limited_not_client_error() {
        assert_eq!(
            ErrorCategory::from_status(429),
            Some(ErrorCategory::RateLimited)
        );
    }

    #[test]
    fn status_ranges_map_to_categories() {
        assert_eq!(
            ErrorCategory::from_status(500),
            Some(ErrorCategory::ServerError)
        );
        assert_eq!(
            ErrorCategory::from_status(599),
            Some(ErrorCategory::ServerError)
        );
        assert_eq!(
            ErrorCategory::from_status(400),
            Some(ErrorCategory::ClientError)
        );
        assert_eq!(
            ErrorCategory::from_status(404),
            Some(ErrorCategory::ClientError)
        );
        assert_eq!(
            ErrorCategory::from_status(499),
            Some(ErrorCategory::ClientError)
        );
    }

    #[test]
    fn success_and_redirect_statuses_are_not_errors() {
        for status in [200, 201, 204, 299, 301, 302, 304, 307, 308] {
            assert_eq!(ErrorCategory::from_status(status), None, "status {status}");
        }
    }

    #[test]
    fn default_retryable_set_is_exactly_the_transient_categories() {
        let set = ErrorCategory::default_retryable();
        assert_eq!(set.len(), 4);
        assert!(set.contains(&ErrorCategory::Timeout));
        assert!(set.contains(&ErrorCategory::ConnectionFailure));
        assert!(set.contains(&ErrorCategory::RateLimited));
        assert!(set.contains(&ErrorCategory::ServerError));
        assert!(!ErrorCategory::ClientError.is_retryable_by_default());
        assert!(!ErrorCategory::TooManyRedirects.is_retryable_by_default());
        assert!(!ErrorCategory::DeserializationFailure.is_retryable_by_default());
    }
}
