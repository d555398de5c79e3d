use std::fmt;
use std::str::FromStr;

use crate::{ConfigError, EnvOverrides, RedirectPolicy, RetryPolicy, TimeoutPolicy};

/// The canonical classes of external service a client can be tuned for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    LlmApi,
    Database,
    GenericApi,
    Scraper,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 4] = [
        ProfileKind::LlmApi,
        ProfileKind::Database,
        ProfileKind::GenericApi,
        ProfileKind::Scraper,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::LlmApi => "llm-api",
            Self::Database => "database",
            Self::GenericApi => "generic-api",
            Self::Scraper => "scraper",
        }
    }

    /// Canonical tuning for this service class.
    pub fn profile(self) -> ClientProfile {
        // (connect, read, total, attempts, initial wait, max wait, redirects)
        let (connect, read, total, attempts, initial, max, redirects) = match self {
            Self::LlmApi => (5.0, 60.0, 90.0, 3, 1.0, 20.0, RedirectPolicy::follow(3)),
            Self::Database => (2.0, 5.0, 10.0, 2, 0.2, 2.0, RedirectPolicy::none()),
            Self::GenericApi => (5.0, 10.0, 30.0, 3, 0.5, 10.0, RedirectPolicy::follow(5)),
            Self::Scraper => (10.0, 30.0, 60.0, 3, 2.0, 20.0, RedirectPolicy::follow(10)),
        };
        ClientProfile {
            service_name: self.name().to_owned(),
            timeouts: TimeoutPolicy::canonical(connect, read, total),
            retry: RetryPolicy::canonical(attempts, initial, max),
            redirects,
            logging_enabled: true,
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProfileKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_owned()))
    }
}

/// Timeout, retry and redirect policy bundled for one service class.
///
/// Pure data: building a client clones the profile and never mutates it.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientProfile {
    /// Label attached to telemetry only.
    pub service_name: String,
    pub timeouts: TimeoutPolicy,
    pub retry: RetryPolicy,
    pub redirects: RedirectPolicy,
    /// Registers the built-in [`crate::TracingObserver`] when the `tracing`
    /// feature is compiled in.
    pub logging_enabled: bool,
}

impl ClientProfile {
    /// Canonical profile for `kind` with the process environment overrides
    /// applied. The environment is read once per process.
    pub fn from_env(kind: ProfileKind) -> Result<Self, ConfigError> {
        EnvOverrides::from_process_env()?.apply(kind.profile())
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_redirects(mut self, redirects: RedirectPolicy) -> Self {
        self.redirects = redirects;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }
}

impl From<ProfileKind> for ClientProfile {
    fn from(kind: ProfileKind) -> Self {
        kind.profile()
    }
}

/// Looks up a canonical profile by its service-class name.
///
/// Fails with [`ConfigError::UnknownProfile`]; there is no fallback profile.
pub fn resolve_profile(name: &str) -> Result<ClientProfile, ConfigError> {
    name.parse::<ProfileKind>().map(ProfileKind::profile)
}
