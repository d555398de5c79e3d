use std::collections::HashMap;
use std::sync::OnceLock;

use crate::{ClientProfile, ConfigError, RedirectPolicy, TimeoutPolicy};

pub const ENV_CONNECT_TIMEOUT: &str = "RESILIENT_HTTP_CONNECT_TIMEOUT_SECS";
pub const ENV_READ_TIMEOUT: &str = "RESILIENT_HTTP_READ_TIMEOUT_SECS";
pub const ENV_TOTAL_TIMEOUT: &str = "RESILIENT_HTTP_TOTAL_TIMEOUT_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "RESILIENT_HTTP_MAX_ATTEMPTS";
pub const ENV_INITIAL_BACKOFF: &str = "RESILIENT_HTTP_INITIAL_BACKOFF_SECS";
pub const ENV_MAX_BACKOFF: &str = "RESILIENT_HTTP_MAX_BACKOFF_SECS";
pub const ENV_FOLLOW_REDIRECTS: &str = "RESILIENT_HTTP_FOLLOW_REDIRECTS";
pub const ENV_MAX_REDIRECTS: &str = "RESILIENT_HTTP_MAX_REDIRECTS";
pub const ENV_LOGGING_ENABLED: &str = "RESILIENT_HTTP_LOGGING_ENABLED";

const ALL_VARS: [&str; 9] = [
    ENV_CONNECT_TIMEOUT,
    ENV_READ_TIMEOUT,
    ENV_TOTAL_TIMEOUT,
    ENV_MAX_ATTEMPTS,
    ENV_INITIAL_BACKOFF,
    ENV_MAX_BACKOFF,
    ENV_FOLLOW_REDIRECTS,
    ENV_MAX_REDIRECTS,
    ENV_LOGGING_ENABLED,
];

// Snapshot of the relevant variables, taken on first use and never refreshed.
static PROCESS_ENV: OnceLock<HashMap<&'static str, String>> = OnceLock::new();

/// Optional overrides for a [`ClientProfile`], usually sourced from the
/// `RESILIENT_HTTP_*` environment variables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvOverrides {
    /// `RESILIENT_HTTP_CONNECT_TIMEOUT_SECS`
    pub connect_timeout_secs: Option<f64>,
    /// `RESILIENT_HTTP_READ_TIMEOUT_SECS`
    pub read_timeout_secs: Option<f64>,
    /// `RESILIENT_HTTP_TOTAL_TIMEOUT_SECS`
    pub total_timeout_secs: Option<f64>,
    /// `RESILIENT_HTTP_MAX_ATTEMPTS`, counting the first attempt.
    pub max_attempts: Option<u32>,
    /// `RESILIENT_HTTP_INITIAL_BACKOFF_SECS`
    pub initial_backoff_secs: Option<f64>,
    /// `RESILIENT_HTTP_MAX_BACKOFF_SECS`
    pub max_backoff_secs: Option<f64>,
    /// `RESILIENT_HTTP_FOLLOW_REDIRECTS`
    pub follow_redirects: Option<bool>,
    /// `RESILIENT_HTTP_MAX_REDIRECTS`; only used when redirects are followed.
    pub max_redirects: Option<u32>,
    /// `RESILIENT_HTTP_LOGGING_ENABLED`
    pub logging_enabled: Option<bool>,
}

impl EnvOverrides {
    /// Overrides from the process environment.
    ///
    /// The variables are captured the first time any profile asks for them;
    /// later changes to the environment are not observed.
    pub fn from_process_env() -> Result<Self, ConfigError> {
        let snapshot = PROCESS_ENV.get_or_init(|| {
            ALL_VARS
                .into_iter()
                .filter_map(|var| std::env::var(var).ok().map(|value| (var, value)))
                .collect()
        });
        Self::from_lookup(|var| snapshot.get(var).cloned())
    }

    /// Overrides from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        Ok(Self {
            connect_timeout_secs: read(&get, ENV_CONNECT_TIMEOUT, parse_f64)?,
            read_timeout_secs: read(&get, ENV_READ_TIMEOUT, parse_f64)?,
            total_timeout_secs: read(&get, ENV_TOTAL_TIMEOUT, parse_f64)?,
            max_attempts: read(&get, ENV_MAX_ATTEMPTS, parse_u32)?,
            initial_backoff_secs: read(&get, ENV_INITIAL_BACKOFF, parse_f64)?,
            max_backoff_secs: read(&get, ENV_MAX_BACKOFF, parse_f64)?,
            follow_redirects: read(&get, ENV_FOLLOW_REDIRECTS, parse_bool)?,
            max_redirects: read(&get, ENV_MAX_REDIRECTS, parse_u32)?,
            logging_enabled: read(&get, ENV_LOGGING_ENABLED, parse_bool)?,
        })
    }

    /// Returns `profile` with every present override applied, re-validated.
    pub fn apply(&self, profile: ClientProfile) -> Result<ClientProfile, ConfigError> {
        let timeouts = TimeoutPolicy::new(
            self.connect_timeout_secs
                .unwrap_or_else(|| profile.timeouts.connect().as_secs_f64()),
            self.read_timeout_secs
                .unwrap_or_else(|| profile.timeouts.read().as_secs_f64()),
            self.total_timeout_secs
                .unwrap_or_else(|| profile.timeouts.total().as_secs_f64()),
        )?;

        let mut retry = profile.retry.clone();
        if let Some(max_attempts) = self.max_attempts {
            retry = retry.with_max_attempts(max_attempts)?;
        }
        let retry = retry.with_waits(self.initial_backoff_secs, self.max_backoff_secs)?;

        let follow = self
            .follow_redirects
            .unwrap_or_else(|| profile.redirects.follows());
        let redirects = if follow {
            RedirectPolicy::follow(
                self.max_redirects
                    .unwrap_or_else(|| profile.redirects.max_redirects()),
            )
        } else {
            RedirectPolicy::none()
        };

        let logging_enabled = self.logging_enabled.unwrap_or(profile.logging_enabled);

        Ok(profile
            .with_timeouts(timeouts)
            .with_retry(retry)
            .with_redirects(redirects)
            .with_logging(logging_enabled))
    }
}

fn read<T>(
    get: &dyn Fn(&str) -> Option<String>,
    var: &str,
    parse: fn(&str) -> Result<T, String>,
) -> Result<Option<T>, ConfigError> {
    get(var)
        .map(|raw| {
            parse(&raw).map_err(|reason| ConfigError::InvalidEnv {
                var: var.to_owned(),
                value: raw.clone(),
                reason,
            })
        })
        .transpose()
}

fn parse_f64(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>().map_err(|err| err.to_string())
}

fn parse_u32(raw: &str) -> Result<u32, String> {
    raw.parse::<u32>().map_err(|err| err.to_string())
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected one of true/false/1/0/yes/no/on/off".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::{ConfigError, ProfileKind};

    fn overrides(pairs: &[(&str, &str)]) -> Result<EnvOverrides, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        EnvOverrides::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn no_variables_leave_profile_unchanged() {
        let profile = ProfileKind::LlmApi.profile();
        let applied = overrides(&[])
            .expect("empty overrides")
            .apply(profile.clone())
            .expect("valid profile");
        assert_eq!(applied, profile);
    }

    #[test]
    fn numeric_and_boolean_overrides_are_applied() {
        let applied = overrides(&[
            (ENV_CONNECT_TIMEOUT, "1.5"),
            (ENV_TOTAL_TIMEOUT, "12"),
            (ENV_MAX_ATTEMPTS, "5"),
            (ENV_MAX_BACKOFF, "4"),
            (ENV_FOLLOW_REDIRECTS, "off"),
            (ENV_LOGGING_ENABLED, "FALSE"),
        ])
        .expect("valid overrides")
        .apply(ProfileKind::GenericApi.profile())
        .expect("valid profile");

        assert_eq!(applied.timeouts.connect(), Duration::from_millis(1500));
        assert_eq!(applied.timeouts.read(), Duration::from_secs(10));
        assert_eq!(applied.timeouts.total(), Duration::from_secs(12));
        assert_eq!(applied.retry.max_attempts(), 5);
        assert_eq!(applied.retry.max_wait(), Duration::from_secs(4));
        assert!(!applied.redirects.follows());
        assert!(!applied.logging_enabled);
    }

    #[test]
    fn enabling_redirects_on_database_profile_uses_override_limit() {
        let applied = overrides(&[(ENV_FOLLOW_REDIRECTS, "true"), (ENV_MAX_REDIRECTS, "2")])
            .expect("valid overrides")
            .apply(ProfileKind::Database.profile())
            .expect("valid profile");
        assert!(applied.redirects.follows());
        assert_eq!(applied.redirects.max_redirects(), 2);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let parsed = overrides(&[(ENV_MAX_ATTEMPTS, "   ")]).expect("blank is unset");
        assert_eq!(parsed.max_attempts, None);
    }

    #[test]
    fn garbage_values_fail_instead_of_falling_back() {
        let err = overrides(&[(ENV_FOLLOW_REDIRECTS, "maybe")]).expect_err("must reject");
        assert!(matches!(err, ConfigError::InvalidEnv { var, .. } if var == ENV_FOLLOW_REDIRECTS));

        let err = overrides(&[(ENV_MAX_ATTEMPTS, "-1")]).expect_err("must reject");
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn overrides_that_break_constraints_are_rejected() {
        let err = overrides(&[(ENV_READ_TIMEOUT, "0")])
            .expect("parses")
            .apply(ProfileKind::Scraper.profile())
            .expect_err("zero timeout must be rejected");
        assert!(matches!(err, ConfigError::InvalidPolicy { .. }));

        let err = overrides(&[(ENV_INITIAL_BACKOFF, "50")])
            .expect("parses")
            .apply(ProfileKind::Scraper.profile())
            .expect_err("initial above max must be rejected");
        assert!(matches!(
            err,
            ConfigError::InvalidPolicy {
                field: "retry.max_wait",
                ..
            }
        ));
    }
}
