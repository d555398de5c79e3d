use std::collections::BTreeSet;
use std::time::Duration;

use crate::{ConfigError, ErrorCategory};

/// Connect, read and overall deadlines for one client profile.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeoutPolicy {
    connect: Duration,
    read: Duration,
    total: Duration,
}

impl TimeoutPolicy {
    /// Builds a policy from seconds. Every value must be finite and positive.
    pub fn new(connect_secs: f64, read_secs: f64, total_secs: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            connect: positive_secs("timeout.connect", connect_secs)?,
            read: positive_secs("timeout.read", read_secs)?,
            total: positive_secs("timeout.total", total_secs)?,
        })
    }

    // Only for the hard-coded profile table, whose values are known valid.
    pub(crate) fn canonical(connect_secs: f64, read_secs: f64, total_secs: f64) -> Self {
        Self {
            connect: Duration::from_secs_f64(connect_secs),
            read: Duration::from_secs_f64(read_secs),
            total: Duration::from_secs_f64(total_secs),
        }
    }

    pub fn connect(&self) -> Duration {
        self.connect
    }

    pub fn read(&self) -> Duration {
        self.read
    }

    /// Upper bound for a whole call, retries and backoff waits included.
    pub fn total(&self) -> Duration {
        self.total
    }
}

/// Attempt budget, backoff schedule and retryable categories.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_wait: Duration,
    max_wait: Duration,
    exponential_base: f64,
    jitter: bool,
    retryable: BTreeSet<ErrorCategory>,
}

impl RetryPolicy {
    pub const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;

    /// Builds a policy with base 2, full jitter and the default retryable set.
    ///
    /// `max_attempts` counts the initial attempt; `1` disables retry.
    pub fn new(
        max_attempts: u32,
        initial_wait_secs: f64,
        max_wait_secs: f64,
    ) -> Result<Self, ConfigError> {
        let policy = Self {
            max_attempts,
            initial_wait: non_negative_secs("retry.initial_wait", initial_wait_secs)?,
            max_wait: non_negative_secs("retry.max_wait", max_wait_secs)?,
            exponential_base: Self::DEFAULT_EXPONENTIAL_BASE,
            jitter: true,
            retryable: ErrorCategory::default_retryable(),
        };
        policy.validate()?;
        Ok(policy)
    }

    pub(crate) fn canonical(
        max_attempts: u32,
        initial_wait_secs: f64,
        max_wait_secs: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_wait: Duration::from_secs_f64(initial_wait_secs),
            max_wait: Duration::from_secs_f64(max_wait_secs),
            exponential_base: Self::DEFAULT_EXPONENTIAL_BASE,
            jitter: true,
            retryable: ErrorCategory::default_retryable(),
        }
    }

    /// A single attempt, never retried.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            initial_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
            exponential_base: Self::DEFAULT_EXPONENTIAL_BASE,
            jitter: false,
            retryable: BTreeSet::new(),
        }
    }

    pub fn with_exponential_base(mut self, base: f64) -> Result<Self, ConfigError> {
        self.exponential_base = base;
        self.validate()?;
        Ok(self)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Restricts which categories are retried. Categories outside the
    /// default retryable set are accepted here but never retried.
    pub fn with_retryable<I>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = ErrorCategory>,
    {
        self.retryable = categories.into_iter().collect();
        self
    }

    pub(crate) fn with_max_attempts(mut self, max_attempts: u32) -> Result<Self, ConfigError> {
        self.max_attempts = max_attempts;
        self.validate()?;
        Ok(self)
    }

    pub(crate) fn with_waits(
        mut self,
        initial_wait_secs: Option<f64>,
        max_wait_secs: Option<f64>,
    ) -> Result<Self, ConfigError> {
        if let Some(secs) = initial_wait_secs {
            self.initial_wait = non_negative_secs("retry.initial_wait", secs)?;
        }
        if let Some(secs) = max_wait_secs {
            self.max_wait = non_negative_secs("retry.max_wait", secs)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_wait(&self) -> Duration {
        self.initial_wait
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn exponential_base(&self) -> f64 {
        self.exponential_base
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Categories as configured, before intersecting with the defaults.
    pub fn retryable(&self) -> &BTreeSet<ErrorCategory> {
        &self.retryable
    }

    /// Configured categories intersected with the default retryable set.
    /// Empty when `max_attempts == 1`.
    pub fn effective_retryable(&self) -> BTreeSet<ErrorCategory> {
        if self.max_attempts <= 1 {
            return BTreeSet::new();
        }
        self.retryable
            .iter()
            .copied()
            .filter(|category| category.is_retryable_by_default())
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::InvalidPolicy {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.max_wait < self.initial_wait {
            return Err(ConfigError::InvalidPolicy {
                field: "retry.max_wait",
                reason: format!(
                    "{}s is below initial_wait {}s",
                    self.max_wait.as_secs_f64(),
                    self.initial_wait.as_secs_f64()
                ),
            });
        }
        if !self.exponential_base.is_finite() || self.exponential_base <= 1.0 {
            return Err(ConfigError::InvalidPolicy {
                field: "retry.exponential_base",
                reason: format!("{} must be finite and greater than 1", self.exponential_base),
            });
        }
        Ok(())
    }
}

/// Whether 3xx responses are followed, and how far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedirectPolicy {
    follow: bool,
    max_redirects: u32,
}

impl RedirectPolicy {
    /// Follow up to `max_redirects` hops; one more is `TooManyRedirects`.
    pub fn follow(max_redirects: u32) -> Self {
        Self {
            follow: true,
            max_redirects,
        }
    }

    /// Surface 3xx responses to the caller unmodified.
    pub fn none() -> Self {
        Self {
            follow: false,
            max_redirects: 0,
        }
    }

    pub fn follows(&self) -> bool {
        self.follow
    }

    /// Hop limit; meaningless when redirects are not followed.
    pub fn max_redirects(&self) -> u32 {
        if self.follow {
            self.max_redirects
        } else {
            0
        }
    }
}

fn positive_secs(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidPolicy {
            field,
            reason: format!("{secs} must be a finite number of seconds greater than 0"),
        });
    }
    secs_to_duration(field, secs)
}

fn non_negative_secs(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::InvalidPolicy {
            field,
            reason: format!("{secs} must be a finite, non-negative number of seconds"),
        });
    }
    secs_to_duration(field, secs)
}

fn secs_to_duration(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|err| ConfigError::InvalidPolicy {
        field,
        reason: err.to_string(),
    })
}
