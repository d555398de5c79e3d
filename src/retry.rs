use std::time::Duration;

use rand::Rng;

use crate::{ErrorCategory, RetryPolicy, StructuredError};

/// Outcome of consulting a [`RetryPolicy`] after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then attempt again.
    Retry(Duration),
    /// Surface the error to the caller.
    Stop,
}

impl RetryPolicy {
    /// Un-jittered wait before the attempt following `attempt` (1-based):
    /// `min(max_wait, initial_wait * base^(attempt - 1))`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        // Zero times an overflowed power is NaN, but the schedule is flat zero.
        if self.initial_wait().is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.max(1) - 1;
        let secs = self.initial_wait().as_secs_f64()
            * self.exponential_base().powf(f64::from(exponent));
        let cap = self.max_wait();
        if secs.is_nan() {
            return Duration::ZERO;
        }
        if secs.is_infinite() || secs >= cap.as_secs_f64() {
            return cap;
        }
        Duration::from_secs_f64(secs)
    }

    /// Decides whether attempt `attempt` (1-based) that failed with `error`
    /// should be followed by another one. Samples jitter from the thread RNG.
    pub fn decide(&self, error: &StructuredError, attempt: u32) -> RetryDecision {
        self.decide_with_rng(error, attempt, &mut rand::thread_rng())
    }

    /// Same as [`RetryPolicy::decide`] with an explicit RNG. Performs no I/O
    /// and never sleeps.
    pub fn decide_with_rng<R>(
        &self,
        error: &StructuredError,
        attempt: u32,
        rng: &mut R,
    ) -> RetryDecision
    where
        R: Rng + ?Sized,
    {
        if attempt >= self.max_attempts() {
            return RetryDecision::Stop;
        }
        if !self.effective_retryable().contains(&error.category) {
            return RetryDecision::Stop;
        }

        if error.category == ErrorCategory::RateLimited {
            if let Some(seconds) = error.retry_after_seconds {
                return RetryDecision::Retry(Duration::from_secs(seconds).min(self.max_wait()));
            }
        }

        let computed = self.backoff(attempt);
        if !self.jitter() || computed.is_zero() {
            return RetryDecision::Retry(computed);
        }
        // Full jitter: uniform over [0, computed].
        let sampled = rng.gen_range(0.0..=computed.as_secs_f64());
        RetryDecision::Retry(Duration::from_secs_f64(sampled).min(computed))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::{rngs::StdRng, SeedableRng};

    use super::RetryDecision;
    use crate::{ErrorCategory, RetryPolicy, StructuredError};

    fn error(category: ErrorCategory) -> StructuredError {
        StructuredError::new(category, "GET", "https://api.example.com/data", "failed")
    }

    fn fixed_policy(max_attempts: u32, initial: f64, max: f64) -> RetryPolicy {
        RetryPolicy::new(max_attempts, initial, max)
            .expect("valid policy")
            .with_jitter(false)
    }

    #[test]
    fn backoff_without_jitter_follows_capped_exponential() {
        let policy = fixed_policy(10, 0.5, 10.0);
        let expected = [0.5, 1.0, 2.0, 4.0, 8.0, 10.0, 10.0];
        for (index, secs) in expected.iter().enumerate() {
            let attempt = index as u32 + 1;
            assert_eq!(
                policy.decide(&error(ErrorCategory::ServerError), attempt),
                RetryDecision::Retry(Duration::from_secs_f64(*secs)),
                "attempt {attempt}"
            );
        }
    }

    #[test]
    fn backoff_is_monotonic_until_cap_for_any_base() {
        for base in [1.2, 1.5, 2.0, 3.0, 10.0] {
            let policy = fixed_policy(50, 0.2, 20.0)
                .with_exponential_base(base)
                .expect("valid base");
            let mut previous = Duration::ZERO;
            for attempt in 1..50 {
                let wait = policy.backoff(attempt);
                assert!(wait >= previous, "base {base} attempt {attempt}");
                assert!(wait <= policy.max_wait());
                previous = wait;
            }
            assert_eq!(previous, policy.max_wait());
        }
    }

    #[test]
    fn huge_attempt_numbers_saturate_at_max_wait() {
        let policy = fixed_policy(u32::MAX, 1.0, 20.0);
        assert_eq!(policy.backoff(u32::MAX - 1), Duration::from_secs(20));
    }

    #[test]
    fn zero_initial_wait_stays_zero_past_overflow() {
        let policy = fixed_policy(u32::MAX, 0.0, 10.0);
        for attempt in [1, 2, 2000, u32::MAX - 1] {
            assert_eq!(policy.backoff(attempt), Duration::ZERO, "attempt {attempt}");
        }
        assert_eq!(
            policy.decide(&error(ErrorCategory::ServerError), 2000),
            RetryDecision::Retry(Duration::ZERO)
        );
    }

    #[test]
    fn jittered_wait_stays_within_computed_bound() {
        let policy = RetryPolicy::new(20, 1.0, 20.0).expect("valid policy");
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..20 {
            let bound = policy.backoff(attempt);
            for _ in 0..200 {
                match policy.decide_with_rng(&error(ErrorCategory::Timeout), attempt, &mut rng) {
                    RetryDecision::Retry(wait) => assert!(wait <= bound, "{wait:?} > {bound:?}"),
                    RetryDecision::Stop => panic!("attempt {attempt} must retry"),
                }
            }
        }
    }

    #[test]
    fn jitter_actually_varies_the_wait() {
        let policy = RetryPolicy::new(5, 1.0, 20.0).expect("valid policy");
        let mut rng = StdRng::seed_from_u64(42);
        let waits: Vec<_> = (0..20)
            .map(|_| policy.decide_with_rng(&error(ErrorCategory::ServerError), 3, &mut rng))
            .collect();
        assert!(waits.iter().any(|wait| *wait != waits[0]));
    }

    #[test]
    fn stops_when_attempts_are_exhausted() {
        let policy = fixed_policy(3, 0.1, 1.0);
        assert!(matches!(
            policy.decide(&error(ErrorCategory::ServerError), 2),
            RetryDecision::Retry(_)
        ));
        assert_eq!(
            policy.decide(&error(ErrorCategory::ServerError), 3),
            RetryDecision::Stop
        );
    }

    #[test]
    fn non_retryable_categories_stop_immediately() {
        let policy = fixed_policy(5, 0.1, 1.0);
        for category in [
            ErrorCategory::ClientError,
            ErrorCategory::TooManyRedirects,
            ErrorCategory::DeserializationFailure,
        ] {
            assert_eq!(policy.decide(&error(category), 1), RetryDecision::Stop);
        }
    }

    #[test]
    fn narrowed_policy_stops_on_excluded_category() {
        let policy = fixed_policy(5, 0.1, 1.0).with_retryable([ErrorCategory::Timeout]);
        assert_eq!(
            policy.decide(&error(ErrorCategory::ServerError), 1),
            RetryDecision::Stop
        );
        assert!(matches!(
            policy.decide(&error(ErrorCategory::Timeout), 1),
            RetryDecision::Retry(_)
        ));
    }

    #[test]
    fn widened_policy_still_stops_on_client_error() {
        let policy = fixed_policy(5, 0.1, 1.0).with_retryable([ErrorCategory::ClientError]);
        assert_eq!(
            policy.decide(&error(ErrorCategory::ClientError), 1),
            RetryDecision::Stop
        );
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let policy = fixed_policy(1, 0.1, 1.0);
        assert_eq!(
            policy.decide(&error(ErrorCategory::Timeout), 1),
            RetryDecision::Stop
        );
    }

    #[test]
    fn retry_after_overrides_backoff_and_is_capped() {
        let policy = RetryPolicy::new(3, 0.1, 120.0).expect("valid policy");
        let limited = error(ErrorCategory::RateLimited).with_retry_after(Some(60));
        assert_eq!(
            policy.decide(&limited, 1),
            RetryDecision::Retry(Duration::from_secs(60))
        );

        let capped = RetryPolicy::new(3, 0.1, 20.0).expect("valid policy");
        assert_eq!(
            capped.decide(&limited, 1),
            RetryDecision::Retry(Duration::from_secs(20))
        );
    }

    #[test]
    fn rate_limited_without_retry_after_uses_backoff() {
        let policy = fixed_policy(3, 0.5, 10.0);
        assert_eq!(
            policy.decide(&error(ErrorCategory::RateLimited), 2),
            RetryDecision::Retry(Duration::from_secs(1))
        );
    }
}
