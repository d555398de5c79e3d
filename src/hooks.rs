use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::{ErrorCategory, StructuredError};

/// Identifies the call an event belongs to. The URL is already sanitized.
#[derive(Clone, Copy, Debug)]
pub struct RequestContext<'a> {
    /// [`crate::ClientProfile::service_name`] of the client.
    pub service: &'a str,
    pub method: &'a str,
    pub url: &'a str,
    /// Caller-supplied correlation token, see [`crate::RequestOptions::trace_token`].
    pub trace_token: Option<&'a str>,
}

/// Terminal successful response.
#[derive(Clone, Copy, Debug)]
pub struct ResponseEvent {
    pub status: u16,
    /// Time since the call started, retries and waits included.
    pub elapsed: Duration,
    /// Attempts used, the successful one included.
    pub attempts: u32,
}

/// A failed attempt that will be followed by another one after `wait`.
#[derive(Clone, Copy, Debug)]
pub struct RetryEvent<'a> {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    pub category: ErrorCategory,
    /// Status of the failed attempt, if a response arrived.
    pub status: Option<u16>,
    /// Delay before the next attempt starts.
    pub wait: Duration,
    pub error: &'a StructuredError,
}

/// Terminal failure.
#[derive(Clone, Copy, Debug)]
pub struct ErrorEvent<'a> {
    /// The error returned to the caller.
    pub error: &'a StructuredError,
    /// Time since the call started.
    pub elapsed: Duration,
    /// Attempts made; `0` when the request could not be built.
    pub attempts: u32,
}

/// Receives request lifecycle notifications.
///
/// Observers only watch: they cannot alter the request, and a panicking
/// observer is contained and ignored.
pub trait Observer: Send + Sync {
    /// Once per call, before the first attempt.
    fn on_request_start(&self, _ctx: &RequestContext<'_>) {}

    /// Once per call that ends with a parsed response.
    fn on_response(&self, _ctx: &RequestContext<'_>, _event: &ResponseEvent) {}

    /// Before each backoff wait.
    fn on_retry(&self, _ctx: &RequestContext<'_>, _event: &RetryEvent<'_>) {}

    /// Once per call that ends with an error.
    fn on_error(&self, _ctx: &RequestContext<'_>, _event: &ErrorEvent<'_>) {}
}

#[derive(Clone, Default)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn Observer>>,
}

impl Observers {
    pub(crate) fn push(&mut self, observer: Arc<dyn Observer>) {
        self.observers.push(observer);
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn request_start(&self, ctx: &RequestContext<'_>) {
        self.each(|observer| observer.on_request_start(ctx));
    }

    pub(crate) fn response(&self, ctx: &RequestContext<'_>, event: &ResponseEvent) {
        self.each(|observer| observer.on_response(ctx, event));
    }

    pub(crate) fn retry(&self, ctx: &RequestContext<'_>, event: &RetryEvent<'_>) {
        self.each(|observer| observer.on_retry(ctx, event));
    }

    pub(crate) fn error(&self, ctx: &RequestContext<'_>, event: &ErrorEvent<'_>) {
        self.each(|observer| observer.on_error(ctx, event));
    }

    fn each<F>(&self, notify: F)
    where
        F: Fn(&dyn Observer),
    {
        for observer in &self.observers {
            // A broken observer must not break the request.
            let _ = catch_unwind(AssertUnwindSafe(|| notify(observer.as_ref())));
        }
    }
}

/// Built-in observer that emits `tracing` events.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

#[cfg(feature = "tracing")]
impl Observer for TracingObserver {
    fn on_request_start(&self, ctx: &RequestContext<'_>) {
        tracing::debug!(
            service = ctx.service,
            method = ctx.method,
            url = ctx.url,
            trace = ctx.trace_token,
            "http request started"
        );
    }

    fn on_response(&self, ctx: &RequestContext<'_>, event: &ResponseEvent) {
        tracing::info!(
            service = ctx.service,
            method = ctx.method,
            url = ctx.url,
            status = event.status,
            duration_ms = event.elapsed.as_millis() as u64,
            attempts = event.attempts,
            trace = ctx.trace_token,
            "http request completed"
        );
    }

    fn on_retry(&self, ctx: &RequestContext<'_>, event: &RetryEvent<'_>) {
        tracing::warn!(
            service = ctx.service,
            method = ctx.method,
            url = ctx.url,
            attempt = event.attempt,
            category = %event.category,
            status = event.status,
            wait_ms = event.wait.as_millis() as u64,
            trace = ctx.trace_token,
            "retrying http request: {}",
            event.error.summary
        );
    }

    fn on_error(&self, ctx: &RequestContext<'_>, event: &ErrorEvent<'_>) {
        tracing::warn!(
            service = ctx.service,
            method = ctx.method,
            url = ctx.url,
            category = %event.error.category,
            status = event.error.http_status,
            request_id = event.error.request_id.as_deref(),
            duration_ms = event.elapsed.as_millis() as u64,
            attempts = event.attempts,
            trace = ctx.trace_token,
            "http request failed: {}",
            event.error.summary
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{Observer, Observers, RequestContext};

    struct Panics;

    impl Observer for Panics {
        fn on_request_start(&self, _ctx: &RequestContext<'_>) {
            panic!("observer bug");
        }
    }

    #[derive(Default)]
    struct Counts(AtomicUsize);

    impl Observer for Counts {
        fn on_request_start(&self, _ctx: &RequestContext<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn panicking_observer_does_not_stop_the_others() {
        let counts = Arc::new(Counts::default());
        let mut observers = Observers::default();
        observers.push(Arc::new(Panics));
        observers.push(counts.clone());

        let ctx = RequestContext {
            service: "generic-api",
            method: "GET",
            url: "http://h/",
            trace_token: None,
        };
        observers.request_start(&ctx);
        observers.request_start(&ctx);

        assert_eq!(counts.0.load(Ordering::SeqCst), 2);
    }
}
