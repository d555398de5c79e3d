//! `resilient-http` is an async HTTP client that layers a resilience policy
//! on top of `reqwest`:
//! - per-attempt timeouts bounded by an overall deadline
//! - a closed [`ErrorCategory`] taxonomy reported through [`StructuredError`]
//! - retry with exponential full-jitter backoff and `Retry-After` support
//! - redirect following with hop limits and loop detection
//! - [`Observer`] hooks for logging and tracing
//!
//! Start from a canonical [`ProfileKind`] and call [`ResilientClient::request`]
//! or one of its method shorthands.

mod client;
mod decode;
mod env;
mod error;
mod executor;
mod hooks;
mod options;
mod policy;
mod profile;
mod retry;
mod sanitize;
mod taxonomy;
mod types;

pub use client::ResilientClient;
pub use env::{
    EnvOverrides, ENV_CONNECT_TIMEOUT, ENV_FOLLOW_REDIRECTS, ENV_INITIAL_BACKOFF,
    ENV_LOGGING_ENABLED, ENV_MAX_ATTEMPTS, ENV_MAX_BACKOFF, ENV_MAX_REDIRECTS, ENV_READ_TIMEOUT,
    ENV_TOTAL_TIMEOUT,
};
pub use error::{ConfigError, StructuredError, SUMMARY_MAX_CHARS};
#[cfg(feature = "tracing")]
pub use hooks::TracingObserver;
pub use hooks::{ErrorEvent, Observer, RequestContext, ResponseEvent, RetryEvent};
pub use options::{RequestBody, RequestOptions, TimeoutOverride};
pub use policy::{RedirectPolicy, RetryPolicy, TimeoutPolicy};
pub use profile::{resolve_profile, ClientProfile, ProfileKind};
pub use reqwest::Method;
pub use retry::RetryDecision;
pub use sanitize::{sanitize_url, QUERY_MARKER};
pub use taxonomy::ErrorCategory;
pub use types::{ParsedBody, RequestResult};

pub type Result<T> = std::result::Result<T, ConfigError>;
