use resilient_http::{ErrorCategory, ProfileKind, RequestOptions, ResilientClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("resilient_http=debug")),
        )
        .init();

    let url = std::env::var("DEMO_URL").unwrap_or_else(|_| "https://httpbin.org/json".to_owned());

    // Canonical generic-API tuning, with RESILIENT_HTTP_* overrides applied.
    let client = ResilientClient::shared(ProfileKind::GenericApi)?;

    let result = client
        .get(&url, RequestOptions::new().trace_token("demo-1"))
        .await;

    match result.error() {
        None => println!("{} -> {:?}", result.status_code(), result.body()),
        Some(error) if error.category == ErrorCategory::RateLimited => {
            println!(
                "rate limited, retry in {}s",
                error.retry_after_seconds.unwrap_or_default()
            );
        }
        Some(error) => println!("{}", serde_json::to_string_pretty(error)?),
    }

    Ok(())
}
