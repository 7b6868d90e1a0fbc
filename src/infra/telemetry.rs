use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register metric metadata with the installed recorder. Runs once per process.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "chatcache_cache_hit_total",
            Unit::Count,
            "Total number of queries answered from the response cache."
        );
        describe_counter!(
            "chatcache_cache_miss_total",
            Unit::Count,
            "Total number of response-cache misses, including degraded lookups."
        );
        describe_counter!(
            "chatcache_cache_error_total",
            Unit::Count,
            "Total number of cache backend failures, labelled by operation."
        );
        describe_counter!(
            "chatcache_cache_store_total",
            Unit::Count,
            "Total number of generated responses written to the cache."
        );
        describe_counter!(
            "chatcache_generation_fallback_total",
            Unit::Count,
            "Total number of mock responses served, labelled by reason."
        );
        describe_histogram!(
            "chatcache_chat_handle_ms",
            Unit::Milliseconds,
            "End-to-end chat handling latency in milliseconds."
        );
    });
}
