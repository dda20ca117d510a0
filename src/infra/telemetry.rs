use std::sync::Once;

use metrics::{Unit, describe_counter};
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "inkwell_page_cache_hit_total",
            Unit::Count,
            "Index page requests answered from the page cache."
        );
        describe_counter!(
            "inkwell_page_cache_miss_total",
            Unit::Count,
            "Index page requests that had to be rendered."
        );
        describe_counter!(
            "inkwell_page_cache_expired_total",
            Unit::Count,
            "Cached pages dropped on read because their TTL had elapsed."
        );
        describe_counter!(
            "inkwell_page_cache_store_total",
            Unit::Count,
            "Rendered pages written to the page cache."
        );
        describe_counter!(
            "inkwell_page_cache_evict_total",
            Unit::Count,
            "Cached pages evicted due to capacity."
        );
        describe_counter!(
            "inkwell_page_cache_flush_total",
            Unit::Count,
            "Explicit page cache flushes."
        );
    });
}
