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

/// Directives added beneath the configured level when `RUST_LOG` is unset.
const QUIET_DIRECTIVES: &[&str] = &["sqlx=warn"];

/// Install the global subscriber for the vola binary.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let mut filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        for directive in QUIET_DIRECTIVES {
            match directive.parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(err) => {
                    return Err(InfraError::telemetry(format!(
                        "invalid log directive `{directive}`: {err}"
                    )));
                }
            }
        }
    }

    let output = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default())
        .with(output)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

/// Register descriptions for every metric the crate emits. Safe to call more
/// than once.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "vola_fragment_cache_hit_total",
            Unit::Count,
            "Fragment lookups served from the cache."
        );
        describe_counter!(
            "vola_fragment_cache_miss_total",
            Unit::Count,
            "Fragment lookups that had to render."
        );
        describe_counter!(
            "vola_fragment_cache_generation_bump_total",
            Unit::Count,
            "Group generations advanced after a write."
        );
        describe_counter!(
            "vola_fragment_cache_evict_total",
            Unit::Count,
            "In-memory fragment entries evicted due to capacity."
        );
        describe_histogram!(
            "vola_preview_clone_ms",
            Unit::Milliseconds,
            "Preview clone latency in milliseconds."
        );
        describe_histogram!(
            "vola_preview_transfer_ms",
            Unit::Milliseconds,
            "Preview transfer latency in milliseconds."
        );
    });
}
