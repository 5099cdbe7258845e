//! Structured JSON logging.
//!
//! Filtering follows `RUST_LOG`; when it is unset or unparseable the
//! fallback directive is used instead.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is absent.
pub const DEFAULT_FILTER: &str = "info";

/// Install the JSON subscriber with [`DEFAULT_FILTER`] as fallback.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with_default(DEFAULT_FILTER);
}

/// Install the JSON subscriber with a caller-chosen fallback directive,
/// e.g. `"rolegate_infra=debug,info"` for local debugging.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_with_default(fallback: &str) -> bool {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), fallback);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_current_span(true)
        .with_target(true)
        .try_init()
        .is_ok()
}

fn build_filter(env: Option<&str>, fallback: &str) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(fallback).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_directive_wins_over_fallback() {
        let filter = build_filter(Some("rolegate_api=trace"), "warn");
        assert_eq!(filter.to_string(), "rolegate_api=trace");
    }

    #[test]
    fn unparseable_env_falls_back() {
        let filter = build_filter(Some("rolegate=loud"), "warn");
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn second_init_is_a_no_op() {
        init();
        assert!(!init_with_default("debug"));
    }
}
