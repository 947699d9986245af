use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_DIRECTIVES: &str = "info,watheye_monitor=debug";

/// `RUST_LOG` when set and parseable, otherwise `defaults`
fn build_filter(rust_log: Option<&str>, defaults: &str) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(defaults))
}

/// Installs the global subscriber: env filter plus a fmt layer carrying
/// target, thread and source location.
pub fn init_telemetry() -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(rust_log.as_deref(), DEFAULT_DIRECTIVES);

    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .context("installing tracing subscriber")?;

    info!("📊 Telemetry initialized ({})", rust_log.as_deref().unwrap_or(DEFAULT_DIRECTIVES));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_falls_back_to_defaults() {
        let filter = build_filter(None, DEFAULT_DIRECTIVES);
        assert!(filter.to_string().contains("watheye_monitor=debug"));

        let blank = build_filter(Some("  "), DEFAULT_DIRECTIVES);
        assert!(blank.to_string().contains("watheye_monitor=debug"));
    }

    #[test]
    fn test_filter_prefers_rust_log() {
        let filter = build_filter(Some("warn,watheye_monitor::stream=trace"), DEFAULT_DIRECTIVES);
        let rendered = filter.to_string();
        assert!(rendered.contains("watheye_monitor::stream=trace"));
        assert!(!rendered.contains("watheye_monitor=debug"));
    }

    #[test]
    fn test_unparseable_rust_log_uses_defaults() {
        let filter = build_filter(Some("watheye_monitor=loudest"), DEFAULT_DIRECTIVES);
        assert!(filter.to_string().contains("watheye_monitor=debug"));
    }
}
