use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Directives are read from here instead of `RUST_LOG`.
pub(crate) const LOG_ENV_VAR: &str = "WEFT_LOG";

/// Sends compact logs to stderr so stdout carries only the fabric answer.
pub(crate) fn install_stderr_logging() {
    let directives = std::env::var(LOG_ENV_VAR).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Warnings and errors by default; bad directives are skipped.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(directives.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::log_filter;

    #[test]
    fn unit_log_filter_defaults_to_warn() {
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(log_filter(Some("")).max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn unit_log_filter_applies_crate_directives() {
        let filter = log_filter(Some("weft_fabric=debug"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
