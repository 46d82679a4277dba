use anyhow::{Result, anyhow};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

const BOOTSTRAP_FILTER: &str = "info";

pub struct LogConfig {
    pub filter: String,
}

/// Parses `RUST_LOG`-style directives such as `info,sqlx=warn`.
pub fn parse_filter(directives: &str) -> Result<EnvFilter> {
    if directives.trim().is_empty() {
        return Err(anyhow!("log filter must not be empty"));
    }
    EnvFilter::try_new(directives).map_err(|e| anyhow!("invalid log filter {:?}: {}", directives, e))
}

/// Global subscriber whose filter is swapped once settings are known.
pub struct Logger {
    reload_handle: reload::Handle<EnvFilter, Registry>,
}

impl Logger {
    /// Installs the subscriber with `RUST_LOG`, or `info` when unset.
    pub fn new_bootstrap() -> Self {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(BOOTSTRAP_FILTER));
        let (filter, reload_handle) = reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();

        Self { reload_handle }
    }

    pub fn reload_from_config(&self, config: &LogConfig) -> Result<()> {
        let filter = parse_filter(&config.filter)?;
        self.reload_handle.reload(filter).map_err(|e| anyhow!(e))?;
        tracing::info!(filter = %self.current_filter(), "log filter applied");
        Ok(())
    }

    pub fn current_filter(&self) -> String {
        self.reload_handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_target_directives() {
        assert!(parse_filter("debug,sqlx=warn,hyper=info").is_ok());
        assert!(parse_filter("turnstile=trace").is_ok());
    }

    #[test]
    fn rejects_blank_filter() {
        assert!(parse_filter("").is_err());
        assert!(parse_filter("   ").is_err());
    }
}
