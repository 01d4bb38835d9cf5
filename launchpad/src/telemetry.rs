//! Logging bootstrap for the launchpad binaries.
//!
//! - Text or JSON lines, RFC 3339 UTC timestamps.
//! - EnvFilter from an explicit directive string, else `RUST_LOG`, else "info".
//! - Everything goes to stderr; stdout is reserved for command output.

use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::Telemetry;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directives, e.g. "info,launchpad=debug". `None` reads RUST_LOG.
    pub env_filter: Option<String>,
    pub json: bool,
    /// Print target, file and line.
    pub with_targets_and_lines: bool,
    /// ANSI colours (text format only).
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            json: false,
            with_targets_and_lines: false,
            ansi: false,
        }
    }
}

impl From<&Telemetry> for LoggingConfig {
    fn from(t: &Telemetry) -> Self {
        Self {
            env_filter: Some(t.log_filter.clone()).filter(|s| !s.is_empty()),
            json: t.json,
            ..Self::default()
        }
    }
}

impl LoggingConfig {
    /// Explicit directives, else `RUST_LOG`, else "info". Malformed
    /// directives are an error rather than a silent fallback.
    fn filter(&self) -> anyhow::Result<EnvFilter> {
        let directives = match &self.env_filter {
            Some(s) => s.clone(),
            None => match std::env::var(EnvFilter::DEFAULT_ENV) {
                Ok(v) if !v.trim().is_empty() => v,
                _ => return Ok(EnvFilter::new("info")),
            },
        };
        EnvFilter::try_new(&directives).with_context(|| format!("invalid log filter `{directives}`"))
    }
}

/// Install the global subscriber. Call once at process start; a second call
/// returns an error instead of replacing the first subscriber.
pub fn init(cfg: LoggingConfig) -> anyhow::Result<()> {
    let filter = cfg.filter()?;

    let fmt_layer = {
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(cfg.with_targets_and_lines)
            .with_file(cfg.with_targets_and_lines)
            .with_line_number(cfg.with_targets_and_lines)
            .with_timer(fmt::time::UtcTime::rfc_3339());

        if cfg.json {
            base.json().with_ansi(false).with_current_span(true).flatten_event(true).boxed()
        } else {
            base.with_ansi(cfg.ansi).boxed()
        }
    };

    Registry::default().with(filter).with(fmt_layer).try_init()?;
    Ok(())
}
