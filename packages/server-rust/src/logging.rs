//! Tracing subscriber setup.
//!
//! Logs always go to stderr. On the stdio transport stdout carries protocol
//! traffic, and keeping one destination for every transport keeps operators'
//! log collection the same.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Default directives when `RUST_LOG` is unset. Framework crates are held at
/// `warn` so per-connection chatter does not drown out relay events.
pub const DEFAULT_FILTER: &str = "info,hyper=warn,h2=warn,tower_http=warn,reqwest=warn";

/// Always appended so a generated client key is printed even under a quiet
/// `RUST_LOG` such as `error` or `off`.
const CREDENTIAL_DIRECTIVE: &str = "credential=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// `RUST_LOG` when set and valid, otherwise [`DEFAULT_FILTER`], plus the
/// `credential` target.
fn build_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| {
            EnvFilter::try_new(format!("{directives},{CREDENTIAL_DIRECTIVE}")).ok()
        })
        .unwrap_or_else(|| EnvFilter::new(format!("{DEFAULT_FILTER},{CREDENTIAL_DIRECTIVE}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_quiets_framework_crates() {
        let rendered = build_filter(None).to_string();
        for directive in ["hyper=warn", "h2=warn", "tower_http=warn", "reqwest=warn"] {
            assert!(rendered.contains(directive), "{rendered}");
        }
    }

    #[test]
    fn rust_log_overrides_default() {
        let rendered = build_filter(Some("debug")).to_string();
        assert!(rendered.contains("debug"));
        assert!(!rendered.contains("hyper=warn"));
    }

    #[test]
    fn blank_or_invalid_rust_log_falls_back() {
        assert!(build_filter(Some("  ")).to_string().contains("hyper=warn"));
        assert!(build_filter(Some("relay=notalevel"))
            .to_string()
            .contains("hyper=warn"));
    }

    #[test]
    fn credential_target_survives_quiet_rust_log() {
        for quiet in ["off", "error"] {
            let filter = build_filter(Some(quiet));
            assert!(filter.to_string().contains(CREDENTIAL_DIRECTIVE), "{filter}");
            assert_eq!(
                filter.max_level_hint(),
                Some(tracing::level_filters::LevelFilter::WARN)
            );
        }
        assert!(build_filter(None).to_string().contains(CREDENTIAL_DIRECTIVE));
    }

    #[test]
    fn format_parses_from_cli_names() {
        assert_eq!(LogFormat::from_str("json", true).unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("TEXT", true).unwrap(), LogFormat::Text);
    }
}
