//! Log output for autodoc binaries.
//!
//! Pipeline crates log at the chosen verbosity while dependencies (HTTP
//! clients, the runtime) stay at `warn` unless `RUST_LOG` says otherwise.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested verbosity.
const PIPELINE_TARGETS: &[&str] = &[
    "autodoc_core",
    "autodoc_state",
    "autodoc_providers",
    "autodoc_cli",
    "autodoc",
];

/// How log lines are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines with stage spans.
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub format: LogFormat,
    /// Verbosity for pipeline crates when `RUST_LOG` is unset.
    pub level: Level,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: Level::INFO,
        }
    }
}

impl TelemetryOptions {
    /// Options derived from the CLI's `--json` and `--verbose` flags.
    pub fn from_flags(json: bool, verbose: bool) -> Self {
        Self {
            format: if json { LogFormat::Json } else { LogFormat::Pretty },
            level: if verbose { Level::DEBUG } else { Level::INFO },
        }
    }

    /// Filter directives used when `RUST_LOG` is unset.
    pub fn default_directives(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        let mut directives = vec!["warn".to_string()];
        directives.extend(PIPELINE_TARGETS.iter().map(|t| format!("{t}={level}")));
        directives.join(",")
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directives()))
    }
}

/// Install the global subscriber. Returns `false` when one was already set.
///
/// Output goes to stderr so stdout stays free for run reports.
pub fn init_tracing(options: &TelemetryOptions) -> bool {
    let registry = tracing_subscriber::registry().with(options.filter());
    let installed = match options.format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_span_events(fmt::format::FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.is_ok()
}
