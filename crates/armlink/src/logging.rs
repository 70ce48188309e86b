use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Overrides `--log-level` with full filter directives when set.
const LOG_ENV: &str = "ARMLINK_LOG";

/// Crates whose events follow `--log-level`; everything else stays at warn.
const CRATES: [&str; 4] = [
    "armlink",
    "armlink_transport",
    "armlink_frame",
    "armlink_dispatch",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn directives(level: LogLevel) -> String {
    let level = level.as_str();
    let mut out = String::from("warn");
    for name in CRATES {
        out.push_str(&format!(",{name}={level}"));
    }
    out
}

/// Install the stderr subscriber. Library crates only emit through `tracing`.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(directives(level)));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_applies_to_workspace_crates_only() {
        let filter = directives(LogLevel::Debug);
        assert!(filter.starts_with("warn,"));
        assert!(filter.contains("armlink_dispatch=debug"));
        assert!(filter.contains("armlink_frame=debug"));
    }

    #[test]
    fn directives_parse() {
        assert!(EnvFilter::try_new(directives(LogLevel::Trace)).is_ok());
    }
}
