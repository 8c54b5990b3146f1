//! Logging configuration

use clap::ValueEnum;
use std::sync::LazyLock;
use tracing_subscriber::{
    fmt, fmt::time::ChronoLocal, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

static HOSTNAME: LazyLock<String> = LazyLock::new(|| {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// One short line per event.
    #[default]
    Compact,
    /// Adds source locations; logs host and memory at start-up.
    Detailed,
    /// Structured output, requires the `json` feature.
    Json,
}

pub fn hostname() -> &'static str {
    &HOSTNAME
}

/// Resident memory of this process, e.g. `12.3M`.
pub fn memory_usage() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok());
            if let Some(kb) = kb {
                return format!("{:.1}M", kb / 1024.0);
            }
        }
    }

    use sysinfo::{Pid, System};
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_process(pid);
    match system.process(pid) {
        Some(process) => format!("{:.1}M", process.memory() as f64 / (1024.0 * 1024.0)),
        None => "N/A".to_string(),
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. `RUST_LOG` overrides the default `info`
/// filter; call `dotenvy::dotenv()` first to pick it up from `.env`.
pub fn init_logger(format: LogFormat) {
    match format {
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(
                    fmt::layer()
                        .with_timer(ChronoLocal::rfc_3339())
                        .with_target(false)
                        .with_level(true)
                        .with_ansi(true)
                        .compact(),
                )
                .init();
        }
        LogFormat::Detailed => init_detailed(),
        #[cfg(feature = "json")]
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(true)
                        .with_span_list(true),
                )
                .init();
        }
        #[cfg(not(feature = "json"))]
        LogFormat::Json => {
            init_detailed();
            tracing::warn!("JSON logging needs the `json` feature, using detailed format");
            return;
        }
    }

    tracing::debug!(?format, "Logger initialized");
}

fn init_detailed() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_timer(ChronoLocal::rfc_3339())
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_ansi(true)
                .compact(),
        )
        .init();

    tracing::info!(
        hostname = %hostname(),
        memory = %memory_usage(),
        "Logger initialized (detailed format)"
    );
}

/// Subscriber for unit tests; quiet unless `RUST_LOG` says otherwise.
#[cfg(test)]
pub fn init_test_logger() {
    use tracing_subscriber::fmt::TestWriter;

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")))
        .with(
            fmt::layer()
                .with_writer(TestWriter::default())
                .with_target(false)
                .with_ansi(false)
                .compact(),
        )
        .try_init();
}
