//! Tracing subscriber setup

use std::fs;
use std::path::Path;

use refill_types::{RefillError, RefillResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Keeps the file writer alive; dropping it flushes pending log lines
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("refill_bot={level},refill_types={level}")))
        .unwrap_or_else(|_| EnvFilter::new("refill_bot=info,refill_types=info"))
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LoggingConfig) -> RefillResult<LoggingGuard> {
    let (file_layer, file_guard) = match &config.file_path {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().ok_or_else(|| {
                RefillError::invalid_config("logging.file_path", "path has no file name")
            })?;
            fs::create_dir_all(directory)
                .map_err(|e| RefillError::io_error(&directory.display().to_string(), &e.to_string()))?;

            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    let (json_layer, text_layer) = if config.json {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| RefillError::generic_with_context(&e.to_string(), "logging init"))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Shorten an address for log output
pub fn short_address(address: &str) -> String {
    let count = address.chars().count();
    if count <= 16 {
        return address.to_string();
    }
    let head: String = address.chars().take(8).collect();
    let tail: String = address.chars().skip(count - 8).collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_address() {
        assert_eq!(
            short_address("So11111111111111111111111111111111111111112"),
            "So111111...11111112"
        );
        assert_eq!(short_address("abc"), "abc");
    }

    #[test]
    fn test_short_address_multibyte() {
        assert_eq!(short_address("ééééééééxxxxxxxxxxüüüüüüüü"), "éééééééé...üüüüüüüü");
        assert_eq!(short_address("日本語の署名"), "日本語の署名");
    }
}
