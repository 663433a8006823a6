//! ### English
//! Structured logging setup for embedders of the scheduler.
//!
//! The scheduler only emits `tracing` events; installing a subscriber is optional and is done
//! once per process through [`init_logging`]. `RUST_LOG` overrides the configured level.
//!
//! ### 中文
//! 供调度器宿主使用的结构化日志初始化。
//!
//! 调度器只发出 `tracing` 事件；是否安装 subscriber 由宿主决定，每个进程通过
//! [`init_logging`] 安装一次。`RUST_LOG` 会覆盖配置中的日志级别。

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt as fmt_layer};

pub use crate::error::LogError;

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();
/// Held by the caller currently installing a subscriber, and kept once one succeeded.
static LOGGING_CLAIMED: AtomicBool = AtomicBool::new(false);

/// ### English
/// Output format of the fmt layer.
///
/// ### 中文
/// fmt layer 的输出格式。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// ### English
    /// Human-readable, ANSI-colored lines on stderr.
    ///
    /// ### 中文
    /// 面向人的彩色文本行（输出到 stderr）。
    #[default]
    Pretty,
    /// ### English
    /// One JSON object per event (CI / log collectors).
    ///
    /// ### 中文
    /// 每个事件一行 JSON（CI / 日志采集）。
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// ### English
/// Logging configuration.
///
/// ### 中文
/// 日志配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// ### English
    /// Filter directive used when `RUST_LOG` is unset (e.g. `info`, `xian_scheduler=debug`).
    ///
    /// ### 中文
    /// 未设置 `RUST_LOG` 时使用的过滤指令（例如 `info`、`xian_scheduler=debug`）。
    pub level: String,
    /// ### English
    /// Output format.
    ///
    /// ### 中文
    /// 输出格式。
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// ### English
/// Installs the global tracing subscriber.
///
/// Subsequent calls return [`LogError::AlreadyInitialized`].
///
/// #### Parameters
/// - `config`: Level and format to install.
///
/// ### 中文
/// 安装全局 tracing subscriber。
///
/// 重复调用返回 [`LogError::AlreadyInitialized`]。
///
/// #### 参数
/// - `config`：要安装的级别与格式。
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    if LOGGING_CLAIMED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(LogError::AlreadyInitialized);
    }

    if let Err(err) = install_subscriber(config) {
        LOGGING_CLAIMED.store(false, Ordering::Release);
        return Err(err);
    }
    let _ = LOGGING_INITIALIZED.set(());

    tracing::info!(
        log_level = %config.level,
        log_format = %config.format,
        "Logging initialized"
    );

    Ok(())
}

fn install_subscriber(config: &LogConfig) -> Result<(), LogError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt_layer::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_ansi(true),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt_layer::layer()
                    .json()
                    .with_timer(SystemTime)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true)
                    .flatten_event(true),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

/// ### English
/// Returns whether [`init_logging`] has succeeded in this process.
///
/// ### 中文
/// 返回本进程中 [`init_logging`] 是否已成功执行。
pub fn is_logging_initialized() -> bool {
    LOGGING_INITIALIZED.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn log_format_parses_lowercase() {
        let config: LogConfig = toml::from_str("level = \"debug\"\nformat = \"json\"").unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.format.to_string(), "json");
    }

    #[test]
    fn second_init_is_rejected() {
        let config = LogConfig {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        };
        // Another test binary may have installed a subscriber first; either way the
        // second call in this process must fail.
        let _ = init_logging(&config);
        assert!(matches!(
            init_logging(&config),
            Err(LogError::AlreadyInitialized) | Err(LogError::SetSubscriber(_))
        ));
    }

    #[test]
    fn concurrent_init_installs_at_most_once() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| init_logging(&LogConfig::default()).is_ok()))
            .collect();
        let installed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert!(installed <= 1);
        if installed == 1 {
            assert!(is_logging_initialized());
        }
    }
}
