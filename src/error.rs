//! ### English
//! Error types for the recoverable, configuration-time failures of the scheduler crate.
//!
//! The scheduler surface itself is command-style: hooks and posts never return errors.
//! Invariant violations are fatal panics; stale handles are silent no-ops.
//!
//! ### 中文
//! 调度器 crate 中可恢复的、配置阶段的错误类型。
//!
//! 调度器本身的接口是命令式的：hook 与 post 从不返回错误。
//! 不变量被破坏时直接 panic；失效句柄上的操作静默忽略。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// ### English
/// Failure while loading or validating a [`crate::config::SchedulerConfig`].
///
/// ### 中文
/// 加载或校验 [`crate::config::SchedulerConfig`] 时的错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scheduler config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse scheduler config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid scheduler config: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// ### English
/// Failure while installing the global tracing subscriber.
///
/// ### 中文
/// 安装全局 tracing subscriber 时的错误。
#[derive(Debug, Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,

    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// ### English
/// Failure reported by a [`crate::scheduler::SchedulerObserver`].
///
/// Observer failures are logged with `warn!` and otherwise ignored; they never affect scheduling.
///
/// ### 中文
/// [`crate::scheduler::SchedulerObserver`] 报告的错误。
///
/// 观察者错误只会以 `warn!` 记录后忽略，不会影响调度。
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("observer sink unavailable: {0}")]
    Unavailable(String),

    #[error("observer rejected record: {0}")]
    Rejected(String),
}
