//! ### English
//! `xian_scheduler` crate root.
//! A cooperative main-thread task scheduler for the Xian engine: typed task queues, a
//! use-case driven priority policy, idle periods and deterministic virtual time.
//! The implementation lives under `scheduler`; `config`, `error` and `logging` carry the
//! ambient setup.
//!
//! ### 中文
//! `xian_scheduler` 的 crate 根。
//! Xian 引擎的协作式主线程任务调度器：带类型的任务队列、由使用场景驱动的优先级策略、
//! 空闲期以及确定性的虚拟时间。
//! 核心实现位于 `scheduler` 模块；`config`、`error` 与 `logging` 负责周边配置。
pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use error::{ConfigError, LogError, ObserverError};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use scheduler::{MainThreadScheduler, SchedulerBuilder};
