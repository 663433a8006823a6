//! ### English
//! Idle periods, the idle task queue and the idle time estimator.
//!
//! ### 中文
//! 空闲期、空闲任务队列以及空闲时间估算器。

mod estimator;
mod helper;

pub use estimator::IdleTimeEstimator;
pub use helper::IdlePeriodState;
pub(crate) use helper::{IdleHelper, LongIdleGate};
