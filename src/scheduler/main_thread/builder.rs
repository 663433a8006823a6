use std::fmt;
use std::sync::Arc;

use crossbeam_channel as channel;

use super::MainThreadScheduler;
use crate::config::SchedulerConfig;
use crate::error::ConfigError;
use crate::scheduler::any_thread::{MainThreadWaker, SharedState};
use crate::scheduler::clock::{DefaultTickClock, SchedulerClock, TickClock};
use crate::scheduler::observer::SchedulerObserver;
use crate::scheduler::process_state::ProcessState;

/// ### English
/// Builder for [`MainThreadScheduler`].
///
/// Every collaborator is optional: the wall clock, a fresh [`ProcessState`], no waker and no
/// observers are used by default.
///
/// ### 中文
/// [`MainThreadScheduler`] 的构建器。
///
/// 所有协作者都是可选的：默认使用真实时钟、新建的 [`ProcessState`]、不设置唤醒器与观察者。
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    tick_clock: Option<Arc<dyn TickClock>>,
    process_state: Option<Arc<ProcessState>>,
    waker: Option<Arc<dyn MainThreadWaker>>,
    observers: Vec<Box<dyn SchedulerObserver>>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// ### English
    /// Real-time source; tests pass a [`crate::scheduler::clock::TestTickClock`].
    ///
    /// ### 中文
    /// 真实时间来源；测试中传入 [`crate::scheduler::clock::TestTickClock`]。
    pub fn with_tick_clock(mut self, tick_clock: Arc<dyn TickClock>) -> Self {
        self.tick_clock = Some(tick_clock);
        self
    }

    /// ### English
    /// Process-wide state shared with other schedulers of the process.
    ///
    /// ### 中文
    /// 与进程内其它调度器共享的进程级状态。
    pub fn with_process_state(mut self, process_state: Arc<ProcessState>) -> Self {
        self.process_state = Some(process_state);
        self
    }

    /// ### English
    /// Called from other threads when work for the main thread arrives.
    ///
    /// ### 中文
    /// 有发往主线程的工作到达时，由其它线程调用。
    pub fn with_waker(mut self, waker: Arc<dyn MainThreadWaker>) -> Self {
        self.waker = Some(waker);
        self
    }

    pub fn with_observer(mut self, observer: impl SchedulerObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// ### English
    /// Validates the configuration and builds the scheduler with its default queues and an
    /// initial policy applied.
    ///
    /// ### 中文
    /// 校验配置，并构建带有默认队列、已应用初始策略的调度器。
    pub fn build(self) -> Result<MainThreadScheduler, ConfigError> {
        self.config.validate()?;

        let tick_clock: Arc<dyn TickClock> = match self.tick_clock {
            Some(tick_clock) => tick_clock,
            None => Arc::new(DefaultTickClock),
        };
        let clock = Arc::new(SchedulerClock::new(tick_clock));
        let (inbox_tx, inbox_rx) = channel::unbounded();
        let shared = Arc::new(SharedState::new(
            &self.config,
            Arc::clone(&clock),
            inbox_tx,
            self.waker,
        ));
        let process_state = self.process_state.unwrap_or_default();

        Ok(MainThreadScheduler::from_parts(
            self.config,
            clock,
            process_state,
            shared,
            inbox_rx,
            self.observers,
        ))
    }
}

impl fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("has_tick_clock", &self.tick_clock.is_some())
            .field("has_waker", &self.waker.is_some())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
