//! ### English
//! Advanceable software clock for deterministic runs.
//!
//! While virtual time is enabled every scheduler time read returns the virtual now, which only
//! moves forward when the scheduler fast-forwards to the next delayed task or when the embedder
//! asks for an explicit advance. A fence caps how far time may move.
//!
//! ### 中文
//! 用于确定性运行的可推进软件时钟。
//!
//! 虚拟时间启用期间，调度器的所有读时间操作都返回虚拟当前时间；它只会在调度器快进到下一个
//! 延迟任务，或嵌入方显式要求推进时向前移动。fence 限制时间最多可推进到的位置。

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::trace;

use crate::scheduler::clock::SchedulerClock;

/// ### English
/// How virtual time behaves while enabled.
///
/// ### 中文
/// 虚拟时间启用期间的行为。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VirtualTimePolicy {
    /// ### English
    /// Time advances whenever the thread would otherwise idle.
    ///
    /// ### 中文
    /// 线程本应空闲时推进时间。
    #[default]
    Advance,
    /// ### English
    /// Time is stopped at a fence; only queues marked as able run.
    ///
    /// ### 中文
    /// 时间停在 fence 处；只有标记为可运行的队列继续运行。
    Pause,
    /// ### English
    /// Like `Advance`, but paused while any pause scope is open or a nested loop runs.
    ///
    /// ### 中文
    /// 与 `Advance` 相同，但在任一暂停作用域打开或嵌套循环运行期间暂停。
    DeterministicLoading,
}

impl VirtualTimePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Pause => "pause",
            Self::DeterministicLoading => "deterministic_loading",
        }
    }
}

impl fmt::Display for VirtualTimePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ### English
/// Auto-advancing virtual clock. Publishes its now into the shared [`SchedulerClock`] and
/// returns the clock to wall time when dropped.
///
/// ### 中文
/// 自动推进的虚拟时钟。将其当前时间发布到共享的 [`SchedulerClock`]，被丢弃时恢复真实时钟。
pub struct VirtualTimeDomain {
    clock: Arc<SchedulerClock>,
    initial_ticks: Instant,
    now: Instant,
    /// ### English
    /// Time may not advance past this point.
    ///
    /// ### 中文
    /// 时间不得推进超过该点。
    fence: Option<Instant>,
    can_advance: bool,
    max_task_starvation_count: u32,
    task_starvation_count: u32,
}

impl VirtualTimeDomain {
    pub(crate) fn new(clock: Arc<SchedulerClock>, initial_ticks: Instant) -> Self {
        clock.publish_virtual_now(Some(initial_ticks));
        Self {
            clock,
            initial_ticks,
            now: initial_ticks,
            fence: None,
            can_advance: true,
            max_task_starvation_count: 0,
            task_starvation_count: 0,
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn initial_ticks(&self) -> Instant {
        self.initial_ticks
    }

    pub fn fence(&self) -> Option<Instant> {
        self.fence
    }

    pub fn can_advance(&self) -> bool {
        self.can_advance
    }

    pub(crate) fn set_fence(&mut self, fence: Option<Instant>) {
        self.fence = fence;
    }

    pub(crate) fn set_can_advance(&mut self, can_advance: bool) {
        self.can_advance = can_advance;
    }

    pub(crate) fn set_max_task_starvation_count(&mut self, count: u32) {
        self.max_task_starvation_count = count;
        self.task_starvation_count = 0;
    }

    /// ### English
    /// Moves virtual time to `new_now` unless time is stopped, or `new_now` is in the past or
    /// beyond the fence.
    ///
    /// Returns whether time moved.
    ///
    /// ### 中文
    /// 将虚拟时间移动到 `new_now`，除非时间已停止，或 `new_now` 早于当前时间或超出 fence。
    ///
    /// 返回时间是否发生移动。
    pub fn maybe_advance_virtual_time(&mut self, new_now: Instant) -> bool {
        if !self.can_advance {
            trace!("virtual time advance refused while stopped");
            return false;
        }
        if self.fence.is_some_and(|fence| new_now > fence) {
            trace!("virtual time advance refused by fence");
            return false;
        }
        if new_now <= self.now {
            return false;
        }
        self.now = new_now;
        self.clock.publish_virtual_now(Some(new_now));
        true
    }

    /// ### English
    /// Jumps to the next delayed wake-up when the thread has nothing else to run.
    ///
    /// ### 中文
    /// 线程无事可做时跳到下一次延迟唤醒时间。
    pub(crate) fn maybe_fast_forward_to_wake_up(&mut self, wake_up: Option<Instant>) -> bool {
        if !self.can_advance {
            return false;
        }
        let Some(wake_up) = wake_up else {
            return false;
        };
        if self.maybe_advance_virtual_time(wake_up) {
            self.task_starvation_count = 0;
            return true;
        }
        false
    }

    /// ### English
    /// Counts a completed task; after too many tasks without advancing, delayed work is let
    /// through by advancing to its wake-up anyway.
    ///
    /// ### 中文
    /// 统计一个已完成任务；连续过多任务而时间未推进时，强制推进到延迟任务的唤醒时间。
    pub(crate) fn did_process_task(&mut self, next_wake_up: Option<Instant>) {
        if self.max_task_starvation_count == 0 || !self.can_advance {
            return;
        }
        self.task_starvation_count += 1;
        if self.task_starvation_count < self.max_task_starvation_count {
            return;
        }
        if let Some(wake_up) = next_wake_up
            && self.maybe_advance_virtual_time(wake_up)
        {
            self.task_starvation_count = 0;
        }
    }
}

impl Drop for VirtualTimeDomain {
    fn drop(&mut self) {
        self.clock.publish_virtual_now(None);
    }
}

impl fmt::Debug for VirtualTimeDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualTimeDomain")
            .field("initial_ticks", &self.initial_ticks)
            .field("now", &self.now)
            .field("fence", &self.fence)
            .field("can_advance", &self.can_advance)
            .field("max_task_starvation_count", &self.max_task_starvation_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::scheduler::clock::TestTickClock;

    const MS: Duration = Duration::from_millis(1);

    fn domain() -> (Arc<SchedulerClock>, VirtualTimeDomain, Instant) {
        let clock = Arc::new(SchedulerClock::new(Arc::new(TestTickClock::new())));
        let start = clock.real_now_ticks();
        let domain = VirtualTimeDomain::new(clock.clone(), start);
        (clock, domain, start)
    }

    #[test]
    fn publishes_and_restores_the_clock() {
        let (clock, mut domain, start) = domain();
        assert!(clock.is_virtual());
        assert!(domain.maybe_advance_virtual_time(start + 10 * MS));
        assert_eq!(clock.now_ticks(), start + 10 * MS);

        drop(domain);
        assert!(!clock.is_virtual());
        assert_eq!(clock.now_ticks(), start);
    }

    #[test]
    fn never_moves_backwards_or_past_the_fence() {
        let (_clock, mut domain, start) = domain();
        domain.set_fence(Some(start + 5 * MS));
        assert!(!domain.maybe_advance_virtual_time(start + 6 * MS));
        assert!(domain.maybe_advance_virtual_time(start + 5 * MS));
        assert!(!domain.maybe_advance_virtual_time(start + 2 * MS));
        assert_eq!(domain.now(), start + 5 * MS);
    }

    #[test]
    fn fast_forward_requires_permission() {
        let (_clock, mut domain, start) = domain();
        domain.set_can_advance(false);
        assert!(!domain.maybe_fast_forward_to_wake_up(Some(start + MS)));
        domain.set_can_advance(true);
        assert!(domain.maybe_fast_forward_to_wake_up(Some(start + MS)));
        assert!(!domain.maybe_fast_forward_to_wake_up(None));
    }

    #[test]
    fn starvation_limit_forces_an_advance() {
        let (_clock, mut domain, start) = domain();
        domain.set_max_task_starvation_count(3);
        let wake_up = Some(start + 40 * MS);

        domain.did_process_task(wake_up);
        domain.did_process_task(wake_up);
        assert_eq!(domain.now(), start);
        domain.did_process_task(wake_up);
        assert_eq!(domain.now(), start + 40 * MS);
    }

    #[test]
    fn stopped_time_refuses_every_kind_of_advance() {
        let (_clock, mut domain, start) = domain();
        domain.set_max_task_starvation_count(1);
        domain.set_can_advance(false);

        assert!(!domain.maybe_advance_virtual_time(start + 10 * MS));
        domain.did_process_task(Some(start + 10 * MS));
        domain.did_process_task(Some(start + 10 * MS));
        assert_eq!(domain.now(), start);

        domain.set_can_advance(true);
        domain.did_process_task(Some(start + 10 * MS));
        assert_eq!(domain.now(), start + 10 * MS);
    }

    #[test]
    fn zero_starvation_limit_never_advances() {
        let (_clock, mut domain, start) = domain();
        for _ in 0..100 {
            domain.did_process_task(Some(start + MS));
        }
        assert_eq!(domain.now(), start);
    }
}
