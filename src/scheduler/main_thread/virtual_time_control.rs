//! ### English
//! Virtual time and nested run loop control of [`MainThreadScheduler`].
//!
//! Stopping virtual time fences every queue that cannot run while time is paused; resuming
//! removes the fences. Nothing is discarded either way.
//!
//! ### 中文
//! [`MainThreadScheduler`] 的虚拟时间与嵌套运行循环控制。
//!
//! 停止虚拟时间会为所有不能在时间暂停时运行的队列插入 fence；恢复时移除 fence。
//! 两种情况下都不会丢弃任务。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use super::MainThreadScheduler;
use crate::scheduler::queue::{QueueCreationParams, QueueType, Runnable, TaskType};
use crate::scheduler::virtual_time::{VirtualTimeDomain, VirtualTimePolicy};

impl MainThreadScheduler {
    /// ### English
    /// Switches the scheduler to virtual time and returns the virtual now.
    ///
    /// Calling it again while enabled only returns the current virtual now.
    ///
    /// #### Parameters
    /// - `initial_time`: Starting virtual time; the current real time when `None`.
    ///
    /// ### 中文
    /// 将调度器切换到虚拟时间，并返回虚拟当前时间。
    ///
    /// 已启用时再次调用只返回当前虚拟时间。
    ///
    /// #### 参数
    /// - `initial_time`：虚拟时间起点；为 `None` 时取当前真实时间。
    pub fn enable_virtual_time(&mut self, initial_time: Option<Instant>) -> Instant {
        if let Some(virtual_time) = &self.virtual_time {
            return virtual_time.now();
        }
        let initial_time = initial_time.unwrap_or_else(|| self.clock.real_now_ticks());
        self.virtual_time = Some(VirtualTimeDomain::new(Arc::clone(&self.clock), initial_time));
        self.virtual_time_control_queue =
            Some(self.create_task_queue(QueueCreationParams::new(QueueType::Control)));
        info!(policy = self.virtual_time_policy.as_str(), "virtual time enabled");

        self.apply_virtual_time_policy();
        self.force_update_policy();
        initial_time
    }

    /// ### English
    /// Returns to wall-clock time: fences are removed, the virtual-time control queue is shut
    /// down (dropping pending budget callbacks).
    ///
    /// ### 中文
    /// 恢复真实时钟：移除 fence，并关闭虚拟时间控制队列（丢弃待执行的预算回调）。
    pub fn disable_virtual_time_for_testing(&mut self) {
        if self.virtual_time.is_none() {
            return;
        }
        if self.virtual_time_stopped {
            for handle in self.queues.handles() {
                self.queues.remove_fence(handle);
            }
            self.virtual_time_stopped = false;
            self.process_state.set_virtual_time_stopped(false);
        }
        if let Some(queue) = self.virtual_time_control_queue.take() {
            self.queues.shutdown(queue);
        }
        self.virtual_time = None;
        info!("virtual time disabled");
        self.force_update_policy();
    }

    pub fn is_virtual_time_enabled(&self) -> bool {
        self.virtual_time.is_some()
    }

    /// ### English
    /// Whether virtual time is enabled and currently stopped.
    ///
    /// ### 中文
    /// 虚拟时间是否已启用且当前处于停止状态。
    pub fn is_virtual_time_stopped(&self) -> bool {
        self.virtual_time_stopped
    }

    pub fn virtual_time_policy(&self) -> VirtualTimePolicy {
        self.virtual_time_policy
    }

    pub fn set_virtual_time_policy(&mut self, policy: VirtualTimePolicy) {
        self.virtual_time_policy = policy;
        self.apply_virtual_time_policy();
    }

    /// ### English
    /// Pushes the policy into the virtual time domain.
    ///
    /// `Advance` drops any budget fence and restores the starvation limit. `Pause` fences time
    /// at the current virtual now and disables the starvation limit. Nested run loops always
    /// run without a starvation limit.
    ///
    /// ### 中文
    /// 将策略应用到虚拟时间域。
    ///
    /// `Advance` 移除预算 fence 并恢复饥饿上限。`Pause` 将 fence 设在当前虚拟时间并禁用饥饿上限。
    /// 嵌套运行循环期间始终不使用饥饿上限。
    fn apply_virtual_time_policy(&mut self) {
        let nested = self.nested_runloop_depth > 0;
        let starvation_count = if nested {
            0
        } else {
            self.max_virtual_time_task_starvation_count
        };
        let Some(virtual_time) = self.virtual_time.as_mut() else {
            return;
        };
        let stopped = match self.virtual_time_policy {
            VirtualTimePolicy::Advance => {
                virtual_time.set_max_task_starvation_count(starvation_count);
                virtual_time.set_fence(None);
                false
            }
            VirtualTimePolicy::Pause => {
                virtual_time.set_max_task_starvation_count(0);
                let now = virtual_time.now();
                virtual_time.set_fence(Some(now));
                true
            }
            VirtualTimePolicy::DeterministicLoading => {
                virtual_time.set_max_task_starvation_count(starvation_count);
                self.virtual_time_pause_count > 0 || nested
            }
        };
        self.set_virtual_time_stopped(stopped);
    }

    /// ### English
    /// Stops or resumes virtual time. Ignored unless virtual time is enabled.
    ///
    /// ### 中文
    /// 停止或恢复虚拟时间。未启用虚拟时间时忽略。
    pub fn set_virtual_time_stopped(&mut self, stopped: bool) {
        let Some(virtual_time) = self.virtual_time.as_mut() else {
            warn!("virtual time stop requested without virtual time");
            return;
        };
        if self.virtual_time_stopped == stopped {
            return;
        }
        virtual_time.set_can_advance(!stopped);
        self.virtual_time_stopped = stopped;
        self.process_state.set_virtual_time_stopped(stopped);

        for handle in self.queues.handles() {
            if !stopped {
                self.queues.remove_fence(handle);
                continue;
            }
            let can_run = self
                .queues
                .info(handle)
                .is_some_and(|info| info.traits.can_run_when_virtual_time_paused);
            if !can_run {
                self.queues.insert_fence_now(handle);
            }
        }
        debug!(stopped, "virtual time stop state changed");
    }

    /// ### English
    /// Runs `callback` once virtual time has advanced by `budget`; time may not pass that
    /// point until a later budget or a switch to [`VirtualTimePolicy::Advance`] moves the fence.
    ///
    /// #### Parameters
    /// - `budget`: Virtual time to grant, measured from the current virtual now.
    /// - `callback`: Runs on the virtual-time control queue when the budget is used up.
    ///
    /// ### 中文
    /// 虚拟时间推进 `budget` 之后运行 `callback`；在之后的预算或切换到
    /// [`VirtualTimePolicy::Advance`] 移动 fence 之前，时间不会越过该点。
    ///
    /// #### 参数
    /// - `budget`：授予的虚拟时间，从当前虚拟时间起算。
    /// - `callback`：预算耗尽时在虚拟时间控制队列上运行。
    pub fn grant_virtual_time_budget(
        &mut self,
        budget: Duration,
        callback: impl FnOnce() + 'static,
    ) {
        let (Some(virtual_time), Some(queue)) =
            (self.virtual_time.as_mut(), self.virtual_time_control_queue)
        else {
            warn!("virtual time budget granted without virtual time");
            return;
        };
        let fence = virtual_time.now() + budget;
        virtual_time.set_fence(Some(fence));
        self.queues.push_delayed(
            queue,
            fence,
            TaskType::VIRTUAL_TIME_BUDGET,
            Runnable::Client(Box::new(callback)),
        );
    }

    /// ### English
    /// Opens a pause scope (honoured by [`VirtualTimePolicy::DeterministicLoading`]).
    ///
    /// Returns the current scheduler time.
    ///
    /// ### 中文
    /// 打开一个暂停作用域（由 [`VirtualTimePolicy::DeterministicLoading`] 遵循）。
    ///
    /// 返回当前调度器时间。
    pub fn increment_virtual_time_pause_count(&mut self) -> Instant {
        self.virtual_time_pause_count += 1;
        self.apply_virtual_time_policy();
        self.clock.now_ticks()
    }

    pub fn decrement_virtual_time_pause_count(&mut self) {
        if self.virtual_time_pause_count == 0 {
            warn!("virtual time pause count decremented below zero");
            return;
        }
        self.virtual_time_pause_count -= 1;
        self.apply_virtual_time_policy();
    }

    /// ### English
    /// Explicitly advances virtual time. Refused when disabled or stopped, and when the target
    /// is in the past or beyond the fence.
    ///
    /// ### 中文
    /// 显式推进虚拟时间。未启用或已停止时拒绝；目标早于当前时间或超出 fence 时也拒绝。
    pub fn maybe_advance_virtual_time(&mut self, new_virtual_time: Instant) -> bool {
        self.virtual_time
            .as_mut()
            .is_some_and(|virtual_time| virtual_time.maybe_advance_virtual_time(new_virtual_time))
    }

    pub fn virtual_time_fence(&self) -> Option<Instant> {
        self.virtual_time
            .as_ref()
            .and_then(|virtual_time| virtual_time.fence())
    }

    /// ### English
    /// After `count` consecutive tasks without time moving, virtual time jumps to the next
    /// delayed task anyway. `0` disables the limit; nested run loops always disable it.
    ///
    /// ### 中文
    /// 连续 `count` 个任务执行而时间未推进时，虚拟时间强制跳到下一个延迟任务。
    /// `0` 表示禁用；嵌套运行循环期间始终禁用。
    pub fn set_max_virtual_time_task_starvation_count(&mut self, count: u32) {
        self.max_virtual_time_task_starvation_count = count;
        self.apply_virtual_time_policy();
    }

    pub(super) fn fast_forward_virtual_time(&mut self) -> bool {
        let next_wake_up = self.queues.next_wake_up();
        let Some(virtual_time) = self.virtual_time.as_mut() else {
            return false;
        };
        let advanced = virtual_time.maybe_fast_forward_to_wake_up(next_wake_up);
        if advanced {
            trace!("virtual time fast-forwarded to next wake-up");
        }
        advanced
    }

    /// ### English
    /// A task is about to spin a nested run loop. Ignored outside a running task.
    ///
    /// ### 中文
    /// 某个任务即将运行嵌套循环。不在任务执行期间调用时忽略。
    pub fn on_begin_nested_run_loop(&mut self) {
        if self.running_queues.is_empty() {
            trace!("nested run loop begin outside a task ignored");
            return;
        }
        self.nested_runloop_depth += 1;
        debug!(depth = self.nested_runloop_depth, "nested run loop started");
        self.apply_virtual_time_policy();
    }

    /// ### English
    /// The nested run loop ended. Panics when no nested loop is open.
    ///
    /// ### 中文
    /// 嵌套运行循环结束。没有打开的嵌套循环时 panic。
    pub fn on_exit_nested_run_loop(&mut self) {
        if self.running_queues.is_empty() {
            trace!("nested run loop exit outside a task ignored");
            return;
        }
        assert!(
            self.nested_runloop_depth > 0,
            "nested run loop exit without a matching begin"
        );
        self.nested_runloop_depth -= 1;
        debug!(depth = self.nested_runloop_depth, "nested run loop exited");
        self.apply_virtual_time_policy();
    }

    pub fn nested_run_loop_depth(&self) -> u32 {
        self.nested_runloop_depth
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::scheduler::clock::{TestTickClock, TickClock};

    const MS: Duration = Duration::from_millis(1);

    fn scheduler() -> (Arc<TestTickClock>, MainThreadScheduler) {
        let clock = Arc::new(TestTickClock::new());
        let scheduler = MainThreadScheduler::builder()
            .with_tick_clock(clock.clone())
            .build()
            .unwrap();
        (clock, scheduler)
    }

    #[test]
    fn delayed_tasks_fast_forward_virtual_time() {
        let (clock, mut scheduler) = scheduler();
        let start = scheduler.enable_virtual_time(None);
        assert_eq!(start, clock.now_ticks());

        let ran_at = Rc::new(Cell::new(None));
        let ran_at_clone = ran_at.clone();
        let handle = scheduler.compositor_thread_handle();
        let queue = scheduler.default_task_queue();
        scheduler.post_delayed_task(queue, TaskType::UNSPECIFIED, 250 * MS, move || {
            ran_at_clone.set(Some(handle.now_ticks()))
        });

        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(ran_at.get(), Some(start + 250 * MS));
        assert_eq!(clock.now_ticks(), start);
    }

    #[test]
    fn stopping_fences_queues_without_dropping_tasks() {
        let (_clock, mut scheduler) = scheduler();
        scheduler.enable_virtual_time(None);
        scheduler.set_virtual_time_stopped(true);
        assert!(scheduler.process_state().is_virtual_time_stopped());

        let queue = scheduler.default_task_queue();
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        scheduler.post_task(queue, TaskType::UNSPECIFIED, move || ran_clone.set(true));
        assert!(scheduler.is_queue_blocked_by_fence(queue));
        scheduler.run_until_idle();
        assert!(!ran.get());

        scheduler.set_virtual_time_stopped(false);
        scheduler.run_until_idle();
        assert!(ran.get());
    }

    #[test]
    fn queues_created_while_stopped_start_fenced() {
        let (_clock, mut scheduler) = scheduler();
        scheduler.enable_virtual_time(None);
        scheduler.set_virtual_time_policy(VirtualTimePolicy::Pause);
        let queue = scheduler.create_task_queue(QueueCreationParams::new(QueueType::Test));
        assert!(scheduler.post_task(queue, TaskType::UNSPECIFIED, || {}));
        assert_eq!(scheduler.run_until_idle(), 0);

        scheduler.disable_virtual_time_for_testing();
        assert!(!scheduler.is_virtual_time_enabled());
        assert_eq!(scheduler.run_until_idle(), 1);
    }

    #[test]
    fn deterministic_loading_follows_pause_count() {
        let (_clock, mut scheduler) = scheduler();
        scheduler.enable_virtual_time(None);
        scheduler.set_virtual_time_policy(VirtualTimePolicy::DeterministicLoading);
        assert!(!scheduler.is_virtual_time_stopped());

        scheduler.increment_virtual_time_pause_count();
        scheduler.increment_virtual_time_pause_count();
        assert!(scheduler.is_virtual_time_stopped());
        scheduler.decrement_virtual_time_pause_count();
        assert!(scheduler.is_virtual_time_stopped());
        scheduler.decrement_virtual_time_pause_count();
        assert!(!scheduler.is_virtual_time_stopped());
        scheduler.decrement_virtual_time_pause_count();
        assert!(!scheduler.is_virtual_time_stopped());
    }

    #[test]
    fn budget_fence_caps_explicit_advances() {
        let (_clock, mut scheduler) = scheduler();
        let start = scheduler.enable_virtual_time(None);
        scheduler.set_virtual_time_policy(VirtualTimePolicy::DeterministicLoading);
        scheduler.grant_virtual_time_budget(100 * MS, || {});
        assert_eq!(scheduler.virtual_time_fence(), Some(start + 100 * MS));
        assert!(!scheduler.maybe_advance_virtual_time(start + 101 * MS));
        assert!(scheduler.maybe_advance_virtual_time(start + 100 * MS));
        assert_eq!(scheduler.now_ticks(), start + 100 * MS);
    }

    #[test]
    fn pause_fences_time_at_now_and_refuses_explicit_advances() {
        let (_clock, mut scheduler) = scheduler();
        let start = scheduler.enable_virtual_time(None);
        scheduler.set_virtual_time_policy(VirtualTimePolicy::Pause);
        assert_eq!(scheduler.virtual_time_fence(), Some(start));

        scheduler.grant_virtual_time_budget(500 * MS, || {});
        assert_eq!(scheduler.virtual_time_fence(), Some(start + 500 * MS));
        assert!(!scheduler.maybe_advance_virtual_time(start + 500 * MS));
        assert!(!scheduler.maybe_advance_virtual_time(start + MS));
        assert_eq!(scheduler.now_ticks(), start);

        scheduler.set_virtual_time_policy(VirtualTimePolicy::Advance);
        assert_eq!(scheduler.virtual_time_fence(), None);
        assert!(scheduler.maybe_advance_virtual_time(start + 800 * MS));
    }

    #[test]
    fn pause_disables_the_starvation_limit() {
        let (_clock, mut scheduler) = scheduler();
        let start = scheduler.enable_virtual_time(None);
        scheduler.set_max_virtual_time_task_starvation_count(1);
        let queue = scheduler.default_task_queue();
        scheduler.post_task(queue, TaskType::UNSPECIFIED, || {});
        scheduler.set_virtual_time_policy(VirtualTimePolicy::Pause);

        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        scheduler.grant_virtual_time_budget(500 * MS, move || fired_clone.set(true));
        scheduler.run_until_idle();
        assert!(!fired.get());
        assert_eq!(scheduler.now_ticks(), start);
    }

    #[test]
    fn starvation_limit_applies_immediately_under_advance() {
        let (_clock, mut scheduler) = scheduler();
        let start = scheduler.enable_virtual_time(None);
        let queue = scheduler.default_task_queue();
        scheduler.post_delayed_task(queue, TaskType::UNSPECIFIED, 50 * MS, || {});
        scheduler.post_task(queue, TaskType::UNSPECIFIED, || {});

        scheduler.set_max_virtual_time_task_starvation_count(1);
        assert!(scheduler.run_next_task());
        assert_eq!(scheduler.now_ticks(), start + 50 * MS);
    }

    #[test]
    fn nested_loop_hooks_outside_a_task_are_ignored() {
        let (_clock, mut scheduler) = scheduler();
        scheduler.on_begin_nested_run_loop();
        assert_eq!(scheduler.nested_run_loop_depth(), 0);
        scheduler.on_exit_nested_run_loop();
        assert_eq!(scheduler.nested_run_loop_depth(), 0);
    }
}
