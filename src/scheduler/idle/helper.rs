//! ### English
//! Idle periods and the idle task queue.
//!
//! A short idle period runs between a committed frame and the next expected frame begin. A
//! long idle period is used when no frame is expected soon; it is re-armed back to back until
//! a frame is requested again. Idle tasks only run inside a period and receive its deadline.
//!
//! ### 中文
//! 空闲期与空闲任务队列。
//!
//! 短空闲期位于已提交帧与下一次预期帧开始之间。长空闲期用于近期不会有帧的情况，
//! 会连续重新开启，直到再次请求帧。空闲任务只在空闲期内运行，并接收该空闲期的截止时间。

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::SchedulerConfig;
use crate::scheduler::queue::{DelayedTaskQueue, EnqueueOrderSource, IdleTask};

/// ### English
/// Idle period state machine.
///
/// ### 中文
/// 空闲期状态机。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IdlePeriodState {
    #[default]
    NotInIdlePeriod,
    InShortIdlePeriod,
    InLongIdlePeriod,
    /// ### English
    /// Long period lasting the maximum duration; idle tasks may overrun the deadline.
    ///
    /// ### 中文
    /// 持续最大时长的长空闲期；空闲任务可以超出截止时间。
    InLongIdlePeriodWithMaxDeadline,
    /// ### English
    /// Long period with no idle task to run; resumes when one is posted.
    ///
    /// ### 中文
    /// 没有可运行空闲任务的长空闲期；投递新任务后恢复。
    InLongIdlePeriodPaused,
}

impl IdlePeriodState {
    pub const fn is_in_idle_period(self) -> bool {
        !matches!(self, Self::NotInIdlePeriod)
    }

    pub const fn is_in_long_idle_period(self) -> bool {
        matches!(
            self,
            Self::InLongIdlePeriod
                | Self::InLongIdlePeriodWithMaxDeadline
                | Self::InLongIdlePeriodPaused
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotInIdlePeriod => "not_in_idle_period",
            Self::InShortIdlePeriod => "in_short_idle_period",
            Self::InLongIdlePeriod => "in_long_idle_period",
            Self::InLongIdlePeriodWithMaxDeadline => "in_long_idle_period_with_max_deadline",
            Self::InLongIdlePeriodPaused => "in_long_idle_period_paused",
        }
    }
}

impl fmt::Display for IdlePeriodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct QueuedIdleTask {
    enqueue_order: u64,
    task: IdleTask,
}

/// ### English
/// Why a long idle period could not start yet.
///
/// ### 中文
/// 长空闲期暂时无法开始的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LongIdleGate {
    Open,
    /// ### English
    /// Entry refused; try again at the given time.
    ///
    /// ### 中文
    /// 拒绝进入；在给定时间重试。
    RetryAt(Instant),
}

/// ### English
/// Main-thread idle period controller plus the idle task queue it gates.
///
/// ### 中文
/// 主线程空闲期控制器及其控制的空闲任务队列。
pub(crate) struct IdleHelper {
    state: IdlePeriodState,
    deadline: Option<Instant>,
    tasks: VecDeque<QueuedIdleTask>,
    delayed: DelayedTaskQueue<IdleTask>,
    orders: EnqueueOrderSource,
    /// ### English
    /// Tasks with `enqueue_order >= fence` wait for the next period; `0` blocks everything.
    ///
    /// ### 中文
    /// `enqueue_order >= fence` 的任务等待下一个空闲期；`0` 阻塞全部任务。
    fence: u64,
    /// ### English
    /// When to try (re-)entering a long idle period.
    ///
    /// ### 中文
    /// 何时尝试（重新）进入长空闲期。
    pending_long_idle_at: Option<Instant>,
    maximum_idle_period: Duration,
    minimum_idle_period: Duration,
    retry_delay: Duration,
}

impl IdleHelper {
    pub(crate) fn new(config: &SchedulerConfig, orders: EnqueueOrderSource) -> Self {
        Self {
            state: IdlePeriodState::NotInIdlePeriod,
            deadline: None,
            tasks: VecDeque::new(),
            delayed: DelayedTaskQueue::new(),
            orders,
            fence: 0,
            pending_long_idle_at: None,
            maximum_idle_period: config.maximum_idle_period(),
            minimum_idle_period: config.minimum_idle_period(),
            retry_delay: config.retry_enable_long_idle_period_delay(),
        }
    }

    pub(crate) fn state(&self) -> IdlePeriodState {
        self.state
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn can_exceed_idle_deadline_if_required(&self) -> bool {
        self.state == IdlePeriodState::InLongIdlePeriodWithMaxDeadline
    }

    pub(crate) fn pending_idle_task_count(&self) -> usize {
        self.tasks.len() + self.delayed.len()
    }

    /// ### English
    /// Queues an idle task. A paused long period is scheduled to restart.
    ///
    /// ### 中文
    /// 加入空闲任务。若长空闲期处于暂停状态，则安排其重新开始。
    pub(crate) fn post_idle_task(&mut self, task: IdleTask, now: Instant) {
        self.tasks.push_back(QueuedIdleTask {
            enqueue_order: self.orders.take(),
            task,
        });
        if self.state == IdlePeriodState::InLongIdlePeriodPaused {
            self.pending_long_idle_at = Some(now);
        }
    }

    pub(crate) fn post_delayed_idle_task(&mut self, run_at: Instant, task: IdleTask) {
        self.delayed.push(run_at, task);
    }

    /// ### English
    /// Moves ready delayed idle tasks into the idle queue.
    ///
    /// ### 中文
    /// 将已到期的延迟空闲任务移入空闲队列。
    pub(crate) fn move_ready_delayed_tasks(&mut self, now: Instant) {
        while let Some((_, task)) = self.delayed.pop_ready(now) {
            self.post_idle_task(task, now);
        }
    }

    fn front_runnable(&self) -> Option<&QueuedIdleTask> {
        self.tasks
            .front()
            .filter(|task| task.enqueue_order < self.fence)
    }

    /// ### English
    /// Enqueue order of the idle task that would run next, if any may run now.
    ///
    /// ### 中文
    /// 下一个可运行空闲任务的入队序号（若当前有任务可运行）。
    pub(crate) fn front_enqueue_order(&self) -> Option<u64> {
        self.front_runnable().map(|task| task.enqueue_order)
    }

    fn is_blocked_by_fence(&self) -> bool {
        !self.tasks.is_empty() && self.front_runnable().is_none()
    }

    /// ### English
    /// Pops the next runnable idle task together with the deadline it must receive.
    ///
    /// ### 中文
    /// 取出下一个可运行空闲任务及其应接收的截止时间。
    pub(crate) fn pop_runnable(&mut self) -> Option<(IdleTask, Instant)> {
        let deadline = self.deadline?;
        self.front_runnable()?;
        self.tasks.pop_front().map(|queued| (queued.task, deadline))
    }

    /// ### English
    /// Starts a short idle period ending at `deadline`.
    ///
    /// ### 中文
    /// 开始一个在 `deadline` 结束的短空闲期。
    pub(crate) fn start_short_idle_period(&mut self, now: Instant, deadline: Instant) {
        if deadline <= now {
            return;
        }
        self.start_idle_period(IdlePeriodState::InShortIdlePeriod, now, deadline);
    }

    fn start_idle_period(&mut self, state: IdlePeriodState, now: Instant, deadline: Instant) {
        self.fence = self.orders.peek();
        let was_idle = self.state.is_in_idle_period();
        self.state = state;
        self.deadline = Some(deadline);
        if !was_idle {
            debug!(
                state = state.as_str(),
                duration_us = deadline.saturating_duration_since(now).as_micros() as u64,
                "idle period started"
            );
        }
    }

    /// ### English
    /// Ends the current idle period and cancels any long period re-arm.
    ///
    /// ### 中文
    /// 结束当前空闲期，并取消长空闲期的重新开启。
    pub(crate) fn end_idle_period(&mut self) {
        self.pending_long_idle_at = None;
        self.close_period();
    }

    /// ### English
    /// Ends the period for latency-sensitive work; a long period is re-armed right after.
    ///
    /// ### 中文
    /// 为延迟敏感工作结束空闲期；长空闲期会随后重新开启。
    pub(crate) fn interrupt_idle_period(&mut self, now: Instant) {
        if self.state.is_in_long_idle_period() {
            self.pending_long_idle_at = Some(now);
        }
        self.close_period();
    }

    fn close_period(&mut self) {
        if !self.state.is_in_idle_period() {
            return;
        }
        self.fence = 0;
        self.state = IdlePeriodState::NotInIdlePeriod;
        self.deadline = None;
        debug!("idle period ended");
    }

    /// ### English
    /// Tries to start a long idle period; on refusal a retry is scheduled.
    ///
    /// #### Parameters
    /// - `now`: Current scheduler time.
    /// - `gate`: Whether the policy allows a long period right now.
    /// - `next_delayed_task`: Earliest pending delayed task, which bounds the period.
    ///
    /// ### 中文
    /// 尝试开始长空闲期；被拒绝时安排重试。
    ///
    /// #### 参数
    /// - `now`：当前调度器时间。
    /// - `gate`：策略当前是否允许长空闲期。
    /// - `next_delayed_task`：最早的待执行延迟任务，用于限制空闲期长度。
    pub(crate) fn enable_long_idle_period(
        &mut self,
        now: Instant,
        gate: LongIdleGate,
        next_delayed_task: Option<Instant>,
    ) {
        self.pending_long_idle_at = None;
        if let LongIdleGate::RetryAt(at) = gate {
            trace!("long idle period refused");
            self.close_period();
            self.pending_long_idle_at = Some(at.max(now));
            return;
        }

        let duration = next_delayed_task.map_or(self.maximum_idle_period, |next| {
            next.saturating_duration_since(now)
                .min(self.maximum_idle_period)
        });
        if duration < self.minimum_idle_period {
            self.close_period();
            self.pending_long_idle_at = Some(now + self.retry_delay);
            return;
        }

        // Every queued task becomes runnable once the fence moves to "now".
        let state = if self.tasks.is_empty() {
            IdlePeriodState::InLongIdlePeriodPaused
        } else if duration == self.maximum_idle_period {
            IdlePeriodState::InLongIdlePeriodWithMaxDeadline
        } else {
            IdlePeriodState::InLongIdlePeriod
        };
        self.start_idle_period(state, now, now + duration);
    }

    /// ### English
    /// Whether a pending long-period (re-)entry is due.
    ///
    /// ### 中文
    /// 待处理的长空闲期（重新）进入是否已到期。
    pub(crate) fn long_idle_period_due(&self, now: Instant) -> bool {
        self.pending_long_idle_at.is_some_and(|at| at <= now)
    }

    /// ### English
    /// Bookkeeping after an idle task ran inside a long period.
    ///
    /// ### 中文
    /// 长空闲期内执行完一个空闲任务后的状态更新。
    pub(crate) fn did_process_idle_task(&mut self, now: Instant) {
        if !self.state.is_in_long_idle_period() {
            return;
        }
        if self.tasks.is_empty() {
            self.state = IdlePeriodState::InLongIdlePeriodPaused;
        } else if self.is_blocked_by_fence() {
            let at = if self.state == IdlePeriodState::InLongIdlePeriodWithMaxDeadline {
                now
            } else {
                self.deadline.map_or(now, |deadline| deadline.max(now))
            };
            self.pending_long_idle_at = Some(at);
        }
    }

    /// ### English
    /// Runs after every task (and before selection): an expired period is re-armed when long
    /// and ended when short.
    ///
    /// ### 中文
    /// 每个任务之后（以及选择任务之前）调用：过期的长空闲期重新开启，短空闲期则结束。
    pub(crate) fn check_deadline(&mut self, now: Instant) {
        if !self.state.is_in_idle_period() || self.state == IdlePeriodState::InLongIdlePeriodPaused
        {
            return;
        }
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            if self.state.is_in_long_idle_period() {
                self.pending_long_idle_at = Some(now);
            } else {
                self.end_idle_period();
            }
        }
    }

    /// ### English
    /// Earliest time the idle machinery needs the thread back.
    ///
    /// ### 中文
    /// 空闲机制下一次需要线程的最早时间。
    pub(crate) fn next_wake_up(&self) -> Option<Instant> {
        let period_end = match self.state {
            IdlePeriodState::NotInIdlePeriod | IdlePeriodState::InLongIdlePeriodPaused => None,
            _ => self.deadline,
        };
        [period_end, self.pending_long_idle_at, self.delayed.next_run_at()]
            .into_iter()
            .flatten()
            .min()
    }

    /// ### English
    /// Drops every idle task and leaves the idle period.
    ///
    /// ### 中文
    /// 丢弃全部空闲任务并退出空闲期。
    pub(crate) fn shutdown(&mut self) {
        self.end_idle_period();
        self.tasks.clear();
        self.delayed.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn helper() -> IdleHelper {
        IdleHelper::new(&SchedulerConfig::default(), EnqueueOrderSource::new())
    }

    fn recording(log: &Rc<RefCell<Vec<(&'static str, Instant)>>>, name: &'static str) -> IdleTask {
        let log = log.clone();
        Box::new(move |deadline| log.borrow_mut().push((name, deadline)))
    }

    fn drain(helper: &mut IdleHelper) {
        while let Some((task, deadline)) = helper.pop_runnable() {
            task(deadline);
        }
    }

    #[test]
    fn tasks_wait_for_an_idle_period() {
        let now = Instant::now();
        let mut helper = helper();
        let log = Rc::new(RefCell::new(Vec::new()));
        helper.post_idle_task(recording(&log, "a"), now);
        assert!(helper.pop_runnable().is_none());

        helper.start_short_idle_period(now, now + 10 * MS);
        assert_eq!(helper.state(), IdlePeriodState::InShortIdlePeriod);
        drain(&mut helper);
        assert_eq!(*log.borrow(), vec![("a", now + 10 * MS)]);
    }

    #[test]
    fn tasks_posted_during_a_period_wait_for_the_next() {
        let now = Instant::now();
        let mut helper = helper();
        let log = Rc::new(RefCell::new(Vec::new()));
        helper.start_short_idle_period(now, now + 10 * MS);
        helper.post_idle_task(recording(&log, "late"), now);
        assert!(helper.pop_runnable().is_none());

        helper.end_idle_period();
        helper.start_short_idle_period(now + 20 * MS, now + 30 * MS);
        drain(&mut helper);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn short_period_ends_at_deadline() {
        let now = Instant::now();
        let mut helper = helper();
        helper.start_short_idle_period(now, now + 5 * MS);
        helper.check_deadline(now + 4 * MS);
        assert!(helper.state().is_in_idle_period());
        helper.check_deadline(now + 5 * MS);
        assert_eq!(helper.state(), IdlePeriodState::NotInIdlePeriod);
    }

    #[test]
    fn empty_short_period_is_not_started() {
        let now = Instant::now();
        let mut helper = helper();
        helper.start_short_idle_period(now, now);
        assert_eq!(helper.state(), IdlePeriodState::NotInIdlePeriod);
    }

    #[test]
    fn long_period_without_tasks_is_paused_and_resumes_on_post() {
        let now = Instant::now();
        let mut helper = helper();
        helper.enable_long_idle_period(now, LongIdleGate::Open, None);
        assert_eq!(helper.state(), IdlePeriodState::InLongIdlePeriodPaused);
        assert_eq!(helper.next_wake_up(), None);

        let log = Rc::new(RefCell::new(Vec::new()));
        helper.post_idle_task(recording(&log, "a"), now + MS);
        assert!(helper.long_idle_period_due(now + MS));

        helper.enable_long_idle_period(now + MS, LongIdleGate::Open, None);
        assert_eq!(
            helper.state(),
            IdlePeriodState::InLongIdlePeriodWithMaxDeadline
        );
        assert!(helper.can_exceed_idle_deadline_if_required());
        drain(&mut helper);
        assert_eq!(*log.borrow(), vec![("a", now + 51 * MS)]);
    }

    #[test]
    fn long_period_is_bounded_by_next_delayed_task() {
        let now = Instant::now();
        let mut helper = helper();
        helper.post_idle_task(Box::new(|_| {}), now);
        helper.enable_long_idle_period(now, LongIdleGate::Open, Some(now + 20 * MS));
        assert_eq!(helper.state(), IdlePeriodState::InLongIdlePeriod);
        assert_eq!(helper.deadline(), Some(now + 20 * MS));
        assert!(!helper.can_exceed_idle_deadline_if_required());
    }

    #[test]
    fn too_short_long_period_is_retried() {
        let now = Instant::now();
        let mut helper = helper();
        let next_delayed = Some(now + Duration::from_micros(500));
        helper.enable_long_idle_period(now, LongIdleGate::Open, next_delayed);
        assert_eq!(helper.state(), IdlePeriodState::NotInIdlePeriod);
        assert_eq!(helper.next_wake_up(), Some(now + MS));
    }

    #[test]
    fn refused_long_period_retries_later() {
        let now = Instant::now();
        let mut helper = helper();
        helper.enable_long_idle_period(now, LongIdleGate::RetryAt(now + 80 * MS), None);
        assert_eq!(helper.state(), IdlePeriodState::NotInIdlePeriod);
        assert!(!helper.long_idle_period_due(now + 79 * MS));
        assert!(helper.long_idle_period_due(now + 80 * MS));
    }

    #[test]
    fn long_period_rearms_for_tasks_posted_inside_it() {
        let now = Instant::now();
        let mut helper = helper();
        let log = Rc::new(RefCell::new(Vec::new()));
        helper.post_idle_task(recording(&log, "first"), now);
        helper.enable_long_idle_period(now, LongIdleGate::Open, None);

        let (task, deadline) = helper.pop_runnable().unwrap();
        task(deadline);
        helper.post_idle_task(recording(&log, "second"), now + MS);
        helper.did_process_idle_task(now + MS);
        assert!(helper.long_idle_period_due(now + MS));

        helper.enable_long_idle_period(now + MS, LongIdleGate::Open, None);
        drain(&mut helper);
        assert_eq!(log.borrow().len(), 2);
        helper.did_process_idle_task(now + 2 * MS);
        assert_eq!(helper.state(), IdlePeriodState::InLongIdlePeriodPaused);
    }

    #[test]
    fn interrupt_keeps_long_period_armed_but_end_does_not() {
        let now = Instant::now();
        let mut helper = helper();
        helper.enable_long_idle_period(now, LongIdleGate::Open, None);
        helper.interrupt_idle_period(now + MS);
        assert_eq!(helper.state(), IdlePeriodState::NotInIdlePeriod);
        assert!(helper.long_idle_period_due(now + MS));

        helper.enable_long_idle_period(now + MS, LongIdleGate::Open, None);
        helper.end_idle_period();
        assert!(!helper.long_idle_period_due(now + 100 * MS));
    }

    #[test]
    fn delayed_idle_tasks_become_ready() {
        let now = Instant::now();
        let mut helper = helper();
        helper.post_delayed_idle_task(now + 5 * MS, Box::new(|_| {}));
        assert_eq!(helper.next_wake_up(), Some(now + 5 * MS));
        helper.move_ready_delayed_tasks(now + 5 * MS);
        assert_eq!(helper.pending_idle_task_count(), 1);
        assert!(helper.front_enqueue_order().is_none());
    }
}
