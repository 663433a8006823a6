//! ### English
//! Passive observers of scheduler decisions.
//!
//! Observers are called once per applied policy snapshot and once per completed task. A
//! failing observer is logged and otherwise ignored; it never affects scheduling.
//!
//! ### 中文
//! 调度决策的被动观察者。
//!
//! 每应用一次策略快照、每完成一个任务，各调用一次观察者。观察者失败只记录日志，
//! 不会影响调度。

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::ObserverError;
use crate::scheduler::idle::IdlePeriodState;
use crate::scheduler::policy::{Policy, RailMode};
use crate::scheduler::queue::{QueuePriority, QueueType, TaskType};

/// ### English
/// Everything an observer may want to know about one policy update.
///
/// ### 中文
/// 一次策略更新中观察者可能关心的全部信息。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicySnapshot {
    pub now: Instant,
    pub policy: Policy,
    pub compositor_priority: QueuePriority,
    pub blocking_input_expected_soon: bool,
    pub have_seen_a_blocking_gesture: bool,
    pub awaiting_touch_start_response: bool,
    pub renderer_hidden: bool,
    pub renderer_backgrounded: bool,
    pub idle_period_state: IdlePeriodState,
    pub longest_jank_free_task_duration: Duration,
    pub virtual_time_enabled: bool,
}

/// ### English
/// One completed task.
///
/// ### 中文
/// 一个已完成的任务。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRecord {
    pub queue_type: QueueType,
    pub priority: QueuePriority,
    pub task_type: TaskType,
    pub start: Instant,
    pub end: Instant,
    /// ### English
    /// Nested run-loop depth the task ran at.
    ///
    /// ### 中文
    /// 任务运行时的嵌套运行循环深度。
    pub nesting_depth: u32,
}

impl TaskRecord {
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// ### English
/// Sink for scheduler decisions. All methods run on the main thread.
///
/// ### 中文
/// 调度决策的接收端。所有方法都在主线程调用。
pub trait SchedulerObserver {
    /// ### English
    /// Called after a policy snapshot was applied to the queues.
    ///
    /// ### 中文
    /// 策略快照应用到队列之后调用。
    fn on_policy_snapshot(&mut self, snapshot: &PolicySnapshot) -> Result<(), ObserverError>;

    /// ### English
    /// Called after every completed task (idle tasks included).
    ///
    /// ### 中文
    /// 每个任务（包括空闲任务）完成后调用。
    fn on_task_completed(&mut self, record: &TaskRecord) -> Result<(), ObserverError>;

    /// ### English
    /// Called when the RAIL mode changes. Optional.
    ///
    /// ### 中文
    /// RAIL 模式变化时调用。可选实现。
    fn on_rail_mode_changed(&mut self, _mode: RailMode) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// ### English
/// Observer that forwards everything to `tracing`.
///
/// ### 中文
/// 将所有信息转发给 `tracing` 的观察者。
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SchedulerObserver for TracingObserver {
    fn on_policy_snapshot(&mut self, snapshot: &PolicySnapshot) -> Result<(), ObserverError> {
        debug!(
            use_case = snapshot.policy.use_case.as_str(),
            rail_mode = snapshot.policy.rail_mode.as_str(),
            compositor_priority = snapshot.compositor_priority.as_str(),
            pause = snapshot.policy.should_pause_task_queues,
            defer = snapshot.policy.should_defer_task_queues,
            webview_pause = snapshot.policy.should_pause_task_queues_for_webview,
            freeze_compositor = snapshot.policy.should_freeze_compositor_queue,
            find_in_page_priority = snapshot.policy.find_in_page_priority.as_str(),
            blocking_input_expected_soon = snapshot.blocking_input_expected_soon,
            idle = snapshot.idle_period_state.as_str(),
            "policy snapshot"
        );
        Ok(())
    }

    fn on_task_completed(&mut self, record: &TaskRecord) -> Result<(), ObserverError> {
        trace!(
            queue = record.queue_type.as_str(),
            priority = record.priority.as_str(),
            task_type = record.task_type.as_str(),
            duration_us = record.duration().as_micros() as u64,
            nesting_depth = record.nesting_depth,
            "task completed"
        );
        Ok(())
    }

    fn on_rail_mode_changed(&mut self, mode: RailMode) -> Result<(), ObserverError> {
        debug!(rail_mode = mode.as_str(), "rail mode changed");
        Ok(())
    }
}
