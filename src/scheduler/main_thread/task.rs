//! ### English
//! A task taken out of the scheduler, and the receipt handed back after it ran.
//!
//! ### 中文
//! 从调度器取出的任务，以及运行完成后交还的回执。

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::scheduler::clock::SchedulerClock;
use crate::scheduler::observer::TaskRecord;
use crate::scheduler::queue::{
    IdleTask, PrioritisationType, QueuePriority, QueueType, Task, TaskType,
};

pub(super) enum TaskBody {
    Client(Task),
    Idle { task: IdleTask, deadline: Instant },
}

#[derive(Debug, Clone, Copy)]
pub(super) struct TaskMeta {
    pub(super) queue_type: QueueType,
    pub(super) priority: QueuePriority,
    pub(super) prioritisation_type: PrioritisationType,
    pub(super) task_type: TaskType,
    pub(super) start: Instant,
    pub(super) nesting_depth: u32,
}

/// ### English
/// A selected task that has not run yet.
///
/// Running it does not borrow the scheduler, so the task body may call back into it (post
/// tasks, invoke hooks, or spin a nested run loop).
///
/// ### 中文
/// 已被选中但尚未运行的任务。
///
/// 运行它不会借用调度器，因此任务体可以回调调度器（投递任务、调用钩子或运行嵌套循环）。
#[must_use = "a taken task must be run and reported through `did_run_task`"]
pub struct ScheduledTask {
    body: TaskBody,
    meta: TaskMeta,
    clock: Arc<SchedulerClock>,
}

impl ScheduledTask {
    pub(super) fn new(body: TaskBody, meta: TaskMeta, clock: Arc<SchedulerClock>) -> Self {
        Self { body, meta, clock }
    }

    pub fn queue_type(&self) -> QueueType {
        self.meta.queue_type
    }

    pub fn priority(&self) -> QueuePriority {
        self.meta.priority
    }

    pub fn task_type(&self) -> TaskType {
        self.meta.task_type
    }

    pub fn is_idle_task(&self) -> bool {
        matches!(self.body, TaskBody::Idle { .. })
    }

    /// ### English
    /// Runs the task body and stamps its end time.
    ///
    /// ### 中文
    /// 运行任务体并记录结束时间。
    pub fn run(self) -> CompletedTask {
        let is_idle_task = match self.body {
            TaskBody::Client(task) => {
                task();
                false
            }
            TaskBody::Idle { task, deadline } => {
                task(deadline);
                true
            }
        };
        CompletedTask {
            meta: self.meta,
            end: self.clock.now_ticks(),
            is_idle_task,
        }
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("queue_type", &self.meta.queue_type)
            .field("priority", &self.meta.priority)
            .field("task_type", &self.meta.task_type)
            .field("is_idle_task", &self.is_idle_task())
            .finish_non_exhaustive()
    }
}

/// ### English
/// Receipt of a finished task, consumed by `MainThreadScheduler::did_run_task`.
///
/// ### 中文
/// 已完成任务的回执，由 `MainThreadScheduler::did_run_task` 消费。
#[derive(Debug)]
#[must_use = "completed tasks must be reported through `did_run_task`"]
pub struct CompletedTask {
    meta: TaskMeta,
    end: Instant,
    is_idle_task: bool,
}

impl CompletedTask {
    pub fn record(&self) -> TaskRecord {
        TaskRecord {
            queue_type: self.meta.queue_type,
            priority: self.meta.priority,
            task_type: self.meta.task_type,
            start: self.meta.start,
            end: self.end,
            nesting_depth: self.meta.nesting_depth,
        }
    }

    pub fn is_idle_task(&self) -> bool {
        self.is_idle_task
    }

    pub(super) fn prioritisation_type(&self) -> PrioritisationType {
        self.meta.prioritisation_type
    }
}
