//! ### English
//! Arena of task queues with FIFO storage, fences, enabled votes and strict-priority selection.
//!
//! Handles are `(index, generation)` pairs: shutting a queue down bumps the slot generation, so
//! every outstanding handle to it becomes inert instead of dangling.
//!
//! ### 中文
//! 任务队列 arena：包含 FIFO 存储、fence、启用投票以及严格优先级选择。
//!
//! 句柄为 `(index, generation)`：关闭队列会递增槽位代数，所有旧句柄随之失效（而非悬垂）。

use std::collections::VecDeque;
use std::rc::Weak;
use std::time::Instant;

use super::{
    DelayedTaskQueue, EnqueueOrderSource, FrameQueueDelegate, QueueCreationParams,
    QueuePriority, QueueTraits, QueueType, Task, TaskQueueHandle, TaskType, assert_valid_traits,
};

/// ### English
/// Scheduler-internal work posted on control queues.
///
/// Carries a generation instead of a pointer back to the scheduler; a stale generation turns
/// the task into a no-op.
///
/// ### 中文
/// 投递到控制队列上的调度器内部工作。
///
/// 携带代数而不是指向调度器的指针；代数过期时任务变为空操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InternalTask {
    UpdatePolicy { generation: u64 },
    EndHiddenIdlePeriod { generation: u64 },
}

pub(crate) enum Runnable {
    Client(Task),
    Internal(InternalTask),
}

/// ### English
/// One task sitting in a queue's immediate FIFO.
///
/// ### 中文
/// 位于队列立即执行 FIFO 中的单个任务。
pub(crate) struct PendingTask {
    /// ### English
    /// Global enqueue order; breaks ties across queues of equal priority and drives fences.
    ///
    /// ### 中文
    /// 全局入队序号；用于同优先级队列间的平局判定以及 fence 判断。
    pub(crate) enqueue_order: u64,
    pub(crate) task_type: TaskType,
    pub(crate) runnable: Runnable,
}

struct DelayedPost {
    queue: TaskQueueHandle,
    task_type: TaskType,
    runnable: Runnable,
}

struct QueueState {
    queue_type: QueueType,
    traits: QueueTraits,
    frame: Option<Weak<dyn FrameQueueDelegate>>,
    non_waking: bool,
    priority: QueuePriority,
    has_voter: bool,
    enabled_vote: bool,
    /// ### English
    /// Tasks with `enqueue_order >= fence` are blocked.
    ///
    /// ### 中文
    /// `enqueue_order >= fence` 的任务被阻塞。
    fence: Option<u64>,
    immediate: VecDeque<PendingTask>,
}

impl QueueState {
    fn is_enabled(&self) -> bool {
        !self.has_voter || self.enabled_vote
    }

    fn front_runnable(&self) -> Option<&PendingTask> {
        let front = self.immediate.front()?;
        match self.fence {
            Some(fence) if front.enqueue_order >= fence => None,
            _ => Some(front),
        }
    }
}

struct Slot {
    generation: u32,
    queue: Option<QueueState>,
}

/// ### English
/// Read-only view of a live queue.
///
/// ### 中文
/// 存活队列的只读视图。
pub(crate) struct QueueInfo<'a> {
    pub(crate) queue_type: QueueType,
    pub(crate) traits: &'a QueueTraits,
    pub(crate) frame: Option<&'a Weak<dyn FrameQueueDelegate>>,
}

/// ### English
/// The queue arena plus the shared delayed-task heap.
///
/// ### 中文
/// 队列 arena 以及共享的延迟任务堆。
pub(crate) struct TaskQueueSet {
    slots: Vec<Slot>,
    free: Vec<u32>,
    orders: EnqueueOrderSource,
    delayed: DelayedTaskQueue<DelayedPost>,
}

impl TaskQueueSet {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            orders: EnqueueOrderSource::new(),
            delayed: DelayedTaskQueue::new(),
        }
    }

    /// ### English
    /// Shared enqueue-order sequence, handed to the idle queue so idle tasks order globally.
    ///
    /// ### 中文
    /// 共享的入队序号序列，交给空闲队列使其任务参与全局排序。
    pub(crate) fn order_source(&self) -> EnqueueOrderSource {
        self.orders.clone()
    }

    /// ### English
    /// Creates a queue; panics on invalid trait combinations.
    ///
    /// New queues start at `Normal` priority (or `Control` for control queues) and enabled.
    ///
    /// ### 中文
    /// 创建队列；特性组合非法时 panic。
    ///
    /// 新队列初始为 `Normal` 优先级（控制队列为 `Control`），且处于启用状态。
    pub(crate) fn create(&mut self, params: QueueCreationParams) -> TaskQueueHandle {
        assert_valid_traits(params.queue_type, &params.traits);
        let priority = if matches!(params.queue_type, QueueType::Control) {
            QueuePriority::Control
        } else {
            QueuePriority::Normal
        };
        let state = QueueState {
            queue_type: params.queue_type,
            has_voter: params.traits.needs_enabled_voter(),
            traits: params.traits,
            frame: params.frame,
            non_waking: params.non_waking,
            priority,
            enabled_vote: true,
            fence: None,
            immediate: VecDeque::new(),
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.queue = Some(state);
            TaskQueueHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = u32::try_from(self.slots.len()).unwrap_or_else(|_| {
                panic!("task queue arena exhausted");
            });
            self.slots.push(Slot {
                generation: 0,
                queue: Some(state),
            });
            TaskQueueHandle {
                index,
                generation: 0,
            }
        }
    }

    /// ### English
    /// Shuts a queue down, dropping its pending tasks. Idempotent.
    ///
    /// Returns `true` if the handle referred to a live queue.
    ///
    /// ### 中文
    /// 关闭队列并丢弃其待执行任务。幂等。
    ///
    /// 句柄对应存活队列时返回 `true`。
    pub(crate) fn shutdown(&mut self, handle: TaskQueueHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || slot.queue.is_none() {
            return false;
        }
        slot.queue = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.delayed.retain(|post| post.queue != handle);
        true
    }

    fn state(&self, handle: TaskQueueHandle) -> Option<&QueueState> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.queue.as_ref()
    }

    fn state_mut(&mut self, handle: TaskQueueHandle) -> Option<&mut QueueState> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.queue.as_mut()
    }

    pub(crate) fn is_alive(&self, handle: TaskQueueHandle) -> bool {
        self.state(handle).is_some()
    }

    pub(crate) fn info(&self, handle: TaskQueueHandle) -> Option<QueueInfo<'_>> {
        self.state(handle).map(|state| QueueInfo {
            queue_type: state.queue_type,
            traits: &state.traits,
            frame: state.frame.as_ref(),
        })
    }

    /// ### English
    /// Handles of every live queue, in arena order.
    ///
    /// ### 中文
    /// 所有存活队列的句柄（按 arena 顺序）。
    pub(crate) fn handles(&self) -> Vec<TaskQueueHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.queue.is_some())
            .map(|(index, slot)| TaskQueueHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// ### English
    /// Appends a task to the queue's FIFO. Returns `false` (and drops the task) for stale handles.
    ///
    /// ### 中文
    /// 将任务追加到队列 FIFO。句柄失效时返回 `false` 并丢弃任务。
    pub(crate) fn push(
        &mut self,
        handle: TaskQueueHandle,
        task_type: TaskType,
        runnable: Runnable,
    ) -> bool {
        if !self.is_alive(handle) {
            return false;
        }
        let enqueue_order = self.orders.take();
        if let Some(state) = self.state_mut(handle) {
            state.immediate.push_back(PendingTask {
                enqueue_order,
                task_type,
                runnable,
            });
        }
        true
    }

    pub(crate) fn push_delayed(
        &mut self,
        handle: TaskQueueHandle,
        run_at: Instant,
        task_type: TaskType,
        runnable: Runnable,
    ) -> bool {
        if !self.is_alive(handle) {
            return false;
        }
        self.delayed.push(
            run_at,
            DelayedPost {
                queue: handle,
                task_type,
                runnable,
            },
        );
        true
    }

    /// ### English
    /// Moves every delayed task due at `now` into its queue, assigning fresh enqueue orders.
    ///
    /// ### 中文
    /// 将所有在 `now` 到期的延迟任务移入各自队列，并分配新的入队序号。
    pub(crate) fn move_ready_delayed_tasks(&mut self, now: Instant) {
        while let Some((_, post)) = self.delayed.pop_ready(now) {
            self.push(post.queue, post.task_type, post.runnable);
        }
    }

    /// ### English
    /// Earliest delayed run time that should wake the thread (non-waking queues excluded).
    ///
    /// ### 中文
    /// 需要唤醒线程的最早延迟运行时间（不含 non-waking 队列）。
    pub(crate) fn next_wake_up(&self) -> Option<Instant> {
        self.delayed.next_run_at_matching(|post| {
            self.state(post.queue)
                .is_some_and(|state| !state.non_waking)
        })
    }

    pub(crate) fn priority(&self, handle: TaskQueueHandle) -> Option<QueuePriority> {
        self.state(handle).map(|state| state.priority)
    }

    pub(crate) fn set_priority(&mut self, handle: TaskQueueHandle, priority: QueuePriority) {
        if let Some(state) = self.state_mut(handle) {
            state.priority = priority;
        }
    }

    /// ### English
    /// Sets the scheduler's enabled vote; ignored for queues without a voter.
    ///
    /// ### 中文
    /// 设置调度器的启用投票；没有投票者的队列忽略该调用。
    pub(crate) fn set_enabled_vote(&mut self, handle: TaskQueueHandle, enabled: bool) {
        if let Some(state) = self.state_mut(handle)
            && state.has_voter
        {
            state.enabled_vote = enabled;
        }
    }

    pub(crate) fn is_enabled(&self, handle: TaskQueueHandle) -> bool {
        self.state(handle).is_some_and(QueueState::is_enabled)
    }

    /// ### English
    /// Blocks every task posted from now on; tasks already queued stay runnable.
    ///
    /// ### 中文
    /// 阻塞从现在起投递的所有任务；已入队的任务仍可运行。
    pub(crate) fn insert_fence_now(&mut self, handle: TaskQueueHandle) {
        let fence = self.orders.peek();
        if let Some(state) = self.state_mut(handle) {
            state.fence = Some(fence);
        }
    }

    pub(crate) fn remove_fence(&mut self, handle: TaskQueueHandle) {
        if let Some(state) = self.state_mut(handle) {
            state.fence = None;
        }
    }

    pub(crate) fn has_active_fence(&self, handle: TaskQueueHandle) -> bool {
        self.state(handle).is_some_and(|state| state.fence.is_some())
    }

    /// ### English
    /// Whether the queue has an immediate task or a delayed task due at `now`.
    ///
    /// ### 中文
    /// 队列是否有立即任务，或有在 `now` 到期的延迟任务。
    pub(crate) fn has_task_to_run_immediately_or_ready_delayed(
        &self,
        handle: TaskQueueHandle,
        now: Instant,
    ) -> bool {
        let Some(state) = self.state(handle) else {
            return false;
        };
        !state.immediate.is_empty()
            || self
                .delayed
                .any_ready_matching(now, |post| post.queue == handle)
    }

    pub(crate) fn pending_task_count(&self, handle: TaskQueueHandle) -> usize {
        self.state(handle).map_or(0, |state| state.immediate.len())
    }

    /// ### English
    /// Picks the queue whose front task runs next: highest priority first, then the oldest
    /// enqueue order. Disabled and fenced queues are skipped.
    ///
    /// ### 中文
    /// 选出下一个运行的队列：优先级最高者优先，其次按最早入队序号。跳过禁用及被 fence 阻塞的队列。
    pub(crate) fn select(&self) -> Option<(TaskQueueHandle, QueuePriority)> {
        let mut best: Option<(TaskQueueHandle, QueuePriority, u64)> = None;
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(state) = slot.queue.as_ref() else {
                continue;
            };
            if !state.is_enabled() {
                continue;
            }
            let Some(front) = state.front_runnable() else {
                continue;
            };
            let better = match best {
                None => true,
                Some((_, priority, order)) => {
                    state.priority > priority
                        || (state.priority == priority && front.enqueue_order < order)
                }
            };
            if better {
                best = Some((
                    TaskQueueHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    state.priority,
                    front.enqueue_order,
                ));
            }
        }
        best.map(|(handle, priority, _)| (handle, priority))
    }

    /// ### English
    /// Enqueue order of the task `select` would return.
    ///
    /// ### 中文
    /// `select` 将返回的任务的入队序号。
    pub(crate) fn front_enqueue_order(&self, handle: TaskQueueHandle) -> Option<u64> {
        self.state(handle)
            .and_then(QueueState::front_runnable)
            .map(|task| task.enqueue_order)
    }

    pub(crate) fn pop_front(&mut self, handle: TaskQueueHandle) -> Option<PendingTask> {
        let state = self.state_mut(handle)?;
        state.front_runnable()?;
        state.immediate.pop_front()
    }

    /// ### English
    /// Whether a runnable (enabled, unfenced) task exists at `priority` or above.
    ///
    /// ### 中文
    /// 是否存在优先级不低于 `priority` 的可运行（已启用、未被 fence 阻塞）任务。
    pub(crate) fn has_runnable_work_at_or_above(&self, priority: QueuePriority) -> bool {
        self.slots
            .iter()
            .filter_map(|slot| slot.queue.as_ref())
            .any(|state| {
                state.priority >= priority && state.is_enabled() && state.front_runnable().is_some()
            })
    }

    /// ### English
    /// Drops every queue and pending task.
    ///
    /// ### 中文
    /// 丢弃所有队列与待执行任务。
    pub(crate) fn shutdown_all(&mut self) {
        for handle in self.handles() {
            self.shutdown(handle);
        }
        self.delayed.clear();
    }
}
