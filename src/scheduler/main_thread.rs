//! ### English
//! The main-thread scheduler: owns every queue, the idle machinery and the policy engine.
//!
//! The embedder's run loop drives it with [`MainThreadScheduler::take_next_task`] /
//! [`ScheduledTask::run`] / [`MainThreadScheduler::did_run_task`] (or the
//! [`MainThreadScheduler::run_next_task`] shortcut when tasks never call back into the
//! scheduler). Between tasks the scheduler drains the cross-thread inbox, moves due delayed
//! tasks, maintains idle periods and, under virtual time, fast-forwards the clock.
//!
//! ### 中文
//! 主线程调度器：持有所有队列、空闲机制与策略引擎。
//!
//! 宿主运行循环通过 [`MainThreadScheduler::take_next_task`] / [`ScheduledTask::run`] /
//! [`MainThreadScheduler::did_run_task`] 驱动它（任务不回调调度器时可直接使用
//! [`MainThreadScheduler::run_next_task`]）。在任务之间，调度器 drain 跨线程收件箱、
//! 移动到期的延迟任务、维护空闲期，并在虚拟时间下快进时钟。

mod builder;
mod pages;
mod pause;
mod task;
mod virtual_time_control;

pub use builder::SchedulerBuilder;
pub use pages::{MainFramePaintState, PageId};
pub use pause::RendererPauseHandle;
pub use task::{CompletedTask, ScheduledTask};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use tracing::{debug, info, trace, warn};

use crate::config::SchedulerConfig;
use crate::error::ObserverError;
use crate::scheduler::any_thread::{CompositorThreadHandle, InboxMessage, SharedState};
use crate::scheduler::clock::SchedulerClock;
use crate::scheduler::find_in_page::FindInPageBudgetController;
use crate::scheduler::idle::{IdleHelper, IdlePeriodState, IdleTimeEstimator, LongIdleGate};
use crate::scheduler::input::{InputEvent, InputEventResult, InputEventType};
use crate::scheduler::observer::{PolicySnapshot, SchedulerObserver};
use crate::scheduler::policy::{self, CompositorPriorityInputs, Policy, RailMode, UseCase};
use crate::scheduler::process_state::ProcessState;
use crate::scheduler::queue::{
    InternalTask, PrioritisationType, QueueCreationParams, QueuePriority, QueueTraits, QueueType,
    Runnable, TaskQueueHandle, TaskQueueSet, TaskType,
};
use crate::scheduler::virtual_time::{VirtualTimeDomain, VirtualTimePolicy};

use pages::PageState;
use task::{TaskBody, TaskMeta};

/// ### English
/// Frame timing handed to [`MainThreadScheduler::will_begin_frame`].
///
/// ### 中文
/// 传给 [`MainThreadScheduler::will_begin_frame`] 的帧时序信息。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginFrameArgs {
    pub frame_time: Instant,
    pub interval: Duration,
    /// ### English
    /// The main frame is on the critical path for this frame.
    ///
    /// ### 中文
    /// 本帧中主帧位于关键路径上。
    pub on_critical_path: bool,
}

impl BeginFrameArgs {
    pub const fn new(frame_time: Instant, interval: Duration) -> Self {
        Self {
            frame_time,
            interval,
            on_critical_path: true,
        }
    }

    pub const fn with_on_critical_path(mut self, on_critical_path: bool) -> Self {
        self.on_critical_path = on_critical_path;
        self
    }
}

/// ### English
/// Queues every scheduler owns from construction on.
///
/// ### 中文
/// 调度器自构造起便持有的队列。
#[derive(Debug, Clone, Copy)]
struct DefaultQueues {
    control: TaskQueueHandle,
    default: TaskQueueHandle,
    compositor: TaskQueueHandle,
    input: TaskQueueHandle,
    v8: TaskQueueHandle,
    non_waking: TaskQueueHandle,
    memory_purge: TaskQueueHandle,
    ipc_tracking: TaskQueueHandle,
}

impl DefaultQueues {
    fn create(queues: &mut TaskQueueSet) -> Self {
        Self {
            control: queues.create(QueueCreationParams::new(QueueType::Control)),
            default: queues.create(QueueCreationParams::new(QueueType::Default)),
            compositor: queues.create(
                QueueCreationParams::new(QueueType::Compositor).with_traits(
                    QueueTraits::for_queue_type(QueueType::Compositor)
                        .set_monitor_quiescence(true),
                ),
            ),
            input: queues.create(QueueCreationParams::new(QueueType::Input)),
            v8: queues.create(QueueCreationParams::new(QueueType::V8)),
            non_waking: queues.create(QueueCreationParams::new(QueueType::NonWaking)),
            memory_purge: queues.create(QueueCreationParams::new(QueueType::Idle)),
            ipc_tracking: queues.create(QueueCreationParams::new(QueueType::IpcTracking)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateType {
    MayEarlyOutIfPolicyUnchanged,
    ForceUpdate,
}

enum Selection {
    Queue(TaskQueueHandle, QueuePriority),
    Idle,
}

/// ### English
/// Cooperative scheduler for one main thread.
///
/// Everything here is main-thread-only; the compositor/input thread talks to it through
/// [`CompositorThreadHandle`]. Build one with [`MainThreadScheduler::builder`].
///
/// ### 中文
/// 单个主线程的协作式调度器。
///
/// 此处所有状态只属于主线程；合成器/输入线程通过 [`CompositorThreadHandle`] 与其交互。
/// 使用 [`MainThreadScheduler::builder`] 构建。
pub struct MainThreadScheduler {
    config: SchedulerConfig,
    clock: Arc<SchedulerClock>,
    shared: Arc<SharedState>,
    inbox: channel::Receiver<InboxMessage>,
    process_state: Arc<ProcessState>,
    observers: Vec<Box<dyn SchedulerObserver>>,

    queues: TaskQueueSet,
    default_queues: DefaultQueues,
    idle: IdleHelper,
    estimator: IdleTimeEstimator,
    find_in_page: FindInPageBudgetController,

    current_policy: Policy,
    current_use_case: UseCase,
    current_policy_expiration_time: Option<Instant>,
    /// ### English
    /// Deadline of the pending delayed policy update and the generation that keeps it valid.
    ///
    /// ### 中文
    /// 待执行的延迟策略更新的截止时间，以及使其保持有效的代数。
    policy_update_deadline: Option<Instant>,
    policy_update_generation: u64,
    blocking_input_expected_soon: bool,
    longest_jank_free_task_duration: Duration,

    compositor_priority: QueuePriority,
    main_thread_compositing_is_fast: bool,
    prioritize_compositing_after_input: bool,
    should_prioritize_compositor_after_delay: bool,
    have_seen_a_frame: bool,
    last_frame_time: Instant,
    estimated_next_frame_begin: Option<Instant>,
    compositor_frame_interval: Duration,

    renderer_hidden: bool,
    renderer_backgrounded: bool,
    hidden_idle_generation: u64,
    renderer_pause_count: u32,
    webview_paused: bool,
    has_visible_render_widget_with_touch_handler: bool,
    pages: HashMap<PageId, PageState>,

    /// ### English
    /// Queue types of the tasks currently taken and not yet reported back (innermost last).
    ///
    /// ### 中文
    /// 已取出但尚未回报完成的任务所属队列种类（最内层在末尾）。
    running_queues: Vec<QueueType>,
    nested_runloop_depth: u32,

    virtual_time: Option<VirtualTimeDomain>,
    virtual_time_control_queue: Option<TaskQueueHandle>,
    virtual_time_policy: VirtualTimePolicy,
    virtual_time_pause_count: u32,
    /// ### English
    /// Virtual time is enabled and currently stopped.
    ///
    /// ### 中文
    /// 虚拟时间已启用且当前处于停止状态。
    virtual_time_stopped: bool,
    max_virtual_time_task_starvation_count: u32,

    was_shutdown: bool,
}

impl MainThreadScheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    fn from_parts(
        config: SchedulerConfig,
        clock: Arc<SchedulerClock>,
        process_state: Arc<ProcessState>,
        shared: Arc<SharedState>,
        inbox: channel::Receiver<InboxMessage>,
        observers: Vec<Box<dyn SchedulerObserver>>,
    ) -> Self {
        let mut queues = TaskQueueSet::new();
        let default_queues = DefaultQueues::create(&mut queues);
        let idle = IdleHelper::new(&config, queues.order_source());
        let now = clock.now_ticks();

        let mut scheduler = Self {
            estimator: IdleTimeEstimator::new(
                config.short_idle_period_sample_count,
                config.short_idle_period_percentile,
            ),
            find_in_page: FindInPageBudgetController::new(&config),
            compositor_frame_interval: config.default_frame_interval(),
            max_virtual_time_task_starvation_count: config.max_virtual_time_task_starvation_count,
            config,
            clock,
            shared,
            inbox,
            process_state,
            observers,
            queues,
            default_queues,
            idle,
            current_policy: Policy::default(),
            current_use_case: UseCase::None,
            current_policy_expiration_time: None,
            policy_update_deadline: None,
            policy_update_generation: 0,
            blocking_input_expected_soon: false,
            longest_jank_free_task_duration: Duration::ZERO,
            compositor_priority: QueuePriority::Normal,
            main_thread_compositing_is_fast: false,
            prioritize_compositing_after_input: false,
            should_prioritize_compositor_after_delay: false,
            have_seen_a_frame: false,
            last_frame_time: now,
            estimated_next_frame_begin: None,
            renderer_hidden: false,
            renderer_backgrounded: false,
            hidden_idle_generation: 0,
            renderer_pause_count: 0,
            webview_paused: false,
            has_visible_render_widget_with_touch_handler: false,
            pages: HashMap::new(),
            running_queues: Vec::new(),
            nested_runloop_depth: 0,
            virtual_time: None,
            virtual_time_control_queue: None,
            virtual_time_policy: VirtualTimePolicy::default(),
            virtual_time_pause_count: 0,
            virtual_time_stopped: false,
            was_shutdown: false,
        };
        for handle in scheduler.queues.handles() {
            scheduler.apply_queue_priority(handle);
            scheduler.apply_queue_vote(handle);
        }
        scheduler.force_update_policy();
        scheduler
    }

    /// ### English
    /// Handle for the compositor/input thread.
    ///
    /// ### 中文
    /// 供合成器/输入线程使用的句柄。
    pub fn compositor_thread_handle(&self) -> CompositorThreadHandle {
        CompositorThreadHandle::new(Arc::clone(&self.shared))
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn process_state(&self) -> &Arc<ProcessState> {
        &self.process_state
    }

    /// ### English
    /// Scheduler time (virtual while virtual time is enabled).
    ///
    /// ### 中文
    /// 调度器时间（启用虚拟时间时为虚拟时间）。
    pub fn now_ticks(&self) -> Instant {
        self.clock.now_ticks()
    }

    pub fn add_observer(&mut self, observer: impl SchedulerObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// ### English
    /// Drops every queue and pending task. Further posts are no-ops.
    ///
    /// ### 中文
    /// 丢弃所有队列与待执行任务。之后的投递均为空操作。
    pub fn shutdown(&mut self) {
        if self.was_shutdown {
            return;
        }
        self.queues.shutdown_all();
        self.idle.shutdown();
        self.virtual_time = None;
        self.virtual_time_control_queue = None;
        self.observers.clear();
        self.was_shutdown = true;
        info!("main thread scheduler shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.was_shutdown
    }

    // ---------------------------------------------------------------------------------------
    // Queues and posting
    // ---------------------------------------------------------------------------------------

    pub fn control_task_queue(&self) -> TaskQueueHandle {
        self.default_queues.control
    }

    pub fn default_task_queue(&self) -> TaskQueueHandle {
        self.default_queues.default
    }

    pub fn compositor_task_queue(&self) -> TaskQueueHandle {
        self.default_queues.compositor
    }

    pub fn input_task_queue(&self) -> TaskQueueHandle {
        self.default_queues.input
    }

    pub fn v8_task_queue(&self) -> TaskQueueHandle {
        self.default_queues.v8
    }

    pub fn non_waking_task_queue(&self) -> TaskQueueHandle {
        self.default_queues.non_waking
    }

    pub fn memory_purge_task_queue(&self) -> TaskQueueHandle {
        self.default_queues.memory_purge
    }

    pub fn ipc_tracking_task_queue(&self) -> TaskQueueHandle {
        self.default_queues.ipc_tracking
    }

    /// ### English
    /// Creates a queue and applies the current policy to it.
    ///
    /// Panics on an invalid trait combination.
    ///
    /// #### Parameters
    /// - `params`: Queue type, traits, optional owning frame and wake-up behaviour.
    ///
    /// ### 中文
    /// 创建队列，并对其应用当前策略。
    ///
    /// 特性组合非法时 panic。
    ///
    /// #### 参数
    /// - `params`：队列种类、特性、可选的所属 frame 以及唤醒行为。
    pub fn create_task_queue(&mut self, params: QueueCreationParams) -> TaskQueueHandle {
        let can_run_when_virtual_time_paused = params.traits.can_run_when_virtual_time_paused;
        let handle = self.queues.create(params);
        self.apply_queue_priority(handle);
        self.apply_queue_vote(handle);
        if self.virtual_time.is_some()
            && self.virtual_time_stopped
            && !can_run_when_virtual_time_paused
        {
            self.queues.insert_fence_now(handle);
        }
        handle
    }

    /// ### English
    /// Shuts a queue down, dropping its tasks. Idempotent.
    ///
    /// ### 中文
    /// 关闭队列并丢弃其任务。幂等。
    pub fn shutdown_task_queue(&mut self, handle: TaskQueueHandle) {
        if !self.queues.shutdown(handle) {
            trace!(?handle, "queue already shut down");
        }
    }

    pub fn is_queue_alive(&self, handle: TaskQueueHandle) -> bool {
        self.queues.is_alive(handle)
    }

    /// ### English
    /// Posts a task. Returns `false` (dropping the task) for a shut-down queue.
    ///
    /// #### Parameters
    /// - `queue`: Target queue.
    /// - `task_type`: Metrics-only tag.
    /// - `task`: The callable.
    ///
    /// ### 中文
    /// 投递任务。队列已关闭时返回 `false` 并丢弃任务。
    ///
    /// #### 参数
    /// - `queue`：目标队列。
    /// - `task_type`：仅用于统计的标签。
    /// - `task`：可调用对象。
    pub fn post_task(
        &mut self,
        queue: TaskQueueHandle,
        task_type: TaskType,
        task: impl FnOnce() + 'static,
    ) -> bool {
        let posted = self
            .queues
            .push(queue, task_type, Runnable::Client(Box::new(task)));
        if !posted {
            trace!(?queue, "post to shut-down queue ignored");
        }
        posted
    }

    pub fn post_delayed_task(
        &mut self,
        queue: TaskQueueHandle,
        task_type: TaskType,
        delay: Duration,
        task: impl FnOnce() + 'static,
    ) -> bool {
        let run_at = self.clock.now_ticks() + delay;
        let posted =
            self.queues
                .push_delayed(queue, run_at, task_type, Runnable::Client(Box::new(task)));
        if !posted {
            trace!(?queue, "delayed post to shut-down queue ignored");
        }
        posted
    }

    /// ### English
    /// Posts an idle task; it receives the deadline of the idle period it runs in.
    ///
    /// ### 中文
    /// 投递空闲任务；任务参数为其所在空闲期的截止时间。
    pub fn post_idle_task(&mut self, task: impl FnOnce(Instant) + 'static) {
        if self.was_shutdown {
            return;
        }
        let now = self.clock.now_ticks();
        self.idle.post_idle_task(Box::new(task), now);
    }

    pub fn post_delayed_idle_task(&mut self, delay: Duration, task: impl FnOnce(Instant) + 'static) {
        if self.was_shutdown {
            return;
        }
        let run_at = self.clock.now_ticks() + delay;
        self.idle.post_delayed_idle_task(run_at, Box::new(task));
    }

    pub fn queue_priority(&self, handle: TaskQueueHandle) -> Option<QueuePriority> {
        self.queues.priority(handle)
    }

    /// ### English
    /// Whether the queue may currently run tasks (alive and not voted off).
    ///
    /// ### 中文
    /// 队列当前是否可以运行任务（存活且未被投票禁用）。
    pub fn is_queue_enabled(&self, handle: TaskQueueHandle) -> bool {
        self.queues.is_enabled(handle)
    }

    /// ### English
    /// Whether a fence currently blocks newly posted tasks of the queue.
    ///
    /// ### 中文
    /// 该队列当前是否有 fence 阻塞新投递的任务。
    pub fn is_queue_blocked_by_fence(&self, handle: TaskQueueHandle) -> bool {
        self.queues.has_active_fence(handle)
    }

    pub fn pending_task_count(&self, handle: TaskQueueHandle) -> usize {
        self.queues.pending_task_count(handle)
    }

    pub fn pending_idle_task_count(&self) -> usize {
        self.idle.pending_idle_task_count()
    }

    // ---------------------------------------------------------------------------------------
    // Run loop
    // ---------------------------------------------------------------------------------------

    /// ### English
    /// Picks the next task to run, or `None` when nothing is runnable now.
    ///
    /// Scheduler-internal control work selected on the way runs inline. The returned task
    /// must be run and then handed back through [`Self::did_run_task`]; the scheduler is free
    /// to be borrowed again while it runs (for posting, hooks or a nested run loop).
    ///
    /// ### 中文
    /// 选出下一个要运行的任务；当前没有可运行任务时返回 `None`。
    ///
    /// 选择过程中遇到的调度器内部控制工作会就地执行。返回的任务必须被运行，然后通过
    /// [`Self::did_run_task`] 交还；任务运行期间调度器可以再次被借用（投递任务、调用钩子或
    /// 嵌套运行循环）。
    pub fn take_next_task(&mut self) -> Option<ScheduledTask> {
        loop {
            self.drain_inbox();
            if self.was_shutdown {
                return None;
            }
            let now = self.clock.now_ticks();
            self.prepare_for_selection(now);

            match self.select_next() {
                Some(Selection::Queue(handle, priority)) => {
                    let (queue_type, prioritisation_type) = {
                        let info = self.queues.info(handle)?;
                        (info.queue_type, info.traits.prioritisation_type)
                    };
                    let pending = self.queues.pop_front(handle)?;
                    match pending.runnable {
                        Runnable::Internal(task) => self.run_internal_task(task),
                        Runnable::Client(task) => {
                            return Some(self.start_task(
                                TaskBody::Client(task),
                                queue_type,
                                priority,
                                prioritisation_type,
                                pending.task_type,
                            ));
                        }
                    }
                }
                Some(Selection::Idle) => {
                    let (task, deadline) = self.idle.pop_runnable()?;
                    return Some(self.start_task(
                        TaskBody::Idle { task, deadline },
                        QueueType::Idle,
                        QueuePriority::BestEffort,
                        PrioritisationType::BestEffort,
                        TaskType::IDLE,
                    ));
                }
                None => {
                    if self.fast_forward_virtual_time() {
                        continue;
                    }
                    return None;
                }
            }
        }
    }

    /// ### English
    /// Completion bookkeeping for a task returned by [`Self::take_next_task`].
    ///
    /// ### 中文
    /// 对 [`Self::take_next_task`] 返回的任务进行完成后的记账。
    pub fn did_run_task(&mut self, completed: CompletedTask) {
        let record = completed.record();
        if self.running_queues.pop().is_none() {
            warn!("task completion reported without a running task");
        }
        if self.was_shutdown {
            return;
        }

        if completed.is_idle_task() {
            self.idle.did_process_idle_task(record.end);
        }
        self.idle.check_deadline(record.end);

        let next_wake_up = self.queues.next_wake_up();
        if let Some(virtual_time) = self.virtual_time.as_mut() {
            virtual_time.did_process_task(next_wake_up);
        }

        if self.nested_runloop_depth == 0 {
            if record.queue_type == QueueType::Compositor {
                self.estimator.did_process_task(record.end);
            }
            self.update_compositor_staleness(record.queue_type, record.end);
            if completed.prioritisation_type() == PrioritisationType::FindInPage
                && self.find_in_page.on_task_completed(record.start, record.end)
            {
                self.update_policy();
            }
        }

        self.notify_observers(|observer| observer.on_task_completed(&record));
    }

    /// ### English
    /// Takes, runs and completes one task. Returns `false` when nothing was runnable.
    ///
    /// Tasks run this way must not borrow the scheduler themselves.
    ///
    /// ### 中文
    /// 取出、运行并完成一个任务。没有可运行任务时返回 `false`。
    ///
    /// 以这种方式运行的任务不能自行借用调度器。
    pub fn run_next_task(&mut self) -> bool {
        let Some(task) = self.take_next_task() else {
            return false;
        };
        let completed = task.run();
        self.did_run_task(completed);
        true
    }

    /// ### English
    /// Runs tasks until nothing is runnable now. Returns how many ran.
    ///
    /// ### 中文
    /// 持续运行任务直到当前没有可运行任务。返回运行的任务数。
    pub fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        while self.run_next_task() {
            ran += 1;
        }
        ran
    }

    /// ### English
    /// Earliest time the embedder's run loop must call back; `None` means "sleep until woken".
    ///
    /// ### 中文
    /// 宿主运行循环最早需要回调的时间；`None` 表示“睡眠直到被唤醒”。
    pub fn next_wake_up(&self) -> Option<Instant> {
        if self.was_shutdown {
            return None;
        }
        if !self.inbox.is_empty() || self.select_next().is_some() {
            return Some(self.clock.now_ticks());
        }
        [self.queues.next_wake_up(), self.idle.next_wake_up()]
            .into_iter()
            .flatten()
            .min()
    }

    fn start_task(
        &mut self,
        body: TaskBody,
        queue_type: QueueType,
        priority: QueuePriority,
        prioritisation_type: PrioritisationType,
        task_type: TaskType,
    ) -> ScheduledTask {
        let start = self.clock.now_ticks();
        self.running_queues.push(queue_type);
        if self.nested_runloop_depth == 0 && queue_type == QueueType::Compositor {
            self.estimator.will_process_task(start);
        }
        ScheduledTask::new(
            body,
            TaskMeta {
                queue_type,
                priority,
                prioritisation_type,
                task_type,
                start,
                nesting_depth: self.nested_runloop_depth,
            },
            Arc::clone(&self.clock),
        )
    }

    fn drain_inbox(&mut self) {
        self.shared.clear_wake_pending();
        while let Ok(message) = self.inbox.try_recv() {
            match message {
                InboxMessage::UpdatePolicy => self.maybe_update_policy(),
                InboxMessage::ResumeRenderer => self.resume_renderer(),
                InboxMessage::PostTask {
                    queue,
                    task_type,
                    run_at,
                    task,
                } => {
                    let runnable = Runnable::Client(task);
                    let posted = match run_at {
                        Some(run_at) => self.queues.push_delayed(queue, run_at, task_type, runnable),
                        None => self.queues.push(queue, task_type, runnable),
                    };
                    if !posted {
                        trace!(?queue, "cross-thread post to shut-down queue dropped");
                    }
                }
            }
        }
    }

    fn prepare_for_selection(&mut self, now: Instant) {
        self.queues.move_ready_delayed_tasks(now);
        self.idle.move_ready_delayed_tasks(now);
        self.idle.check_deadline(now);

        if self.has_urgent_work() {
            if self.idle.state().is_in_idle_period() {
                trace!("idle period interrupted by urgent work");
                self.idle.interrupt_idle_period(now);
            }
        } else if self.idle.long_idle_period_due(now) {
            self.enable_long_idle_period(now);
        }
    }

    fn has_urgent_work(&self) -> bool {
        self.queues
            .has_runnable_work_at_or_above(QueuePriority::Highest)
    }

    fn select_next(&self) -> Option<Selection> {
        let candidate = self.queues.select();
        let idle_order = if self.nested_runloop_depth == 0 {
            self.idle.front_enqueue_order()
        } else {
            None
        };
        match (candidate, idle_order) {
            (Some((handle, QueuePriority::BestEffort)), Some(idle_order))
                if self
                    .queues
                    .front_enqueue_order(handle)
                    .is_some_and(|order| idle_order < order) =>
            {
                Some(Selection::Idle)
            }
            (Some((handle, priority)), _) => Some(Selection::Queue(handle, priority)),
            (None, Some(_)) => Some(Selection::Idle),
            (None, None) => None,
        }
    }

    fn run_internal_task(&mut self, task: InternalTask) {
        match task {
            InternalTask::UpdatePolicy { generation } => {
                if generation != self.policy_update_generation {
                    return;
                }
                self.policy_update_deadline = None;
                self.update_policy();
            }
            InternalTask::EndHiddenIdlePeriod { generation } => {
                if generation != self.hidden_idle_generation {
                    return;
                }
                debug!("ending idle period after being hidden");
                self.idle.end_idle_period();
            }
        }
    }

    fn update_compositor_staleness(&mut self, queue_type: QueueType, end: Instant) {
        let was_stale = self.should_prioritize_compositor_after_delay;
        if queue_type == QueueType::Compositor && self.have_seen_a_frame {
            self.last_frame_time = end;
            self.have_seen_a_frame = false;
            self.should_prioritize_compositor_after_delay = false;
        } else if end.saturating_duration_since(self.last_frame_time)
            >= self.config.prioritize_compositing_after_delay()
        {
            self.should_prioritize_compositor_after_delay = true;
        }
        if self.should_prioritize_compositor_after_delay != was_stale {
            self.update_compositor_priority();
        }
    }

    fn notify_observers<F>(&mut self, mut notify: F)
    where
        F: FnMut(&mut dyn SchedulerObserver) -> Result<(), ObserverError>,
    {
        for observer in &mut self.observers {
            if let Err(err) = notify(observer.as_mut()) {
                warn!(error = %err, "scheduler observer failed");
            }
        }
    }

    // ---------------------------------------------------------------------------------------
    // Policy
    // ---------------------------------------------------------------------------------------

    /// ### English
    /// Recomputes the policy; leaves every queue untouched if nothing changed.
    ///
    /// ### 中文
    /// 重新计算策略；若无变化则不触碰任何队列。
    pub fn update_policy(&mut self) {
        self.update_policy_locked(UpdateType::MayEarlyOutIfPolicyUnchanged);
    }

    /// ### English
    /// Recomputes the policy and re-applies it to every queue even if unchanged.
    ///
    /// ### 中文
    /// 重新计算策略，即使未变化也重新应用到所有队列。
    pub fn force_update_policy(&mut self) {
        self.update_policy_locked(UpdateType::ForceUpdate);
    }

    fn maybe_update_policy(&mut self) {
        let needs_update = self.shared.any_thread.lock().policy_may_need_update;
        if needs_update {
            self.update_policy();
        }
    }

    fn update_policy_locked(&mut self, update_type: UpdateType) {
        if self.was_shutdown {
            return;
        }
        let now = self.clock.now_ticks();

        let shared = Arc::clone(&self.shared);
        let mut any_thread = shared.any_thread.lock();
        any_thread.policy_may_need_update = false;

        let (use_case, expected_use_case_duration) = policy::compute_use_case(&any_thread, now);
        self.current_use_case = use_case;

        let mut gesture_expected_flag_valid_for = Duration::ZERO;
        self.blocking_input_expected_soon = false;
        if any_thread.have_seen_a_blocking_gesture {
            let (expected, valid_for) = any_thread.user_model.is_gesture_expected_soon(now);
            self.blocking_input_expected_soon = expected;
            gesture_expected_flag_valid_for = valid_for;
        }
        let last_gesture_was_compositor_driven = any_thread.last_gesture_was_compositor_driven;
        let have_seen_a_blocking_gesture = any_thread.have_seen_a_blocking_gesture;
        let awaiting_touch_start_response = any_thread.awaiting_touch_start_response;
        drop(any_thread);

        let expected_idle = self
            .estimator
            .expected_idle_duration(self.compositor_frame_interval);
        self.longest_jank_free_task_duration = policy::longest_jank_free_task_duration(
            use_case,
            self.config.rails_response_time(),
            expected_idle,
        );

        // Shortest non-zero of the two durations.
        let mut new_policy_duration = expected_use_case_duration;
        if new_policy_duration.is_zero()
            || (!gesture_expected_flag_valid_for.is_zero()
                && new_policy_duration > gesture_expected_flag_valid_for)
        {
            new_policy_duration = gesture_expected_flag_valid_for;
        }
        if new_policy_duration.is_zero() {
            self.current_policy_expiration_time = None;
        } else {
            let expiration = now + new_policy_duration;
            self.current_policy_expiration_time = Some(expiration);
            self.schedule_delayed_policy_update(expiration);
        }

        self.main_thread_compositing_is_fast = expected_idle
            > self
                .compositor_frame_interval
                .mul_f64(self.config.fast_compositing_idle_time_threshold);

        let new_policy = Policy {
            rail_mode: policy::compute_rail_mode(
                use_case,
                self.blocking_input_expected_soon,
                last_gesture_was_compositor_driven,
                self.renderer_hidden,
            ),
            use_case,
            should_pause_task_queues: self.renderer_pause_count != 0,
            should_defer_task_queues: use_case == UseCase::Touchstart,
            should_pause_task_queues_for_webview: self.webview_paused,
            should_freeze_compositor_queue: self.all_pages_frozen(),
            should_prioritize_loading_with_compositing: self
                .config
                .prioritize_compositing_and_loading_during_early_loading
                && use_case == UseCase::EarlyLoading,
            find_in_page_priority: self.find_in_page.current_priority(),
        };

        // Compositor priority depends on state outside the policy, so it is refreshed first.
        self.update_compositor_priority();

        if update_type == UpdateType::MayEarlyOutIfPolicyUnchanged
            && new_policy == self.current_policy
        {
            return;
        }

        let old_policy = self.current_policy;
        self.current_policy = new_policy;
        if old_policy.use_case != new_policy.use_case
            || old_policy.rail_mode != new_policy.rail_mode
        {
            debug!(
                from = old_policy.use_case.as_str(),
                to = new_policy.use_case.as_str(),
                rail_mode = new_policy.rail_mode.as_str(),
                "use case changed"
            );
        }
        if old_policy.rail_mode != new_policy.rail_mode {
            let mode = new_policy.rail_mode;
            self.notify_observers(|observer| observer.on_rail_mode_changed(mode));
        }

        let update_priorities = update_type == UpdateType::ForceUpdate
            || policy::should_update_priorities(&old_policy, &new_policy);
        for handle in self.queues.handles() {
            if update_priorities {
                self.apply_queue_priority(handle);
            }
            self.apply_queue_vote(handle);
        }

        let snapshot = PolicySnapshot {
            now,
            policy: new_policy,
            compositor_priority: self.compositor_priority,
            blocking_input_expected_soon: self.blocking_input_expected_soon,
            have_seen_a_blocking_gesture,
            awaiting_touch_start_response,
            renderer_hidden: self.renderer_hidden,
            renderer_backgrounded: self.renderer_backgrounded,
            idle_period_state: self.idle.state(),
            longest_jank_free_task_duration: self.longest_jank_free_task_duration,
            virtual_time_enabled: self.virtual_time.is_some(),
        };
        self.notify_observers(|observer| observer.on_policy_snapshot(&snapshot));
    }

    /// ### English
    /// Arms the delayed policy update unless an earlier one is already pending.
    ///
    /// ### 中文
    /// 安排延迟策略更新；若已有更早的更新待执行则保持不变。
    fn schedule_delayed_policy_update(&mut self, deadline: Instant) {
        if self
            .policy_update_deadline
            .is_some_and(|pending| pending <= deadline)
        {
            return;
        }
        self.policy_update_deadline = Some(deadline);
        self.policy_update_generation += 1;
        self.queues.push_delayed(
            self.default_queues.control,
            deadline,
            TaskType::CONTROL,
            Runnable::Internal(InternalTask::UpdatePolicy {
                generation: self.policy_update_generation,
            }),
        );
    }

    fn apply_queue_priority(&mut self, handle: TaskQueueHandle) {
        let Some(priority) = self.queues.info(handle).map(|info| {
            policy::compute_priority(
                info.queue_type,
                info.traits,
                info.frame,
                &self.current_policy,
                self.compositor_priority,
            )
        }) else {
            return;
        };
        self.queues.set_priority(handle, priority);
    }

    fn apply_queue_vote(&mut self, handle: TaskQueueHandle) {
        let Some(enabled) = self
            .queues
            .info(handle)
            .map(|info| self.current_policy.is_queue_enabled(info.traits))
        else {
            return;
        };
        self.queues.set_enabled_vote(handle, enabled);
    }

    fn update_compositor_priority(&mut self) {
        let inputs = CompositorPriorityInputs {
            use_case: self.current_use_case,
            prioritize_compositing_after_input: self.prioritize_compositing_after_input,
            prioritize_compositing_and_loading_during_early_loading: self
                .config
                .prioritize_compositing_and_loading_during_early_loading,
            blocking_input_expected_soon: self.blocking_input_expected_soon,
            main_thread_compositing_is_fast: self.main_thread_compositing_is_fast,
            should_prioritize_compositor_after_delay: self.should_prioritize_compositor_after_delay,
        };
        let priority = policy::compute_compositor_priority(&inputs);
        if priority == self.compositor_priority {
            return;
        }
        trace!(
            from = self.compositor_priority.as_str(),
            to = priority.as_str(),
            "compositor priority changed"
        );
        self.compositor_priority = priority;
        for handle in self.queues.handles() {
            let is_compositor = self.queues.info(handle).is_some_and(|info| {
                info.traits.prioritisation_type == PrioritisationType::Compositor
            });
            if is_compositor {
                self.apply_queue_priority(handle);
            }
        }
    }

    pub fn policy(&self) -> Policy {
        self.current_policy
    }

    pub fn current_use_case(&self) -> UseCase {
        self.current_use_case
    }

    pub fn rail_mode(&self) -> RailMode {
        self.current_policy.rail_mode
    }

    pub fn compositor_priority(&self) -> QueuePriority {
        self.compositor_priority
    }

    pub fn blocking_input_expected_soon(&self) -> bool {
        self.blocking_input_expected_soon
    }

    /// ### English
    /// Longest task that would not cause jank under the current use case.
    ///
    /// ### 中文
    /// 当前使用场景下不会造成卡顿的最长任务时长。
    pub fn longest_jank_free_task_duration(&self) -> Duration {
        self.longest_jank_free_task_duration
    }

    /// ### English
    /// Whether the running task should yield to urgent work (pending or imminent input).
    ///
    /// Control work never counts: it only runs between tasks.
    ///
    /// ### 中文
    /// 当前任务是否应让位给紧急工作（待处理或即将到来的输入）。
    ///
    /// 控制类工作不计入：它只在任务之间运行。
    pub fn should_yield_for_high_priority_work(&mut self) -> bool {
        self.maybe_update_policy();
        match self.current_use_case {
            UseCase::CompositorGesture | UseCase::None => self.blocking_input_expected_soon,
            UseCase::MainThreadGesture
            | UseCase::MainThreadCustomInputHandling
            | UseCase::SynchronizedGesture => {
                self.has_ready_compositor_work() || self.blocking_input_expected_soon
            }
            UseCase::Touchstart => true,
            UseCase::EarlyLoading | UseCase::Loading => false,
        }
    }

    /// ### English
    /// Whether latency-sensitive work is expected soon.
    ///
    /// ### 中文
    /// 是否预计很快会有延迟敏感的工作。
    pub fn is_high_priority_work_anticipated(&mut self) -> bool {
        self.maybe_update_policy();
        self.blocking_input_expected_soon
            || matches!(
                self.current_use_case,
                UseCase::Touchstart
                    | UseCase::MainThreadGesture
                    | UseCase::MainThreadCustomInputHandling
                    | UseCase::SynchronizedGesture
            )
    }

    fn has_ready_compositor_work(&self) -> bool {
        let now = self.clock.now_ticks();
        self.queues.handles().into_iter().any(|handle| {
            self.queues.info(handle).is_some_and(|info| {
                info.traits.prioritisation_type == PrioritisationType::Compositor
            }) && self
                .queues
                .has_task_to_run_immediately_or_ready_delayed(handle, now)
        })
    }

    // ---------------------------------------------------------------------------------------
    // Idle periods and frames
    // ---------------------------------------------------------------------------------------

    pub fn idle_period_state(&self) -> IdlePeriodState {
        self.idle.state()
    }

    /// ### English
    /// Whether an idle period is in effect. Always `false` while Control or Highest work is
    /// runnable.
    ///
    /// ### 中文
    /// 当前是否处于空闲期。存在可运行的 Control 或 Highest 工作时始终为 `false`。
    pub fn is_in_idle_period(&self) -> bool {
        self.idle.state().is_in_idle_period() && !self.has_urgent_work()
    }

    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle.deadline()
    }

    pub fn can_exceed_idle_deadline_if_required(&self) -> bool {
        self.idle.can_exceed_idle_deadline_if_required()
    }

    fn long_idle_gate(&mut self, now: Instant) -> LongIdleGate {
        self.maybe_update_policy();
        if self.current_use_case == UseCase::Touchstart {
            let retry_at = self.current_policy_expiration_time.unwrap_or_else(|| {
                now + self.config.retry_enable_long_idle_period_delay()
            });
            return LongIdleGate::RetryAt(retry_at);
        }
        if self.has_urgent_work() {
            return LongIdleGate::RetryAt(now);
        }
        LongIdleGate::Open
    }

    fn enable_long_idle_period(&mut self, now: Instant) {
        let gate = self.long_idle_gate(now);
        let next_delayed_task = self.queues.next_wake_up();
        self.idle
            .enable_long_idle_period(now, gate, next_delayed_task);
    }

    fn start_short_idle_period(&mut self, now: Instant, deadline: Instant) {
        if self.has_urgent_work() {
            trace!("short idle period skipped for urgent work");
            return;
        }
        self.idle.start_short_idle_period(now, deadline);
    }

    /// ### English
    /// A frame is about to begin: ends the idle period and records the frame timing.
    ///
    /// ### 中文
    /// 一帧即将开始：结束空闲期并记录帧时序。
    pub fn will_begin_frame(&mut self, args: BeginFrameArgs) {
        if self.was_shutdown {
            return;
        }
        self.idle.end_idle_period();
        self.estimated_next_frame_begin = Some(args.frame_time + args.interval);
        self.compositor_frame_interval = args.interval;
        self.shared.any_thread.lock().begin_main_frame_on_critical_path = args.on_critical_path;
        self.set_prioritize_compositing_after_input(false);
        self.have_seen_a_frame = true;
    }

    /// ### English
    /// The frame was committed; the time until the next frame becomes a short idle period.
    ///
    /// ### 中文
    /// 帧已提交；距下一帧开始的时间成为一个短空闲期。
    pub fn did_commit_frame_to_compositor(&mut self) {
        if self.was_shutdown {
            return;
        }
        let now = self.clock.now_ticks();
        if let Some(next_frame_begin) = self.estimated_next_frame_begin
            && now < next_frame_begin
        {
            self.start_short_idle_period(now, next_frame_begin);
        }
        self.estimator.did_commit_frame_to_compositor();
    }

    /// ### English
    /// No frame is expected soon; enters a long idle period.
    ///
    /// ### 中文
    /// 近期不会有帧；进入长空闲期。
    pub fn begin_frame_not_expected_soon(&mut self) {
        if self.was_shutdown {
            return;
        }
        let now = self.clock.now_ticks();
        self.enable_long_idle_period(now);
        self.shared.any_thread.lock().begin_main_frame_on_critical_path = false;
    }

    /// ### English
    /// No main frame before `time`; the gap becomes a short idle period.
    ///
    /// ### 中文
    /// 在 `time` 之前不会有主帧；这段间隔成为一个短空闲期。
    pub fn begin_main_frame_not_expected_until(&mut self, time: Instant) {
        if self.was_shutdown {
            return;
        }
        let now = self.clock.now_ticks();
        if now < time {
            self.idle.end_idle_period();
            self.start_short_idle_period(now, time);
        }
    }

    /// ### English
    /// A main frame was requested in response to input; compositing is prioritised until the
    /// next frame begins.
    ///
    /// ### 中文
    /// 为响应输入而请求了主帧；在下一帧开始前优先合成。
    pub fn on_main_frame_requested_for_input(&mut self) {
        self.set_prioritize_compositing_after_input(self.config.prioritize_compositing_after_input);
    }

    fn set_prioritize_compositing_after_input(&mut self, prioritize: bool) {
        if self.prioritize_compositing_after_input == prioritize {
            return;
        }
        self.prioritize_compositing_after_input = prioritize;
        self.update_compositor_priority();
    }

    // ---------------------------------------------------------------------------------------
    // Input on the main thread
    // ---------------------------------------------------------------------------------------

    pub fn will_handle_input_event_on_main_thread(&mut self, event_type: InputEventType) {
        self.shared
            .any_thread
            .lock()
            .pending_input_monitor
            .on_dequeue(event_type);
    }

    /// ### English
    /// The main thread finished handling an input event.
    ///
    /// A touchstart handled by the application establishes the gesture immediately.
    ///
    /// #### Parameters
    /// - `event`: The handled event.
    /// - `result`: How the main thread handled it.
    ///
    /// ### 中文
    /// 主线程处理完一个输入事件。
    ///
    /// 被应用处理的 touchstart 会立即确立手势。
    ///
    /// #### 参数
    /// - `event`：已处理的事件。
    /// - `result`：主线程的处理结果。
    pub fn did_handle_input_event_on_main_thread(
        &mut self,
        event: &InputEvent,
        result: InputEventResult,
    ) {
        if !event.should_prioritize() {
            return;
        }
        let now = self.clock.now_ticks();
        let gesture_established = {
            let mut any_thread = self.shared.any_thread.lock();
            any_thread.user_model.did_finish_processing_input_event(now);
            if any_thread.awaiting_touch_start_response
                && result == InputEventResult::HandledApplication
            {
                any_thread.awaiting_touch_start_response = false;
                any_thread.default_gesture_prevented = true;
                true
            } else {
                false
            }
        };
        if gesture_established {
            self.update_policy();
        }
    }

    // ---------------------------------------------------------------------------------------
    // Renderer lifecycle
    // ---------------------------------------------------------------------------------------

    pub fn is_renderer_hidden(&self) -> bool {
        self.renderer_hidden
    }

    pub fn is_renderer_backgrounded(&self) -> bool {
        self.renderer_backgrounded
    }

    /// ### English
    /// All widgets became hidden (or one became visible).
    ///
    /// Hidden: a long idle period starts and is forcibly ended after the hidden-idle timeout.
    /// Visible: the idle period ends.
    ///
    /// ### 中文
    /// 所有部件被隐藏（或有部件重新可见）。
    ///
    /// 隐藏：开始长空闲期，并在隐藏空闲超时后强制结束。可见：结束空闲期。
    pub fn set_all_render_widgets_hidden(&mut self, hidden: bool) {
        if self.was_shutdown || self.renderer_hidden == hidden {
            return;
        }
        self.hidden_idle_generation += 1;
        self.renderer_hidden = hidden;
        let now = self.clock.now_ticks();
        if hidden {
            self.enable_long_idle_period(now);
            self.queues.push_delayed(
                self.default_queues.control,
                now + self.config.end_idle_when_hidden_delay(),
                TaskType::CONTROL,
                Runnable::Internal(InternalTask::EndHiddenIdlePeriod {
                    generation: self.hidden_idle_generation,
                }),
            );
        } else {
            self.idle.end_idle_period();
        }
        debug!(hidden, "render widgets visibility changed");
        self.update_policy();
    }

    pub fn set_renderer_backgrounded(&mut self, backgrounded: bool) {
        if self.was_shutdown || self.renderer_backgrounded == backgrounded {
            return;
        }
        self.renderer_backgrounded = backgrounded;
        self.process_state.set_process_backgrounded(backgrounded);
        debug!(backgrounded, "renderer background state changed");
        self.update_policy();
    }

    pub fn set_has_visible_render_widget_with_touch_handler(&mut self, has_handler: bool) {
        if self.has_visible_render_widget_with_touch_handler == has_handler {
            return;
        }
        self.has_visible_render_widget_with_touch_handler = has_handler;
        self.force_update_policy();
    }

    /// ### English
    /// Pauses every pausable queue until the returned handle (and all others) are dropped.
    ///
    /// The resume is delivered through the scheduler's inbox and takes effect at the next
    /// run-loop step.
    ///
    /// ### 中文
    /// 暂停所有可暂停队列，直到返回的句柄（以及其它所有句柄）被释放。
    ///
    /// 恢复通过调度器收件箱传递，在下一次运行循环步骤生效。
    #[must_use = "the renderer resumes as soon as the handle is dropped"]
    pub fn pause_renderer(&mut self) -> RendererPauseHandle {
        self.renderer_pause_count += 1;
        self.update_policy();
        RendererPauseHandle::new(Arc::clone(&self.shared))
    }

    fn resume_renderer(&mut self) {
        if self.renderer_pause_count == 0 {
            warn!("renderer resumed more often than paused");
            return;
        }
        self.renderer_pause_count -= 1;
        self.update_policy();
    }

    pub fn pause_timers_for_webview(&mut self) {
        self.webview_paused = true;
        self.update_policy();
    }

    pub fn resume_timers_for_webview(&mut self) {
        self.webview_paused = false;
        self.update_policy();
    }
}

impl fmt::Debug for MainThreadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainThreadScheduler")
            .field("policy", &self.current_policy)
            .field("compositor_priority", &self.compositor_priority)
            .field("idle_period_state", &self.idle.state())
            .field("renderer_hidden", &self.renderer_hidden)
            .field("renderer_backgrounded", &self.renderer_backgrounded)
            .field("nested_runloop_depth", &self.nested_runloop_depth)
            .field("virtual_time", &self.virtual_time)
            .field("was_shutdown", &self.was_shutdown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::scheduler::clock::{TestTickClock, TickClock};
    use crate::scheduler::input::InputEventState;

    const MS: Duration = Duration::from_millis(1);

    fn scheduler() -> (Arc<TestTickClock>, MainThreadScheduler) {
        let clock = Arc::new(TestTickClock::new());
        let scheduler = MainThreadScheduler::builder()
            .with_tick_clock(clock.clone())
            .build()
            .unwrap();
        (clock, scheduler)
    }

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn post(
        scheduler: &mut MainThreadScheduler,
        queue: TaskQueueHandle,
        log: &Rc<RefCell<Vec<&'static str>>>,
        name: &'static str,
    ) {
        let log = log.clone();
        scheduler.post_task(queue, TaskType::UNSPECIFIED, move || {
            log.borrow_mut().push(name)
        });
    }

    #[test]
    fn default_queue_priorities() {
        let (_clock, scheduler) = scheduler();
        assert_eq!(
            scheduler.queue_priority(scheduler.control_task_queue()),
            Some(QueuePriority::Control)
        );
        assert_eq!(
            scheduler.queue_priority(scheduler.input_task_queue()),
            Some(QueuePriority::Highest)
        );
        assert_eq!(
            scheduler.queue_priority(scheduler.default_task_queue()),
            Some(QueuePriority::Normal)
        );
        assert_eq!(
            scheduler.queue_priority(scheduler.memory_purge_task_queue()),
            Some(QueuePriority::BestEffort)
        );
        assert_eq!(scheduler.current_use_case(), UseCase::None);
    }

    #[test]
    fn runs_by_priority_then_post_order() {
        let (_clock, mut scheduler) = scheduler();
        let log = log();
        let default = scheduler.default_task_queue();
        let v8 = scheduler.v8_task_queue();
        let input = scheduler.input_task_queue();
        let purge = scheduler.memory_purge_task_queue();

        post(&mut scheduler, purge, &log, "purge");
        post(&mut scheduler, default, &log, "default-1");
        post(&mut scheduler, v8, &log, "v8");
        post(&mut scheduler, input, &log, "input");
        post(&mut scheduler, default, &log, "default-2");

        assert_eq!(scheduler.run_until_idle(), 5);
        assert_eq!(
            *log.borrow(),
            ["input", "default-1", "v8", "default-2", "purge"]
        );
    }

    #[test]
    fn delayed_tasks_wait_for_their_time() {
        let (clock, mut scheduler) = scheduler();
        let log = log();
        let log_clone = log.clone();
        let queue = scheduler.default_task_queue();
        scheduler.post_delayed_task(queue, TaskType::UNSPECIFIED, 10 * MS, move || {
            log_clone.borrow_mut().push("late")
        });

        assert_eq!(scheduler.run_until_idle(), 0);
        assert_eq!(scheduler.next_wake_up(), Some(clock.now_ticks() + 10 * MS));

        clock.advance(10 * MS);
        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*log.borrow(), ["late"]);
    }

    #[test]
    fn posting_to_a_shut_down_queue_is_a_no_op() {
        let (_clock, mut scheduler) = scheduler();
        let queue = scheduler.create_task_queue(QueueCreationParams::new(QueueType::Test));
        scheduler.shutdown_task_queue(queue);
        scheduler.shutdown_task_queue(queue);
        assert!(!scheduler.post_task(queue, TaskType::UNSPECIFIED, || {}));
        assert_eq!(scheduler.queue_priority(queue), None);
        assert!(!scheduler.is_queue_enabled(queue));
    }

    #[test]
    fn paused_renderer_holds_pausable_queues() {
        let (_clock, mut scheduler) = scheduler();
        let log = log();
        let pausable = scheduler.create_task_queue(
            QueueCreationParams::new(QueueType::FramePausable)
                .with_traits(QueueTraits::for_queue_type(QueueType::FramePausable).set_can_be_paused(true)),
        );

        let handle = scheduler.pause_renderer();
        assert!(scheduler.policy().should_pause_task_queues);
        post(&mut scheduler, pausable, &log, "paused");
        assert_eq!(scheduler.run_until_idle(), 0);

        drop(handle);
        assert_eq!(scheduler.run_until_idle(), 1);
        assert!(!scheduler.policy().should_pause_task_queues);
        assert_eq!(*log.borrow(), ["paused"]);
    }

    #[test]
    fn short_idle_period_runs_idle_tasks_with_deadline() {
        let (clock, mut scheduler) = scheduler();
        let seen = Rc::new(RefCell::new(None));
        let seen_clone = seen.clone();
        scheduler.post_idle_task(move |deadline| *seen_clone.borrow_mut() = Some(deadline));

        let frame_time = clock.now_ticks();
        scheduler.will_begin_frame(BeginFrameArgs::new(frame_time, 16 * MS));
        clock.advance(5 * MS);
        scheduler.did_commit_frame_to_compositor();
        assert_eq!(
            scheduler.idle_period_state(),
            IdlePeriodState::InShortIdlePeriod
        );

        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*seen.borrow(), Some(frame_time + 16 * MS));
    }

    #[test]
    fn urgent_work_interrupts_idle_period() {
        let (clock, mut scheduler) = scheduler();
        let log = log();
        let frame_time = clock.now_ticks();
        scheduler.will_begin_frame(BeginFrameArgs::new(frame_time, 16 * MS));
        scheduler.did_commit_frame_to_compositor();
        assert!(scheduler.is_in_idle_period());

        let input = scheduler.input_task_queue();
        post(&mut scheduler, input, &log, "input");
        assert!(!scheduler.is_in_idle_period());

        assert!(scheduler.run_next_task());
        assert_eq!(
            scheduler.idle_period_state(),
            IdlePeriodState::NotInIdlePeriod
        );
    }

    #[test]
    fn touchstart_defers_deferrable_queues() {
        let (_clock, mut scheduler) = scheduler();
        let deferrable = scheduler.create_task_queue(
            QueueCreationParams::new(QueueType::FrameDeferrable).with_traits(
                QueueTraits::for_queue_type(QueueType::FrameDeferrable).set_can_be_deferred(true),
            ),
        );
        let handle = scheduler.compositor_thread_handle();
        handle.did_handle_input_event_on_compositor_thread(
            &InputEvent::new(InputEventType::TouchStart),
            InputEventState::ForwardedToMainThread,
        );
        scheduler.run_until_idle();

        assert_eq!(scheduler.current_use_case(), UseCase::Touchstart);
        assert_eq!(scheduler.compositor_priority(), QueuePriority::Highest);
        assert!(!scheduler.is_queue_enabled(deferrable));
        assert!(scheduler.should_yield_for_high_priority_work());
    }

    #[test]
    fn stale_policy_update_generation_is_ignored() {
        let (_clock, mut scheduler) = scheduler();
        scheduler.policy_update_generation = 3;
        scheduler.policy_update_deadline = Some(scheduler.now_ticks());
        scheduler.run_internal_task(InternalTask::UpdatePolicy { generation: 2 });
        assert!(scheduler.policy_update_deadline.is_some());
        scheduler.run_internal_task(InternalTask::UpdatePolicy { generation: 3 });
        assert!(scheduler.policy_update_deadline.is_none());
    }

    #[test]
    fn compositor_priority_escalates_when_frames_go_stale() {
        let (clock, mut scheduler) = scheduler();
        let default = scheduler.default_task_queue();
        clock.advance(150 * MS);
        scheduler.post_task(default, TaskType::UNSPECIFIED, || {});
        scheduler.run_until_idle();
        assert_eq!(scheduler.compositor_priority(), QueuePriority::VeryHigh);

        scheduler.will_begin_frame(BeginFrameArgs::new(clock.now_ticks(), 16 * MS));
        let compositor = scheduler.compositor_task_queue();
        scheduler.post_task(compositor, TaskType::COMPOSITOR, || {});
        scheduler.run_until_idle();
        assert_eq!(scheduler.compositor_priority(), QueuePriority::Normal);
    }

    #[test]
    fn shutdown_drops_everything() {
        let (_clock, mut scheduler) = scheduler();
        let default = scheduler.default_task_queue();
        scheduler.post_task(default, TaskType::UNSPECIFIED, || {});
        scheduler.shutdown();
        assert!(scheduler.is_shutdown());
        assert!(!scheduler.run_next_task());
        assert!(!scheduler.post_task(default, TaskType::UNSPECIFIED, || {}));
        assert_eq!(scheduler.next_wake_up(), None);
    }
}
