//! ### English
//! Typed task queues: queue kinds, traits, priorities and the arena that stores them.
//!
//! ### 中文
//! 带类型的任务队列：队列种类、特性、优先级以及存放它们的 arena。

mod delayed;
mod task_queue_set;

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) use delayed::DelayedTaskQueue;
pub(crate) use task_queue_set::{InternalTask, PendingTask, Runnable, TaskQueueSet};

/// ### English
/// Client task: an opaque callable run once on the main thread.
///
/// ### 中文
/// 客户端任务：在主线程上执行一次的不透明可调用对象。
pub type Task = Box<dyn FnOnce() + 'static>;

/// ### English
/// Idle task: receives the deadline of the idle period it runs in.
///
/// ### 中文
/// 空闲任务：参数为其所在空闲期的截止时间。
pub type IdleTask = Box<dyn FnOnce(std::time::Instant) + 'static>;

/// ### English
/// Closed set of queue kinds known to the scheduler.
///
/// ### 中文
/// 调度器已知的队列种类（封闭集合）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Control,
    Default,
    Compositor,
    Input,
    V8,
    Loading,
    LoadingControl,
    /// ### English
    /// Best-effort bookkeeping (memory purge and similar).
    ///
    /// ### 中文
    /// 尽力而为的后台工作（内存清理等）。
    Idle,
    IpcTracking,
    /// ### English
    /// Delayed tasks on this queue never wake the thread by themselves.
    ///
    /// ### 中文
    /// 该队列上的延迟任务不会单独唤醒线程。
    NonWaking,
    FrameThrottleable,
    FrameDeferrable,
    FramePausable,
    FrameUnpausable,
    FindInPage,
    Test,
}

impl QueueType {
    /// ### English
    /// Stable lowercase name used in logs and observer records.
    ///
    /// ### 中文
    /// 日志与观察者记录中使用的稳定小写名称。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Default => "default",
            Self::Compositor => "compositor",
            Self::Input => "input",
            Self::V8 => "v8",
            Self::Loading => "loading",
            Self::LoadingControl => "loading_control",
            Self::Idle => "idle",
            Self::IpcTracking => "ipc_tracking",
            Self::NonWaking => "non_waking",
            Self::FrameThrottleable => "frame_throttleable",
            Self::FrameDeferrable => "frame_deferrable",
            Self::FramePausable => "frame_pausable",
            Self::FrameUnpausable => "frame_unpausable",
            Self::FindInPage => "find_in_page",
            Self::Test => "test",
        }
    }

    /// ### English
    /// Prioritisation type a queue of this kind gets unless overridden.
    ///
    /// ### 中文
    /// 该种类队列的默认优先级分类（可被覆盖）。
    pub const fn default_prioritisation_type(self) -> PrioritisationType {
        match self {
            Self::Control => PrioritisationType::Control,
            Self::Compositor => PrioritisationType::Compositor,
            Self::Input => PrioritisationType::Input,
            Self::Idle => PrioritisationType::BestEffort,
            Self::Loading | Self::LoadingControl => PrioritisationType::Loading,
            Self::FindInPage => PrioritisationType::FindInPage,
            _ => PrioritisationType::Regular,
        }
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ### English
/// Which priority rule applies to a queue.
///
/// ### 中文
/// 队列适用的优先级规则。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrioritisationType {
    Control,
    Compositor,
    Input,
    BestEffort,
    Loading,
    FindInPage,
    Regular,
}

/// ### English
/// Queue priority, ordered from lowest to highest (`Control` wins everything).
///
/// ### 中文
/// 队列优先级，从低到高排序（`Control` 最高）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueuePriority {
    BestEffort,
    Low,
    Normal,
    High,
    VeryHigh,
    Highest,
    Control,
}

impl QueuePriority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BestEffort => "best_effort",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::VeryHigh => "very_high",
            Self::Highest => "highest",
            Self::Control => "control",
        }
    }
}

impl fmt::Display for QueuePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ### English
/// Static capabilities of a queue, fixed at creation.
///
/// ### 中文
/// 队列的静态能力，在创建时确定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTraits {
    /// ### English
    /// Disabled while the renderer is paused.
    ///
    /// ### 中文
    /// 渲染器暂停期间被禁用。
    pub can_be_paused: bool,
    /// ### English
    /// Disabled while a touchstart response is pending.
    ///
    /// ### 中文
    /// 等待 touchstart 响应期间被禁用。
    pub can_be_deferred: bool,
    /// ### English
    /// Frozen together with its page (handled by the owning frame).
    ///
    /// ### 中文
    /// 随所属页面一起冻结（由所属 frame 处理）。
    pub can_be_frozen: bool,
    /// ### English
    /// Eligible for background throttling (handled by the owning frame).
    ///
    /// ### 中文
    /// 可被后台节流（由所属 frame 处理）。
    pub can_be_throttled: bool,
    /// ### English
    /// Disabled while webview timers are paused.
    ///
    /// ### 中文
    /// webview 计时器暂停期间被禁用。
    pub can_be_paused_for_webview: bool,
    /// ### English
    /// Keeps running while virtual time is stopped.
    ///
    /// ### 中文
    /// 虚拟时间停止时仍可运行。
    pub can_run_when_virtual_time_paused: bool,
    /// ### English
    /// Reported in quiescence checks.
    ///
    /// ### 中文
    /// 参与静默（quiescence）检测。
    pub monitor_quiescence: bool,
    pub prioritisation_type: PrioritisationType,
}

impl QueueTraits {
    /// ### English
    /// Default traits for a queue of `queue_type`.
    ///
    /// ### 中文
    /// `queue_type` 种类队列的默认特性。
    pub const fn for_queue_type(queue_type: QueueType) -> Self {
        Self {
            can_be_paused: false,
            can_be_deferred: false,
            can_be_frozen: false,
            can_be_throttled: false,
            can_be_paused_for_webview: false,
            can_run_when_virtual_time_paused: matches!(queue_type, QueueType::Control),
            monitor_quiescence: false,
            prioritisation_type: queue_type.default_prioritisation_type(),
        }
    }

    pub const fn set_can_be_paused(mut self, value: bool) -> Self {
        self.can_be_paused = value;
        self
    }

    pub const fn set_can_be_deferred(mut self, value: bool) -> Self {
        self.can_be_deferred = value;
        self
    }

    pub const fn set_can_be_frozen(mut self, value: bool) -> Self {
        self.can_be_frozen = value;
        self
    }

    pub const fn set_can_be_throttled(mut self, value: bool) -> Self {
        self.can_be_throttled = value;
        self
    }

    pub const fn set_can_be_paused_for_webview(mut self, value: bool) -> Self {
        self.can_be_paused_for_webview = value;
        self
    }

    pub const fn set_can_run_when_virtual_time_paused(mut self, value: bool) -> Self {
        self.can_run_when_virtual_time_paused = value;
        self
    }

    pub const fn set_monitor_quiescence(mut self, value: bool) -> Self {
        self.monitor_quiescence = value;
        self
    }

    pub const fn set_prioritisation_type(mut self, value: PrioritisationType) -> Self {
        self.prioritisation_type = value;
        self
    }

    /// ### English
    /// Whether the scheduler keeps an enabled vote for this queue.
    ///
    /// ### 中文
    /// 调度器是否为该队列保留启用投票。
    pub(crate) const fn needs_enabled_voter(&self) -> bool {
        self.can_be_paused
            || self.can_be_deferred
            || self.can_be_frozen
            || self.can_be_paused_for_webview
            || matches!(self.prioritisation_type, PrioritisationType::Compositor)
    }
}

/// ### English
/// Frame-level owner of a queue that may take over its priority computation.
///
/// The scheduler only holds a `Weak` reference; once the frame is gone the default rules apply.
///
/// ### 中文
/// 队列所属的 frame，可接管该队列的优先级计算。
///
/// 调度器只持有 `Weak` 引用；frame 销毁后回退到默认规则。
pub trait FrameQueueDelegate {
    /// ### English
    /// Returns the priority of the frame's queue.
    ///
    /// #### Parameters
    /// - `queue_type`: Kind of the queue being prioritised.
    /// - `traits`: Traits of the queue being prioritised.
    ///
    /// ### 中文
    /// 返回该 frame 所属队列的优先级。
    ///
    /// #### 参数
    /// - `queue_type`：正在计算优先级的队列种类。
    /// - `traits`：正在计算优先级的队列特性。
    fn compute_priority(&self, queue_type: QueueType, traits: &QueueTraits) -> QueuePriority;
}

/// ### English
/// Everything needed to create a queue.
///
/// ### 中文
/// 创建队列所需的全部参数。
#[derive(Clone)]
pub struct QueueCreationParams {
    pub queue_type: QueueType,
    pub traits: QueueTraits,
    /// ### English
    /// Optional non-owning back-reference to the owning frame.
    ///
    /// ### 中文
    /// 可选的、不持有所有权的所属 frame 反向引用。
    pub frame: Option<Weak<dyn FrameQueueDelegate>>,
    /// ### English
    /// Delayed tasks of this queue are excluded from the next wake-up.
    ///
    /// ### 中文
    /// 该队列的延迟任务不参与下一次唤醒时间计算。
    pub non_waking: bool,
}

impl QueueCreationParams {
    pub fn new(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            traits: QueueTraits::for_queue_type(queue_type),
            frame: None,
            non_waking: matches!(queue_type, QueueType::NonWaking),
        }
    }

    pub fn with_traits(mut self, traits: QueueTraits) -> Self {
        self.traits = traits;
        self
    }

    pub fn with_frame(mut self, frame: Weak<dyn FrameQueueDelegate>) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_non_waking(mut self, non_waking: bool) -> Self {
        self.non_waking = non_waking;
        self
    }
}

impl fmt::Debug for QueueCreationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueCreationParams")
            .field("queue_type", &self.queue_type)
            .field("traits", &self.traits)
            .field("has_frame", &self.frame.is_some())
            .field("non_waking", &self.non_waking)
            .finish()
    }
}

/// ### English
/// Stable, revocable queue handle (arena index plus generation).
///
/// Posting to or querying a handle whose queue was shut down is a silent no-op.
///
/// ### 中文
/// 稳定且可撤销的队列句柄（arena 下标 + 代数）。
///
/// 向已关闭队列的句柄投递任务或查询状态时静默忽略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskQueueHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// ### English
/// Metrics-only tag attached to a posted task.
///
/// ### 中文
/// 附加在任务上的仅用于统计的类型标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskType(pub &'static str);

impl TaskType {
    pub const UNSPECIFIED: Self = Self("unspecified");
    pub const CONTROL: Self = Self("main_thread_control");
    pub const COMPOSITOR: Self = Self("main_thread_compositor");
    pub const INPUT: Self = Self("main_thread_input");
    pub const V8: Self = Self("main_thread_v8");
    pub const IDLE: Self = Self("idle");
    pub const VIRTUAL_TIME_BUDGET: Self = Self("virtual_time_budget");
    pub const CROSS_THREAD: Self = Self("cross_thread");

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Default for TaskType {
    fn default() -> Self {
        Self::UNSPECIFIED
    }
}

/// ### English
/// Monotonic enqueue-order sequence shared by the task queues and the idle queue.
///
/// Orders start at 1, so a fence at 0 blocks everything.
///
/// ### 中文
/// 任务队列与空闲队列共享的单调入队序号序列。
///
/// 序号从 1 开始，因此位于 0 的 fence 会阻塞全部任务。
#[derive(Debug, Clone)]
pub(crate) struct EnqueueOrderSource(Rc<Cell<u64>>);

impl EnqueueOrderSource {
    pub(crate) fn new() -> Self {
        Self(Rc::new(Cell::new(1)))
    }

    pub(crate) fn take(&self) -> u64 {
        let order = self.0.get();
        self.0.set(order + 1);
        order
    }

    /// ### English
    /// Order the next posted task will get (a "now" fence position).
    ///
    /// ### 中文
    /// 下一个投递任务将获得的序号（即“当前”fence 位置）。
    pub(crate) fn peek(&self) -> u64 {
        self.0.get()
    }
}

/// ### English
/// Panics on trait combinations that are programmer errors.
///
/// ### 中文
/// 对属于编程错误的特性组合直接 panic。
pub(crate) fn assert_valid_traits(queue_type: QueueType, traits: &QueueTraits) {
    let is_control_type = matches!(queue_type, QueueType::Control);
    let is_control_prioritisation =
        matches!(traits.prioritisation_type, PrioritisationType::Control);
    assert!(
        is_control_type == is_control_prioritisation,
        "queue type {queue_type} cannot use prioritisation {:?}",
        traits.prioritisation_type
    );
    if is_control_type {
        assert!(
            !(traits.can_be_paused
                || traits.can_be_deferred
                || traits.can_be_frozen
                || traits.can_be_throttled
                || traits.can_be_paused_for_webview),
            "control queues cannot be paused, deferred, frozen or throttled"
        );
    }
    if matches!(traits.prioritisation_type, PrioritisationType::Compositor) {
        assert!(
            !traits.can_be_frozen,
            "compositor queues are frozen through the policy, not per frame"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_puts_control_on_top() {
        assert!(QueuePriority::Control > QueuePriority::Highest);
        assert!(QueuePriority::Highest > QueuePriority::VeryHigh);
        assert!(QueuePriority::VeryHigh > QueuePriority::High);
        assert!(QueuePriority::High > QueuePriority::Normal);
        assert!(QueuePriority::Normal > QueuePriority::Low);
        assert!(QueuePriority::Low > QueuePriority::BestEffort);
    }

    #[test]
    fn default_traits_follow_queue_type() {
        let control = QueueTraits::for_queue_type(QueueType::Control);
        assert_eq!(control.prioritisation_type, PrioritisationType::Control);
        assert!(control.can_run_when_virtual_time_paused);

        let idle = QueueTraits::for_queue_type(QueueType::Idle);
        assert_eq!(idle.prioritisation_type, PrioritisationType::BestEffort);
        assert!(!idle.can_run_when_virtual_time_paused);

        let compositor = QueueTraits::for_queue_type(QueueType::Compositor);
        assert!(compositor.needs_enabled_voter());
        assert!(!QueueTraits::for_queue_type(QueueType::Default).needs_enabled_voter());
    }

    #[test]
    fn non_waking_queue_type_defaults_to_non_waking() {
        assert!(QueueCreationParams::new(QueueType::NonWaking).non_waking);
        assert!(!QueueCreationParams::new(QueueType::V8).non_waking);
    }

    #[test]
    #[should_panic(expected = "cannot use prioritisation")]
    fn control_prioritisation_on_regular_queue_is_fatal() {
        let traits = QueueTraits::for_queue_type(QueueType::Default)
            .set_prioritisation_type(PrioritisationType::Control);
        assert_valid_traits(QueueType::Default, &traits);
    }

    #[test]
    #[should_panic(expected = "control queues cannot be paused")]
    fn pausable_control_queue_is_fatal() {
        let traits = QueueTraits::for_queue_type(QueueType::Control).set_can_be_paused(true);
        assert_valid_traits(QueueType::Control, &traits);
    }
}
