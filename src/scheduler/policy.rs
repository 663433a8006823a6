//! ### English
//! Use case classification and the pure priority rules derived from it.
//!
//! Everything here is a pure function of its inputs; `MainThreadScheduler` gathers the inputs
//! under the cross-thread lock and applies the results to the queues.
//!
//! ### 中文
//! 使用场景分类以及由其推导出的纯优先级规则。
//!
//! 本模块全部为纯函数；`MainThreadScheduler` 在跨线程锁内收集输入，并把结果应用到各个队列。

use std::fmt;
use std::rc::Weak;
use std::time::{Duration, Instant};

use super::any_thread::AnyThread;
use super::queue::{FrameQueueDelegate, PrioritisationType, QueuePriority, QueueTraits, QueueType};

/// ### English
/// The currently dominant interaction or page-lifecycle activity.
///
/// ### 中文
/// 当前占主导地位的交互或页面生命周期活动。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UseCase {
    /// ### English
    /// Nothing notable is happening.
    ///
    /// ### 中文
    /// 没有值得关注的活动。
    #[default]
    None,
    /// ### English
    /// A gesture handled entirely on the compositor thread (including flings).
    ///
    /// ### 中文
    /// 完全在合成器线程处理的手势（包括 fling）。
    CompositorGesture,
    /// ### English
    /// The page consumes an input stream and prevented the default gesture.
    ///
    /// ### 中文
    /// 页面在处理输入流并阻止了默认手势。
    MainThreadCustomInputHandling,
    /// ### English
    /// A gesture handled on the main thread.
    ///
    /// ### 中文
    /// 在主线程处理的手势。
    MainThreadGesture,
    /// ### English
    /// A compositor gesture that also needs main-thread frames.
    ///
    /// ### 中文
    /// 同时需要主线程帧的合成器手势。
    SynchronizedGesture,
    /// ### English
    /// A touchstart is waiting for its response; the gesture is not established yet.
    ///
    /// ### 中文
    /// touchstart 正在等待响应，手势尚未确立。
    Touchstart,
    /// ### English
    /// Loading, before the first contentful paint.
    ///
    /// ### 中文
    /// 加载中，首次内容绘制之前。
    EarlyLoading,
    /// ### English
    /// Loading, before the first meaningful paint.
    ///
    /// ### 中文
    /// 加载中，首次有效绘制之前。
    Loading,
}

impl UseCase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::CompositorGesture => "compositor_gesture",
            Self::MainThreadCustomInputHandling => "main_thread_custom_input_handling",
            Self::MainThreadGesture => "main_thread_gesture",
            Self::SynchronizedGesture => "synchronized_gesture",
            Self::Touchstart => "touchstart",
            Self::EarlyLoading => "early_loading",
            Self::Loading => "loading",
        }
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ### English
/// Coarse performance mode mirrored to the script engine.
///
/// ### 中文
/// 同步给脚本引擎的粗粒度性能模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RailMode {
    Response,
    #[default]
    Animation,
    Idle,
    Load,
}

impl RailMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Response => "response",
            Self::Animation => "animation",
            Self::Idle => "idle",
            Self::Load => "load",
        }
    }
}

impl fmt::Display for RailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ### English
/// Immutable policy snapshot, compared by value to detect no-op updates.
///
/// ### 中文
/// 不可变的策略快照，按值比较以识别无变化的更新。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub rail_mode: RailMode,
    pub use_case: UseCase,
    pub should_pause_task_queues: bool,
    pub should_defer_task_queues: bool,
    pub should_pause_task_queues_for_webview: bool,
    pub should_freeze_compositor_queue: bool,
    pub should_prioritize_loading_with_compositing: bool,
    pub find_in_page_priority: QueuePriority,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            rail_mode: RailMode::Animation,
            use_case: UseCase::None,
            should_pause_task_queues: false,
            should_defer_task_queues: false,
            should_pause_task_queues_for_webview: false,
            should_freeze_compositor_queue: false,
            should_prioritize_loading_with_compositing: false,
            find_in_page_priority: QueuePriority::VeryHigh,
        }
    }
}

impl Policy {
    /// ### English
    /// Enabled vote of a queue with `traits` under this policy.
    ///
    /// Compositor queues are additionally disabled while the compositor queue is frozen.
    ///
    /// ### 中文
    /// 在该策略下，具有 `traits` 的队列的启用投票。
    ///
    /// 合成器队列在合成器冻结期间额外被禁用。
    pub fn is_queue_enabled(&self, traits: &QueueTraits) -> bool {
        if self.should_pause_task_queues && traits.can_be_paused {
            return false;
        }
        if self.should_defer_task_queues && traits.can_be_deferred {
            return false;
        }
        if self.should_pause_task_queues_for_webview && traits.can_be_paused_for_webview {
            return false;
        }
        if matches!(traits.prioritisation_type, PrioritisationType::Compositor)
            && self.should_freeze_compositor_queue
        {
            return false;
        }
        true
    }
}

/// ### English
/// Classifies the current use case; first match wins.
///
/// Returns the use case and how long it is expected to stay valid (`Duration::ZERO` if it has
/// no natural expiry).
///
/// #### Parameters
/// - `any_thread`: Cross-thread state, read under the lock.
/// - `now`: Current scheduler time.
///
/// ### 中文
/// 对当前使用场景分类；按顺序首个匹配生效。
///
/// 返回使用场景及其预计有效时长（没有自然过期时间时为 `Duration::ZERO`）。
///
/// #### 参数
/// - `any_thread`：跨线程状态（在锁内读取）。
/// - `now`：当前调度器时间。
pub(crate) fn compute_use_case(any_thread: &AnyThread, now: Instant) -> (UseCase, Duration) {
    // Flings never report their end, only their cancellation.
    if let Some(deadline) = any_thread.fling_compositor_escalation_deadline
        && deadline > now
        && !any_thread.awaiting_touch_start_response
    {
        return (UseCase::CompositorGesture, deadline - now);
    }

    let gesture_window = any_thread.user_model.time_left_in_user_gesture(now);
    if !gesture_window.is_zero() {
        let use_case = if any_thread.awaiting_touch_start_response {
            UseCase::Touchstart
        } else if any_thread.last_gesture_was_compositor_driven {
            if any_thread.begin_main_frame_on_critical_path {
                UseCase::SynchronizedGesture
            } else {
                UseCase::CompositorGesture
            }
        } else if any_thread.default_gesture_prevented {
            UseCase::MainThreadCustomInputHandling
        } else {
            UseCase::MainThreadGesture
        };
        return (use_case, gesture_window);
    }

    // Input is an indirect sign of meaningful content when a paint signal was missed.
    if !any_thread.have_seen_input_since_navigation {
        if any_thread.waiting_for_any_main_frame_contentful_paint {
            return (UseCase::EarlyLoading, Duration::ZERO);
        }
        if any_thread.waiting_for_any_main_frame_meaningful_paint {
            return (UseCase::Loading, Duration::ZERO);
        }
    }
    (UseCase::None, Duration::ZERO)
}

/// ### English
/// RAIL mode for a use case. A hidden surface forces `Idle`.
///
/// ### 中文
/// 使用场景对应的 RAIL 模式。界面隐藏时强制为 `Idle`。
pub(crate) fn compute_rail_mode(
    use_case: UseCase,
    blocking_input_expected_soon: bool,
    last_gesture_was_compositor_driven: bool,
    hidden: bool,
) -> RailMode {
    if hidden {
        return RailMode::Idle;
    }
    match use_case {
        UseCase::CompositorGesture | UseCase::SynchronizedGesture | UseCase::MainThreadGesture
            if blocking_input_expected_soon =>
        {
            RailMode::Response
        }
        UseCase::Touchstart => RailMode::Response,
        // Blocking is only safe while a compositor-driven gesture is expected.
        UseCase::None if blocking_input_expected_soon && last_gesture_was_compositor_driven => {
            RailMode::Response
        }
        UseCase::EarlyLoading | UseCase::Loading => RailMode::Load,
        _ => RailMode::Animation,
    }
}

/// ### English
/// Inputs of the compositor priority controller.
///
/// ### 中文
/// 合成器优先级控制器的输入。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompositorPriorityInputs {
    pub use_case: UseCase,
    pub prioritize_compositing_after_input: bool,
    pub prioritize_compositing_and_loading_during_early_loading: bool,
    pub blocking_input_expected_soon: bool,
    pub main_thread_compositing_is_fast: bool,
    pub should_prioritize_compositor_after_delay: bool,
}

/// ### English
/// Priority of compositor-type queues.
///
/// ### 中文
/// 合成器类队列的优先级。
pub fn compute_compositor_priority(inputs: &CompositorPriorityInputs) -> QueuePriority {
    if inputs.prioritize_compositing_after_input {
        return QueuePriority::VeryHigh;
    }
    if inputs.prioritize_compositing_and_loading_during_early_loading
        && inputs.use_case == UseCase::EarlyLoading
    {
        return QueuePriority::High;
    }
    if let Some(priority) = compositor_priority_from_use_case(inputs) {
        return priority;
    }
    if inputs.should_prioritize_compositor_after_delay {
        return QueuePriority::VeryHigh;
    }
    QueuePriority::Normal
}

fn compositor_priority_from_use_case(inputs: &CompositorPriorityInputs) -> Option<QueuePriority> {
    match inputs.use_case {
        UseCase::CompositorGesture => {
            if inputs.blocking_input_expected_soon {
                Some(QueuePriority::Highest)
            } else {
                // Deprioritising compositing lets loading make progress during the gesture.
                Some(QueuePriority::Low)
            }
        }
        UseCase::SynchronizedGesture | UseCase::MainThreadCustomInputHandling => inputs
            .main_thread_compositing_is_fast
            .then_some(QueuePriority::Highest),
        UseCase::MainThreadGesture | UseCase::Touchstart => Some(QueuePriority::Highest),
        UseCase::None | UseCase::EarlyLoading | UseCase::Loading => None,
    }
}

/// ### English
/// Priority of one queue. An owning frame that is still alive decides first.
///
/// #### Parameters
/// - `queue_type`: Kind of the queue.
/// - `traits`: Traits of the queue.
/// - `frame`: Optional owning frame.
/// - `policy`: Current policy.
/// - `compositor_priority`: Current compositor priority.
///
/// ### 中文
/// 单个队列的优先级。若所属 frame 仍存活，则由其决定。
///
/// #### 参数
/// - `queue_type`：队列种类。
/// - `traits`：队列特性。
/// - `frame`：可选的所属 frame。
/// - `policy`：当前策略。
/// - `compositor_priority`：当前合成器优先级。
pub fn compute_priority(
    queue_type: QueueType,
    traits: &QueueTraits,
    frame: Option<&Weak<dyn FrameQueueDelegate>>,
    policy: &Policy,
    compositor_priority: QueuePriority,
) -> QueuePriority {
    if !matches!(traits.prioritisation_type, PrioritisationType::Control)
        && let Some(frame) = frame.and_then(Weak::upgrade)
    {
        return frame.compute_priority(queue_type, traits);
    }

    match traits.prioritisation_type {
        PrioritisationType::Control => QueuePriority::Control,
        PrioritisationType::Compositor => compositor_priority,
        PrioritisationType::Input => QueuePriority::Highest,
        PrioritisationType::BestEffort => QueuePriority::BestEffort,
        PrioritisationType::Loading => {
            if policy.should_prioritize_loading_with_compositing {
                QueuePriority::High
            } else {
                QueuePriority::Normal
            }
        }
        PrioritisationType::FindInPage => policy.find_in_page_priority,
        PrioritisationType::Regular => QueuePriority::Normal,
    }
}

/// ### English
/// Longest task that would not cause jank under `use_case`.
///
/// ### 中文
/// 在 `use_case` 下不会造成卡顿的最长任务时长。
pub(crate) fn longest_jank_free_task_duration(
    use_case: UseCase,
    rails_response_time: Duration,
    expected_idle_duration: Duration,
) -> Duration {
    match use_case {
        UseCase::MainThreadCustomInputHandling
        | UseCase::MainThreadGesture
        | UseCase::SynchronizedGesture => expected_idle_duration,
        UseCase::Touchstart
        | UseCase::CompositorGesture
        | UseCase::EarlyLoading
        | UseCase::Loading
        | UseCase::None => rails_response_time,
    }
}

/// ### English
/// Whether priorities must be recomputed when moving from `old` to `new`.
///
/// ### 中文
/// 从 `old` 切换到 `new` 时是否需要重新计算优先级。
pub(crate) fn should_update_priorities(old: &Policy, new: &Policy) -> bool {
    old.use_case != new.use_case || old.find_in_page_priority != new.find_in_page_priority
}
