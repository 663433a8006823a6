//! ### English
//! Cross-thread state and the compositor/input thread's handle to the scheduler.
//!
//! Everything the input thread may touch lives in [`AnyThread`] behind one `parking_lot`
//! mutex. Work that must run on the main thread (policy updates, posted tasks) crosses over
//! through a `crossbeam-channel` inbox drained by the main thread between tasks.
//!
//! ### 中文
//! 跨线程状态，以及合成器/输入线程持有的调度器句柄。
//!
//! 输入线程可能访问的所有状态都位于一个 `parking_lot` 互斥锁保护的 [`AnyThread`] 中。
//! 必须在主线程执行的工作（策略更新、投递的任务）经由 `crossbeam-channel` 收件箱传递，
//! 主线程在任务之间 drain 该收件箱。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use parking_lot::Mutex;
use tracing::trace;

use crate::config::SchedulerConfig;
use crate::scheduler::clock::SchedulerClock;
use crate::scheduler::input::{
    InputEvent, InputEventState, InputEventType, PendingInputMonitor, UserModel,
};
use crate::scheduler::policy::compute_use_case;
use crate::scheduler::queue::{TaskQueueHandle, TaskType};

/// ### English
/// Task posted from another thread; must be `Send`.
///
/// ### 中文
/// 从其它线程投递的任务；必须是 `Send`。
pub type CrossThreadTask = Box<dyn FnOnce() + Send + 'static>;

/// ### English
/// Wakes the embedder's main-thread run loop when cross-thread work arrives.
///
/// ### 中文
/// 跨线程工作到达时唤醒宿主的主线程运行循环。
pub trait MainThreadWaker: Send + Sync {
    fn wake(&self);
}

/// ### English
/// Fields shared between the main thread and the compositor/input thread.
///
/// ### 中文
/// 主线程与合成器/输入线程共享的字段。
#[derive(Debug)]
pub(crate) struct AnyThread {
    pub(crate) user_model: UserModel,
    pub(crate) pending_input_monitor: PendingInputMonitor,
    pub(crate) fling_compositor_escalation_deadline: Option<Instant>,
    pub(crate) last_main_frame_time: Option<Instant>,
    pub(crate) begin_main_frame_scheduled_count: u32,
    pub(crate) awaiting_touch_start_response: bool,
    pub(crate) begin_main_frame_on_critical_path: bool,
    pub(crate) last_gesture_was_compositor_driven: bool,
    pub(crate) default_gesture_prevented: bool,
    pub(crate) have_seen_a_blocking_gesture: bool,
    pub(crate) waiting_for_any_main_frame_contentful_paint: bool,
    pub(crate) waiting_for_any_main_frame_meaningful_paint: bool,
    pub(crate) have_seen_input_since_navigation: bool,
    pub(crate) last_input_type: InputEventType,
    /// ### English
    /// An urgent policy update was requested and has not run yet.
    ///
    /// ### 中文
    /// 已请求紧急策略更新，但尚未执行。
    pub(crate) policy_may_need_update: bool,
    fling_escalation_limit: Duration,
}

impl AnyThread {
    pub(crate) fn new(config: &SchedulerConfig) -> Self {
        Self {
            user_model: UserModel::new(config),
            pending_input_monitor: PendingInputMonitor::new(),
            fling_compositor_escalation_deadline: None,
            last_main_frame_time: None,
            begin_main_frame_scheduled_count: 0,
            awaiting_touch_start_response: false,
            begin_main_frame_on_critical_path: false,
            last_gesture_was_compositor_driven: false,
            default_gesture_prevented: true,
            have_seen_a_blocking_gesture: false,
            waiting_for_any_main_frame_contentful_paint: false,
            waiting_for_any_main_frame_meaningful_paint: false,
            have_seen_input_since_navigation: false,
            last_input_type: InputEventType::Undefined,
            policy_may_need_update: false,
            fling_escalation_limit: config.fling_escalation_limit(),
        }
    }

    /// ### English
    /// Marks an urgent policy update as pending. Returns `false` if one already was, in which
    /// case the main thread has been told and no message is needed.
    ///
    /// ### 中文
    /// 标记紧急策略更新为待处理。若已处于待处理状态则返回 `false`，此时主线程已被通知，
    /// 无需再发送消息。
    pub(crate) fn request_urgent_policy_update(&mut self) -> bool {
        !std::mem::replace(&mut self.policy_may_need_update, true)
    }

    /// ### English
    /// Applies one prioritised input event to the gesture state.
    ///
    /// Returns `true` when the use case or the touchstart flag changed, i.e. the policy needs
    /// an urgent update.
    ///
    /// #### Parameters
    /// - `event`: The event handled by the compositor thread.
    /// - `state`: Whether the compositor consumed it or forwarded it.
    /// - `now`: Current scheduler time.
    ///
    /// ### 中文
    /// 将一个优先输入事件应用到手势状态。
    ///
    /// 使用场景或 touchstart 标记发生变化（即策略需要紧急更新）时返回 `true`。
    ///
    /// #### 参数
    /// - `event`：合成器线程处理的事件。
    /// - `state`：合成器是消费了该事件还是转发到了主线程。
    /// - `now`：当前调度器时间。
    pub(crate) fn update_for_input_event(
        &mut self,
        event: &InputEvent,
        state: InputEventState,
        now: Instant,
    ) -> bool {
        let (previous_use_case, _) = compute_use_case(self, now);
        let was_awaiting_touch_start_response = self.awaiting_touch_start_response;
        let consumed = state == InputEventState::ConsumedByCompositor;

        self.user_model
            .did_start_processing_input_event(event.event_type, now);
        self.have_seen_input_since_navigation = true;
        if consumed {
            self.user_model.did_finish_processing_input_event(now);
        }

        match event.event_type {
            InputEventType::TouchStart => {
                self.awaiting_touch_start_response = true;
                // Where the gesture will run is unknown until it is established.
                self.last_gesture_was_compositor_driven = false;
                self.default_gesture_prevented = true;
                if event.is_blocking() {
                    self.have_seen_a_blocking_gesture = true;
                }
            }
            InputEventType::TouchMove => {
                // Consecutive touchmoves mean the page consumes the touch sequence.
                if self.awaiting_touch_start_response
                    && self.last_input_type == InputEventType::TouchMove
                {
                    self.awaiting_touch_start_response = false;
                }
            }
            InputEventType::GesturePinchUpdate | InputEventType::GestureScrollUpdate => {
                // An established gesture can no longer be cancelled; lock it to its thread.
                self.last_gesture_was_compositor_driven = consumed;
                self.awaiting_touch_start_response = false;
                self.default_gesture_prevented = false;
            }
            InputEventType::GestureFlingCancel => {
                self.fling_compositor_escalation_deadline = None;
            }
            InputEventType::GestureTapDown
            | InputEventType::GestureShowPress
            | InputEventType::GestureScrollEnd => {}
            InputEventType::MouseDown => {
                self.last_gesture_was_compositor_driven = false;
                self.default_gesture_prevented = true;
            }
            InputEventType::MouseMove => {
                self.last_gesture_was_compositor_driven = consumed;
                self.awaiting_touch_start_response = false;
            }
            InputEventType::MouseWheel => {
                self.last_gesture_was_compositor_driven = consumed;
                self.awaiting_touch_start_response = false;
                self.default_gesture_prevented = !self.last_gesture_was_compositor_driven;
                if event.is_blocking() {
                    self.have_seen_a_blocking_gesture = true;
                }
            }
            InputEventType::Undefined => {}
            _ => {
                self.awaiting_touch_start_response = false;
            }
        }

        let (use_case, _) = compute_use_case(self, now);
        self.last_input_type = event.event_type;
        use_case != previous_use_case
            || was_awaiting_touch_start_response != self.awaiting_touch_start_response
    }
}

/// ### English
/// Main-thread-bound work sent from other threads.
///
/// ### 中文
/// 从其它线程发往主线程的工作。
pub(crate) enum InboxMessage {
    /// ### English
    /// Run a policy update before the next task.
    ///
    /// ### 中文
    /// 在下一个任务之前执行策略更新。
    UpdatePolicy,
    /// ### English
    /// A renderer pause handle was dropped.
    ///
    /// ### 中文
    /// 某个渲染器暂停句柄已被释放。
    ResumeRenderer,
    PostTask {
        queue: TaskQueueHandle,
        task_type: TaskType,
        run_at: Option<Instant>,
        task: CrossThreadTask,
    },
}

impl fmt::Debug for InboxMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpdatePolicy => f.write_str("UpdatePolicy"),
            Self::ResumeRenderer => f.write_str("ResumeRenderer"),
            Self::PostTask {
                queue,
                task_type,
                run_at,
                ..
            } => f
                .debug_struct("PostTask")
                .field("queue", queue)
                .field("task_type", task_type)
                .field("run_at", run_at)
                .finish_non_exhaustive(),
        }
    }
}

/// ### English
/// State reachable from every thread.
///
/// ### 中文
/// 所有线程都可访问的状态。
pub(crate) struct SharedState {
    pub(crate) any_thread: Mutex<AnyThread>,
    pub(crate) clock: Arc<SchedulerClock>,
    inbox: channel::Sender<InboxMessage>,
    waker: Option<Arc<dyn MainThreadWaker>>,
    /// ### English
    /// Coalesced "wake pending" flag to avoid wake storms.
    ///
    /// ### 中文
    /// 合并的 “wake pending” 标记，用于避免唤醒风暴。
    wake_pending: AtomicBool,
}

impl SharedState {
    pub(crate) fn new(
        config: &SchedulerConfig,
        clock: Arc<SchedulerClock>,
        inbox: channel::Sender<InboxMessage>,
        waker: Option<Arc<dyn MainThreadWaker>>,
    ) -> Self {
        Self {
            any_thread: Mutex::new(AnyThread::new(config)),
            clock,
            inbox,
            waker,
            wake_pending: AtomicBool::new(false),
        }
    }

    /// ### English
    /// Sends a message to the main thread. Returns `false` once the scheduler is gone.
    ///
    /// ### 中文
    /// 向主线程发送消息。调度器销毁后返回 `false`。
    pub(crate) fn send(&self, message: InboxMessage) -> bool {
        if self.inbox.send(message).is_err() {
            trace!("main thread inbox closed");
            return false;
        }
        if let Some(waker) = &self.waker
            && !self.wake_pending.swap(true, Ordering::AcqRel)
        {
            waker.wake();
        }
        true
    }

    /// ### English
    /// Called by the main thread right before draining the inbox.
    ///
    /// ### 中文
    /// 主线程在 drain 收件箱之前调用。
    pub(crate) fn clear_wake_pending(&self) {
        self.wake_pending.store(false, Ordering::Release);
    }

}

/// ### English
/// `Send + Sync` handle used by the compositor/input thread.
///
/// Cloning is cheap. Every method takes the cross-thread lock only for a few field updates.
///
/// ### 中文
/// 合成器/输入线程使用的 `Send + Sync` 句柄。
///
/// 克隆开销很小。每个方法只在更新少量字段时持有跨线程锁。
#[derive(Clone)]
pub struct CompositorThreadHandle {
    shared: Arc<SharedState>,
}

impl CompositorThreadHandle {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// ### English
    /// Reports an input event seen by the compositor thread.
    ///
    /// Events that do not signal a smooth-frame-rate interaction (keyboard, plain mouse
    /// moves) are ignored.
    ///
    /// #### Parameters
    /// - `event`: The input event.
    /// - `state`: Whether the compositor consumed it or forwarded it to the main thread.
    ///
    /// ### 中文
    /// 上报合成器线程看到的输入事件。
    ///
    /// 不代表流畅帧率交互的事件（键盘、普通鼠标移动）会被忽略。
    ///
    /// #### 参数
    /// - `event`：输入事件。
    /// - `state`：合成器是消费了它还是转发到主线程。
    pub fn did_handle_input_event_on_compositor_thread(
        &self,
        event: &InputEvent,
        state: InputEventState,
    ) {
        if !event.should_prioritize() {
            return;
        }
        let now = self.shared.clock.now_ticks();
        let needs_update = {
            let mut any_thread = self.shared.any_thread.lock();
            any_thread.update_for_input_event(event, state, now)
                && any_thread.request_urgent_policy_update()
        };
        // Wake only after the guard is dropped; wakers may re-enter the scheduler.
        if needs_update {
            self.shared.send(InboxMessage::UpdatePolicy);
        }
    }

    /// ### English
    /// The compositor animated for input (e.g. a fling); keeps the fling use case alive.
    ///
    /// ### 中文
    /// 合成器为输入执行了动画（例如 fling）；保持 fling 使用场景有效。
    pub fn did_animate_for_input_on_compositor_thread(&self) {
        let now = self.shared.clock.now_ticks();
        let mut any_thread = self.shared.any_thread.lock();
        any_thread.fling_compositor_escalation_deadline =
            Some(now + any_thread.fling_escalation_limit);
    }

    pub fn will_post_input_event_to_main_thread(&self, event_type: InputEventType) {
        self.shared
            .any_thread
            .lock()
            .pending_input_monitor
            .on_enqueue(event_type);
    }

    pub fn did_schedule_begin_main_frame(&self) {
        self.shared.any_thread.lock().begin_main_frame_scheduled_count += 1;
    }

    pub fn did_run_begin_main_frame(&self) {
        let now = self.shared.clock.now_ticks();
        let mut any_thread = self.shared.any_thread.lock();
        any_thread.begin_main_frame_scheduled_count =
            any_thread.begin_main_frame_scheduled_count.saturating_sub(1);
        any_thread.last_main_frame_time = Some(now);
    }

    pub fn is_begin_main_frame_scheduled(&self) -> bool {
        self.shared.any_thread.lock().begin_main_frame_scheduled_count > 0
    }

    /// ### English
    /// Scheduler time of the last main frame reported through [`Self::did_run_begin_main_frame`].
    ///
    /// ### 中文
    /// 最近一次通过 [`Self::did_run_begin_main_frame`] 上报的主帧所对应的调度器时间。
    pub fn last_main_frame_time(&self) -> Option<Instant> {
        self.shared.any_thread.lock().last_main_frame_time
    }

    /// ### English
    /// Posts a task to a main-thread queue.
    ///
    /// Returns `false` if the scheduler is gone. Posting to a queue that is shut down by the
    /// time the main thread sees the task silently drops it.
    ///
    /// #### Parameters
    /// - `queue`: Target queue.
    /// - `task_type`: Metrics-only tag.
    /// - `task`: The callable.
    ///
    /// ### 中文
    /// 向主线程队列投递任务。
    ///
    /// 调度器已销毁时返回 `false`。若主线程处理时目标队列已关闭，任务会被静默丢弃。
    ///
    /// #### 参数
    /// - `queue`：目标队列。
    /// - `task_type`：仅用于统计的标签。
    /// - `task`：可调用对象。
    pub fn post_task(
        &self,
        queue: TaskQueueHandle,
        task_type: TaskType,
        task: impl FnOnce() + Send + 'static,
    ) -> bool {
        self.shared.send(InboxMessage::PostTask {
            queue,
            task_type,
            run_at: None,
            task: Box::new(task),
        })
    }

    pub fn post_delayed_task(
        &self,
        queue: TaskQueueHandle,
        task_type: TaskType,
        delay: Duration,
        task: impl FnOnce() + Send + 'static,
    ) -> bool {
        let run_at = self.shared.clock.now_ticks() + delay;
        self.shared.send(InboxMessage::PostTask {
            queue,
            task_type,
            run_at: Some(run_at),
            task: Box::new(task),
        })
    }

    /// ### English
    /// Scheduler time as seen from any thread (virtual when enabled).
    ///
    /// ### 中文
    /// 任意线程看到的调度器时间（启用虚拟时间时为虚拟时间）。
    pub fn now_ticks(&self) -> Instant {
        self.shared.clock.now_ticks()
    }
}

impl fmt::Debug for CompositorThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositorThreadHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::input::DispatchType;
    use crate::scheduler::policy::UseCase;

    fn any_thread() -> AnyThread {
        AnyThread::new(&SchedulerConfig::default())
    }

    #[test]
    fn touchstart_arms_awaiting_response() {
        let now = Instant::now();
        let mut state = any_thread();
        let changed = state.update_for_input_event(
            &InputEvent::new(InputEventType::TouchStart),
            InputEventState::ForwardedToMainThread,
            now,
        );
        assert!(changed);
        assert!(state.awaiting_touch_start_response);
        assert!(state.default_gesture_prevented);
        assert!(state.have_seen_a_blocking_gesture);
        assert_eq!(compute_use_case(&state, now).0, UseCase::Touchstart);
    }

    #[test]
    fn non_blocking_touchstart_is_not_a_blocking_gesture() {
        let mut state = any_thread();
        state.update_for_input_event(
            &InputEvent::new(InputEventType::TouchStart).with_dispatch_type(DispatchType::NonBlocking),
            InputEventState::ForwardedToMainThread,
            Instant::now(),
        );
        assert!(!state.have_seen_a_blocking_gesture);
    }

    #[test]
    fn second_touchmove_clears_awaiting_response() {
        let now = Instant::now();
        let mut state = any_thread();
        let forwarded = InputEventState::ForwardedToMainThread;
        state.update_for_input_event(&InputEvent::new(InputEventType::TouchStart), forwarded, now);
        state.update_for_input_event(&InputEvent::new(InputEventType::TouchMove), forwarded, now);
        assert!(state.awaiting_touch_start_response);
        let changed =
            state.update_for_input_event(&InputEvent::new(InputEventType::TouchMove), forwarded, now);
        assert!(changed);
        assert!(!state.awaiting_touch_start_response);
    }

    #[test]
    fn scroll_update_locks_gesture_to_compositor() {
        let now = Instant::now();
        let mut state = any_thread();
        state.update_for_input_event(
            &InputEvent::new(InputEventType::GestureScrollUpdate),
            InputEventState::ConsumedByCompositor,
            now,
        );
        assert!(state.last_gesture_was_compositor_driven);
        assert!(!state.default_gesture_prevented);
        assert_eq!(compute_use_case(&state, now).0, UseCase::CompositorGesture);
    }

    #[test]
    fn repeated_event_does_not_request_update() {
        let now = Instant::now();
        let mut state = any_thread();
        let event = InputEvent::new(InputEventType::GestureScrollUpdate);
        assert!(state.update_for_input_event(&event, InputEventState::ConsumedByCompositor, now));
        assert!(!state.update_for_input_event(&event, InputEventState::ConsumedByCompositor, now));
    }

    #[test]
    fn wheel_to_main_thread_prevents_default() {
        let now = Instant::now();
        let mut state = any_thread();
        state.update_for_input_event(
            &InputEvent::new(InputEventType::MouseWheel),
            InputEventState::ForwardedToMainThread,
            now,
        );
        assert!(state.default_gesture_prevented);
        assert!(state.have_seen_a_blocking_gesture);
        assert_eq!(
            compute_use_case(&state, now).0,
            UseCase::MainThreadCustomInputHandling
        );
    }

    #[test]
    fn fling_cancel_clears_deadline() {
        let now = Instant::now();
        let mut state = any_thread();
        state.fling_compositor_escalation_deadline = Some(now + Duration::from_millis(50));
        state.update_for_input_event(
            &InputEvent::new(InputEventType::GestureFlingCancel),
            InputEventState::ConsumedByCompositor,
            now,
        );
        assert_eq!(state.fling_compositor_escalation_deadline, None);
    }

    struct CountingWaker(std::sync::atomic::AtomicUsize);

    impl MainThreadWaker for CountingWaker {
        fn wake(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn wakes_are_coalesced_until_drained() {
        let (tx, rx) = channel::unbounded();
        let waker = Arc::new(CountingWaker(Default::default()));
        let clock = Arc::new(SchedulerClock::new(Arc::new(
            crate::scheduler::clock::TestTickClock::new(),
        )));
        let shared = SharedState::new(&SchedulerConfig::default(), clock, tx, Some(waker.clone()));

        assert!(shared.send(InboxMessage::UpdatePolicy));
        assert!(shared.send(InboxMessage::UpdatePolicy));
        assert_eq!(waker.0.load(Ordering::Relaxed), 1);

        shared.clear_wake_pending();
        while rx.try_recv().is_ok() {}
        assert!(shared.send(InboxMessage::UpdatePolicy));
        assert_eq!(waker.0.load(Ordering::Relaxed), 2);

        drop(rx);
        assert!(!shared.send(InboxMessage::UpdatePolicy));
    }

    #[test]
    fn urgent_update_is_requested_once_until_handled() {
        let mut state = any_thread();
        assert!(state.request_urgent_policy_update());
        assert!(!state.request_urgent_policy_update());
        state.policy_may_need_update = false;
        assert!(state.request_urgent_policy_update());
    }

    /// Records whether the cross-thread lock was free when the wake arrived.
    #[derive(Default)]
    struct LockCheckingWaker {
        shared: std::sync::OnceLock<std::sync::Weak<SharedState>>,
        wakes: std::sync::atomic::AtomicUsize,
        woke_under_lock: AtomicBool,
    }

    impl MainThreadWaker for LockCheckingWaker {
        fn wake(&self) {
            self.wakes.fetch_add(1, Ordering::Relaxed);
            let Some(shared) = self.shared.get().and_then(std::sync::Weak::upgrade) else {
                return;
            };
            if shared.any_thread.try_lock().is_none() {
                self.woke_under_lock.store(true, Ordering::Relaxed);
            }
        }
    }

    #[test]
    fn input_wake_runs_without_the_cross_thread_lock() {
        let (tx, _rx) = channel::unbounded();
        let waker = Arc::new(LockCheckingWaker::default());
        let clock = Arc::new(SchedulerClock::new(Arc::new(
            crate::scheduler::clock::TestTickClock::new(),
        )));
        let shared = Arc::new(SharedState::new(
            &SchedulerConfig::default(),
            clock,
            tx,
            Some(waker.clone()),
        ));
        assert!(waker.shared.set(Arc::downgrade(&shared)).is_ok());

        let handle = CompositorThreadHandle::new(Arc::clone(&shared));
        handle.did_handle_input_event_on_compositor_thread(
            &InputEvent::new(InputEventType::TouchStart),
            InputEventState::ForwardedToMainThread,
        );
        assert_eq!(waker.wakes.load(Ordering::Relaxed), 1);
        assert!(!waker.woke_under_lock.load(Ordering::Relaxed));
        assert!(shared.any_thread.lock().policy_may_need_update);
    }
}
