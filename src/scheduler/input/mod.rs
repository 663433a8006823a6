//! ### English
//! Input event model seen by the scheduler.
//!
//! The scheduler never dispatches input; it only classifies the events the compositor thread
//! and the main thread report, to predict gestures and pick a use case.
//!
//! ### 中文
//! 调度器所见的输入事件模型。
//!
//! 调度器从不分发输入；它只对合成器线程与主线程上报的事件分类，用于预测手势并选择使用场景。

mod pending;
mod user_model;

pub use pending::PendingInputMonitor;
pub use user_model::UserModel;

/// ### English
/// Input event kinds relevant to scheduling.
///
/// ### 中文
/// 与调度相关的输入事件种类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputEventType {
    #[default]
    Undefined,
    MouseDown,
    MouseUp,
    MouseMove,
    MouseEnter,
    MouseLeave,
    ContextMenu,
    MouseWheel,
    RawKeyDown,
    KeyDown,
    KeyUp,
    Char,
    GestureScrollBegin,
    GestureScrollUpdate,
    GestureScrollEnd,
    GestureFlingStart,
    GestureFlingCancel,
    GesturePinchBegin,
    GesturePinchUpdate,
    GesturePinchEnd,
    GestureTapDown,
    GestureShowPress,
    GestureTap,
    GestureTapCancel,
    GestureLongPress,
    GestureDoubleTap,
    TouchStart,
    TouchMove,
    TouchEnd,
    TouchCancel,
}

impl InputEventType {
    /// ### English
    /// Mouse button/move events (wheel is *not* a mouse event here).
    ///
    /// ### 中文
    /// 鼠标按键/移动事件（此处滚轮*不*算鼠标事件）。
    pub const fn is_mouse_event(self) -> bool {
        matches!(
            self,
            Self::MouseDown
                | Self::MouseUp
                | Self::MouseMove
                | Self::MouseEnter
                | Self::MouseLeave
                | Self::ContextMenu
        )
    }

    pub const fn is_keyboard_event(self) -> bool {
        matches!(
            self,
            Self::RawKeyDown | Self::KeyDown | Self::KeyUp | Self::Char
        )
    }

    /// ### English
    /// Events that start a gesture in the user model.
    ///
    /// ### 中文
    /// 在用户模型中开启手势的事件。
    pub(crate) const fn starts_gesture(self) -> bool {
        matches!(
            self,
            Self::TouchStart | Self::GestureScrollBegin | Self::GesturePinchBegin
        )
    }

    /// ### English
    /// Events of a continuous (scroll/pinch/fling) gesture.
    ///
    /// ### 中文
    /// 连续手势（滚动/缩放/fling）事件。
    pub(crate) const fn is_continuous_gesture(self) -> bool {
        matches!(
            self,
            Self::GestureScrollBegin
                | Self::GestureScrollEnd
                | Self::GestureScrollUpdate
                | Self::GestureFlingStart
                | Self::GestureFlingCancel
                | Self::GesturePinchBegin
                | Self::GesturePinchEnd
                | Self::GesturePinchUpdate
        )
    }

    pub(crate) const fn ends_gesture(self) -> bool {
        matches!(
            self,
            Self::GestureScrollEnd | Self::GesturePinchEnd | Self::GestureFlingStart | Self::TouchEnd
        )
    }
}

/// ### English
/// Whether the sender waits for the main thread's verdict on the event.
///
/// ### 中文
/// 发送方是否需要等待主线程对该事件的处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchType {
    #[default]
    Blocking,
    NonBlocking,
}

/// ### English
/// Where the compositor thread routed an event.
///
/// ### 中文
/// 合成器线程对事件的处理去向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEventState {
    ConsumedByCompositor,
    ForwardedToMainThread,
}

/// ### English
/// Outcome of main-thread input handling.
///
/// ### 中文
/// 主线程输入处理的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEventResult {
    NotHandled,
    HandledSuppressed,
    HandledApplication,
    HandledSystem,
}

/// ### English
/// One input event as reported to the scheduler.
///
/// ### 中文
/// 上报给调度器的单个输入事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputEvent {
    pub event_type: InputEventType,
    /// ### English
    /// Left mouse button held while the event happened.
    ///
    /// ### 中文
    /// 事件发生时鼠标左键处于按下状态。
    pub left_button_down: bool,
    pub dispatch_type: DispatchType,
}

impl InputEvent {
    pub const fn new(event_type: InputEventType) -> Self {
        Self {
            event_type,
            left_button_down: false,
            dispatch_type: DispatchType::Blocking,
        }
    }

    pub const fn with_left_button_down(mut self, down: bool) -> Self {
        self.left_button_down = down;
        self
    }

    pub const fn with_dispatch_type(mut self, dispatch_type: DispatchType) -> Self {
        self.dispatch_type = dispatch_type;
        self
    }

    /// ### English
    /// Whether the event should move the scheduler into an input-prioritised state.
    ///
    /// Mouse presses/moves count only with the left button held; other mouse events and
    /// keyboard events never do. Wheel, touch and gesture events always do.
    ///
    /// ### 中文
    /// 该事件是否应让调度器进入输入优先状态。
    ///
    /// 鼠标按下/移动仅在左键按住时计入；其它鼠标事件与键盘事件从不计入。
    /// 滚轮、触摸与手势事件始终计入。
    pub const fn should_prioritize(&self) -> bool {
        if matches!(
            self.event_type,
            InputEventType::MouseDown | InputEventType::MouseMove
        ) && self.left_button_down
        {
            return true;
        }
        !(self.event_type.is_mouse_event() || self.event_type.is_keyboard_event())
    }

    /// ### English
    /// Blocking touchstart or wheel: a sign that blocking gestures happen on this page.
    ///
    /// ### 中文
    /// 阻塞式 touchstart 或滚轮：表示该页面会出现阻塞式手势。
    pub(crate) const fn is_blocking(&self) -> bool {
        matches!(
            self.event_type,
            InputEventType::TouchStart | InputEventType::MouseWheel
        ) && matches!(self.dispatch_type, DispatchType::Blocking)
    }
}
