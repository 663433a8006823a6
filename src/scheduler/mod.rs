//! ### English
//! Main-thread scheduler modules (queues, policy engine, idle periods, virtual time, and the
//! cross-thread surface used by the compositor/input thread).
//!
//! ### 中文
//! 主线程调度器模块（队列、策略引擎、空闲期、虚拟时间，以及合成器/输入线程使用的跨线程接口）。
pub mod any_thread;
pub mod clock;
pub mod find_in_page;
pub mod idle;
pub mod input;
pub mod main_thread;
pub mod observer;
pub mod policy;
pub mod process_state;
pub mod queue;
pub mod virtual_time;

pub use any_thread::{CompositorThreadHandle, CrossThreadTask, MainThreadWaker};
pub use clock::{DefaultTickClock, SchedulerClock, TestTickClock, TickClock};
pub use idle::IdlePeriodState;
pub use input::{DispatchType, InputEvent, InputEventResult, InputEventState, InputEventType};
pub use main_thread::{
    BeginFrameArgs, CompletedTask, MainFramePaintState, MainThreadScheduler, PageId,
    RendererPauseHandle, ScheduledTask, SchedulerBuilder,
};
pub use observer::{PolicySnapshot, SchedulerObserver, TaskRecord, TracingObserver};
pub use policy::{Policy, RailMode, UseCase};
pub use process_state::ProcessState;
pub use queue::{
    FrameQueueDelegate, PrioritisationType, QueueCreationParams, QueuePriority, QueueTraits,
    QueueType, TaskQueueHandle, TaskType,
};
pub use virtual_time::VirtualTimePolicy;
