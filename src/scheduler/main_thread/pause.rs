use std::fmt;
use std::sync::Arc;

use crate::scheduler::any_thread::{InboxMessage, SharedState};

/// ### English
/// Keeps the renderer paused while alive.
///
/// Handles nest: pausable queues resume once every handle is dropped and the scheduler has
/// processed the resumes at its next run-loop step. Dropping a handle after the scheduler is
/// gone is harmless.
///
/// ### 中文
/// 存活期间保持渲染器暂停。
///
/// 句柄可以嵌套：所有句柄都被释放、且调度器在下一次运行循环步骤处理了恢复消息后，
/// 可暂停队列才会恢复。调度器销毁后再释放句柄不会产生任何影响。
#[must_use = "the renderer resumes as soon as the handle is dropped"]
pub struct RendererPauseHandle {
    shared: Arc<SharedState>,
}

impl RendererPauseHandle {
    pub(super) fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }
}

impl Drop for RendererPauseHandle {
    fn drop(&mut self) {
        self.shared.send(InboxMessage::ResumeRenderer);
    }
}

impl fmt::Debug for RendererPauseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererPauseHandle").finish_non_exhaustive()
    }
}
