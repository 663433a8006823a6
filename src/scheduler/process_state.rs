//! ### English
//! Process-wide scheduling facts shared through an explicit handle.
//!
//! ### 中文
//! 通过显式句柄共享的进程级调度状态。

use std::sync::atomic::{AtomicBool, Ordering};

/// ### English
/// Process-level state readable from any thread (other schedulers, worker pools).
///
/// Owned by whoever creates the scheduler and handed to it as `Arc<ProcessState>`; there is
/// no global instance.
///
/// ### 中文
/// 任意线程都可读取的进程级状态（其它调度器、工作线程池等）。
///
/// 由创建调度器的一方持有，并以 `Arc<ProcessState>` 交给调度器；不存在全局实例。
#[derive(Debug, Default)]
pub struct ProcessState {
    is_process_backgrounded: AtomicBool,
    is_virtual_time_stopped: AtomicBool,
}

impl ProcessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_process_backgrounded(&self) -> bool {
        self.is_process_backgrounded.load(Ordering::Acquire)
    }

    pub fn is_virtual_time_stopped(&self) -> bool {
        self.is_virtual_time_stopped.load(Ordering::Acquire)
    }

    pub(crate) fn set_process_backgrounded(&self, backgrounded: bool) {
        self.is_process_backgrounded
            .store(backgrounded, Ordering::Release);
    }

    pub(crate) fn set_virtual_time_stopped(&self, stopped: bool) {
        self.is_virtual_time_stopped.store(stopped, Ordering::Release);
    }
}
