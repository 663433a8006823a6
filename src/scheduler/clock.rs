//! ### English
//! Tick clocks used by the scheduler.
//!
//! The scheduler never calls `Instant::now()` directly: every time read goes through a
//! [`SchedulerClock`], which wraps an injected [`TickClock`] and can be overridden by the
//! virtual time domain.
//!
//! ### 中文
//! 调度器使用的 tick 时钟。
//!
//! 调度器从不直接调用 `Instant::now()`：所有读时间的操作都经过 [`SchedulerClock`]，
//! 它包装一个注入的 [`TickClock`]，并可被虚拟时间域覆盖。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// ### English
/// Monotonic time source.
///
/// ### 中文
/// 单调时间源。
pub trait TickClock: Send + Sync {
    /// ### English
    /// Returns the current monotonic time.
    ///
    /// ### 中文
    /// 返回当前单调时间。
    fn now_ticks(&self) -> Instant;
}

/// ### English
/// Wall-clock backed tick clock (`Instant::now()`).
///
/// ### 中文
/// 基于真实时钟的 tick 时钟（`Instant::now()`）。
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTickClock;

impl TickClock for DefaultTickClock {
    #[inline]
    fn now_ticks(&self) -> Instant {
        Instant::now()
    }
}

/// ### English
/// Manually advanced tick clock for tests.
///
/// Clones share the same underlying time, so a test can keep one clone and hand another to
/// the scheduler.
///
/// ### 中文
/// 测试用的手动推进 tick 时钟。
///
/// 克隆体共享同一时间，测试可以自己持有一个克隆，把另一个交给调度器。
#[derive(Debug, Clone)]
pub struct TestTickClock {
    now: Arc<Mutex<Instant>>,
}

impl TestTickClock {
    /// ### English
    /// Creates a clock frozen at the current real time.
    ///
    /// ### 中文
    /// 创建一个冻结在当前真实时间的时钟。
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// ### English
    /// Creates a clock frozen at `start`.
    ///
    /// ### 中文
    /// 创建一个冻结在 `start` 的时钟。
    pub fn starting_at(start: Instant) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// ### English
    /// Moves the clock forward by `delta`.
    ///
    /// ### 中文
    /// 将时钟向前推进 `delta`。
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }

    /// ### English
    /// Sets the clock to `time`; moving backwards is ignored so the clock stays monotonic.
    ///
    /// ### 中文
    /// 把时钟设置为 `time`；向后设置会被忽略，以保持单调性。
    pub fn set(&self, time: Instant) {
        let mut now = self.now.lock();
        if time > *now {
            *now = time;
        }
    }
}

impl Default for TestTickClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickClock for TestTickClock {
    fn now_ticks(&self) -> Instant {
        *self.now.lock()
    }
}

/// ### English
/// Clock shared by the main thread and the compositor/input thread.
///
/// Reads the injected real clock unless virtual time is active, in which case the virtual
/// now published by the virtual time domain wins.
///
/// ### 中文
/// 主线程与合成器/输入线程共享的时钟。
///
/// 默认读取注入的真实时钟；虚拟时间启用时，以虚拟时间域发布的虚拟当前时间为准。
pub struct SchedulerClock {
    /// ### English
    /// Injected real time source.
    ///
    /// ### 中文
    /// 注入的真实时间源。
    real: Arc<dyn TickClock>,
    /// ### English
    /// Virtual now published by the virtual time domain (`None` = wall clock).
    ///
    /// ### 中文
    /// 虚拟时间域发布的虚拟当前时间（`None` = 使用真实时钟）。
    virtual_now: Mutex<Option<Instant>>,
}

impl SchedulerClock {
    pub(crate) fn new(real: Arc<dyn TickClock>) -> Self {
        Self {
            real,
            virtual_now: Mutex::new(None),
        }
    }

    /// ### English
    /// Returns the scheduler's notion of "now" (virtual if enabled).
    ///
    /// ### 中文
    /// 返回调度器意义上的“当前时间”（启用虚拟时间时为虚拟时间）。
    pub fn now_ticks(&self) -> Instant {
        match *self.virtual_now.lock() {
            Some(now) => now,
            None => self.real.now_ticks(),
        }
    }

    /// ### English
    /// Returns the injected real clock reading, ignoring virtual time.
    ///
    /// ### 中文
    /// 返回注入真实时钟的读数，忽略虚拟时间。
    pub fn real_now_ticks(&self) -> Instant {
        self.real.now_ticks()
    }

    pub(crate) fn publish_virtual_now(&self, now: Option<Instant>) {
        *self.virtual_now.lock() = now;
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_now.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_and_never_goes_backwards() {
        let clock = TestTickClock::new();
        let start = clock.now_ticks();
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now_ticks(), start + Duration::from_millis(5));

        clock.set(start);
        assert_eq!(clock.now_ticks(), start + Duration::from_millis(5));
    }

    #[test]
    fn clones_share_time() {
        let clock = TestTickClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(3));
        assert_eq!(clock.now_ticks(), other.now_ticks());
    }

    #[test]
    fn scheduler_clock_prefers_virtual_now() {
        let real = TestTickClock::new();
        let clock = SchedulerClock::new(Arc::new(real.clone()));
        let virtual_now = real.now_ticks() + Duration::from_secs(60);

        clock.publish_virtual_now(Some(virtual_now));
        real.advance(Duration::from_millis(1));
        assert_eq!(clock.now_ticks(), virtual_now);
        assert!(clock.is_virtual());

        clock.publish_virtual_now(None);
        assert_eq!(clock.now_ticks(), real.now_ticks());
    }
}
