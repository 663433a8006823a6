//! ### English
//! Counts input events posted to the main thread but not yet handled there.
//!
//! ### 中文
//! 统计已投递到主线程但尚未在主线程处理的输入事件。

use std::collections::HashMap;

use tracing::warn;

use super::InputEventType;

/// ### English
/// Per-type enqueue/dequeue bookkeeping for input in flight to the main thread.
///
/// ### 中文
/// 按事件种类记录正在发往主线程的输入（入队/出队计数）。
#[derive(Debug, Clone, Default)]
pub struct PendingInputMonitor {
    pending: HashMap<InputEventType, u32>,
}

impl PendingInputMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_enqueue(&mut self, event_type: InputEventType) {
        *self.pending.entry(event_type).or_insert(0) += 1;
    }

    /// ### English
    /// Records a dequeue; an unmatched dequeue is logged and ignored.
    ///
    /// ### 中文
    /// 记录一次出队；没有对应入队的出队会记录日志后忽略。
    pub fn on_dequeue(&mut self, event_type: InputEventType) {
        match self.pending.get_mut(&event_type) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.pending.remove(&event_type);
            }
            None => warn!(?event_type, "input dequeued without matching enqueue"),
        }
    }

    pub fn pending_count(&self, event_type: InputEventType) -> u32 {
        self.pending.get(&event_type).copied().unwrap_or(0)
    }

    pub fn total_pending(&self) -> u32 {
        self.pending.values().sum()
    }

    /// ### English
    /// Whether any blocking-capable input (touch, wheel, mouse, key) waits on the main thread.
    ///
    /// ### 中文
    /// 是否有可能阻塞的输入（触摸、滚轮、鼠标、键盘）在主线程等待。
    pub fn has_pending_discrete_input(&self) -> bool {
        self.pending.keys().any(|event_type| {
            matches!(
                event_type,
                InputEventType::TouchStart
                    | InputEventType::TouchEnd
                    | InputEventType::MouseDown
                    | InputEventType::MouseUp
                    | InputEventType::KeyDown
                    | InputEventType::RawKeyDown
                    | InputEventType::KeyUp
                    | InputEventType::Char
            )
        })
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_per_type_counts() {
        let mut monitor = PendingInputMonitor::new();
        monitor.on_enqueue(InputEventType::TouchMove);
        monitor.on_enqueue(InputEventType::TouchMove);
        monitor.on_enqueue(InputEventType::MouseWheel);
        assert_eq!(monitor.pending_count(InputEventType::TouchMove), 2);
        assert_eq!(monitor.total_pending(), 3);
        assert!(!monitor.has_pending_discrete_input());

        monitor.on_dequeue(InputEventType::TouchMove);
        monitor.on_dequeue(InputEventType::TouchMove);
        assert_eq!(monitor.pending_count(InputEventType::TouchMove), 0);
        assert_eq!(monitor.total_pending(), 1);
    }

    #[test]
    fn unmatched_dequeue_is_ignored() {
        let mut monitor = PendingInputMonitor::new();
        monitor.on_dequeue(InputEventType::KeyDown);
        assert_eq!(monitor.total_pending(), 0);
    }

    #[test]
    fn discrete_input_is_reported() {
        let mut monitor = PendingInputMonitor::new();
        monitor.on_enqueue(InputEventType::KeyDown);
        assert!(monitor.has_pending_discrete_input());
        monitor.clear();
        assert!(!monitor.has_pending_discrete_input());
    }
}
