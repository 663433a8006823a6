//! ### English
//! Cross-thread model of recent user input.
//!
//! ### 中文
//! 跨线程共享的近期用户输入模型。

use std::time::{Duration, Instant};

use super::InputEventType;
use crate::config::SchedulerConfig;

/// ### English
/// Tracks input timing to answer two questions: "how long is the current gesture window still
/// open" and "is another gesture expected soon".
///
/// Lives inside the lock-guarded cross-thread block; every method takes `now` explicitly.
///
/// ### 中文
/// 追踪输入时间，用于回答两个问题：“当前手势窗口还会持续多久”以及“是否很快会有下一个手势”。
///
/// 位于受锁保护的跨线程状态块中；所有方法都显式接收 `now`。
#[derive(Debug, Clone)]
pub struct UserModel {
    gesture_estimation_limit: Duration,
    median_gesture_duration: Duration,
    expect_subsequent_gesture: Duration,

    pending_input_event_count: u32,
    last_input_signal_time: Option<Instant>,
    last_gesture_start_time: Option<Instant>,
    last_continuous_gesture_time: Option<Instant>,
    is_gesture_active: bool,
}

impl UserModel {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            gesture_estimation_limit: config.gesture_estimation_limit(),
            median_gesture_duration: config.median_gesture_duration(),
            expect_subsequent_gesture: config.expect_subsequent_gesture(),
            pending_input_event_count: 0,
            last_input_signal_time: None,
            last_gesture_start_time: None,
            last_continuous_gesture_time: None,
            is_gesture_active: false,
        }
    }

    /// ### English
    /// Records that an input event started processing.
    ///
    /// #### Parameters
    /// - `event_type`: Kind of the event.
    /// - `now`: Current scheduler time.
    ///
    /// ### 中文
    /// 记录一个输入事件开始处理。
    ///
    /// #### 参数
    /// - `event_type`：事件种类。
    /// - `now`：当前调度器时间。
    pub fn did_start_processing_input_event(&mut self, event_type: InputEventType, now: Instant) {
        self.last_input_signal_time = Some(now);
        if event_type.starts_gesture() {
            if !self.is_gesture_active {
                self.last_gesture_start_time = Some(now);
            }
            self.is_gesture_active = true;
        }
        // Taps must not look like scrolls, so only continuous gestures are tracked here.
        if event_type.is_continuous_gesture() {
            self.last_continuous_gesture_time = Some(now);
        }
        if event_type.ends_gesture() {
            self.is_gesture_active = false;
        }
        self.pending_input_event_count += 1;
    }

    pub fn did_finish_processing_input_event(&mut self, now: Instant) {
        self.last_input_signal_time = Some(now);
        self.pending_input_event_count = self.pending_input_event_count.saturating_sub(1);
    }

    /// ### English
    /// Remaining length of the gesture window.
    ///
    /// While an input is still pending the full escalation window is returned, so the policy
    /// is checked again later.
    ///
    /// ### 中文
    /// 手势窗口的剩余时长。
    ///
    /// 若仍有输入待处理，则返回完整升级窗口，以便稍后再次检查策略。
    pub fn time_left_in_user_gesture(&self, now: Instant) -> Duration {
        if self.pending_input_event_count > 0 {
            return self.gesture_estimation_limit;
        }
        match self.last_input_signal_time {
            Some(last) => (last + self.gesture_estimation_limit).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// ### English
    /// Predicts whether a new gesture will start soon.
    ///
    /// Returns the prediction and how long it stays valid (`Duration::ZERO` when it has no
    /// natural expiry).
    ///
    /// ### 中文
    /// 预测是否很快会开始新的手势。
    ///
    /// 返回预测结果及其有效时长（没有自然过期时间时为 `Duration::ZERO`）。
    pub fn is_gesture_expected_soon(&self, now: Instant) -> (bool, Duration) {
        if self.is_gesture_active {
            if let Some(valid_for) = self.gesture_expected_to_continue_for(now) {
                return (false, valid_for);
            }
            return (true, self.expect_subsequent_gesture);
        }

        // A finished continuous gesture makes a follow-up gesture likely.
        match self.last_continuous_gesture_time {
            Some(last) if last + self.expect_subsequent_gesture > now => {
                (true, last + self.expect_subsequent_gesture - now)
            }
            _ => (false, Duration::ZERO),
        }
    }

    fn gesture_expected_to_continue_for(&self, now: Instant) -> Option<Duration> {
        let start = self.last_gesture_start_time?;
        let expected_end = start + self.median_gesture_duration;
        (expected_end > now).then(|| expected_end - now)
    }

    pub fn is_gesture_active(&self) -> bool {
        self.is_gesture_active
    }

    pub fn pending_input_event_count(&self) -> u32 {
        self.pending_input_event_count
    }

    /// ### English
    /// Forgets all input history (new navigation).
    ///
    /// ### 中文
    /// 清除所有输入历史（新的导航）。
    pub fn reset(&mut self) {
        self.pending_input_event_count = 0;
        self.last_input_signal_time = None;
        self.last_gesture_start_time = None;
        self.last_continuous_gesture_time = None;
        self.is_gesture_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> UserModel {
        UserModel::new(&SchedulerConfig::default())
    }

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn no_input_means_no_gesture_window() {
        let now = Instant::now();
        assert_eq!(model().time_left_in_user_gesture(now), Duration::ZERO);
        assert_eq!(model().is_gesture_expected_soon(now), (false, Duration::ZERO));
    }

    #[test]
    fn pending_input_keeps_the_full_window() {
        let start = Instant::now();
        let mut model = model();
        model.did_start_processing_input_event(InputEventType::TouchStart, start);
        assert_eq!(
            model.time_left_in_user_gesture(start + 500 * MS),
            100 * MS
        );
    }

    #[test]
    fn finished_input_window_decays() {
        let start = Instant::now();
        let mut model = model();
        model.did_start_processing_input_event(InputEventType::GestureScrollUpdate, start);
        model.did_finish_processing_input_event(start);

        assert_eq!(model.time_left_in_user_gesture(start + 40 * MS), 60 * MS);
        assert_eq!(model.time_left_in_user_gesture(start + 100 * MS), Duration::ZERO);
        assert_eq!(model.time_left_in_user_gesture(start + 150 * MS), Duration::ZERO);
    }

    #[test]
    fn young_active_gesture_is_expected_to_continue() {
        let start = Instant::now();
        let mut model = model();
        model.did_start_processing_input_event(InputEventType::GestureScrollBegin, start);
        model.did_finish_processing_input_event(start);

        assert!(model.is_gesture_active());
        assert_eq!(
            model.is_gesture_expected_soon(start + 100 * MS),
            (false, 200 * MS)
        );
        assert_eq!(
            model.is_gesture_expected_soon(start + 400 * MS),
            (true, 2000 * MS)
        );
    }

    #[test]
    fn finished_continuous_gesture_predicts_followup() {
        let start = Instant::now();
        let mut model = model();
        model.did_start_processing_input_event(InputEventType::GestureScrollBegin, start);
        model.did_finish_processing_input_event(start);
        model.did_start_processing_input_event(InputEventType::GestureScrollEnd, start + 50 * MS);
        model.did_finish_processing_input_event(start + 50 * MS);

        assert!(!model.is_gesture_active());
        assert_eq!(
            model.is_gesture_expected_soon(start + 1050 * MS),
            (true, 1000 * MS)
        );
        assert_eq!(
            model.is_gesture_expected_soon(start + 2050 * MS),
            (false, Duration::ZERO)
        );
    }

    #[test]
    fn taps_do_not_predict_followups() {
        let start = Instant::now();
        let mut model = model();
        model.did_start_processing_input_event(InputEventType::GestureTap, start);
        model.did_finish_processing_input_event(start);
        assert_eq!(model.is_gesture_expected_soon(start + MS), (false, Duration::ZERO));
    }

    #[test]
    fn reset_forgets_everything() {
        let start = Instant::now();
        let mut model = model();
        model.did_start_processing_input_event(InputEventType::TouchStart, start);
        model.reset();
        assert_eq!(model.pending_input_event_count(), 0);
        assert_eq!(model.time_left_in_user_gesture(start), Duration::ZERO);
        assert!(!model.is_gesture_active());
    }
}
