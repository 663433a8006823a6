//! ### English
//! Named tuning knobs of the scheduler.
//!
//! Every constant that shapes scheduling decisions (gesture windows, idle period bounds,
//! staleness delays, find-in-page budget) lives here with its production default, so a
//! product can retune it from TOML without touching scheduler code.
//!
//! ### 中文
//! 调度器的具名调优参数。
//!
//! 所有影响调度决策的常量（手势窗口、空闲期上下限、过期延迟、页内查找预算）都集中在这里，
//! 并带有生产默认值；产品可以通过 TOML 重新调优，而无需修改调度器代码。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// ### English
/// Scheduler tuning configuration (all durations in milliseconds unless the name says `_us`).
///
/// ### 中文
/// 调度器调优配置（除名称带 `_us` 的字段外，时长单位均为毫秒）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// ### English
    /// Length of the decaying gesture window re-armed by every input signal.
    ///
    /// ### 中文
    /// 由每个输入信号重新开启、随时间衰减的手势窗口长度。
    pub gesture_estimation_limit_ms: u64,
    /// ### English
    /// Typical gesture duration; a gesture younger than this is expected to continue.
    ///
    /// ### 中文
    /// 典型手势时长；短于该值的手势被认为还会继续。
    pub median_gesture_duration_ms: u64,
    /// ### English
    /// How long after a continuous gesture another gesture is expected.
    ///
    /// ### 中文
    /// 连续手势结束后，多长时间内预计会有下一个手势。
    pub expect_subsequent_gesture_ms: u64,
    /// ### English
    /// Fling escalation window armed when the compositor animates for input.
    ///
    /// ### 中文
    /// 合成器为输入做动画时开启的 fling 升级窗口。
    pub fling_escalation_limit_ms: u64,
    /// ### English
    /// Staleness delay: no compositor task for this long escalates the compositor queue.
    ///
    /// ### 中文
    /// 过期延迟：超过该时长未运行合成器任务时提升合成器队列优先级。
    pub prioritize_compositing_after_delay_ms: u64,
    /// ### English
    /// Hidden-surface timeout after which the long idle period is ended.
    ///
    /// ### 中文
    /// 隐藏后经过该时长结束长空闲期。
    pub end_idle_when_hidden_delay_ms: u64,
    /// ### English
    /// Longest task that keeps response-mode input jank free.
    ///
    /// ### 中文
    /// 保证响应模式下输入不卡顿的最长任务时长。
    pub rails_response_time_ms: u64,
    /// ### English
    /// Upper bound of one long idle period.
    ///
    /// ### 中文
    /// 单个长空闲期的上限。
    pub maximum_idle_period_ms: u64,
    /// ### English
    /// Long idle periods shorter than this are not entered.
    ///
    /// ### 中文
    /// 短于该值的长空闲期不会进入。
    pub minimum_idle_period_ms: u64,
    /// ### English
    /// Retry delay when a long idle period could not be entered.
    ///
    /// ### 中文
    /// 无法进入长空闲期时的重试延迟。
    pub retry_enable_long_idle_period_delay_ms: u64,
    /// ### English
    /// Number of frames sampled by the idle time estimator.
    ///
    /// ### 中文
    /// 空闲时间估计器采样的帧数。
    pub short_idle_period_sample_count: usize,
    /// ### English
    /// Percentile (0..=100) of sampled idle time reported by the estimator.
    ///
    /// ### 中文
    /// 估计器报告的空闲时间百分位（0..=100）。
    pub short_idle_period_percentile: f64,
    /// ### English
    /// Fraction of the frame interval that must be idle for compositing to count as fast.
    ///
    /// ### 中文
    /// 帧间隔中空闲部分至少占多少比例时，主线程合成被视为“快”。
    pub fast_compositing_idle_time_threshold: f64,
    /// ### English
    /// Frame interval assumed before the first `will_begin_frame`.
    ///
    /// ### 中文
    /// 第一次 `will_begin_frame` 之前假定的帧间隔。
    pub default_frame_interval_us: u64,
    /// ### English
    /// Escalate compositing to VeryHigh after discrete input until the next frame.
    ///
    /// ### 中文
    /// 离散输入后、下一帧开始前，将合成提升到 VeryHigh。
    pub prioritize_compositing_after_input: bool,
    /// ### English
    /// Raise compositing and loading to High while the page is early-loading.
    ///
    /// ### 中文
    /// 页面处于早期加载时，将合成与加载提升到 High。
    pub prioritize_compositing_and_loading_during_early_loading: bool,
    /// ### English
    /// Consecutive tasks allowed without virtual time advancing (`0` disables the limit).
    ///
    /// ### 中文
    /// 虚拟时间不前进的情况下允许连续运行的任务数（`0` 表示不限制）。
    pub max_virtual_time_task_starvation_count: u32,
    /// ### English
    /// Initial CPU budget of find-in-page work.
    ///
    /// ### 中文
    /// 页内查找任务的初始 CPU 预算。
    pub find_in_page_budget_ms: u64,
    /// ### English
    /// Ceiling of the find-in-page CPU budget.
    ///
    /// ### 中文
    /// 页内查找 CPU 预算的上限。
    pub find_in_page_max_budget_ms: u64,
    /// ### English
    /// Budget recovered per unit of wall time (0.1 = 100 ms per second).
    ///
    /// ### 中文
    /// 每单位时间恢复的预算（0.1 = 每秒恢复 100 ms）。
    pub find_in_page_recovery_rate: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            gesture_estimation_limit_ms: 100,
            median_gesture_duration_ms: 300,
            expect_subsequent_gesture_ms: 2000,
            fling_escalation_limit_ms: 100,
            prioritize_compositing_after_delay_ms: 100,
            end_idle_when_hidden_delay_ms: 10_000,
            rails_response_time_ms: 50,
            maximum_idle_period_ms: 50,
            minimum_idle_period_ms: 1,
            retry_enable_long_idle_period_delay_ms: 1,
            short_idle_period_sample_count: 10,
            short_idle_period_percentile: 50.0,
            fast_compositing_idle_time_threshold: 0.2,
            default_frame_interval_us: 16_667,
            prioritize_compositing_after_input: true,
            prioritize_compositing_and_loading_during_early_loading: false,
            max_virtual_time_task_starvation_count: 0,
            find_in_page_budget_ms: 1000,
            find_in_page_max_budget_ms: 1000,
            find_in_page_recovery_rate: 0.1,
        }
    }
}

impl SchedulerConfig {
    /// ### English
    /// Parses and validates a TOML document. Missing keys keep their defaults.
    ///
    /// ### 中文
    /// 解析并校验 TOML 文档。缺失的键使用默认值。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// ### English
    /// Reads, parses and validates a TOML file.
    ///
    /// #### Parameters
    /// - `path`: Location of the TOML file.
    ///
    /// ### 中文
    /// 读取、解析并校验 TOML 文件。
    ///
    /// #### 参数
    /// - `path`：TOML 文件路径。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// ### English
    /// Rejects knob values the scheduler cannot work with.
    ///
    /// ### 中文
    /// 拒绝调度器无法使用的参数值。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gesture_estimation_limit_ms == 0 {
            return Err(ConfigError::invalid(
                "gesture_estimation_limit_ms",
                "must be greater than zero",
            ));
        }
        if self.short_idle_period_sample_count == 0 {
            return Err(ConfigError::invalid(
                "short_idle_period_sample_count",
                "must be greater than zero",
            ));
        }
        if !(0.0..=100.0).contains(&self.short_idle_period_percentile) {
            return Err(ConfigError::invalid(
                "short_idle_period_percentile",
                "must be within 0..=100",
            ));
        }
        if !(0.0..=1.0).contains(&self.fast_compositing_idle_time_threshold) {
            return Err(ConfigError::invalid(
                "fast_compositing_idle_time_threshold",
                "must be within 0..=1",
            ));
        }
        if self.minimum_idle_period_ms > self.maximum_idle_period_ms {
            return Err(ConfigError::invalid(
                "minimum_idle_period_ms",
                "must not exceed maximum_idle_period_ms",
            ));
        }
        if self.default_frame_interval_us == 0 {
            return Err(ConfigError::invalid(
                "default_frame_interval_us",
                "must be greater than zero",
            ));
        }
        if self.find_in_page_budget_ms > self.find_in_page_max_budget_ms {
            return Err(ConfigError::invalid(
                "find_in_page_budget_ms",
                "must not exceed find_in_page_max_budget_ms",
            ));
        }
        if self.find_in_page_recovery_rate.is_nan() || self.find_in_page_recovery_rate < 0.0 {
            return Err(ConfigError::invalid(
                "find_in_page_recovery_rate",
                "must be non-negative",
            ));
        }
        Ok(())
    }

    pub(crate) fn gesture_estimation_limit(&self) -> Duration {
        Duration::from_millis(self.gesture_estimation_limit_ms)
    }

    pub(crate) fn median_gesture_duration(&self) -> Duration {
        Duration::from_millis(self.median_gesture_duration_ms)
    }

    pub(crate) fn expect_subsequent_gesture(&self) -> Duration {
        Duration::from_millis(self.expect_subsequent_gesture_ms)
    }

    pub(crate) fn fling_escalation_limit(&self) -> Duration {
        Duration::from_millis(self.fling_escalation_limit_ms)
    }

    pub(crate) fn prioritize_compositing_after_delay(&self) -> Duration {
        Duration::from_millis(self.prioritize_compositing_after_delay_ms)
    }

    pub(crate) fn end_idle_when_hidden_delay(&self) -> Duration {
        Duration::from_millis(self.end_idle_when_hidden_delay_ms)
    }

    pub(crate) fn rails_response_time(&self) -> Duration {
        Duration::from_millis(self.rails_response_time_ms)
    }

    pub(crate) fn maximum_idle_period(&self) -> Duration {
        Duration::from_millis(self.maximum_idle_period_ms)
    }

    pub(crate) fn minimum_idle_period(&self) -> Duration {
        Duration::from_millis(self.minimum_idle_period_ms)
    }

    pub(crate) fn retry_enable_long_idle_period_delay(&self) -> Duration {
        Duration::from_millis(self.retry_enable_long_idle_period_delay_ms)
    }

    pub(crate) fn default_frame_interval(&self) -> Duration {
        Duration::from_micros(self.default_frame_interval_us)
    }

    pub(crate) fn find_in_page_budget(&self) -> Duration {
        Duration::from_millis(self.find_in_page_budget_ms)
    }

    pub(crate) fn find_in_page_max_budget(&self) -> Duration {
        Duration::from_millis(self.find_in_page_max_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SchedulerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.gesture_estimation_limit(), Duration::from_millis(100));
        assert_eq!(config.end_idle_when_hidden_delay(), Duration::from_secs(10));
        assert_eq!(config.default_frame_interval(), Duration::from_micros(16_667));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SchedulerConfig::from_toml_str(
            "median_gesture_duration_ms = 250\nprioritize_compositing_after_input = false\n",
        )
        .unwrap();
        assert_eq!(config.median_gesture_duration_ms, 250);
        assert!(!config.prioritize_compositing_after_input);
        assert_eq!(config.expect_subsequent_gesture_ms, 2000);
    }

    #[test]
    fn rejects_out_of_range_percentile() {
        let err = SchedulerConfig::from_toml_str("short_idle_period_percentile = 120.0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "short_idle_period_percentile",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_gesture_window() {
        let err = SchedulerConfig::from_toml_str("gesture_estimation_limit_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn reports_parse_errors() {
        let err = SchedulerConfig::from_toml_str("maximum_idle_period_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = SchedulerConfig::load("/nonexistent/xian-scheduler.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = SchedulerConfig {
            max_virtual_time_task_starvation_count: 7,
            ..SchedulerConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(SchedulerConfig::from_toml_str(&text).unwrap(), config);
    }
}
