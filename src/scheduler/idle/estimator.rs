//! ### English
//! Estimates how much of a frame interval the main thread leaves idle.
//!
//! ### 中文
//! 估算主线程在一个帧间隔内留出的空闲时间。

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// ### English
/// Percentile estimator over the compositor work done per committed frame.
///
/// Compositor-queue task durations are accumulated until a frame is committed; each commit
/// closes one sample. The expected idle time is the frame interval minus the configured
/// percentile of recent samples.
///
/// ### 中文
/// 基于每个已提交帧内合成器工作时长的分位数估算器。
///
/// 合成器队列任务的耗时被累加，直到有帧提交；每次提交形成一个样本。
/// 预期空闲时间 = 帧间隔 - 最近样本的指定分位数。
#[derive(Debug, Clone)]
pub struct IdleTimeEstimator {
    sample_count: usize,
    percentile: f64,
    samples: VecDeque<Duration>,
    cumulative_compositor_runtime: Duration,
    task_start_time: Option<Instant>,
    nesting_level: u32,
    did_commit: bool,
}

impl IdleTimeEstimator {
    /// ### English
    /// Creates an estimator.
    ///
    /// #### Parameters
    /// - `sample_count`: Number of frames kept in the history.
    /// - `percentile`: Percentile (0..=100) taken over the history.
    ///
    /// ### 中文
    /// 创建估算器。
    ///
    /// #### 参数
    /// - `sample_count`：历史中保留的帧数。
    /// - `percentile`：对历史取的分位数（0..=100）。
    pub fn new(sample_count: usize, percentile: f64) -> Self {
        Self {
            sample_count: sample_count.max(1),
            percentile,
            samples: VecDeque::with_capacity(sample_count.max(1)),
            cumulative_compositor_runtime: Duration::ZERO,
            task_start_time: None,
            nesting_level: 0,
            did_commit: false,
        }
    }

    /// ### English
    /// Expected idle time in a frame of length `frame_interval`.
    ///
    /// ### 中文
    /// 长度为 `frame_interval` 的帧中预期的空闲时间。
    pub fn expected_idle_duration(&self, frame_interval: Duration) -> Duration {
        frame_interval.saturating_sub(self.percentile_sample())
    }

    fn percentile_sample(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let rank = (self.percentile / 100.0 * sorted.len() as f64).ceil() as usize;
        sorted[rank.clamp(1, sorted.len()) - 1]
    }

    pub fn did_commit_frame_to_compositor(&mut self) {
        // Commits from nested compositor tasks belong to the outer task.
        if self.nesting_level == 1 {
            self.did_commit = true;
        }
    }

    pub fn will_process_task(&mut self, start: Instant) {
        self.nesting_level += 1;
        if self.nesting_level == 1 {
            self.task_start_time = Some(start);
        }
    }

    pub fn did_process_task(&mut self, end: Instant) {
        self.nesting_level = self.nesting_level.saturating_sub(1);
        if self.nesting_level != 0 {
            return;
        }
        if let Some(start) = self.task_start_time.take() {
            self.cumulative_compositor_runtime += end.saturating_duration_since(start);
        }
        if self.did_commit {
            if self.samples.len() == self.sample_count {
                self.samples.pop_front();
            }
            self.samples.push_back(self.cumulative_compositor_runtime);
            self.cumulative_compositor_runtime = Duration::ZERO;
            self.did_commit = false;
        }
    }

    /// ### English
    /// Drops the history (new navigation).
    ///
    /// ### 中文
    /// 清空历史（新的导航）。
    pub fn clear(&mut self) {
        self.samples.clear();
        self.cumulative_compositor_runtime = Duration::ZERO;
        self.task_start_time = None;
        self.nesting_level = 0;
        self.did_commit = false;
    }
}
