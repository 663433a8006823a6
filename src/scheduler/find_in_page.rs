//! ### English
//! CPU budget for find-in-page queues.
//!
//! ### 中文
//! 页内查找队列的 CPU 预算。

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::SchedulerConfig;
use crate::scheduler::queue::QueuePriority;

/// ### English
/// Priority while budget remains.
///
/// ### 中文
/// 预算充足时的优先级。
pub const FIND_IN_PAGE_BUDGET_NOT_EXHAUSTED_PRIORITY: QueuePriority = QueuePriority::VeryHigh;

/// ### English
/// Priority once the budget is spent.
///
/// ### 中文
/// 预算耗尽后的优先级。
pub const FIND_IN_PAGE_BUDGET_EXHAUSTED_PRIORITY: QueuePriority = QueuePriority::Normal;

/// ### English
/// Token-bucket style budget: find-in-page work spends it, wall time refills it.
///
/// ### 中文
/// 令牌桶式预算：页内查找工作消耗预算，时间流逝恢复预算。
#[derive(Debug, Clone)]
pub struct FindInPageBudgetController {
    /// ### English
    /// Remaining budget in microseconds; may go negative after a long task.
    ///
    /// ### 中文
    /// 剩余预算（微秒）；长任务之后可能为负。
    level_us: i64,
    max_level_us: i64,
    recovery_rate: f64,
    last_update: Option<Instant>,
    priority: QueuePriority,
}

impl FindInPageBudgetController {
    pub fn new(config: &SchedulerConfig) -> Self {
        let max_level_us = duration_as_micros(config.find_in_page_max_budget());
        Self {
            level_us: duration_as_micros(config.find_in_page_budget()).min(max_level_us),
            max_level_us,
            recovery_rate: config.find_in_page_recovery_rate,
            last_update: None,
            priority: FIND_IN_PAGE_BUDGET_NOT_EXHAUSTED_PRIORITY,
        }
    }

    pub fn current_priority(&self) -> QueuePriority {
        self.priority
    }

    /// ### English
    /// Remaining budget (zero when exhausted).
    ///
    /// ### 中文
    /// 剩余预算（耗尽时为零）。
    pub fn remaining_budget(&self) -> Duration {
        Duration::from_micros(self.level_us.max(0) as u64)
    }

    fn recover(&mut self, now: Instant) {
        if let Some(last) = self.last_update {
            let elapsed = duration_as_micros(now.saturating_duration_since(last));
            let gained = (elapsed as f64 * self.recovery_rate) as i64;
            self.level_us = self.level_us.saturating_add(gained).min(self.max_level_us);
        }
        self.last_update = Some(now);
    }

    /// ### English
    /// Charges a completed find-in-page task.
    ///
    /// Returns `true` when the priority changed and the policy must be updated.
    ///
    /// #### Parameters
    /// - `start`: When the task started.
    /// - `end`: When the task finished.
    ///
    /// ### 中文
    /// 为一个已完成的页内查找任务扣费。
    ///
    /// 优先级发生变化（需要更新策略）时返回 `true`。
    ///
    /// #### 参数
    /// - `start`：任务开始时间。
    /// - `end`：任务结束时间。
    pub fn on_task_completed(&mut self, start: Instant, end: Instant) -> bool {
        self.recover(start);
        self.level_us = self
            .level_us
            .saturating_sub(duration_as_micros(end.saturating_duration_since(start)));
        self.last_update = Some(end);

        let priority = if self.level_us <= 0 {
            FIND_IN_PAGE_BUDGET_EXHAUSTED_PRIORITY
        } else {
            FIND_IN_PAGE_BUDGET_NOT_EXHAUSTED_PRIORITY
        };
        if priority == self.priority {
            return false;
        }
        debug!(
            priority = priority.as_str(),
            level_us = self.level_us,
            "find-in-page priority changed"
        );
        self.priority = priority;
        true
    }
}

fn duration_as_micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}
