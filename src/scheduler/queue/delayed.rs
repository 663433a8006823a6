//! ### English
//! Min-heap of delayed work keyed by run time.
//!
//! ### 中文
//! 按运行时间排序的延迟任务最小堆。

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

/// ### English
/// One delayed entry stored in the heap.
///
/// `BinaryHeap` is a max-heap, so we reverse the ordering in `Ord` to pop the earliest run time.
///
/// ### 中文
/// 堆中存储的单个延迟条目。
///
/// `BinaryHeap` 是最大堆，因此在 `Ord` 中反转排序以便弹出最早的运行时间。
struct DelayedEntry<T> {
    /// ### English
    /// Time when the entry becomes ready.
    ///
    /// ### 中文
    /// 条目就绪的时间。
    run_at: Instant,
    /// ### English
    /// Monotonic sequence used as a tiebreaker so equal run times keep post order.
    ///
    /// ### 中文
    /// 单调序号，作为平局判定，保证相同运行时间按投递顺序出堆。
    seq: u64,
    payload: T,
}

impl<T> PartialEq for DelayedEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.run_at == other.run_at && self.seq == other.seq
    }
}

impl<T> Eq for DelayedEntry<T> {}

impl<T> PartialOrd for DelayedEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for DelayedEntry<T> {
    /// ### English
    /// Reversed ordering so earlier run times have higher priority in a max-heap.
    ///
    /// #### Parameters
    /// - `other`: Value to compare against.
    ///
    /// ### 中文
    /// 反转排序：在最大堆中让更早的运行时间拥有更高优先级。
    ///
    /// #### 参数
    /// - `other`：用于比较的另一个值。
    fn cmp(&self, other: &Self) -> Ordering {
        match other.run_at.cmp(&self.run_at) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// ### English
/// Delayed work waiting for its run time.
///
/// ### 中文
/// 等待到达运行时间的延迟工作。
pub(crate) struct DelayedTaskQueue<T> {
    heap: BinaryHeap<DelayedEntry<T>>,
    next_seq: u64,
}

impl<T> DelayedTaskQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn push(&mut self, run_at: Instant, payload: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(DelayedEntry {
            run_at,
            seq,
            payload,
        });
    }

    /// ### English
    /// Pops the earliest entry if it is due at `now`.
    ///
    /// ### 中文
    /// 若最早条目在 `now` 时已到期，则弹出它。
    pub(crate) fn pop_ready(&mut self, now: Instant) -> Option<(Instant, T)> {
        if self.heap.peek()?.run_at > now {
            return None;
        }
        self.heap.pop().map(|entry| (entry.run_at, entry.payload))
    }

    pub(crate) fn next_run_at(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.run_at)
    }

    /// ### English
    /// Earliest run time among entries accepted by `filter`.
    ///
    /// ### 中文
    /// 满足 `filter` 的条目中最早的运行时间。
    pub(crate) fn next_run_at_matching(&self, mut filter: impl FnMut(&T) -> bool) -> Option<Instant> {
        self.heap
            .iter()
            .filter(|entry| filter(&entry.payload))
            .map(|entry| entry.run_at)
            .min()
    }

    pub(crate) fn any_ready_matching(&self, now: Instant, mut filter: impl FnMut(&T) -> bool) -> bool {
        self.heap
            .iter()
            .any(|entry| entry.run_at <= now && filter(&entry.payload))
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.heap.retain(|entry| keep(&entry.payload));
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}
