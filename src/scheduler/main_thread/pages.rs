//! ### English
//! Page registry: freezing and main-frame loading state per page, plus the navigation reset.
//!
//! ### 中文
//! 页面登记：按页面记录冻结状态与主帧加载状态，以及导航重置。

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use super::MainThreadScheduler;
use crate::scheduler::any_thread::AnyThread;

/// ### English
/// Embedder-chosen identifier of a page.
///
/// ### 中文
/// 由宿主指定的页面标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u64);

/// ### English
/// Paint milestones reached by a page's main frame since its last navigation.
///
/// ### 中文
/// 页面主帧自上次导航以来达到的绘制里程碑。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MainFramePaintState {
    pub had_first_contentful_paint: bool,
    pub had_first_meaningful_paint: bool,
}

impl MainFramePaintState {
    fn merge(&mut self, other: MainFramePaintState) {
        self.had_first_contentful_paint |= other.had_first_contentful_paint;
        self.had_first_meaningful_paint |= other.had_first_meaningful_paint;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct PageState {
    frozen: bool,
    /// ### English
    /// A main-frame navigation committed; paint milestones are being waited for.
    ///
    /// ### 中文
    /// 已提交主帧导航，正在等待绘制里程碑。
    loading: bool,
    paint: MainFramePaintState,
}

impl PageState {
    fn awaits_contentful_paint(&self) -> bool {
        self.loading && !self.paint.had_first_contentful_paint
    }

    fn awaits_meaningful_paint(&self) -> bool {
        self.loading && !self.paint.had_first_meaningful_paint
    }
}

impl MainThreadScheduler {
    pub fn register_page(&mut self, page: PageId) {
        self.pages.entry(page).or_default();
        self.update_policy();
    }

    pub fn unregister_page(&mut self, page: PageId) {
        if self.pages.remove(&page).is_none() {
            trace!(?page, "unregistering unknown page");
            return;
        }
        self.refresh_paint_expectations();
        self.update_policy();
    }

    /// ### English
    /// The page was frozen. When every registered page is frozen the compositor queues freeze.
    ///
    /// ### 中文
    /// 页面被冻结。所有已登记页面都冻结时，合成器队列随之冻结。
    pub fn on_page_frozen(&mut self, page: PageId) {
        self.set_page_frozen(page, true);
    }

    pub fn on_page_resumed(&mut self, page: PageId) {
        self.set_page_frozen(page, false);
    }

    fn set_page_frozen(&mut self, page: PageId, frozen: bool) {
        let Some(state) = self.pages.get_mut(&page) else {
            trace!(?page, "freeze state change for unknown page ignored");
            return;
        };
        if state.frozen == frozen {
            return;
        }
        state.frozen = frozen;
        debug!(?page, frozen, "page freeze state changed");
        self.update_policy();
    }

    pub(super) fn all_pages_frozen(&self) -> bool {
        !self.pages.is_empty() && self.pages.values().all(|page| page.frozen)
    }

    /// ### English
    /// Records paint milestones of a page's main frame.
    ///
    /// ### 中文
    /// 记录页面主帧的绘制里程碑。
    pub fn on_main_frame_paint(&mut self, page: PageId, paint: MainFramePaintState) {
        let Some(state) = self.pages.get_mut(&page) else {
            trace!(?page, "paint for unknown page ignored");
            return;
        };
        state.paint.merge(paint);
        self.refresh_paint_expectations();
        self.update_policy();
    }

    pub fn did_start_provisional_load(&mut self, page: PageId, is_main_frame: bool) {
        if !is_main_frame {
            return;
        }
        trace!(?page, "main frame provisional load started");
        self.reset_for_navigation();
    }

    /// ### English
    /// A navigation committed. History-inert commits only count when they are reloads.
    ///
    /// #### Parameters
    /// - `page`: Page that navigated.
    /// - `is_main_frame`: Whether the main frame navigated.
    /// - `is_history_inert`: Commit does not create a history entry.
    /// - `is_reload`: Commit is a reload.
    ///
    /// ### 中文
    /// 导航已提交。不产生历史记录的提交只有在是重新加载时才计入。
    ///
    /// #### 参数
    /// - `page`：发生导航的页面。
    /// - `is_main_frame`：是否为主帧导航。
    /// - `is_history_inert`：提交不产生历史记录项。
    /// - `is_reload`：提交是否为重新加载。
    pub fn did_commit_provisional_load(
        &mut self,
        page: PageId,
        is_main_frame: bool,
        is_history_inert: bool,
        is_reload: bool,
    ) {
        if !is_main_frame || (is_history_inert && !is_reload) {
            return;
        }
        let Some(state) = self.pages.get_mut(&page) else {
            warn!(?page, "navigation commit for unregistered page ignored");
            return;
        };
        state.loading = true;
        state.paint = MainFramePaintState::default();
        self.reset_for_navigation();
    }

    fn reset_for_navigation(&mut self) {
        {
            let mut any_thread = self.shared.any_thread.lock();
            any_thread.user_model.reset();
            any_thread.have_seen_a_blocking_gesture = false;
            any_thread.have_seen_input_since_navigation = false;
            Self::write_paint_expectations(&self.pages, &mut any_thread);
        }
        self.estimator.clear();
        debug!("scheduler state reset for navigation");
        self.update_policy();
    }

    fn refresh_paint_expectations(&mut self) {
        let mut any_thread = self.shared.any_thread.lock();
        Self::write_paint_expectations(&self.pages, &mut any_thread);
    }

    fn write_paint_expectations(
        pages: &HashMap<PageId, PageState>,
        any_thread: &mut AnyThread,
    ) {
        any_thread.waiting_for_any_main_frame_contentful_paint =
            pages.values().any(PageState::awaits_contentful_paint);
        any_thread.waiting_for_any_main_frame_meaningful_paint =
            pages.values().any(PageState::awaits_meaningful_paint);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::scheduler::clock::TestTickClock;
    use crate::scheduler::policy::UseCase;

    fn scheduler() -> MainThreadScheduler {
        MainThreadScheduler::builder()
            .with_tick_clock(Arc::new(TestTickClock::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn compositor_freezes_only_when_every_page_is_frozen() {
        let mut scheduler = scheduler();
        let compositor = scheduler.compositor_task_queue();
        scheduler.register_page(PageId(1));
        scheduler.register_page(PageId(2));

        scheduler.on_page_frozen(PageId(1));
        assert!(!scheduler.policy().should_freeze_compositor_queue);
        scheduler.on_page_frozen(PageId(2));
        assert!(scheduler.policy().should_freeze_compositor_queue);
        assert!(!scheduler.is_queue_enabled(compositor));

        scheduler.unregister_page(PageId(2));
        assert!(scheduler.policy().should_freeze_compositor_queue);
        scheduler.on_page_resumed(PageId(1));
        assert!(!scheduler.policy().should_freeze_compositor_queue);
        assert!(scheduler.is_queue_enabled(compositor));
    }

    #[test]
    fn paint_milestones_walk_through_loading_use_cases() {
        let mut scheduler = scheduler();
        let page = PageId(7);
        scheduler.register_page(page);
        assert_eq!(scheduler.current_use_case(), UseCase::None);

        scheduler.did_commit_provisional_load(page, true, false, false);
        assert_eq!(scheduler.current_use_case(), UseCase::EarlyLoading);

        scheduler.on_main_frame_paint(
            page,
            MainFramePaintState {
                had_first_contentful_paint: true,
                had_first_meaningful_paint: false,
            },
        );
        assert_eq!(scheduler.current_use_case(), UseCase::Loading);

        scheduler.on_main_frame_paint(
            page,
            MainFramePaintState {
                had_first_contentful_paint: false,
                had_first_meaningful_paint: true,
            },
        );
        assert_eq!(scheduler.current_use_case(), UseCase::None);
    }

    #[test]
    fn history_inert_commit_is_ignored_unless_reload() {
        let mut scheduler = scheduler();
        let page = PageId(3);
        scheduler.register_page(page);
        scheduler.did_commit_provisional_load(page, true, true, false);
        assert_eq!(scheduler.current_use_case(), UseCase::None);

        scheduler.did_commit_provisional_load(page, true, true, true);
        assert_eq!(scheduler.current_use_case(), UseCase::EarlyLoading);

        scheduler.did_commit_provisional_load(PageId(4), false, false, false);
        assert!(!scheduler.pages.contains_key(&PageId(4)));
    }

    #[test]
    fn commit_for_unregistered_page_leaves_the_registry_alone() {
        let mut scheduler = scheduler();
        scheduler.register_page(PageId(1));
        scheduler.on_page_frozen(PageId(1));
        assert!(scheduler.all_pages_frozen());

        scheduler.did_commit_provisional_load(PageId(9), true, false, false);
        assert!(!scheduler.pages.contains_key(&PageId(9)));
        assert!(scheduler.all_pages_frozen());
        assert_eq!(scheduler.current_use_case(), UseCase::None);
    }
}
