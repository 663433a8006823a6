//! Property-based tests for use-case expiry.
//!
//! Whatever input burst the compositor reports, the gesture use case must be gone once the
//! gesture window has elapsed after the last input, without any further signal.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use xian_scheduler::scheduler::{
    InputEvent, InputEventResult, InputEventState, InputEventType, TestTickClock, UseCase,
};
use xian_scheduler::{MainThreadScheduler, SchedulerConfig};

// =============================================================================
// Strategies
// =============================================================================

fn arb_event_type() -> impl Strategy<Value = InputEventType> {
    prop_oneof![
        Just(InputEventType::TouchStart),
        Just(InputEventType::TouchMove),
        Just(InputEventType::TouchEnd),
        Just(InputEventType::GestureScrollBegin),
        Just(InputEventType::GestureScrollUpdate),
        Just(InputEventType::GestureScrollEnd),
        Just(InputEventType::GesturePinchUpdate),
        Just(InputEventType::GestureFlingCancel),
        Just(InputEventType::GestureTapDown),
        Just(InputEventType::MouseWheel),
        Just(InputEventType::MouseDown),
        Just(InputEventType::MouseMove),
    ]
}

fn arb_state() -> impl Strategy<Value = InputEventState> {
    prop_oneof![
        Just(InputEventState::ConsumedByCompositor),
        Just(InputEventState::ForwardedToMainThread),
    ]
}

fn arb_result() -> impl Strategy<Value = InputEventResult> {
    prop_oneof![
        Just(InputEventResult::NotHandled),
        Just(InputEventResult::HandledSuppressed),
        Just(InputEventResult::HandledApplication),
        Just(InputEventResult::HandledSystem),
    ]
}

#[derive(Debug, Clone, Copy)]
struct Step {
    gap_ms: u64,
    event_type: InputEventType,
    state: InputEventState,
    result: InputEventResult,
    animate: bool,
}

fn arb_step() -> impl Strategy<Value = Step> {
    (0u64..60, arb_event_type(), arb_state(), arb_result(), any::<bool>()).prop_map(
        |(gap_ms, event_type, state, result, animate)| Step {
            gap_ms,
            event_type,
            state,
            result,
            animate,
        },
    )
}

// =============================================================================
// Helpers
// =============================================================================

fn deliver(scheduler: &mut MainThreadScheduler, step: Step) {
    let event = InputEvent::new(step.event_type).with_left_button_down(true);
    let handle = scheduler.compositor_thread_handle();
    if step.state == InputEventState::ForwardedToMainThread {
        handle.will_post_input_event_to_main_thread(event.event_type);
    }
    handle.did_handle_input_event_on_compositor_thread(&event, step.state);
    if step.animate {
        handle.did_animate_for_input_on_compositor_thread();
    }
    scheduler.run_until_idle();
    if step.state == InputEventState::ForwardedToMainThread {
        scheduler.will_handle_input_event_on_main_thread(event.event_type);
        scheduler.did_handle_input_event_on_main_thread(&event, step.result);
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn gesture_use_case_is_active_right_after_input(
        steps in prop::collection::vec(arb_step(), 1..8),
    ) {
        let clock = Arc::new(TestTickClock::new());
        let mut scheduler = MainThreadScheduler::builder()
            .with_tick_clock(clock.clone())
            .build()
            .unwrap();
        for step in steps {
            clock.advance(Duration::from_millis(step.gap_ms));
            deliver(&mut scheduler, step);
        }
        scheduler.update_policy();
        prop_assert_ne!(scheduler.current_use_case(), UseCase::None);
    }

    #[test]
    fn gesture_use_case_expires_after_the_window(
        steps in prop::collection::vec(arb_step(), 1..8),
        epsilon_ms in 1u64..3_000,
    ) {
        let clock = Arc::new(TestTickClock::new());
        let mut scheduler = MainThreadScheduler::builder()
            .with_tick_clock(clock.clone())
            .build()
            .unwrap();
        for step in steps {
            clock.advance(Duration::from_millis(step.gap_ms));
            deliver(&mut scheduler, step);
        }

        let config = SchedulerConfig::default();
        let window = config
            .gesture_estimation_limit_ms
            .max(config.fling_escalation_limit_ms);
        clock.advance(Duration::from_millis(window + epsilon_ms));
        scheduler.run_until_idle();

        prop_assert_eq!(scheduler.current_use_case(), UseCase::None);
        prop_assert!(!scheduler.policy().should_defer_task_queues);
    }
}
