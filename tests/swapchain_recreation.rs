mod common;

use common::{test_config, Call, MockDevice, ScriptedAcquire, ScriptedPlatform};
use frameshell::app::{Application, Iteration};
use frameshell::rhi::{Extent, PresentStatus};

fn app() -> (Application<ScriptedPlatform, MockDevice>, MockDevice) {
    let device = MockDevice::new();
    let app = Application::new(&test_config(2), ScriptedPlatform::new(800, 600), device.clone())
        .unwrap();
    (app, device)
}

fn swapchains_created(device: &MockDevice) -> usize {
    device
        .state()
        .count(|c| matches!(c, Call::CreateSwapchain(_)))
}

#[test]
fn out_of_date_acquire_recreates_exactly_once() {
    let (mut app, device) = app();
    app.run_iteration().unwrap();
    assert_eq!(app.current_frame_slot(), 1);

    device
        .state_mut()
        .acquire_script
        .push_back(ScriptedAcquire::OutOfDate);
    assert_eq!(app.run_iteration().unwrap(), Iteration::NotRendered);
    assert!(app.needs_resize());

    assert_eq!(app.run_iteration().unwrap(), Iteration::Resized);
    assert_eq!(swapchains_created(&device), 2);
    assert_eq!(app.current_frame_slot(), 0);
    assert_eq!(app.swapchain_generation(), 2);

    assert_eq!(app.run_iteration().unwrap(), Iteration::Rendered);
    assert_eq!(swapchains_created(&device), 2);
    assert!(device.state().violations.is_empty(), "{:?}", device.state().violations);
}

#[test]
fn suboptimal_acquire_leaves_no_dangling_semaphore() {
    let (mut app, device) = app();
    device
        .state_mut()
        .acquire_script
        .push_back(ScriptedAcquire::Suboptimal);

    // the acquire semaphore is signaled but nothing will wait on it
    assert_eq!(app.run_iteration().unwrap(), Iteration::NotRendered);
    assert_eq!(app.run_iteration().unwrap(), Iteration::Resized);

    for _ in 0..4 {
        assert_eq!(app.run_iteration().unwrap(), Iteration::Rendered);
    }
    assert!(device.state().violations.is_empty(), "{:?}", device.state().violations);
}

#[test]
fn stale_present_triggers_recreation_next_iteration() {
    for status in [PresentStatus::Suboptimal, PresentStatus::OutOfDate] {
        let (mut app, device) = app();
        device.state_mut().present_script.push_back(status);

        assert_eq!(app.run_iteration().unwrap(), Iteration::Rendered);
        assert!(app.needs_resize());
        assert_eq!(app.run_iteration().unwrap(), Iteration::Resized);
        assert_eq!(app.current_frame_slot(), 0);
        assert_eq!(app.run_iteration().unwrap(), Iteration::Rendered);
        assert_eq!(swapchains_created(&device), 2);
    }
}

#[test]
fn resize_skips_update_and_render_for_that_iteration() {
    let (mut app, device) = app();
    app.run_iteration().unwrap();
    let executes_before = device.state().count(|c| *c == Call::Execute);

    app.platform_mut().resize(1600, 900);
    assert_eq!(app.run_iteration().unwrap(), Iteration::Resized);
    assert_eq!(device.state().count(|c| *c == Call::Execute), executes_before);
    assert_eq!(app.swapchain_extent(), Extent::new(1600, 900));
    assert_eq!(
        device.state().calls.iter().rev().find(|c| matches!(c, Call::CreateSwapchain(_))),
        Some(&Call::CreateSwapchain(Extent::new(1600, 900)))
    );

    // recreation drains the GPU before touching the chain
    let calls = device.state().calls.clone();
    let create = calls
        .iter()
        .rposition(|c| matches!(c, Call::CreateSwapchain(_)))
        .unwrap();
    assert!(calls[..create].contains(&Call::WaitIdle));
}

#[test]
fn resizes_in_one_pump_coalesce_into_one_recreation() {
    let (mut app, device) = app();
    app.platform_mut().resize(1000, 700);
    app.platform_mut().resize(1200, 800);
    app.platform_mut().resize(1600, 900);

    assert_eq!(app.run_iteration().unwrap(), Iteration::Resized);
    assert_eq!(swapchains_created(&device), 2);
    assert_eq!(app.swapchain_extent(), Extent::new(1600, 900));
}

#[test]
fn zero_area_resize_defers_until_the_window_has_area() {
    let (mut app, device) = app();
    app.platform_mut().resize(0, 0);

    app.run_iteration().unwrap();
    assert!(app.is_minimized());
    assert!(app.needs_resize());
    assert_eq!(swapchains_created(&device), 1);

    assert_eq!(app.run_iteration().unwrap(), Iteration::NotRendered);

    app.platform_mut().resize(640, 480);
    app.platform_mut().push(frameshell::platform::PlatformEvent::Restored);
    assert_eq!(app.run_iteration().unwrap(), Iteration::Resized);
    assert_eq!(app.swapchain_extent(), Extent::new(640, 480));
    assert_eq!(app.run_iteration().unwrap(), Iteration::Rendered);
}

#[test]
fn regaining_area_without_a_restored_event_resumes_rendering() {
    let (mut app, device) = app();
    app.platform_mut().resize(0, 0);
    assert_eq!(app.run_iteration().unwrap(), Iteration::NotRendered);
    assert!(app.is_minimized());

    app.platform_mut().resize(640, 480);
    assert_eq!(app.run_iteration().unwrap(), Iteration::Resized);
    assert!(!app.is_minimized());
    assert_eq!(app.swapchain_extent(), Extent::new(640, 480));
    assert_eq!(swapchains_created(&device), 2);

    assert_eq!(app.run_iteration().unwrap(), Iteration::Rendered);
}

#[test]
fn window_starting_without_area_renders_after_its_first_resize() {
    let device = MockDevice::new();
    let mut app =
        Application::new(&test_config(2), ScriptedPlatform::new(0, 0), device.clone()).unwrap();
    assert!(app.is_minimized());
    assert_eq!(app.run_iteration().unwrap(), Iteration::NotRendered);
    assert_eq!(swapchains_created(&device), 0);

    app.platform_mut().resize(640, 480);
    assert_eq!(app.run_iteration().unwrap(), Iteration::Resized);
    assert_eq!(app.swapchain_extent(), Extent::new(640, 480));
    assert_eq!(app.run_iteration().unwrap(), Iteration::Rendered);
    assert!(device.state().violations.is_empty(), "{:?}", device.state().violations);
}

#[test]
fn fullscreen_key_toggles_and_recreates() {
    let (mut app, device) = app();
    app.platform_mut().press("F11");
    // the toggle is handled during the pump, so the same iteration rebuilds
    assert_eq!(app.run_iteration().unwrap(), Iteration::Resized);
    assert_eq!(app.platform().fullscreen, vec![true]);
    assert!(!app.needs_resize());
    assert_eq!(swapchains_created(&device), 2);

    assert_eq!(app.run_iteration().unwrap(), Iteration::Rendered);

    app.platform_mut().press("F11");
    assert_eq!(app.run_iteration().unwrap(), Iteration::Resized);
    assert_eq!(app.platform().fullscreen, vec![true, false]);
}

#[test]
fn old_chain_is_released_after_recreation() {
    let (mut app, device) = app();
    for _ in 0..3 {
        app.platform_mut().resize(900, 700);
        app.run_iteration().unwrap();
        app.run_iteration().unwrap();
    }
    assert_eq!(device.state().live_swapchains, 1);
    assert_eq!(app.swapchain_generation(), 4);
}
