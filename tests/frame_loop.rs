mod common;

use common::{test_config, Call, MockDevice, ScriptedPlatform};
use frameshell::app::{Application, EventFlow, FrameContext, Iteration, Layer, LoopPhase};
use frameshell::platform::{InputEvent, PlatformEvent};
use frameshell::rhi::Extent;
use frameshell::AppHandle;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

type Log = Rc<RefCell<Vec<String>>>;

struct RecordingLayer {
    name: &'static str,
    log: Log,
    consume_key: Option<&'static str>,
}

impl RecordingLayer {
    fn boxed(name: &'static str, log: &Log) -> Box<Self> {
        Box::new(Self {
            name,
            log: log.clone(),
            consume_key: None,
        })
    }
}

impl Layer<MockDevice> for RecordingLayer {
    fn name(&self) -> &str {
        self.name
    }

    fn on_attach(&mut self, _app: AppHandle, _device: &MockDevice) -> frameshell::Result<()> {
        self.log.borrow_mut().push(format!("{}:attach", self.name));
        Ok(())
    }

    fn on_detach(&mut self, _device: &MockDevice) {
        self.log.borrow_mut().push(format!("{}:detach", self.name));
    }

    fn on_update(&mut self, _dt: Duration) -> frameshell::Result<()> {
        self.log.borrow_mut().push(format!("{}:update", self.name));
        Ok(())
    }

    fn on_event(&mut self, event: &PlatformEvent) -> EventFlow {
        self.log.borrow_mut().push(format!("{}:event", self.name));
        match (self.consume_key, event) {
            (Some(key), PlatformEvent::Input(input)) if input.is_key_press(key) => EventFlow::Consumed,
            _ => EventFlow::Propagate,
        }
    }

    fn on_render(&mut self, frame: &mut FrameContext<'_, MockDevice>) -> frameshell::Result<()> {
        self.log
            .borrow_mut()
            .push(format!("{}:render@{}", self.name, frame.frame_slot));
        Ok(())
    }
}

fn app(frames: usize, images: u32) -> (Application<ScriptedPlatform, MockDevice>, MockDevice) {
    let device = MockDevice::new();
    device.state_mut().image_count = images;
    let app = Application::new(&test_config(frames), ScriptedPlatform::new(800, 600), device.clone())
        .unwrap();
    (app, device)
}

#[test]
fn no_fence_is_ever_waited_on_unsignaled() {
    for frames in 2..=3 {
        for images in frames as u32..=4 {
            let (mut app, device) = app(frames, images);
            for _ in 0..10 {
                assert_eq!(app.run_iteration().unwrap(), Iteration::Rendered);
            }
            let state = device.state();
            assert!(
                state.violations.is_empty(),
                "F={frames} I={images}: {:?}",
                state.violations
            );
            assert_eq!(state.count(|c| *c == Call::Execute), 10);
            assert_eq!(state.count(|c| matches!(c, Call::Present { .. })), 10);
        }
    }
}

#[test]
fn frame_follows_wait_acquire_reset_record_submit_present() {
    let (mut app, device) = app(2, 3);
    device.state_mut().calls.clear();

    app.run_iteration().unwrap();

    let calls: Vec<Call> = device
        .state()
        .calls
        .iter()
        .filter(|c| !matches!(c, Call::GarbageCollection))
        .cloned()
        .collect();
    assert!(
        matches!(
            calls.as_slice(),
            [
                Call::WaitFences,
                Call::Acquire { image: Some(0) },
                Call::ResetFences,
                Call::Open,
                Call::Clear { .. },
                Call::Close,
                Call::Execute,
                Call::Present { image: 0 },
            ]
        ),
        "{calls:?}"
    );
}

#[test]
fn frame_slots_rotate_and_layers_render_in_attach_order() {
    let log = Log::default();
    let (mut app, _device) = app(2, 3);
    app.push_layer(RecordingLayer::boxed("base", &log)).unwrap();
    app.push_layer(RecordingLayer::boxed("overlay", &log)).unwrap();

    for _ in 0..3 {
        app.run_iteration().unwrap();
    }

    let renders: Vec<_> = log
        .borrow()
        .iter()
        .filter(|l| l.contains("render"))
        .cloned()
        .collect();
    assert_eq!(
        renders,
        [
            "base:render@0",
            "overlay:render@0",
            "base:render@1",
            "overlay:render@1",
            "base:render@0",
            "overlay:render@0",
        ]
    );
    assert_eq!(app.stats().frames_rendered, 3);
}

#[test]
fn events_reach_the_top_layer_first() {
    let log = Log::default();
    let (mut app, _device) = app(2, 3);
    app.push_layer(RecordingLayer::boxed("base", &log)).unwrap();
    app.push_layer(Box::new(RecordingLayer {
        name: "overlay",
        log: log.clone(),
        consume_key: Some("Escape"),
    }))
    .unwrap();
    log.borrow_mut().clear();

    // consumed by the overlay: never reaches base, and the quit binding
    app.platform_mut().press("Escape");
    app.run_iteration().unwrap();
    assert!(app.is_running());

    app.platform_mut().press("KeyA");
    app.run_iteration().unwrap();

    let events: Vec<_> = log
        .borrow()
        .iter()
        .filter(|l| l.ends_with(":event"))
        .cloned()
        .collect();
    assert_eq!(events, ["overlay:event", "overlay:event", "base:event"]);
}

#[test]
fn quit_key_ends_the_run() {
    let (mut app, device) = app(2, 3);
    app.platform_mut().press("Escape");

    app.run().unwrap();

    assert!(!app.is_running());
    assert_eq!(app.stats().iterations, 1);
    assert_eq!(device.state().calls.last(), Some(&Call::WaitIdle));
}

#[test]
fn close_request_stops_after_the_current_iteration() {
    let (mut app, _device) = app(2, 3);
    app.platform_mut().push(PlatformEvent::CloseRequested);

    app.run().unwrap();

    // the iteration that saw the close request still completes
    assert_eq!(app.stats().iterations, 1);
    assert_eq!(app.stats().frames_rendered, 1);
}

#[test]
fn minimized_window_updates_without_rendering() {
    let log = Log::default();
    let (mut app, device) = app(2, 3);
    app.push_layer(RecordingLayer::boxed("base", &log)).unwrap();

    app.platform_mut().push(PlatformEvent::Minimized);
    assert_eq!(app.run_iteration().unwrap(), Iteration::NotRendered);
    assert!(app.is_minimized());
    assert_eq!(device.state().count(|c| matches!(c, Call::Acquire { .. })), 0);
    assert!(log.borrow().contains(&"base:update".to_string()));

    app.platform_mut().push(PlatformEvent::Restored);
    assert_eq!(app.run_iteration().unwrap(), Iteration::Rendered);
}

#[test]
fn garbage_collection_follows_the_configured_cadence() {
    let device = MockDevice::new();
    let mut config = test_config(2);
    config.graphics.gc_interval_secs = 0.0;
    let mut app = Application::new(&config, ScriptedPlatform::new(640, 480), device.clone()).unwrap();

    for _ in 0..4 {
        app.run_iteration().unwrap();
    }
    assert_eq!(app.stats().gc_runs, 4);

    let device = MockDevice::new();
    let mut config = test_config(2);
    config.graphics.gc_interval_secs = 3600.0;
    let mut app = Application::new(&config, ScriptedPlatform::new(640, 480), device).unwrap();
    for _ in 0..4 {
        app.run_iteration().unwrap();
    }
    assert_eq!(app.stats().gc_runs, 0);
}

#[test]
fn shutdown_detaches_layers_newest_first_and_releases_everything() {
    let log = Log::default();
    let (mut app, device) = app(3, 3);
    app.push_layer(RecordingLayer::boxed("a", &log)).unwrap();
    app.push_layer(RecordingLayer::boxed("b", &log)).unwrap();
    app.push_layer(RecordingLayer::boxed("c", &log)).unwrap();
    app.run_iteration().unwrap();

    app.shutdown().unwrap();
    // second call is a no-op
    app.shutdown().unwrap();

    let detaches: Vec<_> = log
        .borrow()
        .iter()
        .filter(|l| l.ends_with(":detach"))
        .cloned()
        .collect();
    assert_eq!(detaches, ["c:detach", "b:detach", "a:detach"]);
    assert_eq!(app.phase(), LoopPhase::Destroyed);
    assert_eq!(app.layer_count(), 0);
    assert!(app.run().is_err());

    let state = device.state();
    assert_eq!(state.live_fences(), 0);
    assert_eq!(state.live_semaphores(), 0);
    assert_eq!(state.live_swapchains, 0);
}

#[test]
fn window_starting_without_area_builds_the_chain_later() {
    let device = MockDevice::new();
    let mut app =
        Application::new(&test_config(2), ScriptedPlatform::new(0, 0), device.clone()).unwrap();
    assert_eq!(app.swapchain_extent(), Extent::default());

    assert_eq!(app.run_iteration().unwrap(), Iteration::NotRendered);

    app.platform_mut().resize(1024, 768);
    app.platform_mut().push(PlatformEvent::Restored);
    assert_eq!(app.run_iteration().unwrap(), Iteration::Resized);
    assert_eq!(app.swapchain_extent(), Extent::new(1024, 768));
    assert_eq!(app.run_iteration().unwrap(), Iteration::Rendered);
    assert!(device.state().violations.is_empty());
}

#[test]
fn unconsumed_repeat_presses_do_not_trigger_controls() {
    let (mut app, _device) = app(2, 3);
    app.platform_mut().push(PlatformEvent::Input(InputEvent::Key {
        key: "Escape".into(),
        pressed: true,
        repeat: true,
    }));
    app.run_iteration().unwrap();
    assert!(app.is_running());
}

#[test]
fn layers_can_take_the_queue_lock_while_rendering() {
    struct Overlay(Rc<RefCell<Vec<bool>>>);
    impl Layer<MockDevice> for Overlay {
        fn on_render(&mut self, frame: &mut FrameContext<'_, MockDevice>) -> frameshell::Result<()> {
            // an overlay submitting on its own path holds the lock for the pair
            let free = frame.queue_lock.try_lock().is_some();
            self.0.borrow_mut().push(free);
            Ok(())
        }
    }

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (mut app, _device) = app(2, 3);
    app.push_layer(Box::new(Overlay(seen.clone()))).unwrap();
    for _ in 0..3 {
        app.run_iteration().unwrap();
    }
    assert_eq!(*seen.borrow(), [true, true, true]);
}
