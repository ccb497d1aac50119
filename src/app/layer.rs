// Layer stack
//
// Layers are visited front-to-back (attach order) for update and render so
// later layers draw on top, and back-to-front for events so the top-most
// layer sees input first.

use super::deferred::{DeferredQueue, DeferredTask};
use crate::error::{Result, ShellError};
use crate::platform::PlatformEvent;
use crate::rhi::{Extent, QueueLock, RenderDevice};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Whether an event stops at the layer that received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFlow {
    Consumed,
    Propagate,
}

/// Everything a layer may record into during its render callback.
pub struct FrameContext<'a, D: RenderDevice> {
    pub device: &'a D,
    pub command_list: &'a mut D::CommandList,
    pub framebuffer: &'a D::Framebuffer,
    pub extent: Extent,
    pub image_index: u32,
    pub frame_slot: usize,
    /// Held by the core around its own submit+present; take it for any
    /// independent submission on the same queue.
    pub queue_lock: &'a QueueLock,
}

pub trait Layer<D: RenderDevice> {
    fn name(&self) -> &str {
        "layer"
    }

    /// Called when pushed. `app` is the only route back to the application.
    fn on_attach(&mut self, app: AppHandle, device: &D) -> Result<()> {
        let _ = (app, device);
        Ok(())
    }

    fn on_detach(&mut self, device: &D) {
        let _ = device;
    }

    fn on_update(&mut self, dt: Duration) -> Result<()> {
        let _ = dt;
        Ok(())
    }

    fn on_event(&mut self, event: &PlatformEvent) -> EventFlow {
        let _ = event;
        EventFlow::Propagate
    }

    fn on_render(&mut self, frame: &mut FrameContext<'_, D>) -> Result<()> {
        let _ = frame;
        Ok(())
    }
}

/// Non-owning route from a layer to the application's deferred-task queue.
///
/// Every attached layer gets its own handle. Clones share its attachment, so
/// once the layer is popped every copy it kept rejects new tasks.
#[derive(Clone)]
pub struct AppHandle {
    tasks: Weak<RefCell<DeferredQueue>>,
    attached: Rc<Cell<bool>>,
}

impl AppHandle {
    pub(crate) fn new(tasks: &Rc<RefCell<DeferredQueue>>) -> Self {
        Self {
            tasks: Rc::downgrade(tasks),
            attached: Rc::new(Cell::new(true)),
        }
    }

    /// Queue `task` to run once after the current frame is rendered.
    pub fn on_frame_ended(&self, task: impl FnOnce() + 'static) -> Result<()> {
        if !self.attached.get() {
            return Err(ShellError::LayerDetached);
        }
        let tasks = self.tasks.upgrade().ok_or(ShellError::LayerDetached)?;
        tasks.borrow_mut().push(Box::new(task) as DeferredTask);
        Ok(())
    }

    pub fn is_alive(&self) -> bool {
        self.attached.get() && self.tasks.strong_count() > 0
    }

    pub(crate) fn revoke(&self) {
        self.attached.set(false);
    }
}

/// Attach-time back-reference a layer embeds; empty while detached.
#[derive(Default, Clone)]
pub struct AppLink {
    handle: Option<AppHandle>,
}

impl AppLink {
    pub fn attach(&mut self, handle: AppHandle) {
        self.handle = Some(handle);
    }

    pub fn detach(&mut self) {
        self.handle = None;
    }

    pub fn is_attached(&self) -> bool {
        self.handle.as_ref().is_some_and(AppHandle::is_alive)
    }

    /// Fails with `LayerDetached` when not attached.
    pub fn on_frame_ended(&self, task: impl FnOnce() + 'static) -> Result<()> {
        match &self.handle {
            Some(handle) => handle.on_frame_ended(task),
            None => Err(ShellError::LayerDetached),
        }
    }
}

pub struct LayerStack<D: RenderDevice> {
    layers: Vec<(Box<dyn Layer<D>>, AppHandle)>,
}

impl<D: RenderDevice> Default for LayerStack<D> {
    fn default() -> Self {
        Self { layers: Vec::new() }
    }
}

impl<D: RenderDevice> LayerStack<D> {
    /// `handle` is the one the layer was attached with.
    pub fn push(&mut self, layer: Box<dyn Layer<D>>, handle: AppHandle) {
        self.layers.push((layer, handle));
    }

    pub fn pop(&mut self) -> Option<(Box<dyn Layer<D>>, AppHandle)> {
        self.layers.pop()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Attach order, for update and render.
    pub fn front_to_back(&mut self) -> impl Iterator<Item = &mut Box<dyn Layer<D>>> {
        self.layers.iter_mut().map(|(layer, _)| layer)
    }

    /// Deliver `event` from the top-most layer down until one consumes it.
    /// Returns whether any layer consumed it.
    pub fn dispatch_event(&mut self, event: &PlatformEvent) -> bool {
        for (layer, _) in self.layers.iter_mut().rev() {
            if layer.on_event(event) == EventFlow::Consumed {
                log::trace!("{} consumed {:?}", layer.name(), event);
                return true;
            }
        }
        false
    }
}
