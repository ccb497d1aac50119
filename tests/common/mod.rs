// Recording device and scripted platform shared by the integration tests.
//
// `MockDevice` models just enough GPU state to check the frame protocol:
// fences and semaphores carry a signaled flag, submissions complete
// immediately, and every operation is appended to a call log. Protocol
// violations (waiting on a fence nothing will signal, presenting without a
// signaled semaphore, ...) are collected instead of panicking so tests can
// assert on them.

#![allow(dead_code)]

use frameshell::config::Config;
use frameshell::error::{GpuError, GpuResult};
use frameshell::platform::{InputEvent, Platform, PlatformEvent};
use frameshell::rhi::*;
use parking_lot::Mutex;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateSwapchain(Extent),
    DestroySwapchain(u32),
    Acquire { image: Option<u32> },
    Open,
    Clear { texture: u32 },
    CreateRenderTarget(Extent),
    PrepareForSampling { texture: u32 },
    WriteBuffer { buffer: u32, bytes: usize },
    Draw(DrawRecord),
    Close,
    Execute,
    Present { image: u32 },
    WaitFences,
    ResetFences,
    WaitIdle,
    GarbageCollection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub pipeline: &'static str,
    pub count: u32,
    pub indexed: bool,
    pub extent: Extent,
    pub target: u32,
    pub binding_sets: usize,
    /// Texture ids bound through the draw's binding sets.
    pub sampled: Vec<u32>,
}

/// Scripted result for one acquire. `Ready` hands out images round-robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedAcquire {
    Ready,
    Suboptimal,
    OutOfDate,
}

#[derive(Default)]
pub struct MockState {
    next_id: u32,
    fences: HashMap<u32, bool>,
    semaphores: HashMap<u32, bool>,
    pub calls: Vec<Call>,
    pub violations: Vec<String>,
    pub acquire_script: VecDeque<ScriptedAcquire>,
    pub present_script: VecDeque<PresentStatus>,
    pub image_count: u32,
    next_image: u32,
    pub buffer_writes: HashMap<u32, Vec<u8>>,
    set_textures: HashMap<u32, Vec<u32>>,
    pub live_buffers: usize,
    pub live_textures: usize,
    pub live_binding_sets: usize,
    pub live_swapchains: usize,
    pub max_texture_array_size: u32,
}

impl MockState {
    fn id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Draw(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn live_fences(&self) -> usize {
        self.fences.len()
    }

    pub fn live_semaphores(&self) -> usize {
        self.semaphores.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockTexture(pub u32);

#[derive(Debug, Clone)]
pub struct MockFramebuffer {
    pub texture: u32,
    pub extent: Extent,
}

pub struct MockBuffer {
    pub id: u32,
    pub size: u64,
}

pub struct MockHandle(pub u32);

pub struct MockPipeline {
    pub name: &'static str,
}

pub struct MockCommandList {
    pub open: bool,
}

pub struct MockSwapchain {
    pub id: u32,
    pub extent: Extent,
    pub images: Vec<u32>,
}

#[derive(Clone)]
pub struct MockDevice {
    state: Rc<RefCell<MockState>>,
    queue_lock: QueueLock,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState {
                image_count: 3,
                max_texture_array_size: 4096,
                ..MockState::default()
            })),
            queue_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, MockState> {
        self.state.borrow_mut()
    }

    pub fn framebuffer(&self, extent: Extent) -> MockFramebuffer {
        let id = self.state_mut().id();
        MockFramebuffer { texture: id, extent }
    }

    fn log(&self, call: Call) {
        self.state_mut().calls.push(call);
    }

    fn violation(&self, message: String) {
        self.state_mut().violations.push(message);
    }
}

impl RenderDevice for MockDevice {
    type Fence = u32;
    type Semaphore = u32;
    type CommandList = MockCommandList;
    type Texture = MockTexture;
    type Framebuffer = MockFramebuffer;
    type Buffer = MockBuffer;
    type Sampler = MockHandle;
    type BindingLayout = MockHandle;
    type BindingSet = MockHandle;
    type Pipeline = MockPipeline;

    fn queue_lock(&self) -> &QueueLock {
        &self.queue_lock
    }

    fn max_texture_array_size(&self) -> u32 {
        self.state().max_texture_array_size
    }

    fn create_fence(&self, signaled: bool) -> GpuResult<u32> {
        let mut state = self.state_mut();
        let id = state.id();
        state.fences.insert(id, signaled);
        Ok(id)
    }

    fn destroy_fence(&self, fence: u32) {
        self.state_mut().fences.remove(&fence);
    }

    fn create_semaphore(&self) -> GpuResult<u32> {
        let mut state = self.state_mut();
        let id = state.id();
        state.semaphores.insert(id, false);
        Ok(id)
    }

    fn destroy_semaphore(&self, semaphore: u32) {
        self.state_mut().semaphores.remove(&semaphore);
    }

    fn wait_for_fences(&self, fences: &[u32], _timeout_ns: u64) -> GpuResult<()> {
        self.log(Call::WaitFences);
        for fence in fences {
            let signaled = self.state().fences.get(fence).copied();
            match signaled {
                Some(true) => {}
                Some(false) => {
                    self.violation(format!("wait on unsignaled fence {fence}"));
                    return Err(GpuError::Timeout);
                }
                None => {
                    self.violation(format!("wait on destroyed fence {fence}"));
                    return Err(GpuError::DeviceLost);
                }
            }
        }
        Ok(())
    }

    fn reset_fences(&self, fences: &[u32]) -> GpuResult<()> {
        self.log(Call::ResetFences);
        let mut state = self.state_mut();
        for fence in fences {
            state.fences.insert(*fence, false);
        }
        Ok(())
    }

    fn wait_idle(&self) -> GpuResult<()> {
        self.log(Call::WaitIdle);
        Ok(())
    }

    fn create_command_list(&self) -> GpuResult<MockCommandList> {
        Ok(MockCommandList { open: false })
    }

    fn destroy_command_list(&self, _command_list: MockCommandList) {}

    fn open(&self, command_list: &mut MockCommandList) -> GpuResult<()> {
        if command_list.open {
            self.violation("open on an open command list".into());
        }
        command_list.open = true;
        self.log(Call::Open);
        Ok(())
    }

    fn close(&self, command_list: &mut MockCommandList) -> GpuResult<()> {
        if !command_list.open {
            self.violation("close on a closed command list".into());
        }
        command_list.open = false;
        self.log(Call::Close);
        Ok(())
    }

    fn clear_texture(
        &self,
        command_list: &mut MockCommandList,
        texture: &MockTexture,
        _color: [f32; 4],
    ) -> GpuResult<()> {
        if !command_list.open {
            self.violation("clear outside an open command list".into());
        }
        self.log(Call::Clear { texture: texture.0 });
        Ok(())
    }

    fn prepare_for_sampling(&self, command_list: &mut MockCommandList, texture: &MockTexture) -> GpuResult<()> {
        if !command_list.open {
            self.violation("prepare_for_sampling outside an open command list".into());
        }
        self.log(Call::PrepareForSampling { texture: texture.0 });
        Ok(())
    }

    fn execute(&self, command_list: &MockCommandList, sync: SubmitSync<u32, u32>) -> GpuResult<()> {
        if command_list.open {
            self.violation("execute of an open command list".into());
        }
        if self.queue_lock.try_lock().is_some() {
            self.violation("execute without holding the queue lock".into());
        }
        let mut state = self.state_mut();
        if let Some(wait) = sync.wait {
            match state.semaphores.get_mut(&wait) {
                Some(signaled) if *signaled => *signaled = false,
                _ => state
                    .violations
                    .push(format!("submit waits on unsignaled semaphore {wait}")),
            }
        }
        if let Some(signal) = sync.signal {
            if state.semaphores.insert(signal, true) == Some(true) {
                state
                    .violations
                    .push(format!("submit signals already signaled semaphore {signal}"));
            }
        }
        if let Some(fence) = sync.fence {
            if state.fences.insert(fence, true) == Some(true) {
                state
                    .violations
                    .push(format!("submit signals already signaled fence {fence}"));
            }
        }
        state.calls.push(Call::Execute);
        Ok(())
    }

    fn run_garbage_collection(&self) {
        self.log(Call::GarbageCollection);
    }

    fn create_buffer(&self, desc: &BufferDesc) -> GpuResult<MockBuffer> {
        let mut state = self.state_mut();
        state.live_buffers += 1;
        Ok(MockBuffer {
            id: state.id(),
            size: desc.byte_size,
        })
    }

    fn destroy_buffer(&self, _buffer: MockBuffer) {
        self.state_mut().live_buffers -= 1;
    }

    fn write_buffer(
        &self,
        command_list: &mut MockCommandList,
        buffer: &MockBuffer,
        data: &[u8],
    ) -> GpuResult<()> {
        if !command_list.open {
            self.violation("write_buffer outside an open command list".into());
        }
        if data.len() as u64 > buffer.size {
            return Err(GpuError::OutOfMemory(format!(
                "{} bytes into a {} byte buffer",
                data.len(),
                buffer.size
            )));
        }
        let mut state = self.state_mut();
        state.buffer_writes.insert(buffer.id, data.to_vec());
        state.calls.push(Call::WriteBuffer {
            buffer: buffer.id,
            bytes: data.len(),
        });
        Ok(())
    }

    fn create_texture(&self, desc: &TextureDesc, pixels: &[u8]) -> GpuResult<MockTexture> {
        if pixels.len() != (desc.width * desc.height * 4) as usize {
            return Err(GpuError::Unsupported("pixel size mismatch".into()));
        }
        let mut state = self.state_mut();
        state.live_textures += 1;
        Ok(MockTexture(state.id()))
    }

    fn create_render_target(&self, desc: &TextureDesc) -> GpuResult<MockTexture> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GpuError::Unsupported("render target without area".into()));
        }
        let mut state = self.state_mut();
        state.live_textures += 1;
        state
            .calls
            .push(Call::CreateRenderTarget(Extent::new(desc.width, desc.height)));
        Ok(MockTexture(state.id()))
    }

    fn destroy_texture(&self, _texture: MockTexture) {
        self.state_mut().live_textures -= 1;
    }

    fn create_framebuffer(&self, color: &MockTexture, extent: Extent) -> GpuResult<MockFramebuffer> {
        Ok(MockFramebuffer {
            texture: color.0,
            extent,
        })
    }

    fn destroy_framebuffer(&self, _framebuffer: MockFramebuffer) {}

    fn create_sampler(&self, _desc: &SamplerDesc) -> GpuResult<MockHandle> {
        Ok(MockHandle(self.state_mut().id()))
    }

    fn destroy_sampler(&self, _sampler: MockHandle) {}

    fn create_binding_layout(&self, _desc: &BindingLayoutDesc) -> GpuResult<MockHandle> {
        Ok(MockHandle(self.state_mut().id()))
    }

    fn destroy_binding_layout(&self, _layout: MockHandle) {}

    fn create_binding_set(
        &self,
        desc: &BindingSetDesc<'_, Self>,
        _layout: &MockHandle,
    ) -> GpuResult<MockHandle> {
        let textures = desc
            .items
            .iter()
            .filter_map(|item| match item {
                BindingSetItem::Texture { texture, .. } => Some(texture.0),
                _ => None,
            })
            .collect();
        let mut state = self.state_mut();
        state.live_binding_sets += 1;
        let id = state.id();
        state.set_textures.insert(id, textures);
        Ok(MockHandle(id))
    }

    fn destroy_binding_set(&self, set: MockHandle) {
        let mut state = self.state_mut();
        state.live_binding_sets -= 1;
        state.set_textures.remove(&set.0);
    }

    fn create_graphics_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> GpuResult<MockPipeline> {
        Ok(MockPipeline {
            name: desc.debug_name,
        })
    }

    fn destroy_pipeline(&self, _pipeline: MockPipeline) {}

    fn draw(
        &self,
        command_list: &mut MockCommandList,
        state: &GraphicsState<'_, Self>,
        args: DrawArguments,
    ) -> GpuResult<()> {
        if !command_list.open {
            self.violation("draw outside an open command list".into());
        }
        if args.indexed && state.index_buffer.is_none() {
            self.violation("indexed draw without index buffer".into());
        }
        let sampled = {
            let mock = self.state();
            state
                .bindings
                .iter()
                .filter_map(|set| mock.set_textures.get(&set.0))
                .flatten()
                .copied()
                .collect()
        };
        self.log(Call::Draw(DrawRecord {
            pipeline: state.pipeline.name,
            count: args.count,
            indexed: args.indexed,
            extent: state.extent,
            target: state.framebuffer.texture,
            binding_sets: state.bindings.len(),
            sampled,
        }));
        Ok(())
    }
}

impl SurfaceDevice for MockDevice {
    type Swapchain = MockSwapchain;

    fn create_swapchain(
        &self,
        extent: Extent,
        _old: Option<&MockSwapchain>,
    ) -> GpuResult<MockSwapchain> {
        let mut state = self.state_mut();
        let id = state.id();
        let count = state.image_count;
        let images = (0..count).map(|_| state.id()).collect();
        state.next_image = 0;
        state.live_swapchains += 1;
        state.calls.push(Call::CreateSwapchain(extent));
        Ok(MockSwapchain { id, extent, images })
    }

    fn destroy_swapchain(&self, swapchain: MockSwapchain) {
        let mut state = self.state_mut();
        state.live_swapchains -= 1;
        state.calls.push(Call::DestroySwapchain(swapchain.id));
    }

    fn swapchain_extent(&self, swapchain: &MockSwapchain) -> Extent {
        swapchain.extent
    }

    fn swapchain_images(&self, swapchain: &MockSwapchain) -> Vec<MockTexture> {
        swapchain.images.iter().map(|&id| MockTexture(id)).collect()
    }

    fn acquire_next_image(
        &self,
        swapchain: &MockSwapchain,
        signal: u32,
        _timeout_ns: u64,
    ) -> GpuResult<AcquireStatus> {
        let mut state = self.state_mut();
        let scripted = state.acquire_script.pop_front().unwrap_or(ScriptedAcquire::Ready);
        if scripted == ScriptedAcquire::OutOfDate {
            state.calls.push(Call::Acquire { image: None });
            return Ok(AcquireStatus::OutOfDate);
        }

        let index = state.next_image % swapchain.images.len() as u32;
        state.next_image += 1;
        if state.semaphores.insert(signal, true) == Some(true) {
            state
                .violations
                .push(format!("acquire signals already signaled semaphore {signal}"));
        }
        state.calls.push(Call::Acquire { image: Some(index) });
        Ok(match scripted {
            ScriptedAcquire::Suboptimal => AcquireStatus::Suboptimal(index),
            _ => AcquireStatus::Ready(index),
        })
    }

    fn present(&self, _swapchain: &MockSwapchain, image_index: u32, wait: u32) -> GpuResult<PresentStatus> {
        if self.queue_lock.try_lock().is_some() {
            self.violation("present without holding the queue lock".into());
        }
        let mut state = self.state_mut();
        match state.semaphores.get_mut(&wait) {
            Some(signaled) if *signaled => *signaled = false,
            _ => state
                .violations
                .push(format!("present waits on unsignaled semaphore {wait}")),
        }
        state.calls.push(Call::Present { image: image_index });
        Ok(state.present_script.pop_front().unwrap_or(PresentStatus::Presented))
    }
}

/// Platform whose events and window size are set by the test.
pub struct ScriptedPlatform {
    pub size: Extent,
    pub pending: VecDeque<PlatformEvent>,
    pub titles: Vec<String>,
    pub fullscreen: Vec<bool>,
}

impl ScriptedPlatform {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Extent::new(width, height),
            pending: VecDeque::new(),
            titles: Vec::new(),
            fullscreen: Vec::new(),
        }
    }

    pub fn push(&mut self, event: PlatformEvent) {
        self.pending.push_back(event);
    }

    /// Change the client area and report it like a window manager would.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = Extent::new(width, height);
        self.push(PlatformEvent::Resized(self.size));
    }

    pub fn press(&mut self, key: &str) {
        self.push(PlatformEvent::Input(InputEvent::Key {
            key: key.to_string(),
            pressed: true,
            repeat: false,
        }));
    }
}

impl Platform for ScriptedPlatform {
    fn poll_events(&mut self, events: &mut Vec<PlatformEvent>) {
        events.extend(self.pending.drain(..));
    }

    fn pixel_size(&self) -> Extent {
        self.size
    }

    fn set_title(&mut self, title: &str) {
        self.titles.push(title.to_string());
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen.push(fullscreen);
    }
}

/// Defaults with FPS titles off, so tests only see what they script.
pub fn test_config(frames_in_flight: usize) -> Config {
    let mut config = Config::default();
    config.graphics.max_frames_in_flight = frames_in_flight;
    config.debug.show_fps = false;
    config
}
