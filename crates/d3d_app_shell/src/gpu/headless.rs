//! A software GPU timeline.
//!
//! Submitted work is executed in order by a worker thread that stands in for the GPU,
//! so fences complete asynchronously exactly like they do on hardware. Every object
//! it hands out is observable, which is what the shell's tests lean on.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Condvar;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use super::CpuDescriptorHandle;
use super::DepthStencilDesc;
use super::GpuAllocator;
use super::GpuCommandList;
use super::GpuDescriptorHeap;
use super::GpuDevice;
use super::GpuFence;
use super::GpuQueue;
use super::GpuSwapChain;
use super::HeapKind;
use super::PixelFormat;
use super::ResourceState;
use super::SampleDesc;
use super::SwapChainDesc;
use crate::device_error::DXGI_ERROR_DEVICE_REMOVED;
use crate::device_error::DXGI_ERROR_INVALID_CALL;
use crate::device_error::DeviceError;
use crate::device_error::DeviceResult;
use crate::device_error::E_FAIL;

#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    /// Quality levels reported for 4x MSAA.
    pub msaa_quality_levels: u32,
    /// How long the timeline spends on each executed command list.
    pub execution_latency: Duration,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            msaa_quality_levels: 4,
            execution_latency: Duration::ZERO,
        }
    }
}

/// Stands in for an OS window handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessWindow;

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Transition {
        resource: u64,
        before: ResourceState,
        after: ResourceState,
    },
}

struct Timeline {
    options: HeadlessOptions,
    next_id: AtomicU64,
    removed: AtomicBool,
    swap_chains_created: AtomicU64,
    depth_buffers_created: AtomicU64,
    views: Mutex<HashMap<CpuDescriptorHandle, u64>>,
    executed: Mutex<Vec<RecordedCommand>>,
}

impl Timeline {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn check(&self) -> DeviceResult<()> {
        if self.removed.load(Ordering::Acquire) {
            return Err(DeviceError::DeviceRemoved {
                code: DXGI_ERROR_DEVICE_REMOVED,
            });
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct HeadlessDevice {
    timeline: Arc<Timeline>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_options(HeadlessOptions::default())
    }

    pub fn with_options(options: HeadlessOptions) -> Self {
        Self {
            timeline: Arc::new(Timeline {
                options,
                next_id: AtomicU64::new(1),
                removed: AtomicBool::new(false),
                swap_chains_created: AtomicU64::new(0),
                depth_buffers_created: AtomicU64::new(0),
                views: Mutex::new(HashMap::new()),
                executed: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Every call made after this fails with `DXGI_ERROR_DEVICE_REMOVED`.
    pub fn remove(&self) {
        self.timeline.removed.store(true, Ordering::Release);
    }

    pub fn swap_chains_created(&self) -> u64 {
        self.timeline.swap_chains_created.load(Ordering::Relaxed)
    }

    pub fn depth_buffers_created(&self) -> u64 {
        self.timeline.depth_buffers_created.load(Ordering::Relaxed)
    }

    /// Id of the resource whose view was last written at `handle`.
    pub fn view_at(&self, handle: CpuDescriptorHandle) -> Option<u64> {
        self.timeline.views.lock().get(&handle).copied()
    }

    /// Commands the timeline has finished executing, in order.
    pub fn executed_commands(&self) -> Vec<RecordedCommand> {
        self.timeline.executed.lock().clone()
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    BackBuffer { index: u32 },
    DepthStencil,
}

#[derive(Debug, Clone)]
pub struct HeadlessResource {
    id: u64,
    kind: ResourceKind,
    width: u32,
    height: u32,
    format: PixelFormat,
    sample: SampleDesc,
    // Back buffers keep their chain's lease alive until released.
    lease: Option<Arc<()>>,
}

impl HeadlessResource {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn sample(&self) -> SampleDesc {
        self.sample
    }

    pub fn holds_swap_chain_lease(&self) -> bool {
        self.lease.is_some()
    }
}

struct FenceState {
    completed: Mutex<u64>,
    signalled: Condvar,
}

impl FenceState {
    fn complete(&self, value: u64) {
        let mut completed = self.completed.lock();
        if value > *completed {
            *completed = value;
        }
        drop(completed);
        self.signalled.notify_all();
    }
}

pub struct HeadlessFence {
    state: Arc<FenceState>,
}

impl GpuFence for HeadlessFence {
    fn completed_value(&self) -> u64 {
        *self.state.completed.lock()
    }

    fn wait_for(&self, value: u64) -> DeviceResult<()> {
        let mut completed = self.state.completed.lock();
        while *completed < value {
            self.state.signalled.wait(&mut completed);
        }
        Ok(())
    }
}

enum GpuWork {
    Execute(Vec<RecordedCommand>),
    Signal(Arc<FenceState>, u64),
}

pub struct HeadlessQueue {
    sender: Option<flume::Sender<GpuWork>>,
    worker: Option<JoinHandle<()>>,
    timeline: Arc<Timeline>,
}

impl HeadlessQueue {
    fn spawn(timeline: Arc<Timeline>) -> DeviceResult<Self> {
        let (sender, receiver) = flume::unbounded::<GpuWork>();
        let worker_timeline = timeline.clone();
        let worker = std::thread::Builder::new()
            .name("headless-gpu".into())
            .spawn(move || {
                for work in receiver.iter() {
                    match work {
                        GpuWork::Execute(commands) => {
                            let latency = worker_timeline.options.execution_latency;
                            if !latency.is_zero() {
                                std::thread::sleep(latency);
                            }
                            worker_timeline.executed.lock().extend(commands);
                        }
                        GpuWork::Signal(fence, value) => {
                            trace!(value, "timeline reached fence");
                            fence.complete(value);
                        }
                    }
                }
            })
            .map_err(|e| DeviceError::api(E_FAIL, format!("spawning GPU timeline: {e}")))?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            timeline,
        })
    }

    fn send(&self, work: GpuWork) -> DeviceResult<()> {
        self.timeline.check()?;
        self.sender
            .as_ref()
            .ok_or_else(|| DeviceError::api(E_FAIL, "GPU timeline stopped"))?
            .send(work)
            .map_err(|_| DeviceError::api(E_FAIL, "GPU timeline stopped"))
    }
}

impl Drop for HeadlessQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is left and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl GpuQueue for HeadlessQueue {
    type Fence = HeadlessFence;
    type List = HeadlessCommandList;

    fn execute(&self, list: &HeadlessCommandList) -> DeviceResult<()> {
        let commands = list.commands.lock().clone();
        self.send(GpuWork::Execute(commands))
    }

    fn signal(&self, fence: &HeadlessFence, value: u64) -> DeviceResult<()> {
        self.send(GpuWork::Signal(fence.state.clone(), value))
    }
}

pub struct HeadlessAllocator {
    timeline: Arc<Timeline>,
}

impl GpuAllocator for HeadlessAllocator {
    fn reset(&self) -> DeviceResult<()> {
        self.timeline.check()
    }
}

pub struct HeadlessCommandList {
    commands: Mutex<Vec<RecordedCommand>>,
    timeline: Arc<Timeline>,
}

impl HeadlessCommandList {
    pub fn recorded(&self) -> Vec<RecordedCommand> {
        self.commands.lock().clone()
    }
}

impl GpuCommandList for HeadlessCommandList {
    type Allocator = HeadlessAllocator;
    type Resource = HeadlessResource;

    fn reset(&self, _allocator: &HeadlessAllocator) -> DeviceResult<()> {
        self.timeline.check()?;
        self.commands.lock().clear();
        Ok(())
    }

    fn transition(&self, resource: &HeadlessResource, before: ResourceState, after: ResourceState) {
        self.commands.lock().push(RecordedCommand::Transition {
            resource: resource.id,
            before,
            after,
        });
    }

    fn close(&self) -> DeviceResult<()> {
        self.timeline.check()
    }
}

pub struct HeadlessHeap {
    start: CpuDescriptorHandle,
}

impl GpuDescriptorHeap for HeadlessHeap {
    fn cpu_start(&self) -> CpuDescriptorHandle {
        self.start
    }
}

pub struct HeadlessSwapChain {
    desc: Mutex<SwapChainDesc>,
    lease: Arc<()>,
    timeline: Arc<Timeline>,
}

impl HeadlessSwapChain {
    pub fn desc(&self) -> SwapChainDesc {
        *self.desc.lock()
    }
}

impl GpuSwapChain for HeadlessSwapChain {
    type Resource = HeadlessResource;

    fn resize_buffers(
        &self,
        buffer_count: u32,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> DeviceResult<()> {
        self.timeline.check()?;
        let outstanding = Arc::strong_count(&self.lease) - 1;
        if outstanding > 0 {
            return Err(DeviceError::api(
                DXGI_ERROR_INVALID_CALL,
                format!("ResizeBuffers with {outstanding} back buffer reference(s) outstanding"),
            ));
        }
        if width == 0 || height == 0 {
            return Err(DeviceError::InvalidSize { width, height });
        }
        let mut desc = self.desc.lock();
        desc.buffer_count = buffer_count;
        desc.width = width;
        desc.height = height;
        desc.format = format;
        Ok(())
    }

    fn buffer(&self, index: u32) -> DeviceResult<HeadlessResource> {
        self.timeline.check()?;
        let desc = *self.desc.lock();
        if index >= desc.buffer_count {
            return Err(DeviceError::api(
                DXGI_ERROR_INVALID_CALL,
                format!("GetBuffer({index}) on a chain of {}", desc.buffer_count),
            ));
        }
        Ok(HeadlessResource {
            id: self.timeline.next_id(),
            kind: ResourceKind::BackBuffer { index },
            width: desc.width,
            height: desc.height,
            format: desc.format,
            sample: desc.sample,
            lease: Some(self.lease.clone()),
        })
    }

    fn present(&self, _sync_interval: u32) -> DeviceResult<()> {
        self.timeline.check()
    }
}

impl GpuDevice for HeadlessDevice {
    type Window = HeadlessWindow;
    type Queue = HeadlessQueue;
    type Allocator = HeadlessAllocator;
    type List = HeadlessCommandList;
    type Fence = HeadlessFence;
    type Resource = HeadlessResource;
    type Heap = HeadlessHeap;
    type SwapChain = HeadlessSwapChain;

    fn create_command_queue(&self) -> DeviceResult<HeadlessQueue> {
        self.timeline.check()?;
        HeadlessQueue::spawn(self.timeline.clone())
    }

    fn create_command_allocator(&self) -> DeviceResult<HeadlessAllocator> {
        self.timeline.check()?;
        Ok(HeadlessAllocator {
            timeline: self.timeline.clone(),
        })
    }

    fn create_command_list(&self, _allocator: &HeadlessAllocator) -> DeviceResult<HeadlessCommandList> {
        self.timeline.check()?;
        Ok(HeadlessCommandList {
            commands: Mutex::new(Vec::new()),
            timeline: self.timeline.clone(),
        })
    }

    fn create_fence(&self, initial_value: u64) -> DeviceResult<HeadlessFence> {
        self.timeline.check()?;
        Ok(HeadlessFence {
            state: Arc::new(FenceState {
                completed: Mutex::new(initial_value),
                signalled: Condvar::new(),
            }),
        })
    }

    fn create_descriptor_heap(&self, _kind: HeapKind, _capacity: u32) -> DeviceResult<HeadlessHeap> {
        self.timeline.check()?;
        Ok(HeadlessHeap {
            start: CpuDescriptorHandle((self.timeline.next_id() as usize) << 16),
        })
    }

    fn descriptor_increment_size(&self, kind: HeapKind) -> u32 {
        match kind {
            HeapKind::RenderTarget => 32,
            HeapKind::DepthStencil => 8,
        }
    }

    fn msaa_quality_levels(&self, _format: PixelFormat, sample_count: u32) -> DeviceResult<u32> {
        self.timeline.check()?;
        Ok(match sample_count {
            1 => 1,
            4 => self.timeline.options.msaa_quality_levels,
            _ => 0,
        })
    }

    fn create_swap_chain(
        &self,
        _queue: &HeadlessQueue,
        _window: &HeadlessWindow,
        desc: &SwapChainDesc,
    ) -> DeviceResult<HeadlessSwapChain> {
        self.timeline.check()?;
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::InvalidSize {
                width: desc.width,
                height: desc.height,
            });
        }
        let created = self.timeline.swap_chains_created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(created, ?desc, "headless swap chain created");
        Ok(HeadlessSwapChain {
            desc: Mutex::new(*desc),
            lease: Arc::new(()),
            timeline: self.timeline.clone(),
        })
    }

    fn create_render_target_view(&self, resource: &HeadlessResource, handle: CpuDescriptorHandle) {
        self.timeline.views.lock().insert(handle, resource.id);
    }

    fn create_depth_stencil_buffer(&self, desc: &DepthStencilDesc) -> DeviceResult<HeadlessResource> {
        self.timeline.check()?;
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::InvalidSize {
                width: desc.width,
                height: desc.height,
            });
        }
        self.timeline
            .depth_buffers_created
            .fetch_add(1, Ordering::Relaxed);
        Ok(HeadlessResource {
            id: self.timeline.next_id(),
            kind: ResourceKind::DepthStencil,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            sample: desc.sample,
            lease: None,
        })
    }

    fn create_depth_stencil_view(
        &self,
        resource: &HeadlessResource,
        _format: PixelFormat,
        handle: CpuDescriptorHandle,
    ) {
        self.timeline.views.lock().insert(handle, resource.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_desc() -> SwapChainDesc {
        SwapChainDesc {
            width: 320,
            height: 240,
            format: PixelFormat::Rgba8Unorm,
            buffer_count: 2,
            sample: SampleDesc::SINGLE,
        }
    }

    #[test]
    fn signals_complete_in_submission_order() {
        let device = HeadlessDevice::with_options(HeadlessOptions {
            execution_latency: Duration::from_millis(2),
            ..Default::default()
        });
        let queue = device.create_command_queue().unwrap();
        let allocator = device.create_command_allocator().unwrap();
        let list = device.create_command_list(&allocator).unwrap();
        let fence = device.create_fence(0).unwrap();

        queue.execute(&list).unwrap();
        queue.signal(&fence, 1).unwrap();
        queue.execute(&list).unwrap();
        queue.signal(&fence, 2).unwrap();

        fence.wait_for(2).unwrap();
        assert_eq!(fence.completed_value(), 2);
    }

    #[test]
    fn resize_is_refused_while_a_buffer_is_held() {
        let device = HeadlessDevice::new();
        let queue = device.create_command_queue().unwrap();
        let chain = device
            .create_swap_chain(&queue, &HeadlessWindow, &chain_desc())
            .unwrap();

        let held = chain.buffer(0).unwrap();
        let error = chain
            .resize_buffers(2, 640, 480, PixelFormat::Rgba8Unorm)
            .unwrap_err();
        assert_eq!(error.code(), DXGI_ERROR_INVALID_CALL);

        drop(held);
        chain
            .resize_buffers(2, 640, 480, PixelFormat::Rgba8Unorm)
            .unwrap();
        assert_eq!(chain.desc().width, 640);
        assert_eq!(chain.buffer(1).unwrap().size(), (640, 480));
    }

    #[test]
    fn removed_device_fails_every_call() {
        let device = HeadlessDevice::new();
        let queue = device.create_command_queue().unwrap();
        let fence = device.create_fence(0).unwrap();
        device.remove();

        assert!(queue.signal(&fence, 1).unwrap_err().is_device_removed());
        assert!(device.create_command_allocator().is_err());
    }
}
