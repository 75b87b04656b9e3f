use tracing::debug;
use tracing::error;
use tracing::info;

use crate::command_objects::CommandObjects;
use crate::config::AppConfig;
use crate::descriptor_heap::DescriptorHeap;
use crate::device_error::DeviceError;
use crate::device_error::DeviceResult;
use crate::fence_sync::FenceSync;
use crate::gpu::CpuDescriptorHandle;
use crate::gpu::DepthStencilDesc;
use crate::gpu::GpuDevice;
use crate::gpu::HeapKind;
use crate::gpu::PixelFormat;
use crate::gpu::ResourceState;
use crate::gpu::SampleDesc;
use crate::gpu::SwapChainDesc;
use crate::swap_chain::SwapChain;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub top_left_x: f32,
    pub top_left_y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Everything that has to be torn down and rebuilt together when the window
/// changes size: swap chain, views, depth buffer, viewport.
pub struct DeviceResources<D: GpuDevice> {
    window: D::Window,
    commands: CommandObjects<D>,
    fence: FenceSync<D::Fence>,
    swap_chain: SwapChain<D>,
    rtv_heap: DescriptorHeap<D::Heap>,
    dsv_heap: DescriptorHeap<D::Heap>,
    depth_stencil: Option<D::Resource>,
    back_buffer_format: PixelFormat,
    depth_stencil_format: PixelFormat,
    msaa_enabled: bool,
    msaa_quality_levels: u32,
    client_width: u32,
    client_height: u32,
    viewport: Viewport,
    scissor_rect: ScissorRect,
    resize_count: u64,
    device: D,
}

impl<D: GpuDevice> DeviceResources<D> {
    /// Creates the queue, fence, swap chain and descriptor heaps. Nothing is sized
    /// for the window until the first [`DeviceResources::on_resize`].
    pub fn new(device: D, window: D::Window, config: &AppConfig) -> DeviceResult<Self> {
        let msaa_quality_levels = device.msaa_quality_levels(config.back_buffer_format, 4)?;
        if msaa_quality_levels == 0 {
            return Err(DeviceError::MsaaUnsupported {
                format: config.back_buffer_format,
            });
        }
        debug!(msaa_quality_levels, "4x MSAA supported");

        let commands = CommandObjects::new(&device)?;
        let fence = FenceSync::new(&device)?;
        let swap_chain_desc = SwapChainDesc {
            width: config.client_width,
            height: config.client_height,
            format: config.back_buffer_format,
            buffer_count: config.back_buffer_count,
            sample: SampleDesc::for_msaa(config.msaa_enabled, msaa_quality_levels),
        };
        let swap_chain = SwapChain::create(&device, commands.queue(), &window, swap_chain_desc)?;
        let rtv_heap = DescriptorHeap::new(&device, HeapKind::RenderTarget, config.back_buffer_count)?;
        let dsv_heap = DescriptorHeap::new(&device, HeapKind::DepthStencil, 1)?;

        Ok(Self {
            window,
            commands,
            fence,
            swap_chain,
            rtv_heap,
            dsv_heap,
            depth_stencil: None,
            back_buffer_format: config.back_buffer_format,
            depth_stencil_format: config.depth_stencil_format,
            msaa_enabled: config.msaa_enabled,
            msaa_quality_levels,
            client_width: config.client_width,
            client_height: config.client_height,
            viewport: Viewport::default(),
            scissor_rect: ScissorRect::default(),
            resize_count: 0,
            device,
        })
    }

    pub fn sample_desc(&self) -> SampleDesc {
        SampleDesc::for_msaa(self.msaa_enabled, self.msaa_quality_levels)
    }

    fn swap_chain_desc(&self) -> SwapChainDesc {
        SwapChainDesc {
            width: self.client_width,
            height: self.client_height,
            format: self.back_buffer_format,
            buffer_count: self.swap_chain.desc().buffer_count,
            sample: self.sample_desc(),
        }
    }

    /// Rebuild every size-dependent resource for a `width` x `height` client area.
    ///
    /// The order matters: the GPU must be idle before anything is released, and every
    /// back-buffer reference must be gone before the swap chain is resized.
    pub fn on_resize(&mut self, width: u32, height: u32) -> DeviceResult<()> {
        if width == 0 || height == 0 {
            return Err(DeviceError::InvalidSize { width, height });
        }
        info!(width, height, "Resizing swap chain");

        self.fence.flush(self.commands.queue())?;
        self.commands.reset_allocator()?;
        self.commands.reset()?;

        self.swap_chain.release_buffers();
        self.depth_stencil = None;

        self.swap_chain.resize(width, height)?;
        self.swap_chain.reset_current();
        self.client_width = width;
        self.client_height = height;

        self.rtv_heap.invalidate();
        let buffers = self.swap_chain.fetch_buffers()?;
        for (slot, buffer) in buffers.iter().enumerate() {
            let handle = self.rtv_heap.claim(slot as u32)?;
            self.device.create_render_target_view(buffer, handle);
        }

        let sample = self.sample_desc();
        let depth_stencil = self.device.create_depth_stencil_buffer(&DepthStencilDesc {
            width,
            height,
            format: self.depth_stencil_format,
            sample,
            clear_depth: 1.0,
            clear_stencil: 0,
        })?;
        self.dsv_heap.invalidate();
        let handle = self.dsv_heap.claim(0)?;
        self.device
            .create_depth_stencil_view(&depth_stencil, self.depth_stencil_format, handle);

        self.commands.transition(
            &depth_stencil,
            ResourceState::Common,
            ResourceState::DepthWrite,
        )?;
        self.depth_stencil = Some(depth_stencil);

        self.commands.close_and_submit()?;
        self.fence.flush(self.commands.queue())?;

        self.viewport = Viewport {
            top_left_x: 0.0,
            top_left_y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        self.scissor_rect = ScissorRect {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        };
        self.resize_count += 1;
        Ok(())
    }

    /// Switch 4x MSAA on or off. Returns whether anything changed.
    pub fn set_msaa(&mut self, enabled: bool) -> DeviceResult<bool> {
        if enabled == self.msaa_enabled {
            return Ok(false);
        }
        self.msaa_enabled = enabled;
        info!(enabled, "Toggling 4x MSAA");

        self.fence.flush(self.commands.queue())?;
        self.depth_stencil = None;
        let desc = self.swap_chain_desc();
        self.swap_chain
            .recreate(&self.device, self.commands.queue(), &self.window, desc)?;
        self.on_resize(self.client_width, self.client_height)?;
        Ok(true)
    }

    pub fn flush_command_queue(&mut self) -> DeviceResult<u64> {
        self.fence.flush(self.commands.queue())
    }

    /// Present the current back buffer and move on to the next one.
    pub fn present(&mut self) -> DeviceResult<()> {
        self.swap_chain.present(0)
    }

    /// Open the command list for a frame and make the current back buffer writable.
    ///
    /// Resetting the allocator is only sound because [`DeviceResources::end_frame`]
    /// waits for the GPU before returning.
    pub fn begin_frame(&mut self) -> DeviceResult<()> {
        self.commands.reset_allocator()?;
        self.commands.reset()?;
        let back_buffer = self
            .swap_chain
            .current_buffer()
            .ok_or(DeviceError::NoSwapChain)?;
        self.commands.transition(
            back_buffer,
            ResourceState::Present,
            ResourceState::RenderTarget,
        )
    }

    /// Submit what was recorded since [`DeviceResources::begin_frame`], present, and
    /// wait for the GPU to finish the frame.
    pub fn end_frame(&mut self) -> DeviceResult<()> {
        let back_buffer = self
            .swap_chain
            .current_buffer()
            .ok_or(DeviceError::NoSwapChain)?;
        self.commands.transition(
            back_buffer,
            ResourceState::RenderTarget,
            ResourceState::Present,
        )?;
        self.commands.close_and_submit()?;
        self.swap_chain.present(0)?;
        self.fence.flush(self.commands.queue())?;
        Ok(())
    }

    pub fn current_back_buffer(&self) -> Option<&D::Resource> {
        self.swap_chain.current_buffer()
    }

    pub fn current_back_buffer_view(&self) -> DeviceResult<CpuDescriptorHandle> {
        self.rtv_heap.handle(self.swap_chain.current_index())
    }

    pub fn depth_stencil_view(&self) -> DeviceResult<CpuDescriptorHandle> {
        self.dsv_heap.handle(0)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.client_width as f32 / self.client_height as f32
    }

    pub fn msaa_enabled(&self) -> bool {
        self.msaa_enabled
    }

    pub fn msaa_quality_levels(&self) -> u32 {
        self.msaa_quality_levels
    }

    pub fn client_size(&self) -> (u32, u32) {
        (self.client_width, self.client_height)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scissor_rect(&self) -> ScissorRect {
        self.scissor_rect
    }

    pub fn resize_count(&self) -> u64 {
        self.resize_count
    }

    pub fn back_buffer_format(&self) -> PixelFormat {
        self.back_buffer_format
    }

    pub fn depth_stencil_format(&self) -> PixelFormat {
        self.depth_stencil_format
    }

    pub fn depth_stencil(&self) -> Option<&D::Resource> {
        self.depth_stencil.as_ref()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn window(&self) -> &D::Window {
        &self.window
    }

    pub fn commands(&self) -> &CommandObjects<D> {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CommandObjects<D> {
        &mut self.commands
    }

    pub fn fence(&self) -> &FenceSync<D::Fence> {
        &self.fence
    }

    pub fn swap_chain(&self) -> &SwapChain<D> {
        &self.swap_chain
    }

    pub fn rtv_heap(&self) -> &DescriptorHeap<D::Heap> {
        &self.rtv_heap
    }

    pub fn dsv_heap(&self) -> &DescriptorHeap<D::Heap> {
        &self.dsv_heap
    }
}

impl<D: GpuDevice> Drop for DeviceResources<D> {
    fn drop(&mut self) {
        // Nothing may be released while the GPU can still reference it.
        match self.fence.flush(self.commands.queue()) {
            Ok(value) => debug!(value, "GPU idle, releasing device resources"),
            Err(error) => error!(%error, "Failed to flush the GPU during teardown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::HeadlessDevice;
    use crate::gpu::headless::HeadlessOptions;
    use crate::gpu::headless::HeadlessWindow;
    use crate::gpu::headless::RecordedCommand;

    fn resources(device: &HeadlessDevice) -> DeviceResources<HeadlessDevice> {
        let mut resources =
            DeviceResources::new(device.clone(), HeadlessWindow, &AppConfig::default()).unwrap();
        resources.on_resize(800, 600).unwrap();
        resources
    }

    #[test]
    fn viewport_tracks_every_resize() {
        let device = HeadlessDevice::new();
        let mut resources = resources(&device);
        for (width, height) in [(1024, 768), (1, 1), (3840, 2160), (640, 480)] {
            resources.present().unwrap();
            resources.on_resize(width, height).unwrap();
            assert_eq!(
                resources.viewport(),
                Viewport {
                    top_left_x: 0.0,
                    top_left_y: 0.0,
                    width: width as f32,
                    height: height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }
            );
            assert_eq!(
                resources.scissor_rect(),
                ScissorRect {
                    left: 0,
                    top: 0,
                    right: width as i32,
                    bottom: height as i32,
                }
            );
            assert_eq!(resources.swap_chain().current_index(), 0);
        }
        assert_eq!(resources.resize_count(), 5);
    }

    #[test]
    fn resize_leaves_the_gpu_idle_with_depth_in_write_state() {
        let device = HeadlessDevice::with_options(HeadlessOptions {
            execution_latency: std::time::Duration::from_millis(5),
            ..Default::default()
        });
        let resources = resources(&device);
        let depth = resources.depth_stencil().unwrap();

        assert_eq!(
            resources.fence().completed_value(),
            resources.fence().current_value()
        );
        assert_eq!(
            device.executed_commands(),
            vec![RecordedCommand::Transition {
                resource: depth.id(),
                before: ResourceState::Common,
                after: ResourceState::DepthWrite,
            }]
        );
        assert_eq!(device.view_at(resources.depth_stencil_view().unwrap()), Some(depth.id()));
    }

    #[test]
    fn back_buffer_views_follow_the_current_index() {
        let device = HeadlessDevice::new();
        let mut resources = resources(&device);
        let first = resources.current_back_buffer().unwrap().id();
        assert_eq!(device.view_at(resources.current_back_buffer_view().unwrap()), Some(first));

        resources.present().unwrap();
        let second = resources.current_back_buffer().unwrap().id();
        assert_ne!(first, second);
        assert_eq!(device.view_at(resources.current_back_buffer_view().unwrap()), Some(second));
    }

    #[test]
    fn frame_transitions_the_back_buffer_and_presents() {
        let device = HeadlessDevice::new();
        let mut resources = resources(&device);
        let back_buffer = resources.current_back_buffer().unwrap().id();

        resources.begin_frame().unwrap();
        resources.end_frame().unwrap();

        let executed = device.executed_commands();
        assert_eq!(
            executed[1..],
            [
                RecordedCommand::Transition {
                    resource: back_buffer,
                    before: ResourceState::Present,
                    after: ResourceState::RenderTarget,
                },
                RecordedCommand::Transition {
                    resource: back_buffer,
                    before: ResourceState::RenderTarget,
                    after: ResourceState::Present,
                },
            ]
        );
        assert_eq!(resources.swap_chain().current_index(), 1);
        assert_eq!(
            resources.fence().completed_value(),
            resources.fence().current_value()
        );
    }

    #[test]
    fn end_frame_without_begin_is_rejected() {
        let device = HeadlessDevice::new();
        let mut resources = resources(&device);
        assert!(matches!(
            resources.end_frame(),
            Err(DeviceError::CommandListState { .. })
        ));
    }

    #[test]
    fn msaa_toggle_recreates_only_on_change() {
        let device = HeadlessDevice::new();
        let mut resources = resources(&device);
        assert_eq!(resources.swap_chain().recreation_count(), 1);

        assert!(!resources.set_msaa(false).unwrap());
        assert_eq!(resources.swap_chain().recreation_count(), 1);

        assert!(resources.set_msaa(true).unwrap());
        assert_eq!(resources.swap_chain().recreation_count(), 2);
        assert_eq!(resources.depth_stencil().unwrap().sample().count, 4);
        assert_eq!(resources.depth_stencil().unwrap().sample().quality, 3);
        assert_eq!(resources.client_size(), (800, 600));

        assert!(!resources.set_msaa(true).unwrap());
        assert_eq!(resources.swap_chain().recreation_count(), 2);
        assert_eq!(device.swap_chains_created(), 2);
    }

    #[test]
    fn msaa_requires_quality_levels() {
        let device = HeadlessDevice::with_options(HeadlessOptions {
            msaa_quality_levels: 0,
            ..Default::default()
        });
        let result = DeviceResources::new(device, HeadlessWindow, &AppConfig::default());
        assert!(matches!(
            result,
            Err(DeviceError::MsaaUnsupported {
                format: PixelFormat::Rgba8Unorm
            })
        ));
    }

    #[test]
    fn zero_sized_resize_is_rejected() {
        let device = HeadlessDevice::new();
        let mut resources = resources(&device);
        assert_eq!(
            resources.on_resize(0, 0).unwrap_err(),
            DeviceError::InvalidSize {
                width: 0,
                height: 0
            }
        );
        assert_eq!(resources.resize_count(), 1);
    }

    #[test]
    fn removed_device_fails_the_resize() {
        let device = HeadlessDevice::new();
        let mut resources = resources(&device);
        device.remove();
        let error = resources.on_resize(1024, 768).unwrap_err();
        assert!(error.is_device_removed());
        assert_eq!(error.code(), crate::device_error::DXGI_ERROR_DEVICE_REMOVED);
    }
}
