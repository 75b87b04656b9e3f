//! The seam between the shell and a GPU API.
//!
//! The shell only ever talks to the GPU through these traits, so the resize
//! orchestration, fence bookkeeping and descriptor management are written once and
//! run unchanged on Direct3D 12 ([`d3d12`], Windows only) or on the software
//! timeline in [`headless`].

#[cfg(windows)]
pub mod d3d12;
pub mod headless;

use crate::device_error::DeviceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Float,
    D24UnormS8Uint,
    D32Float,
}

impl PixelFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, PixelFormat::D24UnormS8Uint | PixelFormat::D32Float)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDesc {
    pub count: u32,
    pub quality: u32,
}

impl SampleDesc {
    pub const SINGLE: SampleDesc = SampleDesc {
        count: 1,
        quality: 0,
    };

    /// 4x MSAA when enabled, using the highest quality level the device reported.
    pub fn for_msaa(enabled: bool, quality_levels: u32) -> Self {
        if enabled {
            SampleDesc {
                count: 4,
                quality: quality_levels.saturating_sub(1),
            }
        } else {
            SampleDesc::SINGLE
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapKind {
    RenderTarget,
    DepthStencil,
}

/// CPU address of a descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuDescriptorHandle(pub usize);

impl CpuDescriptorHandle {
    pub fn offset(self, index: u32, increment: u32) -> Self {
        CpuDescriptorHandle(self.0 + (index as usize) * (increment as usize))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Common,
    RenderTarget,
    Present,
    DepthWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
    pub sample: SampleDesc,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub sample: SampleDesc,
    pub clear_depth: f32,
    pub clear_stencil: u8,
}

pub trait GpuDevice {
    /// Native handle of the window a swap chain presents into.
    type Window: Clone;
    type Queue: GpuQueue<Fence = Self::Fence, List = Self::List>;
    type Allocator: GpuAllocator;
    type List: GpuCommandList<Allocator = Self::Allocator, Resource = Self::Resource>;
    type Fence: GpuFence;
    type Resource;
    type Heap: GpuDescriptorHeap;
    type SwapChain: GpuSwapChain<Resource = Self::Resource>;

    fn create_command_queue(&self) -> DeviceResult<Self::Queue>;
    fn create_command_allocator(&self) -> DeviceResult<Self::Allocator>;
    /// Lists come back open for recording, like `CreateCommandList`.
    fn create_command_list(&self, allocator: &Self::Allocator) -> DeviceResult<Self::List>;
    fn create_fence(&self, initial_value: u64) -> DeviceResult<Self::Fence>;
    fn create_descriptor_heap(&self, kind: HeapKind, capacity: u32) -> DeviceResult<Self::Heap>;
    fn descriptor_increment_size(&self, kind: HeapKind) -> u32;
    fn msaa_quality_levels(&self, format: PixelFormat, sample_count: u32) -> DeviceResult<u32>;
    fn create_swap_chain(
        &self,
        queue: &Self::Queue,
        window: &Self::Window,
        desc: &SwapChainDesc,
    ) -> DeviceResult<Self::SwapChain>;
    fn create_render_target_view(&self, resource: &Self::Resource, handle: CpuDescriptorHandle);
    fn create_depth_stencil_buffer(&self, desc: &DepthStencilDesc) -> DeviceResult<Self::Resource>;
    fn create_depth_stencil_view(
        &self,
        resource: &Self::Resource,
        format: PixelFormat,
        handle: CpuDescriptorHandle,
    );
}

pub trait GpuQueue {
    type Fence;
    type List;

    fn execute(&self, list: &Self::List) -> DeviceResult<()>;
    /// Enqueue a command that sets `fence` to `value` once everything before it ran.
    fn signal(&self, fence: &Self::Fence, value: u64) -> DeviceResult<()>;
}

pub trait GpuAllocator {
    fn reset(&self) -> DeviceResult<()>;
}

pub trait GpuCommandList {
    type Allocator;
    type Resource;

    fn reset(&self, allocator: &Self::Allocator) -> DeviceResult<()>;
    fn transition(&self, resource: &Self::Resource, before: ResourceState, after: ResourceState);
    fn close(&self) -> DeviceResult<()>;
}

pub trait GpuFence {
    fn completed_value(&self) -> u64;
    /// Block until the GPU has completed `value`. Never times out.
    fn wait_for(&self, value: u64) -> DeviceResult<()>;
}

pub trait GpuDescriptorHeap {
    fn cpu_start(&self) -> CpuDescriptorHandle;
}

pub trait GpuSwapChain {
    type Resource;

    fn resize_buffers(
        &self,
        buffer_count: u32,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> DeviceResult<()>;
    fn buffer(&self, index: u32) -> DeviceResult<Self::Resource>;
    fn present(&self, sync_interval: u32) -> DeviceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msaa_sample_desc_uses_top_quality_level() {
        assert_eq!(
            SampleDesc::for_msaa(true, 4),
            SampleDesc {
                count: 4,
                quality: 3
            }
        );
        assert_eq!(SampleDesc::for_msaa(false, 4), SampleDesc::SINGLE);
    }

    #[test]
    fn depth_descs_compare_by_clear_value() {
        let desc = DepthStencilDesc {
            width: 800,
            height: 600,
            format: PixelFormat::D24UnormS8Uint,
            sample: SampleDesc::SINGLE,
            clear_depth: 1.0,
            clear_stencil: 0,
        };
        assert_eq!(desc, desc);
        assert_ne!(
            desc,
            DepthStencilDesc {
                clear_depth: 0.5,
                ..desc
            }
        );
    }

    #[test]
    fn descriptor_handles_step_by_increment() {
        let start = CpuDescriptorHandle(0x1000);
        assert_eq!(start.offset(0, 32), start);
        assert_eq!(start.offset(2, 32), CpuDescriptorHandle(0x1040));
    }
}
