//! Direct3D 12 / DXGI backend.

use std::mem::ManuallyDrop;

use tracing::debug;
use tracing::info;
use tracing::warn;
use windows::Win32::Foundation::CloseHandle;
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Foundation::HWND;
use windows::Win32::Foundation::WAIT_EVENT;
use windows::Win32::Foundation::WAIT_OBJECT_0;
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_11_0;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::CreateEventA;
use windows::Win32::System::Threading::INFINITE;
use windows::Win32::System::Threading::WaitForSingleObject;
use windows::core::Interface;

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
use super::SwapChainDesc;
use crate::device_error::DeviceError;
use crate::device_error::DeviceResult;
use crate::device_error::E_FAIL;

fn dxgi_format(format: PixelFormat) -> DXGI_FORMAT {
    match format {
        PixelFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        PixelFormat::Bgra8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
        PixelFormat::Rgba16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        PixelFormat::D24UnormS8Uint => DXGI_FORMAT_D24_UNORM_S8_UINT,
        PixelFormat::D32Float => DXGI_FORMAT_D32_FLOAT,
    }
}

fn resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Common => D3D12_RESOURCE_STATE_COMMON,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ResourceState::DepthWrite => D3D12_RESOURCE_STATE_DEPTH_WRITE,
    }
}

fn heap_type(kind: HeapKind) -> D3D12_DESCRIPTOR_HEAP_TYPE {
    match kind {
        HeapKind::RenderTarget => D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
        HeapKind::DepthStencil => D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
    }
}

fn transition_barrier(
    resource: &ID3D12Resource,
    state_before: D3D12_RESOURCE_STATES,
    state_after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            // Borrowed pointer: no AddRef here, and ManuallyDrop means no Release either.
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: unsafe { std::mem::transmute_copy(resource) },
                StateBefore: state_before,
                StateAfter: state_after,
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
            }),
        },
    }
}

fn adapter_name(desc: &DXGI_ADAPTER_DESC1) -> String {
    String::from_utf16_lossy(&desc.Description)
        .trim_end_matches('\0')
        .to_owned()
}

fn is_software(desc: &DXGI_ADAPTER_DESC1) -> bool {
    (DXGI_ADAPTER_FLAG(desc.Flags as i32) & DXGI_ADAPTER_FLAG_SOFTWARE) != DXGI_ADAPTER_FLAG_NONE
}

/// First hardware adapter that can create a feature level 11.0 device.
fn get_hardware_adapter(factory: &IDXGIFactory4) -> Option<IDXGIAdapter1> {
    let mut index = 0;
    while let Ok(adapter) = unsafe { factory.EnumAdapters1(index) } {
        index += 1;
        let Ok(desc) = (unsafe { adapter.GetDesc1() }) else {
            continue;
        };
        if is_software(&desc) {
            continue;
        }
        let supported = unsafe {
            D3D12CreateDevice(
                &adapter,
                D3D_FEATURE_LEVEL_11_0,
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
        }
        .is_ok();
        if supported {
            info!(adapter = %adapter_name(&desc), "Using hardware adapter");
            return Some(adapter);
        }
    }
    None
}

/// Walk every adapter, its outputs and their display modes for the back-buffer format.
pub fn log_adapters(factory: &IDXGIFactory4, format: PixelFormat) {
    let mode_format = dxgi_format(format);
    let mut adapter_index = 0;
    while let Ok(adapter) = unsafe { factory.EnumAdapters1(adapter_index) } {
        adapter_index += 1;
        let Ok(desc) = (unsafe { adapter.GetDesc1() }) else {
            continue;
        };
        debug!(adapter = %adapter_name(&desc), software = is_software(&desc), "Adapter");

        let mut output_index = 0;
        while let Ok(output) = unsafe { adapter.EnumOutputs(output_index) } {
            output_index += 1;
            let Ok(output_desc) = (unsafe { output.GetDesc() }) else {
                continue;
            };
            let output_name = String::from_utf16_lossy(&output_desc.DeviceName)
                .trim_end_matches('\0')
                .to_owned();
            debug!(output = %output_name, "Output");

            let mut count = 0u32;
            if unsafe {
                output.GetDisplayModeList(mode_format, DXGI_ENUM_MODES(0), &mut count, None)
            }
            .is_err()
            {
                continue;
            }
            let mut modes = vec![DXGI_MODE_DESC::default(); count as usize];
            if unsafe {
                output.GetDisplayModeList(
                    mode_format,
                    DXGI_ENUM_MODES(0),
                    &mut count,
                    Some(modes.as_mut_ptr()),
                )
            }
            .is_err()
            {
                continue;
            }
            for mode in modes.iter().take(count as usize) {
                debug!(
                    width = mode.Width,
                    height = mode.Height,
                    refresh = format_args!(
                        "{}/{}",
                        mode.RefreshRate.Numerator, mode.RefreshRate.Denominator
                    ),
                    "Display mode"
                );
            }
        }
    }
}

#[derive(Clone)]
pub struct D3d12Device {
    factory: IDXGIFactory4,
    device: ID3D12Device,
}

impl D3d12Device {
    /// Create a device on the first capable hardware adapter, falling back to WARP.
    pub fn create(use_warp_device: bool) -> DeviceResult<Self> {
        let mut debug_flags = DXGI_CREATE_FACTORY_FLAGS(0);
        if cfg!(debug_assertions) {
            unsafe {
                let mut debug: Option<ID3D12Debug> = None;
                if let Some(debug) = D3D12GetDebugInterface(&mut debug).ok().and(debug) {
                    debug.EnableDebugLayer();
                    debug_flags |= DXGI_CREATE_FACTORY_DEBUG;
                    info!("D3D12 debug layer enabled");
                } else {
                    warn!("D3D12 debug layer unavailable");
                }
            }
        }

        let factory: IDXGIFactory4 = unsafe { CreateDXGIFactory2(debug_flags) }?;

        let hardware = if use_warp_device {
            None
        } else {
            get_hardware_adapter(&factory)
        };
        let adapter: IDXGIAdapter1 = match hardware {
            Some(adapter) => adapter,
            None => {
                info!("Using WARP adapter");
                unsafe { factory.EnumWarpAdapter()? }
            }
        };

        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device) }?;
        let device = device
            .ok_or_else(|| DeviceError::api(E_FAIL, "D3D12CreateDevice returned no device"))?;
        Ok(Self { factory, device })
    }

    pub fn factory(&self) -> &IDXGIFactory4 {
        &self.factory
    }

    pub fn raw(&self) -> &ID3D12Device {
        &self.device
    }
}

pub struct D3d12Fence {
    fence: ID3D12Fence,
    event: HANDLE,
}

impl D3d12Fence {
    pub fn raw(&self) -> &ID3D12Fence {
        &self.fence
    }
}

impl GpuFence for D3d12Fence {
    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn wait_for(&self, value: u64) -> DeviceResult<()> {
        let result = unsafe {
            self.fence.SetEventOnCompletion(value, self.event)?;
            WaitForSingleObject(self.event, INFINITE)
        };
        check_wait(result, value)
    }
}

/// Anything but a signalled event means the fence value was never observed.
fn check_wait(result: WAIT_EVENT, value: u64) -> DeviceResult<()> {
    if result == WAIT_OBJECT_0 {
        return Ok(());
    }
    let code = windows::core::Error::from_win32().code();
    let code = if code.is_ok() { E_FAIL } else { code.0 };
    Err(DeviceError::api(
        code,
        format!("waiting for fence value {value} returned {:#x}", result.0),
    ))
}

impl Drop for D3d12Fence {
    fn drop(&mut self) {
        if !self.event.is_invalid() {
            if let Err(error) = unsafe { CloseHandle(self.event) } {
                warn!(%error, "Failed to close the fence event");
            }
        }
    }
}

impl GpuQueue for ID3D12CommandQueue {
    type Fence = D3d12Fence;
    type List = ID3D12GraphicsCommandList;

    fn execute(&self, list: &ID3D12GraphicsCommandList) -> DeviceResult<()> {
        let command_lists = [Some(list.cast::<ID3D12CommandList>()?)];
        unsafe { self.ExecuteCommandLists(&command_lists) };
        Ok(())
    }

    fn signal(&self, fence: &D3d12Fence, value: u64) -> DeviceResult<()> {
        unsafe { self.Signal(&fence.fence, value)? };
        Ok(())
    }
}

impl GpuAllocator for ID3D12CommandAllocator {
    fn reset(&self) -> DeviceResult<()> {
        unsafe { self.Reset()? };
        Ok(())
    }
}

impl GpuCommandList for ID3D12GraphicsCommandList {
    type Allocator = ID3D12CommandAllocator;
    type Resource = ID3D12Resource;

    fn reset(&self, allocator: &ID3D12CommandAllocator) -> DeviceResult<()> {
        unsafe { self.Reset(allocator, None)? };
        Ok(())
    }

    fn transition(&self, resource: &ID3D12Resource, before: ResourceState, after: ResourceState) {
        let barrier = transition_barrier(resource, resource_state(before), resource_state(after));
        unsafe { self.ResourceBarrier(&[barrier]) };
    }

    fn close(&self) -> DeviceResult<()> {
        unsafe { self.Close()? };
        Ok(())
    }
}

impl GpuDescriptorHeap for ID3D12DescriptorHeap {
    fn cpu_start(&self) -> CpuDescriptorHandle {
        CpuDescriptorHandle(unsafe { self.GetCPUDescriptorHandleForHeapStart() }.ptr)
    }
}

impl GpuSwapChain for IDXGISwapChain3 {
    type Resource = ID3D12Resource;

    fn resize_buffers(
        &self,
        buffer_count: u32,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> DeviceResult<()> {
        unsafe {
            self.ResizeBuffers(
                buffer_count,
                width,
                height,
                dxgi_format(format),
                DXGI_SWAP_CHAIN_FLAG_ALLOW_MODE_SWITCH,
            )?
        };
        Ok(())
    }

    fn buffer(&self, index: u32) -> DeviceResult<ID3D12Resource> {
        Ok(unsafe { self.GetBuffer(index)? })
    }

    fn present(&self, sync_interval: u32) -> DeviceResult<()> {
        unsafe { self.Present(sync_interval, DXGI_PRESENT::default()) }.ok()?;
        Ok(())
    }
}

impl GpuDevice for D3d12Device {
    type Window = HWND;
    type Queue = ID3D12CommandQueue;
    type Allocator = ID3D12CommandAllocator;
    type List = ID3D12GraphicsCommandList;
    type Fence = D3d12Fence;
    type Resource = ID3D12Resource;
    type Heap = ID3D12DescriptorHeap;
    type SwapChain = IDXGISwapChain3;

    fn create_command_queue(&self) -> DeviceResult<ID3D12CommandQueue> {
        let queue = unsafe {
            self.device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
                ..Default::default()
            })?
        };
        Ok(queue)
    }

    fn create_command_allocator(&self) -> DeviceResult<ID3D12CommandAllocator> {
        Ok(unsafe {
            self.device
                .CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)?
        })
    }

    fn create_command_list(
        &self,
        allocator: &ID3D12CommandAllocator,
    ) -> DeviceResult<ID3D12GraphicsCommandList> {
        Ok(unsafe {
            self.device
                .CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, allocator, None)?
        })
    }

    fn create_fence(&self, initial_value: u64) -> DeviceResult<D3d12Fence> {
        let fence = unsafe { self.device.CreateFence(initial_value, D3D12_FENCE_FLAG_NONE)? };
        let event = unsafe { CreateEventA(None, false, false, None)? };
        Ok(D3d12Fence { fence, event })
    }

    fn create_descriptor_heap(
        &self,
        kind: HeapKind,
        capacity: u32,
    ) -> DeviceResult<ID3D12DescriptorHeap> {
        Ok(unsafe {
            self.device
                .CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                    Type: heap_type(kind),
                    NumDescriptors: capacity,
                    Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
                    NodeMask: 0,
                })?
        })
    }

    fn descriptor_increment_size(&self, kind: HeapKind) -> u32 {
        unsafe { self.device.GetDescriptorHandleIncrementSize(heap_type(kind)) }
    }

    fn msaa_quality_levels(&self, format: PixelFormat, sample_count: u32) -> DeviceResult<u32> {
        let mut levels = D3D12_FEATURE_DATA_MULTISAMPLE_QUALITY_LEVELS {
            Format: dxgi_format(format),
            SampleCount: sample_count,
            Flags: D3D12_MULTISAMPLE_QUALITY_LEVELS_FLAG_NONE,
            NumQualityLevels: 0,
        };
        unsafe {
            self.device.CheckFeatureSupport(
                D3D12_FEATURE_MULTISAMPLE_QUALITY_LEVELS,
                &mut levels as *mut _ as *mut _,
                std::mem::size_of::<D3D12_FEATURE_DATA_MULTISAMPLE_QUALITY_LEVELS>() as u32,
            )?
        };
        Ok(levels.NumQualityLevels)
    }

    fn create_swap_chain(
        &self,
        queue: &ID3D12CommandQueue,
        window: &HWND,
        desc: &SwapChainDesc,
    ) -> DeviceResult<IDXGISwapChain3> {
        // Flip-model chains cannot be multisampled; MSAA only reaches the depth buffer
        // and whatever the app renders into before resolving.
        let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: desc.width,
            Height: desc.height,
            Format: dxgi_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: desc.buffer_count,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            Flags: DXGI_SWAP_CHAIN_FLAG_ALLOW_MODE_SWITCH.0 as u32,
            ..Default::default()
        };
        let swap_chain: IDXGISwapChain1 = unsafe {
            self.factory
                .CreateSwapChainForHwnd(queue, *window, &swap_chain_desc, None, None)?
        };
        Ok(swap_chain.cast()?)
    }

    fn create_render_target_view(&self, resource: &ID3D12Resource, handle: CpuDescriptorHandle) {
        unsafe {
            self.device.CreateRenderTargetView(
                resource,
                None,
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.0 },
            )
        };
    }

    fn create_depth_stencil_buffer(&self, desc: &DepthStencilDesc) -> DeviceResult<ID3D12Resource> {
        let format = dxgi_format(desc.format);
        let clear = D3D12_CLEAR_VALUE {
            Format: format,
            Anonymous: D3D12_CLEAR_VALUE_0 {
                DepthStencil: D3D12_DEPTH_STENCIL_VALUE {
                    Depth: desc.clear_depth,
                    Stencil: desc.clear_stencil,
                },
            },
        };
        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.device.CreateCommittedResource(
                &D3D12_HEAP_PROPERTIES {
                    Type: D3D12_HEAP_TYPE_DEFAULT,
                    ..Default::default()
                },
                D3D12_HEAP_FLAG_NONE,
                &D3D12_RESOURCE_DESC {
                    Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
                    Alignment: 0,
                    Width: desc.width as u64,
                    Height: desc.height,
                    DepthOrArraySize: 1,
                    MipLevels: 1,
                    Format: format,
                    SampleDesc: DXGI_SAMPLE_DESC {
                        Count: desc.sample.count,
                        Quality: desc.sample.quality,
                    },
                    Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
                    Flags: D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
                },
                D3D12_RESOURCE_STATE_COMMON,
                Some(&clear),
                &mut resource,
            )?
        };
        resource
            .ok_or_else(|| DeviceError::api(E_FAIL, "CreateCommittedResource returned no resource"))
    }

    fn create_depth_stencil_view(
        &self,
        resource: &ID3D12Resource,
        _format: PixelFormat,
        handle: CpuDescriptorHandle,
    ) {
        // The resource has a typed format, so the runtime derives the view, including
        // the multisampled dimension, from it.
        unsafe {
            self.device.CreateDepthStencilView(
                resource,
                None,
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.0 },
            )
        };
    }
}

#[cfg(test)]
mod tests {
    use windows::Win32::Foundation::WAIT_FAILED;

    use super::*;

    #[test]
    fn only_a_signalled_event_counts_as_completion() {
        check_wait(WAIT_OBJECT_0, 1).unwrap();

        let failed = check_wait(WAIT_FAILED, 7).unwrap_err();
        assert_ne!(failed.code(), 0);
        assert!(failed.to_string().contains("fence value 7"));
        // WAIT_TIMEOUT
        assert!(check_wait(WAIT_EVENT(0x102), 7).is_err());
    }

    #[test]
    fn fence_wait_observes_the_signalled_value() {
        let device = D3d12Device::create(true).unwrap();
        let queue = device.create_command_queue().unwrap();
        let fence = device.create_fence(0).unwrap();
        queue.signal(&fence, 1).unwrap();
        fence.wait_for(1).unwrap();
        assert!(fence.completed_value() >= 1);
    }
}
