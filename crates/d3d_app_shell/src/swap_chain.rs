use tracing::info;

use crate::device_error::DXGI_ERROR_INVALID_CALL;
use crate::device_error::DeviceError;
use crate::device_error::DeviceResult;
use crate::gpu::GpuDevice;
use crate::gpu::GpuSwapChain;
use crate::gpu::SwapChainDesc;

/// Owns the presentation chain and the back-buffer references fetched from it.
pub struct SwapChain<D: GpuDevice> {
    chain: Option<D::SwapChain>,
    buffers: Vec<D::Resource>,
    desc: SwapChainDesc,
    current: u32,
    recreations: u64,
}

impl<D: GpuDevice> SwapChain<D> {
    pub fn create(
        device: &D,
        queue: &D::Queue,
        window: &D::Window,
        desc: SwapChainDesc,
    ) -> DeviceResult<Self> {
        let mut swap_chain = Self {
            chain: None,
            buffers: Vec::with_capacity(desc.buffer_count as usize),
            desc,
            current: 0,
            recreations: 0,
        };
        swap_chain.recreate(device, queue, window, desc)?;
        Ok(swap_chain)
    }

    /// Throw the current chain away and build a new one bound to `queue`.
    ///
    /// The caller must have flushed the queue; the old chain's buffers are released
    /// here before it is dropped.
    pub fn recreate(
        &mut self,
        device: &D,
        queue: &D::Queue,
        window: &D::Window,
        desc: SwapChainDesc,
    ) -> DeviceResult<()> {
        if desc.buffer_count == 0 {
            return Err(DeviceError::api(
                DXGI_ERROR_INVALID_CALL,
                "a swap chain needs at least one buffer",
            ));
        }
        self.release_buffers();
        self.chain = None;

        let chain = device.create_swap_chain(queue, window, &desc)?;
        self.chain = Some(chain);
        self.desc = desc;
        self.current = 0;
        self.recreations += 1;
        info!(
            width = desc.width,
            height = desc.height,
            buffers = desc.buffer_count,
            samples = desc.sample.count,
            "Swap chain created"
        );
        Ok(())
    }

    pub fn release_buffers(&mut self) -> usize {
        let released = self.buffers.len();
        self.buffers.clear();
        released
    }

    /// Resize every buffer in place, keeping count and format.
    pub fn resize(&mut self, width: u32, height: u32) -> DeviceResult<()> {
        if !self.buffers.is_empty() {
            return Err(DeviceError::BuffersOutstanding {
                count: self.buffers.len(),
            });
        }
        if width == 0 || height == 0 {
            return Err(DeviceError::InvalidSize { width, height });
        }
        let chain = self.chain.as_ref().ok_or(DeviceError::NoSwapChain)?;
        chain.resize_buffers(self.desc.buffer_count, width, height, self.desc.format)?;
        self.desc.width = width;
        self.desc.height = height;
        Ok(())
    }

    pub fn fetch_buffers(&mut self) -> DeviceResult<&[D::Resource]> {
        let chain = self.chain.as_ref().ok_or(DeviceError::NoSwapChain)?;
        self.buffers.clear();
        for index in 0..self.desc.buffer_count {
            self.buffers.push(chain.buffer(index)?);
        }
        Ok(&self.buffers)
    }

    pub fn present(&mut self, sync_interval: u32) -> DeviceResult<()> {
        let chain = self.chain.as_ref().ok_or(DeviceError::NoSwapChain)?;
        chain.present(sync_interval)?;
        self.current = (self.current + 1) % self.desc.buffer_count;
        Ok(())
    }

    pub fn reset_current(&mut self) {
        self.current = 0;
    }

    pub fn current_index(&self) -> u32 {
        self.current
    }

    pub fn current_buffer(&self) -> Option<&D::Resource> {
        self.buffers.get(self.current as usize)
    }

    pub fn buffers(&self) -> &[D::Resource] {
        &self.buffers
    }

    pub fn desc(&self) -> &SwapChainDesc {
        &self.desc
    }

    pub fn recreation_count(&self) -> u64 {
        self.recreations
    }

    pub fn raw(&self) -> Option<&D::SwapChain> {
        self.chain.as_ref()
    }
}
