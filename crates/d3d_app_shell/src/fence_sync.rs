use tracing::debug;

use crate::device_error::DeviceResult;
use crate::gpu::GpuDevice;
use crate::gpu::GpuFence;
use crate::gpu::GpuQueue;

/// CPU/GPU synchronization through one fence and a monotonically increasing target.
pub struct FenceSync<F> {
    fence: F,
    current_value: u64,
}

impl<F: GpuFence> FenceSync<F> {
    pub fn new<D>(device: &D) -> DeviceResult<Self>
    where
        D: GpuDevice<Fence = F>,
    {
        Ok(Self {
            fence: device.create_fence(0)?,
            current_value: 0,
        })
    }

    /// Last value handed to the queue.
    pub fn current_value(&self) -> u64 {
        self.current_value
    }

    pub fn completed_value(&self) -> u64 {
        self.fence.completed_value()
    }

    /// Signal a fresh value on `queue` and block until the GPU reaches it.
    ///
    /// When this returns, everything submitted to `queue` before the call has
    /// finished executing. Work submitted afterwards is not covered.
    pub fn flush<Q>(&mut self, queue: &Q) -> DeviceResult<u64>
    where
        Q: GpuQueue<Fence = F>,
    {
        self.current_value += 1;
        let target = self.current_value;
        queue.signal(&self.fence, target)?;

        if self.fence.completed_value() < target {
            self.fence.wait_for(target)?;
        }
        debug!(target, "GPU flushed");
        Ok(target)
    }
}
