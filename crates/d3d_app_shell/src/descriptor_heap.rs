use crate::device_error::DeviceError;
use crate::device_error::DeviceResult;
use crate::gpu::CpuDescriptorHandle;
use crate::gpu::GpuDescriptorHeap;
use crate::gpu::GpuDevice;
use crate::gpu::HeapKind;

/// A fixed-capacity, CPU-visible descriptor heap.
///
/// Views are never freed one at a time. A resize calls [`DescriptorHeap::invalidate`]
/// and writes every slot again.
pub struct DescriptorHeap<H> {
    heap: H,
    kind: HeapKind,
    capacity: u32,
    increment: u32,
    populated: Vec<bool>,
}

impl<H: GpuDescriptorHeap> DescriptorHeap<H> {
    pub fn new<D>(device: &D, kind: HeapKind, capacity: u32) -> DeviceResult<Self>
    where
        D: GpuDevice<Heap = H>,
    {
        Ok(Self {
            heap: device.create_descriptor_heap(kind, capacity)?,
            kind,
            capacity,
            increment: device.descriptor_increment_size(kind),
            populated: vec![false; capacity as usize],
        })
    }

    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn increment(&self) -> u32 {
        self.increment
    }

    pub fn handle(&self, slot: u32) -> DeviceResult<CpuDescriptorHandle> {
        if slot >= self.capacity {
            return Err(DeviceError::DescriptorSlot {
                slot,
                capacity: self.capacity,
            });
        }
        Ok(self.heap.cpu_start().offset(slot, self.increment))
    }

    /// Handle for a view about to be written into `slot`.
    pub fn claim(&mut self, slot: u32) -> DeviceResult<CpuDescriptorHandle> {
        let handle = self.handle(slot)?;
        self.populated[slot as usize] = true;
        Ok(handle)
    }

    pub fn invalidate(&mut self) {
        self.populated.fill(false);
    }

    pub fn populated(&self) -> u32 {
        self.populated.iter().filter(|written| **written).count() as u32
    }

    pub fn raw(&self) -> &H {
        &self.heap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::HeadlessDevice;

    #[test]
    fn slots_are_spaced_by_the_device_increment() {
        let device = HeadlessDevice::new();
        let heap = DescriptorHeap::new(&device, HeapKind::RenderTarget, 2).unwrap();
        let first = heap.handle(0).unwrap();
        let second = heap.handle(1).unwrap();
        assert_eq!(second.0 - first.0, heap.increment() as usize);
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let device = HeadlessDevice::new();
        let mut heap = DescriptorHeap::new(&device, HeapKind::DepthStencil, 1).unwrap();
        assert_eq!(
            heap.claim(1).unwrap_err(),
            DeviceError::DescriptorSlot {
                slot: 1,
                capacity: 1
            }
        );
        assert_eq!(heap.populated(), 0);
    }

    #[test]
    fn invalidate_forgets_written_slots() {
        let device = HeadlessDevice::new();
        let mut heap = DescriptorHeap::new(&device, HeapKind::RenderTarget, 3).unwrap();
        heap.claim(0).unwrap();
        heap.claim(2).unwrap();
        assert_eq!(heap.populated(), 2);
        heap.invalidate();
        assert_eq!(heap.populated(), 0);
    }
}
