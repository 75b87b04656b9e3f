use tracing::debug;

use crate::device_error::DeviceError;
use crate::device_error::DeviceResult;
use crate::gpu::GpuAllocator;
use crate::gpu::GpuCommandList;
use crate::gpu::GpuDevice;
use crate::gpu::GpuQueue;
use crate::gpu::ResourceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    Recording,
    Closed,
}

/// The direct queue plus the single allocator/list pair every command goes through.
pub struct CommandObjects<D: GpuDevice> {
    queue: D::Queue,
    allocator: D::Allocator,
    list: D::List,
    state: ListState,
    submissions: u64,
}

impl<D: GpuDevice> CommandObjects<D> {
    pub fn new(device: &D) -> DeviceResult<Self> {
        let queue = device.create_command_queue()?;
        let allocator = device.create_command_allocator()?;
        let list = device.create_command_list(&allocator)?;
        // Lists are created open; the first user resets it, which requires it closed.
        list.close()?;
        debug!("Command queue, allocator and list created");
        Ok(Self {
            queue,
            allocator,
            list,
            state: ListState::Closed,
            submissions: 0,
        })
    }

    pub fn queue(&self) -> &D::Queue {
        &self.queue
    }

    pub fn list(&self) -> &D::List {
        &self.list
    }

    pub fn state(&self) -> ListState {
        self.state
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Only valid once the GPU has finished everything recorded from this allocator.
    pub fn reset_allocator(&mut self) -> DeviceResult<()> {
        self.require(ListState::Closed, "reset the allocator")?;
        self.allocator.reset()
    }

    pub fn reset(&mut self) -> DeviceResult<()> {
        self.require(ListState::Closed, "reset")?;
        self.list.reset(&self.allocator)?;
        self.state = ListState::Recording;
        Ok(())
    }

    pub fn transition(
        &mut self,
        resource: &D::Resource,
        before: ResourceState,
        after: ResourceState,
    ) -> DeviceResult<()> {
        self.require(ListState::Recording, "record a barrier")?;
        self.list.transition(resource, before, after);
        Ok(())
    }

    pub fn close(&mut self) -> DeviceResult<()> {
        self.require(ListState::Recording, "close")?;
        self.list.close()?;
        self.state = ListState::Closed;
        Ok(())
    }

    pub fn submit(&mut self) -> DeviceResult<()> {
        self.require(ListState::Closed, "submit")?;
        self.queue.execute(&self.list)?;
        self.submissions += 1;
        Ok(())
    }

    pub fn close_and_submit(&mut self) -> DeviceResult<()> {
        self.close()?;
        self.submit()
    }

    fn require(&self, expected: ListState, operation: &'static str) -> DeviceResult<()> {
        if self.state != expected {
            return Err(DeviceError::CommandListState {
                operation,
                expected,
                found: self.state,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::HeadlessDevice;
    use crate::gpu::headless::RecordedCommand;

    #[test]
    fn starts_closed_and_rejects_recording() {
        let device = HeadlessDevice::new();
        let mut commands = CommandObjects::new(&device).unwrap();
        assert_eq!(commands.state(), ListState::Closed);
        assert!(matches!(
            commands.close(),
            Err(DeviceError::CommandListState {
                expected: ListState::Recording,
                found: ListState::Closed,
                ..
            })
        ));
    }

    #[test]
    fn cannot_submit_while_recording() {
        let device = HeadlessDevice::new();
        let mut commands = CommandObjects::new(&device).unwrap();
        commands.reset().unwrap();
        assert!(commands.submit().is_err());
        assert!(commands.reset().is_err());
        assert_eq!(commands.submissions(), 0);
    }

    #[test]
    fn reset_clears_previous_recording() {
        let device = HeadlessDevice::new();
        let resource = device
            .create_depth_stencil_buffer(&crate::gpu::DepthStencilDesc {
                width: 4,
                height: 4,
                format: crate::gpu::PixelFormat::D24UnormS8Uint,
                sample: crate::gpu::SampleDesc::SINGLE,
                clear_depth: 1.0,
                clear_stencil: 0,
            })
            .unwrap();
        let mut commands = CommandObjects::new(&device).unwrap();

        commands.reset().unwrap();
        commands
            .transition(&resource, ResourceState::Common, ResourceState::DepthWrite)
            .unwrap();
        commands.close_and_submit().unwrap();
        assert_eq!(commands.list().recorded().len(), 1);

        commands.reset().unwrap();
        assert_eq!(commands.list().recorded(), Vec::<RecordedCommand>::new());
        assert_eq!(commands.submissions(), 1);
    }
}
