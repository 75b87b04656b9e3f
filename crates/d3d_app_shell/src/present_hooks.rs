//! Hooks that do nothing but cycle the back buffers, used by the binary.

use tracing::debug;

use crate::app_error::ShellResult;
use crate::app_shell::AppHooks;
use crate::device_resources::DeviceResources;
use crate::game_timer::GameTimer;
use crate::gpu::GpuDevice;
use crate::window_event::KeyCode;
use crate::window_event::MouseButtons;

#[derive(Debug, Default)]
pub struct PresentHooks {
    frames: u64,
    resizes: u32,
    last_size: Option<(u32, u32)>,
}

impl PresentHooks {
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn resizes(&self) -> u32 {
        self.resizes
    }

    pub fn last_size(&self) -> Option<(u32, u32)> {
        self.last_size
    }
}

impl<D: GpuDevice> AppHooks<D> for PresentHooks {
    fn on_resize(&mut self, resources: &DeviceResources<D>) -> ShellResult<()> {
        self.resizes += 1;
        self.last_size = Some(resources.client_size());
        debug!(
            size = ?resources.client_size(),
            aspect = resources.aspect_ratio(),
            "Back buffers resized"
        );
        Ok(())
    }

    fn on_update(
        &mut self,
        _timer: &GameTimer,
        _resources: &mut DeviceResources<D>,
    ) -> ShellResult<()> {
        Ok(())
    }

    fn on_draw(
        &mut self,
        _timer: &GameTimer,
        resources: &mut DeviceResources<D>,
    ) -> ShellResult<()> {
        resources.begin_frame()?;
        resources.end_frame()?;
        self.frames += 1;
        Ok(())
    }

    fn on_mouse_down(&mut self, buttons: MouseButtons, x: i32, y: i32) {
        debug!(?buttons, x, y, "Mouse down");
    }

    fn on_key_up(&mut self, key: KeyCode) {
        debug!(?key, "Key up");
    }
}
