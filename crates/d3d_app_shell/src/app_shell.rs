use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tracing::debug;
use tracing::info;

use crate::app_error::ShellError;
use crate::app_error::ShellResult;
use crate::config::AppConfig;
use crate::device_resources::DeviceResources;
use crate::frame_stats::FrameStats;
use crate::game_timer::Clock;
use crate::game_timer::GameTimer;
use crate::game_timer::SystemClock;
use crate::gpu::GpuDevice;
use crate::resize_state::ResizeAction;
use crate::resize_state::ResizeOrchestrator;
use crate::resize_state::TimerControl;
use crate::window_event::KeyCode;
use crate::window_event::MouseButtons;
use crate::window_event::WindowEvent;

/// The application-specific half of the shell. Every hook runs on the thread that
/// drives the run loop.
pub trait AppHooks<D: GpuDevice> {
    /// Called once after the device resources exist and have been sized.
    fn on_initialize(&mut self, _resources: &mut DeviceResources<D>) -> ShellResult<()> {
        Ok(())
    }

    /// Called after every rebuild of the size-dependent resources.
    fn on_resize(&mut self, _resources: &DeviceResources<D>) -> ShellResult<()> {
        Ok(())
    }

    fn on_update(&mut self, timer: &GameTimer, resources: &mut DeviceResources<D>)
    -> ShellResult<()>;

    fn on_draw(&mut self, timer: &GameTimer, resources: &mut DeviceResources<D>)
    -> ShellResult<()>;

    fn on_mouse_down(&mut self, _buttons: MouseButtons, _x: i32, _y: i32) {}
    fn on_mouse_up(&mut self, _buttons: MouseButtons, _x: i32, _y: i32) {}
    fn on_mouse_move(&mut self, _buttons: MouseButtons, _x: i32, _y: i32) {}
    fn on_key_up(&mut self, _key: KeyCode) {}
}

static SHELL_RUNNING: AtomicBool = AtomicBool::new(false);

/// Held for as long as an [`AppShell`] is alive.
struct InstanceGuard;

impl InstanceGuard {
    fn acquire() -> Result<Self, ShellError> {
        SHELL_RUNNING
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InstanceGuard)
            .map_err(|_| ShellError::AlreadyRunning)
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        SHELL_RUNNING.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Paused,
    /// `title` is set once per second with fresh frame statistics.
    Rendered { title: Option<String> },
}

pub struct AppShell<D: GpuDevice, H: AppHooks<D>> {
    config: AppConfig,
    hooks: H,
    timer: GameTimer,
    stats: FrameStats,
    orchestrator: ResizeOrchestrator,
    resources: Option<DeviceResources<D>>,
    quit: Option<i32>,
    // Released last so a new shell cannot start while this one still owns the GPU.
    _instance: InstanceGuard,
}

impl<D: GpuDevice, H: AppHooks<D>> AppShell<D, H> {
    pub fn new(config: AppConfig, hooks: H) -> ShellResult<Self> {
        Self::with_clock(config, hooks, SystemClock::new())
    }

    pub fn with_clock(
        config: AppConfig,
        hooks: H,
        clock: impl Clock + 'static,
    ) -> ShellResult<Self> {
        let instance = InstanceGuard::acquire()?;
        let orchestrator = ResizeOrchestrator::new(config.client_width, config.client_height);
        Ok(Self {
            config,
            hooks,
            timer: GameTimer::with_clock(clock),
            stats: FrameStats::new(),
            orchestrator,
            resources: None,
            quit: None,
            _instance: instance,
        })
    }

    /// Build the device resources for `window`, size them and hand them to the hooks.
    pub fn initialize(&mut self, device: D, window: D::Window) -> ShellResult<()> {
        let mut resources = DeviceResources::new(device, window, &self.config)?;
        let (width, height) = self.orchestrator.client_size();
        resources.on_resize(width, height)?;
        self.hooks.on_resize(&resources)?;
        self.hooks.on_initialize(&mut resources)?;

        self.resources = Some(resources);
        self.orchestrator.set_device_ready();
        self.timer.reset();
        info!(width, height, msaa = self.config.msaa_enabled, "Shell initialized");
        Ok(())
    }

    pub fn handle_event(&mut self, event: WindowEvent) -> ShellResult<()> {
        match event {
            WindowEvent::Activated(active) => {
                let action = self.orchestrator.on_activate(active);
                self.apply(action)?;
            }
            WindowEvent::Resized {
                kind,
                width,
                height,
            } => {
                let action = self.orchestrator.on_size(kind, width, height);
                self.apply(action)?;
            }
            WindowEvent::EnterSizeMove => {
                let action = self.orchestrator.on_enter_size_move();
                self.apply(action)?;
            }
            WindowEvent::ExitSizeMove => {
                let action = self.orchestrator.on_exit_size_move();
                self.apply(action)?;
            }
            WindowEvent::Destroyed => self.request_quit(0),
            WindowEvent::KeyUp(key) if key == self.config.quit_key => self.request_quit(0),
            WindowEvent::KeyUp(key) if key == self.config.msaa_toggle_key => {
                let enabled = !self.msaa_enabled();
                self.set_msaa(enabled)?;
            }
            WindowEvent::KeyUp(key) => self.hooks.on_key_up(key),
            WindowEvent::MouseDown(_, mouse) => {
                self.hooks.on_mouse_down(mouse.buttons, mouse.x, mouse.y)
            }
            WindowEvent::MouseUp(_, mouse) => {
                self.hooks.on_mouse_up(mouse.buttons, mouse.x, mouse.y)
            }
            WindowEvent::MouseMove(mouse) => {
                self.hooks.on_mouse_move(mouse.buttons, mouse.x, mouse.y)
            }
        }
        Ok(())
    }

    fn apply(&mut self, action: ResizeAction) -> ShellResult<()> {
        match action.timer {
            Some(TimerControl::Stop) => self.timer.stop(),
            Some(TimerControl::Start) => self.timer.start(),
            None => {}
        }
        if action.resize {
            let resources = self.resources.as_mut().ok_or(ShellError::NotInitialized)?;
            let (width, height) = self.orchestrator.client_size();
            resources.on_resize(width, height)?;
            self.hooks.on_resize(resources)?;
        }
        Ok(())
    }

    /// Switch 4x MSAA. Before initialization this only changes the starting mode.
    pub fn set_msaa(&mut self, enabled: bool) -> ShellResult<()> {
        let Some(resources) = self.resources.as_mut() else {
            self.config.msaa_enabled = enabled;
            return Ok(());
        };
        if resources.set_msaa(enabled)? {
            self.config.msaa_enabled = enabled;
            self.hooks.on_resize(resources)?;
        }
        Ok(())
    }

    pub fn msaa_enabled(&self) -> bool {
        match &self.resources {
            Some(resources) => resources.msaa_enabled(),
            None => self.config.msaa_enabled,
        }
    }

    /// Advance one frame: tick the timer and, unless paused, update and draw.
    pub fn frame(&mut self) -> ShellResult<FrameOutcome> {
        self.timer.tick();
        if self.orchestrator.is_paused() {
            return Ok(FrameOutcome::Paused);
        }
        let resources = self.resources.as_mut().ok_or(ShellError::NotInitialized)?;

        let title = self
            .stats
            .record(self.timer.total_time())
            .map(|sample| sample.caption(&self.config.title));
        self.hooks.on_update(&self.timer, resources)?;
        self.hooks.on_draw(&self.timer, resources)?;
        Ok(FrameOutcome::Rendered { title })
    }

    pub fn request_quit(&mut self, code: i32) {
        debug!(code, "Quit requested");
        self.quit.get_or_insert(code);
    }

    pub fn quit_requested(&self) -> Option<i32> {
        self.quit
    }

    pub fn is_paused(&self) -> bool {
        self.orchestrator.is_paused()
    }

    pub fn reset_timer(&mut self) {
        self.timer.reset();
    }

    pub fn timer(&self) -> &GameTimer {
        &self.timer
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &ResizeOrchestrator {
        &self.orchestrator
    }

    pub fn resources(&self) -> Option<&DeviceResources<D>> {
        self.resources.as_ref()
    }

    pub fn resources_mut(&mut self) -> Option<&mut DeviceResources<D>> {
        self.resources.as_mut()
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }
}

#[cfg(test)]
pub(crate) static SHELL_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());
