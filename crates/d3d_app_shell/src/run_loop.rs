use std::collections::VecDeque;

use tracing::info;

use crate::app_error::ShellResult;
use crate::app_shell::AppHooks;
use crate::app_shell::AppShell;
use crate::app_shell::FrameOutcome;
use crate::gpu::GpuDevice;
use crate::window_event::WindowEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum PumpMessage {
    Event(WindowEvent),
    /// The queue is drained; time to render a frame.
    Empty,
    Quit(i32),
}

/// Source of window messages for [`run`].
pub trait MessagePump {
    /// Next pending message. Must not block.
    fn next_message(&mut self) -> PumpMessage;

    fn set_title(&mut self, title: &str) -> ShellResult<()>;
}

/// Drive `app` until the pump or the app asks to quit, returning the exit code.
pub fn run<D, H, P>(app: &mut AppShell<D, H>, pump: &mut P) -> ShellResult<i32>
where
    D: GpuDevice,
    H: AppHooks<D>,
    P: MessagePump,
{
    app.reset_timer();
    let mut frames: u64 = 0;
    let code = loop {
        if let Some(code) = app.quit_requested() {
            break code;
        }
        match pump.next_message() {
            PumpMessage::Quit(code) => break code,
            PumpMessage::Event(event) => app.handle_event(event)?,
            PumpMessage::Empty => match app.frame()? {
                FrameOutcome::Paused => std::thread::sleep(app.config().paused_sleep),
                FrameOutcome::Rendered { title } => {
                    frames += 1;
                    if let Some(title) = title {
                        pump.set_title(&title)?;
                    }
                }
            },
        }
    };
    info!(code, frames, "Run loop finished");
    Ok(code)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Event(WindowEvent),
    /// Report an empty queue this many times in a row.
    Idle(u32),
    Quit(i32),
}

/// A pump that replays a fixed script, then quits with code 0.
#[derive(Debug, Default)]
pub struct ScriptedPump {
    steps: VecDeque<ScriptStep>,
    titles: Vec<String>,
}

impl ScriptedPump {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            titles: Vec::new(),
        }
    }

    pub fn push(&mut self, step: ScriptStep) {
        self.steps.push_back(step);
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    pub fn is_finished(&self) -> bool {
        self.steps.is_empty()
    }
}

impl MessagePump for ScriptedPump {
    fn next_message(&mut self) -> PumpMessage {
        loop {
            let Some(step) = self.steps.front_mut() else {
                return PumpMessage::Quit(0);
            };
            match step {
                ScriptStep::Idle(0) => {
                    self.steps.pop_front();
                }
                ScriptStep::Idle(remaining) => {
                    *remaining -= 1;
                    return PumpMessage::Empty;
                }
                ScriptStep::Event(event) => {
                    let event = *event;
                    self.steps.pop_front();
                    return PumpMessage::Event(event);
                }
                ScriptStep::Quit(code) => {
                    let code = *code;
                    self.steps.pop_front();
                    return PumpMessage::Quit(code);
                }
            }
        }
    }

    fn set_title(&mut self, title: &str) -> ShellResult<()> {
        self.titles.push(title.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::app_shell::SHELL_LOCK;
    use crate::config::AppConfig;
    use crate::device_resources::DeviceResources;
    use crate::game_timer::GameTimer;
    use crate::gpu::headless::HeadlessDevice;
    use crate::gpu::headless::HeadlessWindow;
    use crate::window_event::KeyCode;
    use crate::window_event::SizeKind;

    #[derive(Default)]
    struct Counter {
        frames: u32,
        fail_after: Option<u32>,
    }

    impl AppHooks<HeadlessDevice> for Counter {
        fn on_update(
            &mut self,
            _timer: &GameTimer,
            _resources: &mut DeviceResources<HeadlessDevice>,
        ) -> ShellResult<()> {
            if self.fail_after == Some(self.frames) {
                return Err(eyre::eyre!("scene update failed").into());
            }
            Ok(())
        }

        fn on_draw(
            &mut self,
            _timer: &GameTimer,
            resources: &mut DeviceResources<HeadlessDevice>,
        ) -> ShellResult<()> {
            self.frames += 1;
            resources.present()?;
            Ok(())
        }
    }

    fn shell(device: &HeadlessDevice, hooks: Counter) -> AppShell<HeadlessDevice, Counter> {
        let config = AppConfig::default().with_paused_sleep(Duration::from_millis(1));
        let mut shell = AppShell::new(config, hooks).unwrap();
        shell.initialize(device.clone(), HeadlessWindow).unwrap();
        shell
    }

    #[test]
    fn idle_polls_render_frames() {
        let _lock = SHELL_LOCK.lock();
        let device = HeadlessDevice::new();
        let mut shell = shell(&device, Counter::default());
        let mut pump = ScriptedPump::new([ScriptStep::Idle(10), ScriptStep::Quit(3)]);

        assert_eq!(run(&mut shell, &mut pump).unwrap(), 3);
        assert_eq!(shell.hooks().frames, 10);
        assert!(pump.is_finished());
    }

    #[test]
    fn minimized_app_sleeps_instead_of_drawing() {
        let _lock = SHELL_LOCK.lock();
        let device = HeadlessDevice::new();
        let mut shell = shell(&device, Counter::default());
        let mut pump = ScriptedPump::new([
            ScriptStep::Event(WindowEvent::Resized {
                kind: SizeKind::Minimized,
                width: 0,
                height: 0,
            }),
            ScriptStep::Idle(5),
            ScriptStep::Event(WindowEvent::Resized {
                kind: SizeKind::Restored,
                width: 800,
                height: 600,
            }),
            ScriptStep::Idle(2),
        ]);

        assert_eq!(run(&mut shell, &mut pump).unwrap(), 0);
        assert_eq!(shell.hooks().frames, 2);
        assert_eq!(shell.resources().unwrap().resize_count(), 2);
    }

    #[test]
    fn escape_ends_the_loop() {
        let _lock = SHELL_LOCK.lock();
        let device = HeadlessDevice::new();
        let mut shell = shell(&device, Counter::default());
        let mut pump = ScriptedPump::new([
            ScriptStep::Idle(1),
            ScriptStep::Event(WindowEvent::KeyUp(KeyCode::ESCAPE)),
            ScriptStep::Idle(100),
        ]);

        assert_eq!(run(&mut shell, &mut pump).unwrap(), 0);
        assert_eq!(shell.hooks().frames, 1);
        assert!(!pump.is_finished());
    }

    #[test]
    fn hook_failure_stops_the_loop() {
        let _lock = SHELL_LOCK.lock();
        let device = HeadlessDevice::new();
        let mut shell = shell(
            &device,
            Counter {
                fail_after: Some(2),
                ..Default::default()
            },
        );
        let mut pump = ScriptedPump::new([ScriptStep::Idle(10)]);

        let report = run(&mut shell, &mut pump).unwrap_err();
        assert!(report.to_string().contains("scene update failed"));
        assert_eq!(shell.hooks().frames, 2);
    }

    #[test]
    fn device_removal_during_resize_is_fatal() {
        let _lock = SHELL_LOCK.lock();
        let device = HeadlessDevice::new();
        let mut shell = shell(&device, Counter::default());
        let mut pump = ScriptedPump::new([
            ScriptStep::Event(WindowEvent::Resized {
                kind: SizeKind::Maximized,
                width: 1920,
                height: 1080,
            }),
            ScriptStep::Idle(1),
        ]);
        device.remove();

        let report = run(&mut shell, &mut pump).unwrap_err();
        assert!(report.device_error().is_some_and(|e| e.is_device_removed()));
    }
}
