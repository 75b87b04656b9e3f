use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use d3d_app_shell::app_error::ShellError;
use d3d_app_shell::app_error::ShellResult;
use d3d_app_shell::app_shell::AppHooks;
use d3d_app_shell::app_shell::AppShell;
use d3d_app_shell::config::AppConfig;
use d3d_app_shell::device_resources::DeviceResources;
use d3d_app_shell::game_timer::GameTimer;
use d3d_app_shell::game_timer::ManualClock;
use d3d_app_shell::gpu::headless::HeadlessDevice;
use d3d_app_shell::gpu::headless::HeadlessWindow;
use d3d_app_shell::present_hooks::PresentHooks;
use d3d_app_shell::run_loop::ScriptStep;
use d3d_app_shell::run_loop::ScriptedPump;
use d3d_app_shell::run_loop::run;
use d3d_app_shell::window_event::KeyCode;
use d3d_app_shell::window_event::SizeKind;
use d3d_app_shell::window_event::WindowEvent;
use parking_lot::Mutex;

// Only one shell may exist per process.
static SHELL: Mutex<()> = parking_lot::const_mutex(());

fn config() -> AppConfig {
    AppConfig::default().with_paused_sleep(Duration::from_millis(1))
}

/// Advances a shared clock by a fixed step on every update.
struct Stepper {
    clock: ManualClock,
    step: Duration,
    updates: Rc<Cell<u32>>,
}

impl AppHooks<HeadlessDevice> for Stepper {
    fn on_update(
        &mut self,
        _timer: &GameTimer,
        _resources: &mut DeviceResources<HeadlessDevice>,
    ) -> ShellResult<()> {
        self.clock.advance(self.step);
        self.updates.set(self.updates.get() + 1);
        Ok(())
    }

    fn on_draw(
        &mut self,
        _timer: &GameTimer,
        resources: &mut DeviceResources<HeadlessDevice>,
    ) -> ShellResult<()> {
        resources.begin_frame()?;
        resources.end_frame()?;
        Ok(())
    }
}

#[test]
fn a_second_shell_is_refused_while_the_first_lives() {
    let _lock = SHELL.lock();
    let first = AppShell::<HeadlessDevice, _>::new(config(), PresentHooks::default()).unwrap();

    let second = AppShell::<HeadlessDevice, _>::new(config(), PresentHooks::default());
    let report = second.err().expect("second shell should be refused");
    assert!(matches!(report.shell_error(), Some(ShellError::AlreadyRunning)));

    drop(first);
    assert!(AppShell::<HeadlessDevice, _>::new(config(), PresentHooks::default()).is_ok());
}

#[test]
fn scripted_session_resizes_toggles_msaa_and_quits() {
    let _lock = SHELL.lock();
    let device = HeadlessDevice::new();
    let mut app = AppShell::new(config(), PresentHooks::default()).unwrap();
    app.initialize(device.clone(), HeadlessWindow).unwrap();

    let mut pump = ScriptedPump::new([
        ScriptStep::Idle(5),
        ScriptStep::Event(WindowEvent::EnterSizeMove),
        ScriptStep::Event(WindowEvent::Resized {
            kind: SizeKind::Restored,
            width: 900,
            height: 700,
        }),
        ScriptStep::Event(WindowEvent::Resized {
            kind: SizeKind::Restored,
            width: 1024,
            height: 768,
        }),
        ScriptStep::Event(WindowEvent::ExitSizeMove),
        ScriptStep::Idle(5),
        ScriptStep::Event(WindowEvent::KeyUp(KeyCode::F2)),
        ScriptStep::Idle(5),
        ScriptStep::Event(WindowEvent::KeyUp(KeyCode::ESCAPE)),
        ScriptStep::Idle(5),
    ]);

    assert_eq!(run(&mut app, &mut pump).unwrap(), 0);
    assert_eq!(app.hooks().frames(), 15);
    // Initial size, end of the drag, MSAA toggle.
    assert_eq!(app.hooks().resizes(), 3);
    assert_eq!(app.hooks().last_size(), Some((1024, 768)));
    assert!(app.msaa_enabled());
    assert_eq!(device.swap_chains_created(), 2);
    assert!(!pump.is_finished());
}

#[test]
fn captions_report_frame_statistics_once_per_second() {
    let _lock = SHELL.lock();
    let clock = ManualClock::default();
    let updates = Rc::new(Cell::new(0));
    let hooks = Stepper {
        clock: clock.clone(),
        step: Duration::from_millis(100),
        updates: updates.clone(),
    };
    let mut app = AppShell::with_clock(config().with_title("Session"), hooks, clock).unwrap();
    app.initialize(HeadlessDevice::new(), HeadlessWindow).unwrap();

    let mut pump = ScriptedPump::new([ScriptStep::Idle(31)]);
    assert_eq!(run(&mut app, &mut pump).unwrap(), 0);

    assert_eq!(updates.get(), 31);
    let titles = pump.titles();
    assert_eq!(titles.len(), 3);
    // The first window also counts the frame drawn at t = 0.
    assert!(titles[0].starts_with("Session    fps: 11.000000   mspf: 90.9"));
    assert!(titles[1..].iter().all(|title| title.starts_with("Session    fps: 10.000000")));
}
