use d3d_app_shell::app_error::ShellResult;
use d3d_app_shell::app_shell::AppShell;
use d3d_app_shell::config::AppConfig;
use d3d_app_shell::gpu::headless::HeadlessDevice;
use d3d_app_shell::gpu::headless::HeadlessWindow;
use d3d_app_shell::present_hooks::PresentHooks;
use d3d_app_shell::run_loop::ScriptStep;
use d3d_app_shell::run_loop::ScriptedPump;
use d3d_app_shell::run_loop::run;
use d3d_app_shell::window_event::KeyCode;
use d3d_app_shell::window_event::SizeKind;
use d3d_app_shell::window_event::WindowEvent;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ShellResult<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_target(false)
        .init();

    let config = AppConfig::from_args(std::env::args())?;
    #[cfg(windows)]
    let code = if config.headless {
        run_headless(config)?
    } else {
        run_windowed(config)?
    };
    #[cfg(not(windows))]
    let code = run_headless(config)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Replays a short scripted session against the software device.
fn run_headless(config: AppConfig) -> ShellResult<i32> {
    let (width, height) = (config.client_width, config.client_height);
    let mut app = AppShell::new(config, PresentHooks::default())?;
    app.initialize(HeadlessDevice::new(), HeadlessWindow)?;

    let resized = |kind, width, height| {
        ScriptStep::Event(WindowEvent::Resized {
            kind,
            width,
            height,
        })
    };
    let mut pump = ScriptedPump::new([
        ScriptStep::Idle(120),
        ScriptStep::Event(WindowEvent::EnterSizeMove),
        resized(SizeKind::Restored, width + 64, height + 48),
        resized(SizeKind::Restored, width + 128, height + 96),
        ScriptStep::Event(WindowEvent::ExitSizeMove),
        ScriptStep::Idle(60),
        ScriptStep::Event(WindowEvent::KeyUp(KeyCode::F2)),
        ScriptStep::Idle(60),
        resized(SizeKind::Minimized, 0, 0),
        ScriptStep::Idle(3),
        resized(SizeKind::Restored, width, height),
        ScriptStep::Idle(60),
        ScriptStep::Event(WindowEvent::KeyUp(KeyCode::ESCAPE)),
    ]);

    let code = run(&mut app, &mut pump)?;
    for title in pump.titles() {
        info!(%title, "Caption");
    }
    info!(
        frames = app.hooks().frames(),
        resizes = app.hooks().resizes(),
        msaa = app.msaa_enabled(),
        "Headless session finished"
    );
    Ok(code)
}

#[cfg(windows)]
fn run_windowed(config: AppConfig) -> ShellResult<i32> {
    use d3d_app_shell::app_error::notify_on_error;
    use d3d_app_shell::gpu::d3d12::D3d12Device;
    use d3d_app_shell::gpu::d3d12::log_adapters;
    use d3d_app_shell::win32_window::Win32Window;
    use d3d_app_shell::win32_window::show_error_box;

    let mut window = notify_on_error(Win32Window::create(&config), show_error_box)?;
    let device = notify_on_error(
        D3d12Device::create(config.use_warp_device).map_err(Into::into),
        show_error_box,
    )?;
    log_adapters(device.factory(), config.back_buffer_format);

    // Declared after the window so the swap chain is released before the window is destroyed.
    let mut app = AppShell::new(config, PresentHooks::default())?;
    notify_on_error(app.initialize(device, window.hwnd()), show_error_box)?;
    run(&mut app, &mut window)
}
