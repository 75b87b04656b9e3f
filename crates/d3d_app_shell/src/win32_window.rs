//! The Win32 window and its message pump.

use std::collections::VecDeque;
use std::ffi::c_void;

use tracing::debug;
use tracing::warn;
use widestring::U16CString;
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Gdi::GetStockObject;
use windows::Win32::Graphics::Gdi::HBRUSH;
use windows::Win32::Graphics::Gdi::NULL_BRUSH;
use windows::Win32::Graphics::Gdi::UpdateWindow;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::ReleaseCapture;
use windows::Win32::UI::Input::KeyboardAndMouse::SetCapture;
use windows::Win32::UI::WindowsAndMessaging::*;
use windows::core::PCWSTR;
use windows::core::w;

use crate::app_error::ShellError;
use crate::app_error::ShellResult;
use crate::config::AppConfig;
use crate::run_loop::MessagePump;
use crate::run_loop::PumpMessage;
use crate::window_event::MNC_CLOSE_RESULT;
use crate::window_event::WindowEvent;

const CLASS_NAME: PCWSTR = w!("D3DAppShellWindow");

/// State the window procedure reaches through `GWLP_USERDATA`.
struct WindowContext {
    events: VecDeque<WindowEvent>,
    min_track_size: (i32, i32),
}

pub struct Win32Window {
    hwnd: HWND,
    context: *mut WindowContext,
}

fn wide(text: &str) -> ShellResult<U16CString> {
    U16CString::from_str(text)
        .map_err(|e| ShellError::WindowCreation(format!("title contains a nul: {e}")).into())
}

fn register_window_class(instance: HINSTANCE) -> ShellResult<()> {
    let class = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        style: CS_HREDRAW | CS_VREDRAW,
        lpfnWndProc: Some(wndproc),
        hInstance: instance,
        hIcon: unsafe { LoadIconW(None, IDI_APPLICATION) }
            .map_err(|e| ShellError::WindowClass(e.message()))?,
        hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }
            .map_err(|e| ShellError::WindowClass(e.message()))?,
        hbrBackground: HBRUSH(unsafe { GetStockObject(NULL_BRUSH) }.0),
        lpszClassName: CLASS_NAME,
        ..Default::default()
    };
    let atom = unsafe { RegisterClassExW(&class) };
    if atom == 0 {
        let error = windows::core::Error::from_win32();
        // A previous shell in this process already registered it.
        if error.code() != ERROR_CLASS_ALREADY_EXISTS.to_hresult() {
            return Err(ShellError::WindowClass(error.message()).into());
        }
    }
    Ok(())
}

impl Win32Window {
    pub fn create(config: &AppConfig) -> ShellResult<Self> {
        let module = unsafe { GetModuleHandleW(None) }
            .map_err(|e| ShellError::WindowClass(e.message()))?;
        let instance: HINSTANCE = module.into();
        register_window_class(instance)?;

        let mut window_rect = RECT {
            left: 0,
            top: 0,
            right: config.client_width as i32,
            bottom: config.client_height as i32,
        };
        unsafe { AdjustWindowRect(&mut window_rect, WS_OVERLAPPEDWINDOW, false) }
            .map_err(|e| ShellError::WindowCreation(e.message()))?;

        let mut title = config.title.clone();
        if config.use_warp_device {
            title.push_str(" (WARP)");
        }
        let title = wide(&title)?;

        let context = Box::into_raw(Box::new(WindowContext {
            events: VecDeque::new(),
            min_track_size: config.min_track_size,
        }));
        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                CLASS_NAME,
                PCWSTR(title.as_ptr()),
                WS_OVERLAPPEDWINDOW,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                window_rect.right - window_rect.left,
                window_rect.bottom - window_rect.top,
                None,
                None,
                Some(instance),
                Some(context as *const c_void),
            )
        };
        let hwnd = match hwnd {
            Ok(hwnd) => hwnd,
            Err(error) => {
                drop(unsafe { Box::from_raw(context) });
                return Err(ShellError::WindowCreation(error.message()).into());
            }
        };

        unsafe {
            _ = ShowWindow(hwnd, SW_SHOW);
            _ = UpdateWindow(hwnd);
        }
        debug!(?hwnd, "Window created");
        Ok(Self { hwnd, context })
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }

    fn pop_event(&mut self) -> Option<WindowEvent> {
        // Only the window procedure touches the context otherwise, and it runs
        // inside DispatchMessageW on this thread.
        unsafe { (*self.context).events.pop_front() }
    }
}

impl MessagePump for Win32Window {
    fn next_message(&mut self) -> PumpMessage {
        if let Some(event) = self.pop_event() {
            return PumpMessage::Event(event);
        }
        let mut message = MSG::default();
        while unsafe { PeekMessageW(&mut message, None, 0, 0, PM_REMOVE) }.as_bool() {
            if message.message == WM_QUIT {
                return PumpMessage::Quit(message.wParam.0 as i32);
            }
            unsafe {
                _ = TranslateMessage(&message);
                DispatchMessageW(&message);
            }
            if let Some(event) = self.pop_event() {
                return PumpMessage::Event(event);
            }
        }
        PumpMessage::Empty
    }

    fn set_title(&mut self, title: &str) -> ShellResult<()> {
        let title = wide(title)?;
        unsafe { SetWindowTextW(self.hwnd, PCWSTR(title.as_ptr())) }?;
        Ok(())
    }
}

impl Drop for Win32Window {
    fn drop(&mut self) {
        unsafe {
            SetWindowLongPtrW(self.hwnd, GWLP_USERDATA, 0);
            if let Err(error) = DestroyWindow(self.hwnd) {
                // Already gone if the user closed it.
                debug!(%error, "DestroyWindow");
            }
            drop(Box::from_raw(self.context));
        }
    }
}

/// Blocking error dialog for failures that happen before or outside the run loop.
pub fn show_error_box(message: &str) {
    let text = U16CString::from_str_truncate(message);
    unsafe { MessageBoxW(None, PCWSTR(text.as_ptr()), w!("Error"), MB_OK | MB_ICONERROR) };
}

extern "system" fn wndproc(window: HWND, message: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if message == WM_CREATE {
        unsafe {
            let create_struct: &CREATESTRUCTW = &*(lparam.0 as *const CREATESTRUCTW);
            SetWindowLongPtrW(window, GWLP_USERDATA, create_struct.lpCreateParams as _);
        }
        return LRESULT(0);
    }

    let user_data = unsafe { GetWindowLongPtrW(window, GWLP_USERDATA) };
    if user_data == 0 {
        // We can get messages before WM_CREATE or after the window is released.
        return unsafe { DefWindowProcW(window, message, wparam, lparam) };
    }
    let context = unsafe { &mut *(user_data as *mut WindowContext) };

    match message {
        // Alt+Enter would otherwise beep because there is no menu to match it.
        WM_MENUCHAR => return LRESULT(MNC_CLOSE_RESULT),
        WM_GETMINMAXINFO => {
            let info = unsafe { &mut *(lparam.0 as *mut MINMAXINFO) };
            info.ptMinTrackSize.x = context.min_track_size.0;
            info.ptMinTrackSize.y = context.min_track_size.1;
            return LRESULT(0);
        }
        WM_DESTROY => {
            context.events.push_back(WindowEvent::Destroyed);
            unsafe { PostQuitMessage(0) };
            return LRESULT(0);
        }
        WM_LBUTTONDOWN | WM_MBUTTONDOWN | WM_RBUTTONDOWN => {
            unsafe { SetCapture(window) };
        }
        WM_LBUTTONUP | WM_MBUTTONUP | WM_RBUTTONUP => {
            if let Err(error) = unsafe { ReleaseCapture() } {
                warn!(%error, "ReleaseCapture");
            }
        }
        _ => {}
    }

    match WindowEvent::from_raw(message, wparam.0, lparam.0) {
        Some(event) => {
            context.events.push_back(event);
            LRESULT(0)
        }
        None => unsafe { DefWindowProcW(window, message, wparam, lparam) },
    }
}
