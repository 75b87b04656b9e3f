//! Window messages decoded into something the shell can reason about.
//!
//! Decoding lives here rather than in the Win32 glue so the same events can be
//! scripted on any platform.

use bitflags::bitflags;

pub const WM_CREATE: u32 = 0x0001;
pub const WM_DESTROY: u32 = 0x0002;
pub const WM_SIZE: u32 = 0x0005;
pub const WM_ACTIVATE: u32 = 0x0006;
pub const WM_GETMINMAXINFO: u32 = 0x0024;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_MENUCHAR: u32 = 0x0120;
pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_LBUTTONDOWN: u32 = 0x0201;
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_RBUTTONDOWN: u32 = 0x0204;
pub const WM_RBUTTONUP: u32 = 0x0205;
pub const WM_MBUTTONDOWN: u32 = 0x0207;
pub const WM_MBUTTONUP: u32 = 0x0208;
pub const WM_ENTERSIZEMOVE: u32 = 0x0231;
pub const WM_EXITSIZEMOVE: u32 = 0x0232;

pub const SIZE_RESTORED: usize = 0;
pub const SIZE_MINIMIZED: usize = 1;
pub const SIZE_MAXIMIZED: usize = 2;
pub const SIZE_MAXSHOW: usize = 3;
pub const SIZE_MAXHIDE: usize = 4;

pub const WA_INACTIVE: usize = 0;

/// `WM_MENUCHAR` answer that closes the menu without the error beep.
pub const MNC_CLOSE_RESULT: isize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeKind {
    Restored,
    Minimized,
    Maximized,
    /// Another window was restored or maximized (`SIZE_MAXSHOW` / `SIZE_MAXHIDE`).
    Other,
}

impl SizeKind {
    pub fn from_raw(raw: usize) -> Self {
        match raw {
            SIZE_RESTORED => SizeKind::Restored,
            SIZE_MINIMIZED => SizeKind::Minimized,
            SIZE_MAXIMIZED => SizeKind::Maximized,
            _ => SizeKind::Other,
        }
    }
}

bitflags! {
    /// Mouse buttons and modifier keys held during a mouse message (`MK_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MouseButtons: u32 {
        const LEFT = 0x0001;
        const RIGHT = 0x0002;
        const SHIFT = 0x0004;
        const CONTROL = 0x0008;
        const MIDDLE = 0x0010;
        const X1 = 0x0020;
        const X2 = 0x0040;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// A Win32 virtual-key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u32);

impl KeyCode {
    pub const ESCAPE: KeyCode = KeyCode(0x1B);
    pub const F2: KeyCode = KeyCode(0x71);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub buttons: MouseButtons,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    Activated(bool),
    Resized {
        kind: SizeKind,
        width: u32,
        height: u32,
    },
    EnterSizeMove,
    ExitSizeMove,
    Destroyed,
    KeyUp(KeyCode),
    MouseDown(MouseButton, MouseEvent),
    MouseUp(MouseButton, MouseEvent),
    MouseMove(MouseEvent),
}

fn loword(value: usize) -> u32 {
    (value & 0xFFFF) as u32
}

fn hiword(value: usize) -> u32 {
    ((value >> 16) & 0xFFFF) as u32
}

fn mouse_event(wparam: usize, lparam: isize) -> MouseEvent {
    // Coordinates are signed: they go negative on multi-monitor setups and while captured.
    MouseEvent {
        buttons: MouseButtons::from_bits_truncate(loword(wparam)),
        x: (lparam & 0xFFFF) as u16 as i16 as i32,
        y: ((lparam >> 16) & 0xFFFF) as u16 as i16 as i32,
    }
}

impl WindowEvent {
    /// Decode a raw window message. Messages the shell does not act on yield `None`.
    pub fn from_raw(message: u32, wparam: usize, lparam: isize) -> Option<Self> {
        let event = match message {
            WM_ACTIVATE => WindowEvent::Activated(loword(wparam) as usize != WA_INACTIVE),
            WM_SIZE => WindowEvent::Resized {
                kind: SizeKind::from_raw(wparam),
                width: loword(lparam as usize),
                height: hiword(lparam as usize),
            },
            WM_ENTERSIZEMOVE => WindowEvent::EnterSizeMove,
            WM_EXITSIZEMOVE => WindowEvent::ExitSizeMove,
            WM_DESTROY => WindowEvent::Destroyed,
            WM_KEYUP => WindowEvent::KeyUp(KeyCode(wparam as u32)),
            WM_LBUTTONDOWN => WindowEvent::MouseDown(MouseButton::Left, mouse_event(wparam, lparam)),
            WM_RBUTTONDOWN => WindowEvent::MouseDown(MouseButton::Right, mouse_event(wparam, lparam)),
            WM_MBUTTONDOWN => {
                WindowEvent::MouseDown(MouseButton::Middle, mouse_event(wparam, lparam))
            }
            WM_LBUTTONUP => WindowEvent::MouseUp(MouseButton::Left, mouse_event(wparam, lparam)),
            WM_RBUTTONUP => WindowEvent::MouseUp(MouseButton::Right, mouse_event(wparam, lparam)),
            WM_MBUTTONUP => WindowEvent::MouseUp(MouseButton::Middle, mouse_event(wparam, lparam)),
            WM_MOUSEMOVE => WindowEvent::MouseMove(mouse_event(wparam, lparam)),
            _ => return None,
        };
        Some(event)
    }
}
