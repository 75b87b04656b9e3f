//! Window lifecycle tracking: decides when a size change must rebuild the
//! swap chain and when the app should be paused.

use tracing::trace;

use crate::window_event::SizeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeState {
    #[default]
    Idle,
    /// The user is dragging a border. Size messages are coalesced until release.
    Resizing,
    /// Minimized.
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerControl {
    Stop,
    Start,
}

/// What the shell has to do in response to one window event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResizeAction {
    pub resize: bool,
    pub timer: Option<TimerControl>,
}

impl ResizeAction {
    const NONE: ResizeAction = ResizeAction {
        resize: false,
        timer: None,
    };

    const RESIZE: ResizeAction = ResizeAction {
        resize: true,
        timer: None,
    };
}

#[derive(Debug, Default)]
pub struct ResizeOrchestrator {
    state: ResizeState,
    maximized: bool,
    paused: bool,
    client_width: u32,
    client_height: u32,
    device_ready: bool,
}

impl ResizeOrchestrator {
    pub fn new(client_width: u32, client_height: u32) -> Self {
        Self {
            client_width,
            client_height,
            ..Default::default()
        }
    }

    pub fn state(&self) -> ResizeState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_minimized(&self) -> bool {
        self.state == ResizeState::Suspended
    }

    pub fn is_maximized(&self) -> bool {
        self.maximized
    }

    pub fn is_resizing(&self) -> bool {
        self.state == ResizeState::Resizing
    }

    pub fn client_size(&self) -> (u32, u32) {
        (self.client_width, self.client_height)
    }

    /// Until this is called, size messages only record the client area.
    pub fn set_device_ready(&mut self) {
        self.device_ready = true;
    }

    fn has_area(&self) -> bool {
        self.client_width > 0 && self.client_height > 0
    }

    pub fn on_size(&mut self, kind: SizeKind, width: u32, height: u32) -> ResizeAction {
        self.client_width = width;
        self.client_height = height;
        if !self.device_ready {
            return ResizeAction::NONE;
        }

        let action = match kind {
            SizeKind::Minimized => {
                self.paused = true;
                self.state = ResizeState::Suspended;
                self.maximized = false;
                ResizeAction::NONE
            }
            SizeKind::Maximized => {
                self.paused = false;
                if self.state == ResizeState::Suspended {
                    self.state = ResizeState::Idle;
                }
                self.maximized = true;
                ResizeAction::RESIZE
            }
            SizeKind::Restored => match self.state {
                ResizeState::Suspended => {
                    self.paused = false;
                    self.state = ResizeState::Idle;
                    ResizeAction::RESIZE
                }
                // Also mid-drag: pulling a maximized window off the top edge restores it.
                _ if self.maximized => {
                    self.paused = false;
                    self.maximized = false;
                    ResizeAction::RESIZE
                }
                // The drag is still going; the resize happens on release.
                ResizeState::Resizing => ResizeAction::NONE,
                // Restored without any flag set, e.g. `SetWindowPos`.
                ResizeState::Idle => ResizeAction::RESIZE,
            },
            SizeKind::Other => ResizeAction::NONE,
        };
        trace!(?kind, width, height, state = ?self.state, resize = action.resize, "size");
        ResizeAction {
            resize: action.resize && self.has_area(),
            ..action
        }
    }

    pub fn on_enter_size_move(&mut self) -> ResizeAction {
        self.paused = true;
        if self.state == ResizeState::Idle {
            self.state = ResizeState::Resizing;
        }
        ResizeAction {
            resize: false,
            timer: Some(TimerControl::Stop),
        }
    }

    pub fn on_exit_size_move(&mut self) -> ResizeAction {
        self.paused = false;
        let was_resizing = self.state == ResizeState::Resizing;
        if was_resizing {
            self.state = ResizeState::Idle;
        }
        ResizeAction {
            resize: was_resizing && self.device_ready && self.has_area(),
            timer: Some(TimerControl::Start),
        }
    }

    pub fn on_activate(&mut self, active: bool) -> ResizeAction {
        self.paused = !active;
        ResizeAction {
            resize: false,
            timer: Some(if active {
                TimerControl::Start
            } else {
                TimerControl::Stop
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> ResizeOrchestrator {
        let mut orchestrator = ResizeOrchestrator::new(800, 600);
        orchestrator.set_device_ready();
        orchestrator
    }

    #[test]
    fn drag_coalesces_into_one_resize() {
        let mut orchestrator = ready();
        let mut resizes = 0;

        let begin = orchestrator.on_enter_size_move();
        assert_eq!(begin.timer, Some(TimerControl::Stop));
        assert!(orchestrator.is_paused());

        for step in 0..25 {
            let action = orchestrator.on_size(SizeKind::Restored, 800 + step, 600 + step);
            resizes += action.resize as u32;
        }
        let end = orchestrator.on_exit_size_move();
        resizes += end.resize as u32;

        assert_eq!(resizes, 1);
        assert_eq!(end.timer, Some(TimerControl::Start));
        assert_eq!(orchestrator.client_size(), (824, 624));
        assert!(!orchestrator.is_paused());
        assert_eq!(orchestrator.state(), ResizeState::Idle);
    }

    #[test]
    fn minimize_then_restore_resizes_once() {
        let mut orchestrator = ready();
        let minimized = orchestrator.on_size(SizeKind::Minimized, 0, 0);
        assert!(!minimized.resize);
        assert!(orchestrator.is_paused());
        assert!(orchestrator.is_minimized());

        let restored = orchestrator.on_size(SizeKind::Restored, 800, 600);
        assert!(restored.resize);
        assert!(!orchestrator.is_paused());
        assert_eq!(orchestrator.state(), ResizeState::Idle);
    }

    #[test]
    fn maximize_and_restore_each_resize() {
        let mut orchestrator = ready();
        assert!(orchestrator.on_size(SizeKind::Maximized, 1920, 1080).resize);
        assert!(orchestrator.is_maximized());
        assert!(orchestrator.on_size(SizeKind::Restored, 800, 600).resize);
        assert!(!orchestrator.is_maximized());
    }

    #[test]
    fn restore_from_maximized_mid_drag_resizes_immediately() {
        let mut orchestrator = ready();
        assert!(orchestrator.on_size(SizeKind::Maximized, 1920, 1080).resize);
        orchestrator.on_enter_size_move();

        let restored = orchestrator.on_size(SizeKind::Restored, 800, 600);
        assert!(restored.resize);
        assert!(!orchestrator.is_maximized());
        assert!(orchestrator.is_resizing());

        // Further drag steps are coalesced until release.
        assert!(!orchestrator.on_size(SizeKind::Restored, 820, 610).resize);
        assert!(orchestrator.on_exit_size_move().resize);
        assert_eq!(orchestrator.client_size(), (820, 610));
        assert!(!orchestrator.is_maximized());
    }

    #[test]
    fn programmatic_restore_resizes() {
        let mut orchestrator = ready();
        assert!(orchestrator.on_size(SizeKind::Restored, 640, 480).resize);
        assert!(orchestrator.on_size(SizeKind::Restored, 641, 480).resize);
    }

    #[test]
    fn sizes_before_the_device_only_record() {
        let mut orchestrator = ResizeOrchestrator::new(800, 600);
        assert_eq!(
            orchestrator.on_size(SizeKind::Maximized, 1280, 720),
            ResizeAction::default()
        );
        assert_eq!(orchestrator.client_size(), (1280, 720));
        assert!(!orchestrator.is_maximized());
    }

    #[test]
    fn activation_toggles_pause_and_timer() {
        let mut orchestrator = ready();
        let off = orchestrator.on_activate(false);
        assert_eq!(off.timer, Some(TimerControl::Stop));
        assert!(orchestrator.is_paused());
        let on = orchestrator.on_activate(true);
        assert_eq!(on.timer, Some(TimerControl::Start));
        assert!(!orchestrator.is_paused());
    }

    #[test]
    fn zero_area_never_resizes() {
        let mut orchestrator = ready();
        assert!(!orchestrator.on_size(SizeKind::Restored, 0, 600).resize);
        orchestrator.on_size(SizeKind::Minimized, 0, 0);
        orchestrator.on_enter_size_move();
        assert!(!orchestrator.on_exit_size_move().resize);
        assert!(orchestrator.is_minimized());
    }
}
