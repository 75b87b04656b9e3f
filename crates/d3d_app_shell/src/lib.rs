pub mod app_error;
pub mod app_shell;
pub mod command_objects;
pub mod config;
pub mod descriptor_heap;
pub mod device_error;
pub mod device_resources;
pub mod fence_sync;
pub mod frame_stats;
pub mod game_timer;
pub mod gpu;
pub mod present_hooks;
pub mod resize_state;
pub mod run_loop;
pub mod swap_chain;
#[cfg(windows)]
pub mod win32_window;
pub mod window_event;
