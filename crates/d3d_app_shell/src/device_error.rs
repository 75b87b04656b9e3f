use thiserror::Error;

use crate::command_objects::ListState;
use crate::gpu::PixelFormat;

/// Generic failure, `E_FAIL`.
pub const E_FAIL: i32 = 0x8000_4005_u32 as i32;
/// `DXGI_ERROR_INVALID_CALL`.
pub const DXGI_ERROR_INVALID_CALL: i32 = 0x887A_0001_u32 as i32;
/// `DXGI_ERROR_DEVICE_REMOVED`.
pub const DXGI_ERROR_DEVICE_REMOVED: i32 = 0x887A_0005_u32 as i32;

pub type DeviceResult<T> = core::result::Result<T, DeviceError>;

/// A failed GPU call. None of these are recoverable: once one surfaces the device
/// or the arguments handed to it are unusable, and the shell tears down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("GPU call failed ({code:#010x}): {message}")]
    Api { code: i32, message: String },

    #[error("GPU device removed ({code:#010x})")]
    DeviceRemoved { code: i32 },

    #[error("invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("{count} swap chain buffer reference(s) still alive")]
    BuffersOutstanding { count: usize },

    #[error("command list must be {expected:?} to {operation}, but it is {found:?}")]
    CommandListState {
        operation: &'static str,
        expected: ListState,
        found: ListState,
    },

    #[error("descriptor slot {slot} out of range for a heap of {capacity}")]
    DescriptorSlot { slot: u32, capacity: u32 },

    #[error("4x MSAA is not supported for {format:?}")]
    MsaaUnsupported { format: PixelFormat },

    #[error("swap chain has not been created")]
    NoSwapChain,
}

impl DeviceError {
    pub fn api(code: i32, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// The result code that caused the failure. Errors raised by the shell's own
    /// bookkeeping report the code the native API would have returned.
    pub fn code(&self) -> i32 {
        match self {
            DeviceError::Api { code, .. } | DeviceError::DeviceRemoved { code } => *code,
            DeviceError::MsaaUnsupported { .. } => E_FAIL,
            DeviceError::InvalidSize { .. }
            | DeviceError::BuffersOutstanding { .. }
            | DeviceError::CommandListState { .. }
            | DeviceError::DescriptorSlot { .. }
            | DeviceError::NoSwapChain => DXGI_ERROR_INVALID_CALL,
        }
    }

    pub fn is_device_removed(&self) -> bool {
        matches!(self, DeviceError::DeviceRemoved { .. })
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for DeviceError {
    fn from(error: windows::core::Error) -> Self {
        let code = error.code().0;
        if code == DXGI_ERROR_DEVICE_REMOVED {
            return DeviceError::DeviceRemoved { code };
        }
        DeviceError::Api {
            code,
            message: error.message().to_string(),
        }
    }
}
