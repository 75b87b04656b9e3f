use thiserror::Error;

use crate::device_error::DeviceError;

pub type ShellResult<T, E = ShellReport> = core::result::Result<T, E>;

/// Failures raised by the shell itself rather than by the GPU.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("an application shell is already running in this process")]
    AlreadyRunning,

    #[error("RegisterClass failed: {0}")]
    WindowClass(String),

    #[error("CreateWindow failed: {0}")]
    WindowCreation(String),

    #[error("the shell has not been initialized with a device")]
    NotInitialized,
}

pub struct ShellReport {
    inner: eyre::Report,
}

impl ShellReport {
    /// The device failure at the root of this report, if there is one.
    pub fn device_error(&self) -> Option<&DeviceError> {
        self.inner.downcast_ref::<DeviceError>()
    }

    pub fn shell_error(&self) -> Option<&ShellError> {
        self.inner.downcast_ref::<ShellError>()
    }

    pub fn into_report(self) -> eyre::Report {
        self.inner
    }
}

impl From<eyre::Report> for ShellReport {
    fn from(report: eyre::Report) -> Self {
        Self { inner: report }
    }
}

impl From<DeviceError> for ShellReport {
    fn from(error: DeviceError) -> Self {
        Self {
            inner: eyre::Report::new(error),
        }
    }
}

impl From<ShellError> for ShellReport {
    fn from(error: ShellError) -> Self {
        Self {
            inner: eyre::Report::new(error),
        }
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for ShellReport {
    fn from(error: windows::core::Error) -> Self {
        DeviceError::from(error).into()
    }
}

/// Pass `result` through, handing a failure's message to `notify` first. Startup uses
/// this to put every failure in front of the user before the process exits.
pub fn notify_on_error<T>(result: ShellResult<T>, notify: impl FnOnce(&str)) -> ShellResult<T> {
    if let Err(report) = &result {
        notify(&report.to_string());
    }
    result
}

impl std::fmt::Display for ShellReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

impl std::fmt::Debug for ShellReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}
