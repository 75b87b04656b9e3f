use std::time::Duration;

use eyre::Context;
use eyre::bail;
use eyre::eyre;

use crate::gpu::PixelFormat;
use crate::window_event::KeyCode;

/// Everything the shell needs to know before it opens a window.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub title: String,
    pub client_width: u32,
    pub client_height: u32,
    pub back_buffer_format: PixelFormat,
    pub depth_stencil_format: PixelFormat,
    pub back_buffer_count: u32,
    pub msaa_enabled: bool,
    pub msaa_toggle_key: KeyCode,
    pub quit_key: KeyCode,
    /// Smallest client area the user can drag the window down to.
    pub min_track_size: (i32, i32),
    /// How long the loop sleeps per frame while the app is paused.
    pub paused_sleep: Duration,
    pub use_warp_device: bool,
    pub headless: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "d3d App".to_owned(),
            client_width: 800,
            client_height: 600,
            back_buffer_format: PixelFormat::Rgba8Unorm,
            depth_stencil_format: PixelFormat::D24UnormS8Uint,
            back_buffer_count: 2,
            msaa_enabled: false,
            msaa_toggle_key: KeyCode::F2,
            quit_key: KeyCode::ESCAPE,
            min_track_size: (200, 200),
            paused_sleep: Duration::from_millis(100),
            use_warp_device: false,
            headless: false,
        }
    }
}

impl AppConfig {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_client_size(mut self, width: u32, height: u32) -> Self {
        self.client_width = width;
        self.client_height = height;
        self
    }

    pub fn with_back_buffer_count(mut self, count: u32) -> Self {
        self.back_buffer_count = count;
        self
    }

    pub fn with_msaa(mut self, enabled: bool) -> Self {
        self.msaa_enabled = enabled;
        self
    }

    pub fn with_paused_sleep(mut self, sleep: Duration) -> Self {
        self.paused_sleep = sleep;
        self
    }

    pub fn with_warp(mut self, use_warp_device: bool) -> Self {
        self.use_warp_device = use_warp_device;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Apply command-line flags on top of the defaults. The first item is taken to
    /// be the program name, as with `std::env::args`.
    pub fn from_args<I, S>(args: I) -> eyre::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter().map(Into::into).skip(1);
        while let Some(arg) = args.next() {
            if arg.eq_ignore_ascii_case("-warp") || arg.eq_ignore_ascii_case("/warp") {
                config.use_warp_device = true;
                continue;
            }
            match arg.as_str() {
                "--headless" => config.headless = true,
                "--msaa" => config.msaa_enabled = true,
                "--width" => config.client_width = parse_dimension("--width", args.next())?,
                "--height" => config.client_height = parse_dimension("--height", args.next())?,
                "--title" => {
                    config.title = args.next().ok_or_else(|| eyre!("--title needs a value"))?;
                }
                _ => bail!("unrecognized argument {arg:?}"),
            }
        }
        Ok(config)
    }
}

fn parse_dimension(flag: &str, value: Option<String>) -> eyre::Result<u32> {
    let value = value.ok_or_else(|| eyre!("{flag} needs a value"))?;
    let parsed: u32 = value
        .parse()
        .wrap_err_with(|| format!("{flag} expects a pixel count, got {value:?}"))?;
    if parsed == 0 {
        bail!("{flag} must be greater than zero");
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!((config.client_width, config.client_height), (800, 600));
        assert_eq!(config.back_buffer_count, 2);
        assert_eq!(config.depth_stencil_format, PixelFormat::D24UnormS8Uint);
        assert!(!config.msaa_enabled);
        assert_eq!(config.paused_sleep, Duration::from_millis(100));
    }

    #[test]
    fn parses_flags() {
        let config = AppConfig::from_args([
            "app", "/WARP", "--width", "1024", "--height", "768", "--msaa", "--title", "Box",
        ])
        .unwrap();
        assert!(config.use_warp_device);
        assert!(config.msaa_enabled);
        assert_eq!((config.client_width, config.client_height), (1024, 768));
        assert_eq!(config.title, "Box");
        assert!(!config.headless);
    }

    #[test]
    fn rejects_bad_dimensions() {
        assert!(AppConfig::from_args(["app", "--width", "wide"]).is_err());
        assert!(AppConfig::from_args(["app", "--height", "0"]).is_err());
        assert!(AppConfig::from_args(["app", "--width"]).is_err());
        assert!(AppConfig::from_args(["app", "--fullscreen"]).is_err());
    }
}
