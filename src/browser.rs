//! Browser seams used by the renderer.
//!
//! [`BrowserLauncher`] acquires one browser process per capture and hands it
//! back as a [`BrowserSession`]. The CDP backend implements both; tests plug
//! in fakes that record what the renderer asked for.

use std::path::PathBuf;
use std::time::Duration;

use crate::fonts::FontAsset;
use crate::{ClipRegion, ImageType, Result, Viewport};

/// Chrome flags every launch carries.
///
/// Sandboxing is disabled so the browser runs inside containers and other
/// constrained environments; the font flags keep glyph and emoji rasterisation
/// stable between runs.
pub const DEFAULT_FLAGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-first-run",
    "--no-zygote",
    "--hide-scrollbars",
    "--mute-audio",
    "--font-render-hinting=none",
    "--disable-font-subpixel-positioning",
    "--force-color-profile=srgb",
];

/// How to start a browser process
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    /// Resolved executable; `None` lets the backend discover one
    pub executable: Option<PathBuf>,
    /// Extra command line flags
    pub flags: Vec<String>,
    /// Window size the browser starts with
    pub window: Viewport,
    /// Kill the browser if the protocol connection stays silent this long
    pub idle_timeout: Duration,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            executable: None,
            flags: DEFAULT_FLAGS.iter().map(|f| f.to_string()).collect(),
            window: Viewport::default(),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl LaunchSettings {
    /// Same settings with the window sized to `viewport`.
    pub fn for_viewport(&self, viewport: &Viewport) -> Self {
        Self {
            window: *viewport,
            ..self.clone()
        }
    }
}

/// What part of the page ends up in the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureArea {
    /// The visible viewport only
    Viewport,
    /// The full scrollable document
    FullPage,
    /// Exactly this rectangle, in output pixels
    Clip(ClipRegion),
}

/// Parameters for the final screenshot call
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenshotParams {
    pub format: ImageType,
    /// Only set for lossy formats
    pub quality: Option<u8>,
    pub area: CaptureArea,
    /// Device pixels per CSS pixel the page was laid out with. Clip
    /// rectangles are in device pixels and are scaled down by this factor.
    pub device_scale_factor: f64,
    /// Keep cleared backgrounds transparent
    pub omit_background: bool,
}

/// Starts browser processes.
pub trait BrowserLauncher: Send + Sync {
    /// Launch a new, exclusively owned browser process.
    fn launch(&self, settings: &LaunchSettings) -> Result<Box<dyn BrowserSession>>;
}

/// A running browser process with (at most) one page.
///
/// Every method maps to one step of the render sequence. Implementations are
/// driven from a single worker thread and need not be `Send`.
pub trait BrowserSession {
    /// Open the page this session renders into
    fn open_page(&mut self) -> Result<()>;

    /// Apply width, height and device scale factor
    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()>;

    /// Make a font available to every document loaded afterwards
    fn register_font(&mut self, font: &FontAsset) -> Result<()>;

    /// Navigate and block until the network goes quiet or `timeout` elapses
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Block until the page reports its fonts ready, or `fallback` elapses
    fn wait_for_fonts(&mut self, fallback: Duration) -> Result<()>;

    /// Block until `selector` matches an element, or `timeout` elapses
    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()>;

    /// Clear the document background right before capture
    fn clear_background(&mut self, omit_background: bool) -> Result<()>;

    /// Capture and encode the page
    fn screenshot(&mut self, params: &ScreenshotParams) -> Result<Vec<u8>>;

    /// Terminate the browser process. Called exactly once per session by
    /// [`crate::SessionGuard`].
    fn terminate(&mut self) -> Result<()>;
}
