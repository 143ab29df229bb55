//! Pageshot
//!
//! An HTTP service that renders a URL in headless Chrome and returns the
//! screenshot as an image body.
//!
//! A request flows through three stages:
//!
//! - **Input resolution** ([`job`]): a query string or JSON body becomes a
//!   [`CaptureJob`], or a validation error.
//! - **Rendering** ([`renderer`]): one browser process per job, launched,
//!   driven through navigation and readiness waits, captured, and always
//!   terminated.
//! - **Response building** ([`response`]): image bytes or a JSON error body.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "cdp")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use pageshot::{cdp::CdpLauncher, CaptureJob, LaunchSettings, RenderPolicy, Renderer};
//!
//! let renderer = Renderer::new(
//!     Arc::new(CdpLauncher),
//!     LaunchSettings::default(),
//!     RenderPolicy::default(),
//! );
//! let png = renderer.render(&CaptureJob::new("https://example.com"), None)?;
//! std::fs::write("example.png", png)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "cdp"))]
//! # fn main() {}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod job;
pub mod browser;
pub mod renderer;
pub mod network;
pub mod fonts;
pub mod executable;
pub mod response;
pub mod server;
pub mod config;

// Async-friendly facade over the blocking renderer (dedicated worker thread per capture)
pub mod async_api;

#[cfg(feature = "cdp")]
pub mod cdp;

pub use browser::{BrowserLauncher, BrowserSession, CaptureArea, LaunchSettings, ScreenshotParams};
pub use fonts::{FontAsset, FontCache};
pub use renderer::{RenderPolicy, Renderer, SessionGuard, WaitPolicy};

/// Compression quality used when the request does not specify one.
pub const DEFAULT_QUALITY: u8 = 80;

/// Output encoding of a capture
///
/// Requests may name any type. Names the browser cannot encode are kept in
/// [`ImageType::Other`] and fail at capture time, after the page has loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageType {
    #[default]
    Png,
    Jpeg,
    Webp,
    Other(String),
}

impl ImageType {
    pub fn as_str(&self) -> &str {
        match self {
            ImageType::Png => "png",
            ImageType::Jpeg => "jpeg",
            ImageType::Webp => "webp",
            ImageType::Other(name) => name,
        }
    }

    /// MIME type for the `Content-Type` header
    pub fn mime(&self) -> String {
        format!("image/{}", self.as_str())
    }

    /// Whether a quality setting means anything for this encoding
    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageType::Jpeg | ImageType::Webp)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, ImageType::Other(_))
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ImageType {
    fn from(s: &str) -> Self {
        match s {
            "png" => ImageType::Png,
            "jpeg" => ImageType::Jpeg,
            "webp" => ImageType::Webp,
            other => ImageType::Other(other.to_string()),
        }
    }
}

/// Viewport dimensions and pixel density used to render the page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    /// A large viewport leaves room for full-page geometry.
    fn default() -> Self {
        Self {
            width: 2000,
            height: 2000,
            device_scale_factor: 3.0,
        }
    }
}

/// A fixed pixel rectangle captured instead of the page or viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FromStr for ClipRegion {
    type Err = Error;

    /// Parses `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::ValidationError(format!("Invalid clip '{}': {}", s, e)))?;

        match parts.as_slice() {
            [x, y, width, height] => Ok(ClipRegion {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            }),
            _ => Err(Error::ValidationError(format!(
                "Invalid clip '{}': expected x,y,width,height",
                s
            ))),
        }
    }
}

/// One request's fully-resolved rendering parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureJob {
    /// Page to render; never empty once resolved
    pub url: String,
    /// Capture the whole scrollable page instead of the viewport
    pub full_page: bool,
    /// Compression quality, only meaningful for lossy encodings
    pub quality: u8,
    pub image_type: ImageType,
    /// Explicit viewport; the renderer's default applies when absent
    pub viewport: Option<Viewport>,
    /// Per-request clip; overrides the server-wide clip policy
    pub clip: Option<ClipRegion>,
    /// Per-request content marker; overrides the configured selector
    pub wait_for_selector: Option<String>,
}

impl CaptureJob {
    /// A job with every option at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            full_page: true,
            quality: DEFAULT_QUALITY,
            image_type: ImageType::Png,
            viewport: None,
            clip: None,
            wait_for_selector: None,
        }
    }

    /// Suggested download name for the `Content-Disposition` header
    pub fn file_name(&self) -> String {
        format!("screenshot.{}", self.image_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_viewport() {
        let viewport = Viewport::default();
        assert_eq!(viewport.width, 2000);
        assert_eq!(viewport.height, 2000);
        assert_eq!(viewport.device_scale_factor, 3.0);
    }

    #[test]
    fn test_job_defaults() {
        let job = CaptureJob::new("https://example.com");
        assert!(job.full_page);
        assert_eq!(job.quality, 80);
        assert_eq!(job.image_type, ImageType::Png);
        assert_eq!(job.file_name(), "screenshot.png");
    }

    #[test]
    fn test_image_type_parsing() {
        assert_eq!(ImageType::from("jpeg"), ImageType::Jpeg);
        assert_eq!(ImageType::Webp.mime(), "image/webp");
        assert!(!ImageType::Png.is_lossy());

        let gif = ImageType::from("gif");
        assert_eq!(gif, ImageType::Other("gif".into()));
        assert!(!gif.is_supported());
        assert!(!gif.is_lossy());
        assert_eq!(gif.mime(), "image/gif");
    }

    #[test]
    fn test_clip_parsing() {
        let clip: ClipRegion = "10, 20,300,400".parse().unwrap();
        assert_eq!(clip, ClipRegion { x: 10, y: 20, width: 300, height: 400 });
        assert!("1,2,3".parse::<ClipRegion>().is_err());
        assert!("a,b,c,d".parse::<ClipRegion>().is_err());
    }
}
