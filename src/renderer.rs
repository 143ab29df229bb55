//! The render sequence: launch, configure, navigate, wait, capture.
//!
//! Each capture owns one browser process for its whole lifetime. The process
//! is wrapped in a [`SessionGuard`] as soon as it exists, so it is terminated
//! exactly once on every way out of [`Renderer::render`], including panics.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::browser::{BrowserLauncher, BrowserSession, CaptureArea, LaunchSettings, ScreenshotParams};
use crate::fonts::FontAsset;
use crate::{CaptureJob, ClipRegion, Error, Result, Viewport};

/// Tunables of the render sequence
#[derive(Debug, Clone)]
pub struct RenderPolicy {
    /// Viewport used when a job does not bring its own
    pub default_viewport: Viewport,
    /// Bound on navigation plus network quiescence
    pub navigation_timeout: Duration,
    /// How long to wait for fonts when the page gives no readiness signal
    pub font_fallback: Duration,
    /// Content marker waited for before capture, if any
    pub content_selector: Option<String>,
    pub selector_timeout: Duration,
    /// Server-wide clip; a job's own clip takes precedence
    pub clip: Option<ClipRegion>,
    /// Clear the background and keep it transparent in the output
    pub omit_background: bool,
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self {
            default_viewport: Viewport::default(),
            navigation_timeout: Duration::from_secs(30),
            font_fallback: Duration::from_secs(3),
            content_selector: None,
            selector_timeout: Duration::from_secs(10),
            clip: None,
            omit_background: true,
        }
    }
}

/// Whether a failed wait aborts the capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Failure propagates and fails the capture
    Required,
    /// Failure is logged and the sequence continues
    BestEffort,
}

impl WaitPolicy {
    /// Settle the outcome of a wait named `what`.
    pub fn settle(self, what: &str, outcome: Result<()>) -> Result<()> {
        match (self, outcome) {
            (_, Ok(())) => {
                debug!("Wait for {} completed", what);
                Ok(())
            }
            (WaitPolicy::Required, Err(e)) => Err(e),
            (WaitPolicy::BestEffort, Err(e)) => {
                info!("Wait for {} did not complete, continuing: {}", what, e);
                Ok(())
            }
        }
    }
}

/// Owns a browser session and terminates it exactly once when dropped.
pub struct SessionGuard {
    session: Box<dyn BrowserSession>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self { session }
    }
}

impl Deref for SessionGuard {
    type Target = dyn BrowserSession;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        match self.session.terminate() {
            Ok(()) => debug!("Browser session terminated"),
            Err(e) => warn!("Failed to terminate browser session: {}", e),
        }
    }
}

/// Runs capture jobs against browsers obtained from a [`BrowserLauncher`].
///
/// The renderer itself holds no per-request state; one instance serves every
/// request and concurrent renders are fully independent.
pub struct Renderer {
    launcher: Arc<dyn BrowserLauncher>,
    launch: LaunchSettings,
    policy: RenderPolicy,
}

impl Renderer {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, launch: LaunchSettings, policy: RenderPolicy) -> Self {
        Self {
            launcher,
            launch,
            policy,
        }
    }

    pub fn policy(&self) -> &RenderPolicy {
        &self.policy
    }

    /// Viewport a job renders with
    pub fn viewport_for(&self, job: &CaptureJob) -> Viewport {
        job.viewport.unwrap_or(self.policy.default_viewport)
    }

    /// Screenshot parameters for a job.
    ///
    /// A clip (the job's, else the policy's) always wins over `full_page`, and
    /// quality is only passed along for lossy formats. A format the browser
    /// cannot encode is a [`Error::CaptureError`].
    pub fn screenshot_params(&self, job: &CaptureJob) -> Result<ScreenshotParams> {
        if !job.image_type.is_supported() {
            return Err(Error::CaptureError(format!(
                "Unsupported screenshot type '{}': expected png, jpeg or webp",
                job.image_type
            )));
        }

        let area = match job.clip.or(self.policy.clip) {
            Some(clip) => CaptureArea::Clip(clip),
            None if job.full_page => CaptureArea::FullPage,
            None => CaptureArea::Viewport,
        };

        Ok(ScreenshotParams {
            format: job.image_type.clone(),
            quality: job.image_type.is_lossy().then_some(job.quality),
            area,
            device_scale_factor: self.viewport_for(job).device_scale_factor,
            omit_background: self.policy.omit_background,
        })
    }

    /// Render `job` and return the encoded image.
    ///
    /// `font`, when given, is registered before navigation.
    pub fn render(&self, job: &CaptureJob, font: Option<&FontAsset>) -> Result<Vec<u8>> {
        let viewport = self.viewport_for(job);
        info!(
            "Capturing {} as {} ({}x{}@{})",
            job.url, job.image_type, viewport.width, viewport.height, viewport.device_scale_factor
        );

        let mut session = SessionGuard::new(self.launcher.launch(&self.launch.for_viewport(&viewport))?);

        session.open_page()?;
        session.set_viewport(&viewport)?;

        if let Some(font) = font {
            session.register_font(font)?;
        }

        let outcome = session.navigate(&job.url, self.policy.navigation_timeout);
        WaitPolicy::Required.settle("navigation", outcome)?;

        let outcome = session.wait_for_fonts(self.policy.font_fallback);
        WaitPolicy::BestEffort.settle("fonts", outcome)?;

        if let Some(selector) = job
            .wait_for_selector
            .as_deref()
            .or(self.policy.content_selector.as_deref())
        {
            let outcome = session.wait_for_selector(selector, self.policy.selector_timeout);
            WaitPolicy::BestEffort.settle(&format!("selector '{}'", selector), outcome)?;
        }

        session.clear_background(self.policy.omit_background)?;

        let params = self.screenshot_params(job)?;
        let data = session.screenshot(&params)?;
        if data.is_empty() {
            return Err(Error::CaptureError("Screenshot returned no data".into()));
        }

        info!("Captured {} ({} bytes)", job.url, data.len());
        Ok(data)
    }
}
