//! Chrome DevTools Protocol backend (uses the `headless_chrome` crate)

use std::ffi::{OsStr, OsString};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::{Emulation, Network, Page, DOM};
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, info, warn};

use crate::browser::{BrowserLauncher, BrowserSession, CaptureArea, ScreenshotParams};
use crate::fonts::FontAsset;
use crate::network::{is_snapshot_quiet, NetworkActivity, MAX_INFLIGHT, NETWORK_QUIET_WINDOW};
use crate::{Error, ImageType, LaunchSettings, Result, Viewport};

const NETWORK_POLL_INTERVAL: Duration = Duration::from_millis(100);

const DOCUMENT_SIZE_SCRIPT: &str = r#"JSON.stringify({
    width: Math.max(
        document.documentElement ? document.documentElement.scrollWidth : 0,
        document.body ? document.body.scrollWidth : 0
    ),
    height: Math.max(
        document.documentElement ? document.documentElement.scrollHeight : 0,
        document.body ? document.body.scrollHeight : 0
    )
})"#;

const CLEAR_BODY_BACKGROUND_SCRIPT: &str = r#"(function(){
    if (document.body) { document.body.style.background = 'transparent'; }
    return true;
})()"#;

/// Launches a fresh headless Chrome per capture
#[derive(Debug, Clone, Copy, Default)]
pub struct CdpLauncher;

impl BrowserLauncher for CdpLauncher {
    fn launch(&self, settings: &LaunchSettings) -> Result<Box<dyn BrowserSession>> {
        let flags: Vec<OsString> = settings.flags.iter().map(OsString::from).collect();
        let args: Vec<&OsStr> = flags.iter().map(OsString::as_os_str).collect();

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .path(settings.executable.clone())
            .window_size(Some((settings.window.width, settings.window.height)))
            .idle_browser_timeout(settings.idle_timeout)
            .args(args)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        info!(
            "Launched browser (pid {:?})",
            browser.get_process_id()
        );

        Ok(Box::new(CdpSession {
            browser: Some(browser),
            tab: None,
            network: Arc::new(NetworkActivity::new()),
        }))
    }
}

/// One headless Chrome process and the tab a capture renders into
pub struct CdpSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
    /// Fed by the tab's event listener
    network: Arc<NetworkActivity>,
}

impl CdpSession {
    fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab
            .as_ref()
            .ok_or_else(|| Error::Other("No page is open in this browser session".into()))
    }

    fn evaluate_value(&self, script: &str, await_promise: bool) -> Result<Option<serde_json::Value>> {
        let result = self.tab()?.evaluate(script, await_promise)?;
        Ok(result.value)
    }

    /// Count requests as they are sent and settled.
    fn track_network(&self, tab: &Arc<Tab>) -> Result<()> {
        tab.call_method(Network::Enable {
            max_total_buffer_size: None,
            max_resource_buffer_size: None,
            max_post_data_size: None,
            report_direct_socket_traffic: None,
            enable_durable_messages: None,
        })
        .map_err(|e| Error::InitializationError(format!("Failed to enable network events: {}", e)))?;

        let activity = self.network.clone();
        tab.add_event_listener(Arc::new(move |event: &Event| match event {
            Event::NetworkRequestWillBeSent(e) => activity.request_started(&e.params.request_id),
            Event::NetworkLoadingFinished(e) => activity.request_finished(&e.params.request_id),
            Event::NetworkLoadingFailed(e) => activity.request_finished(&e.params.request_id),
            _ => {}
        }))
        .map_err(|e| Error::InitializationError(format!("Failed to listen for network events: {}", e)))?;
        Ok(())
    }

    /// Block until no request has been open for [`NETWORK_QUIET_WINDOW`].
    fn wait_for_network_idle(&self, deadline: Instant) -> Result<()> {
        loop {
            let snapshot = self.network.snapshot();
            if is_snapshot_quiet(&snapshot, NETWORK_QUIET_WINDOW, MAX_INFLIGHT) {
                debug!("Network idle for {:?}", snapshot.since_last_activity);
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(Error::NavigationError(format!(
                    "Timed out waiting for network to become idle ({} requests in flight)",
                    snapshot.inflight
                )));
            }
            thread::sleep(NETWORK_POLL_INTERVAL);
        }
    }

    fn document_size(&self) -> Result<(u32, u32)> {
        let raw = self
            .evaluate_value(DOCUMENT_SIZE_SCRIPT, false)?
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| Error::CaptureError("Could not measure document size".into()))?;

        let size: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| Error::CaptureError(format!("Invalid document size: {}", e)))?;
        let dim = |key: &str| size.get(key).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        Ok((dim("width"), dim("height")))
    }
}

fn screenshot_format(format: &ImageType) -> Result<Page::CaptureScreenshotFormatOption> {
    match format {
        ImageType::Png => Ok(Page::CaptureScreenshotFormatOption::Png),
        ImageType::Jpeg => Ok(Page::CaptureScreenshotFormatOption::Jpeg),
        ImageType::Webp => Ok(Page::CaptureScreenshotFormatOption::Webp),
        ImageType::Other(name) => Err(Error::CaptureError(format!("Unsupported screenshot type '{}'", name))),
    }
}

/// Clip rectangle producing exactly `width` x `height` image pixels at any
/// device scale factor.
fn clip_viewport(x: u32, y: u32, width: u32, height: u32, device_scale_factor: f64) -> Page::Viewport {
    let scale = if device_scale_factor.is_finite() && device_scale_factor > 0.0 {
        1.0 / device_scale_factor
    } else {
        1.0
    };
    Page::Viewport {
        x: x as f64,
        y: y as f64,
        width: width as f64,
        height: height as f64,
        scale,
    }
}

impl BrowserSession for CdpSession {
    fn open_page(&mut self) -> Result<()> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| Error::Other("Browser session already terminated".into()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;
        self.track_network(&tab)?;
        self.tab = Some(tab);
        Ok(())
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        self.tab()?
            .call_method(Emulation::SetDeviceMetricsOverride {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: viewport.device_scale_factor,
                mobile: false,
                scale: None,
                screen_width: None,
                screen_height: None,
                position_x: None,
                position_y: None,
                dont_set_visible_size: None,
                screen_orientation: None,
                viewport: None,
                display_feature: None,
                device_posture: None,
            })
            .map_err(|e| Error::InitializationError(format!("Failed to set viewport: {}", e)))?;
        Ok(())
    }

    fn register_font(&mut self, font: &FontAsset) -> Result<()> {
        self.tab()?
            .call_method(Page::AddScriptToEvaluateOnNewDocument {
                source: font.registration_script(),
                world_name: None,
                include_command_line_api: None,
                run_immediately: None,
            })
            .map_err(|e| Error::InitializationError(format!("Failed to register font: {}", e)))?;
        debug!("Registered font '{}'", font.family);
        Ok(())
    }

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let tab = self.tab()?;
        tab.set_default_timeout(timeout);
        self.network.touch();

        tab.navigate_to(url)
            .map_err(|e| Error::NavigationError(format!("Navigation failed: {}", e)))?;

        tab.wait_until_navigated()
            .map_err(|e| Error::NavigationError(format!("Wait for navigation failed: {}", e)))?;

        self.wait_for_network_idle(deadline)
    }

    fn wait_for_fonts(&mut self, fallback: Duration) -> Result<()> {
        // Resolves on document.fonts.ready, or after the fallback when the
        // page exposes no font loading signal (or never settles).
        let script = format!(
            r#"Promise.race([
                (document.fonts && document.fonts.ready)
                    ? document.fonts.ready.then(function(){{ return 'ready'; }})
                    : new Promise(function(){{}}),
                new Promise(function(r){{ setTimeout(function(){{ r('fallback'); }}, {}); }})
            ])"#,
            fallback.as_millis()
        );

        let outcome = self.evaluate_value(&script, true)?;
        if outcome.as_ref().and_then(|v| v.as_str()) == Some("fallback") {
            info!("Font readiness not signalled within {:?}", fallback);
        }
        Ok(())
    }

    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        self.tab()?
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|e| Error::Other(format!("Selector '{}' not found: {}", selector, e)))?;
        info!("Selector '{}' found", selector);
        Ok(())
    }

    fn clear_background(&mut self, omit_background: bool) -> Result<()> {
        self.evaluate_value(CLEAR_BODY_BACKGROUND_SCRIPT, false)?;

        if omit_background {
            self.tab()?
                .call_method(Emulation::SetDefaultBackgroundColorOverride {
                    color: Some(DOM::RGBA {
                        r: 0,
                        g: 0,
                        b: 0,
                        a: Some(0.0),
                    }),
                })
                .map_err(|e| Error::CaptureError(format!("Failed to clear background: {}", e)))?;
        }
        Ok(())
    }

    fn screenshot(&mut self, params: &ScreenshotParams) -> Result<Vec<u8>> {
        let format = screenshot_format(&params.format)?;
        let clip = match params.area {
            CaptureArea::Viewport => None,
            CaptureArea::FullPage => {
                let (width, height) = self.document_size()?;
                Some(Page::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: width as f64,
                    height: height as f64,
                    scale: 1.0,
                })
            }
            CaptureArea::Clip(c) => Some(clip_viewport(c.x, c.y, c.width, c.height, params.device_scale_factor)),
        };

        let encoded = self
            .tab()?
            .call_method(Page::CaptureScreenshot {
                format: Some(format),
                quality: params.quality.map(u32::from),
                capture_beyond_viewport: Some(clip.is_some()),
                clip,
                from_surface: Some(true),
                optimize_for_speed: None,
            })
            .map_err(|e| Error::CaptureError(format!("Screenshot failed: {}", e)))?
            .data;

        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::CaptureError(format!("Screenshot data was not base64: {}", e)))
    }

    fn terminate(&mut self) -> Result<()> {
        if let Some(tab) = self.tab.take() {
            if let Err(e) = tab.close(false) {
                warn!("Failed to close tab: {}", e);
            }
        }

        // Dropping the last handle kills the child process.
        if let Some(browser) = self.browser.take() {
            let pid = browser.get_process_id();
            drop(browser);
            info!("Terminated browser (pid {:?})", pid);
        }
        Ok(())
    }
}
