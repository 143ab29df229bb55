//! Shared test helpers: a spy browser backend and a throwaway server.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pageshot::browser::{BrowserLauncher, BrowserSession, LaunchSettings, ScreenshotParams};
use pageshot::server::{cors_layer, router, AppState};
use pageshot::{Error, FontAsset, FontCache, RenderPolicy, Renderer, Result, Viewport};

/// Where the spy should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Launch,
    Navigate,
    Screenshot,
    EmptyScreenshot,
    Panic,
}

/// Records every browser launch and termination
#[derive(Debug, Default)]
pub struct SpyRecord {
    pub launches: usize,
    pub terminations: usize,
    pub screenshots: Vec<ScreenshotParams>,
    pub urls: Vec<String>,
}

#[derive(Clone)]
pub struct SpyLauncher {
    pub record: Arc<Mutex<SpyRecord>>,
    pub fail_at: Option<FailAt>,
    pub image: Vec<u8>,
}

impl SpyLauncher {
    pub fn new(image: Vec<u8>, fail_at: Option<FailAt>) -> Self {
        Self {
            record: Arc::new(Mutex::new(SpyRecord::default())),
            fail_at,
            image,
        }
    }

    pub fn launches(&self) -> usize {
        self.record.lock().unwrap().launches
    }

    pub fn terminations(&self) -> usize {
        self.record.lock().unwrap().terminations
    }
}

impl BrowserLauncher for SpyLauncher {
    fn launch(&self, _settings: &LaunchSettings) -> Result<Box<dyn BrowserSession>> {
        self.record.lock().unwrap().launches += 1;
        if self.fail_at == Some(FailAt::Launch) {
            return Err(Error::InitializationError("Failed to launch browser: not installed".into()));
        }
        Ok(Box::new(SpySession {
            record: self.record.clone(),
            fail_at: self.fail_at,
            image: self.image.clone(),
        }))
    }
}

struct SpySession {
    record: Arc<Mutex<SpyRecord>>,
    fail_at: Option<FailAt>,
    image: Vec<u8>,
}

impl BrowserSession for SpySession {
    fn open_page(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_viewport(&mut self, _viewport: &Viewport) -> Result<()> {
        Ok(())
    }

    fn register_font(&mut self, _font: &FontAsset) -> Result<()> {
        Ok(())
    }

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.record.lock().unwrap().urls.push(url.to_string());
        match self.fail_at {
            Some(FailAt::Navigate) => Err(Error::NavigationError(format!(
                "Navigation timeout of {} ms exceeded",
                timeout.as_millis()
            ))),
            Some(FailAt::Panic) => panic!("protocol connection dropped"),
            _ => Ok(()),
        }
    }

    fn wait_for_fonts(&mut self, _fallback: Duration) -> Result<()> {
        Ok(())
    }

    fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<()> {
        Err(Error::Other(format!("Selector '{}' not found", selector)))
    }

    fn clear_background(&mut self, _omit_background: bool) -> Result<()> {
        Ok(())
    }

    fn screenshot(&mut self, params: &ScreenshotParams) -> Result<Vec<u8>> {
        self.record.lock().unwrap().screenshots.push(params.clone());
        match self.fail_at {
            Some(FailAt::Screenshot) => Err(Error::CaptureError("Screenshot failed".into())),
            Some(FailAt::EmptyScreenshot) => Ok(Vec::new()),
            _ => Ok(self.image.clone()),
        }
    }

    fn terminate(&mut self) -> Result<()> {
        self.record.lock().unwrap().terminations += 1;
        Ok(())
    }
}

/// A 10x10 opaque white image, stored as raw RGBA bytes
pub fn white_10x10() -> Vec<u8> {
    vec![0xFF; 10 * 10 * 4]
}

/// Serve the API on a random local port, backed by `launcher`.
pub async fn spawn_server(launcher: SpyLauncher, policy: RenderPolicy, diagnostics: bool) -> SocketAddr {
    let renderer = Renderer::new(Arc::new(launcher), LaunchSettings::default(), policy);
    let state = Arc::new(AppState::new(renderer, FontCache::disabled(), diagnostics));
    let app = router(state, cors_layer(&["http://localhost:3000".to_string()]));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}
