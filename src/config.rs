//! Service configuration from command line flags and environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::browser::LaunchSettings;
use crate::fonts::FontSource;
use crate::renderer::RenderPolicy;
use crate::{ClipRegion, Viewport};

/// Execution environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    /// Bundled browser, no diagnostics in error responses
    Production,
    /// Locally installed browser, stack traces in error responses
    Development,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "pageshot", version, about = "Render a URL in headless Chrome and return a screenshot")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "PAGESHOT_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    #[arg(long, env = "PAGESHOT_ENV", value_enum, default_value_t = Environment::Development)]
    pub environment: Environment,

    /// Browser executable; overrides environment-based discovery
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    #[arg(long, default_value_t = 2000)]
    pub viewport_width: u32,

    #[arg(long, default_value_t = 2000)]
    pub viewport_height: u32,

    /// Default pixel density; also used when a request viewport omits it
    #[arg(long, default_value_t = 3.0)]
    pub device_scale_factor: f64,

    #[arg(long, default_value_t = 30_000)]
    pub navigation_timeout_ms: u64,

    #[arg(long, default_value_t = 3_000)]
    pub font_fallback_ms: u64,

    /// Content marker to wait for before capturing (best effort)
    #[arg(long)]
    pub wait_selector: Option<String>,

    #[arg(long, default_value_t = 10_000)]
    pub selector_timeout_ms: u64,

    /// Capture this rectangle instead of the page: x,y,width,height
    #[arg(long)]
    pub clip: Option<ClipRegion>,

    /// Font file registered with every page before navigation
    #[arg(long, env = "PAGESHOT_FONT")]
    pub font_path: Option<PathBuf>,

    #[arg(long, default_value = "Noto Color Emoji")]
    pub font_family: String,

    /// Origins allowed to call the API from a browser
    #[arg(long, value_delimiter = ',', default_value = "http://localhost:3000,https://studio.tcot.vn")]
    pub allowed_origins: Vec<String>,

    /// Keep the page background instead of clearing it to transparent
    #[arg(long)]
    pub opaque_background: bool,
}

impl ServerConfig {
    pub fn default_viewport(&self) -> Viewport {
        Viewport {
            width: self.viewport_width,
            height: self.viewport_height,
            device_scale_factor: self.device_scale_factor,
        }
    }

    pub fn render_policy(&self) -> RenderPolicy {
        RenderPolicy {
            default_viewport: self.default_viewport(),
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            font_fallback: Duration::from_millis(self.font_fallback_ms),
            content_selector: self.wait_selector.clone().filter(|s| !s.is_empty()),
            selector_timeout: Duration::from_millis(self.selector_timeout_ms),
            clip: self.clip,
            omit_background: !self.opaque_background,
        }
    }

    /// Launch settings with an already-resolved executable
    pub fn launch_settings(&self, executable: Option<PathBuf>) -> LaunchSettings {
        LaunchSettings {
            executable,
            window: self.default_viewport(),
            // Leave headroom past navigation so a slow page is reported as a
            // navigation timeout rather than a dead connection.
            idle_timeout: Duration::from_millis(self.navigation_timeout_ms) * 2,
            ..Default::default()
        }
    }

    pub fn font_source(&self) -> Option<FontSource> {
        self.font_path.as_ref().map(|path| FontSource {
            path: path.clone(),
            family: self.font_family.clone(),
        })
    }

    /// Error responses include diagnostic traces
    pub fn diagnostics(&self) -> bool {
        self.environment != Environment::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServerConfig {
        let mut argv = vec!["pageshot"];
        argv.extend_from_slice(args);
        ServerConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_render_policy_defaults() {
        let config = parse(&["--environment", "development"]);
        let policy = config.render_policy();
        let defaults = RenderPolicy::default();
        assert_eq!(policy.default_viewport, defaults.default_viewport);
        assert_eq!(policy.navigation_timeout, defaults.navigation_timeout);
        assert_eq!(policy.font_fallback, defaults.font_fallback);
        assert_eq!(policy.selector_timeout, defaults.selector_timeout);
        assert!(policy.omit_background);
        assert!(config.diagnostics());
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:3000".to_string(), "https://studio.tcot.vn".to_string()]
        );
    }

    #[test]
    fn flags_flow_into_policy() {
        let config = parse(&[
            "--environment",
            "production",
            "--device-scale-factor",
            "1.2",
            "--wait-selector",
            "#my-specific-content",
            "--selector-timeout-ms",
            "2000",
            "--clip",
            "0,0,1181,1772",
            "--allowed-origins",
            "http://localhost:3000,https://studio.example.com",
            "--opaque-background",
        ]);
        let policy = config.render_policy();
        assert_eq!(policy.default_viewport.device_scale_factor, 1.2);
        assert_eq!(policy.content_selector.as_deref(), Some("#my-specific-content"));
        assert_eq!(policy.selector_timeout, Duration::from_secs(2));
        assert_eq!(
            policy.clip,
            Some(ClipRegion { x: 0, y: 0, width: 1181, height: 1772 })
        );
        assert!(!policy.omit_background);
        assert_eq!(config.allowed_origins.len(), 2);
        assert!(!config.diagnostics());
    }

    #[test]
    fn launch_settings_carry_executable_and_window() {
        let config = parse(&["--viewport-width", "800", "--viewport-height", "600"]);
        let launch = config.launch_settings(Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(launch.executable, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(launch.window.width, 800);
        assert_eq!(launch.window.height, 600);
        assert!(!launch.flags.is_empty());
    }

    #[test]
    fn bad_clip_is_rejected() {
        assert!(ServerConfig::try_parse_from(["pageshot", "--clip", "1,2"]).is_err());
    }
}
