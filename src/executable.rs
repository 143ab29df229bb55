//! Browser executable resolution.
//!
//! Production images ship a minimal bundled Chromium; development machines use
//! whatever browser is installed. The choice is made once at startup and the
//! resolved path is carried in [`crate::LaunchSettings`].

use std::path::{Path, PathBuf};

use log::debug;

use crate::config::Environment;
use crate::{Error, Result};

/// Where the bundled minimal Chromium is unpacked in production images
pub const BUNDLED_CANDIDATES: &[&str] = &[
    "/opt/chromium/chromium",
    "/tmp/chromium",
    "/usr/lib/chromium/chromium",
];

/// Common locations of a locally installed browser
pub const LOCAL_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutableStrategy {
    /// A path given by the operator; must exist
    Explicit(PathBuf),
    /// First existing bundled location
    Bundled(Vec<PathBuf>),
    /// First existing local install, then the automation library's discovery
    Local(Vec<PathBuf>),
}

impl ExecutableStrategy {
    /// Pick the strategy for an execution environment.
    pub fn for_environment(environment: Environment, explicit: Option<PathBuf>) -> Self {
        if let Some(path) = explicit {
            return ExecutableStrategy::Explicit(path);
        }
        match environment {
            Environment::Production => {
                ExecutableStrategy::Bundled(BUNDLED_CANDIDATES.iter().map(PathBuf::from).collect())
            }
            Environment::Development => {
                ExecutableStrategy::Local(LOCAL_CANDIDATES.iter().map(PathBuf::from).collect())
            }
        }
    }

    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            ExecutableStrategy::Explicit(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(Error::ConfigError(format!(
                        "Browser executable {} does not exist",
                        path.display()
                    )))
                }
            }
            ExecutableStrategy::Bundled(candidates) => first_existing(candidates).ok_or_else(|| {
                Error::ConfigError(format!(
                    "No bundled browser found (looked in {})",
                    join_paths(candidates)
                ))
            }),
            ExecutableStrategy::Local(candidates) => {
                if let Some(path) = first_existing(candidates) {
                    return Ok(path);
                }
                discover().map_err(|e| {
                    Error::ConfigError(format!(
                        "No local browser found (looked in {}): {}",
                        join_paths(candidates),
                        e
                    ))
                })
            }
        }
    }
}

fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|p| {
            debug!("Checking browser candidate {}", p.display());
            p.is_file()
        })
        .cloned()
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(feature = "cdp")]
fn discover() -> std::result::Result<PathBuf, String> {
    headless_chrome::browser::default_executable()
}

#[cfg(not(feature = "cdp"))]
fn discover() -> std::result::Result<PathBuf, String> {
    Err("browser discovery requires the `cdp` feature".into())
}

/// Resolve the executable for `environment`, honouring an explicit override.
pub fn resolve_executable(environment: Environment, explicit: Option<&Path>) -> Result<PathBuf> {
    ExecutableStrategy::for_environment(environment, explicit.map(Path::to_path_buf)).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins_over_environment() {
        let s = ExecutableStrategy::for_environment(
            Environment::Production,
            Some(PathBuf::from("/custom/chrome")),
        );
        assert_eq!(s, ExecutableStrategy::Explicit(PathBuf::from("/custom/chrome")));
    }

    #[test]
    fn environment_selects_candidate_list() {
        match ExecutableStrategy::for_environment(Environment::Production, None) {
            ExecutableStrategy::Bundled(c) => assert_eq!(c[0], PathBuf::from(BUNDLED_CANDIDATES[0])),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            ExecutableStrategy::for_environment(Environment::Development, None),
            ExecutableStrategy::Local(_)
        ));
    }

    #[test]
    fn explicit_missing_path_is_a_config_error() {
        let err = ExecutableStrategy::Explicit(PathBuf::from("/nonexistent/chrome"))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn bundled_picks_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("chromium");
        std::fs::write(&present, b"").unwrap();

        let strategy = ExecutableStrategy::Bundled(vec![dir.path().join("missing"), present.clone()]);
        assert_eq!(strategy.resolve().unwrap(), present);

        let none = ExecutableStrategy::Bundled(vec![dir.path().join("missing")]);
        assert!(matches!(none.resolve(), Err(Error::ConfigError(_))));
    }
}
