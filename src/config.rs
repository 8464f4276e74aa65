//! Run configuration and remote target descriptors.
//!
//! A [`RunConfiguration`] is assembled once from the command line (and an
//! optional YAML targets file) and is passed by reference into every stage.

use crate::analysis::CountMode;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Listing page of the opinion section.
pub const DEFAULT_SECTION_URL: &str = "https://elpais.com/opinion/";

/// Free tier translation endpoint.
pub const DEFAULT_TRANSLATION_ENDPOINT: &str = "https://api.mymemory.translated.net/get";

/// W3C WebDriver hub of the device cloud.
pub const DEFAULT_HUB_URL: &str = "https://hub-cloud.browserstack.com/wd/hub";

pub const DEFAULT_MAX_ARTICLES: usize = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_TARGET_TIMEOUT_SECS: u64 = 300;

/// One remote execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    /// Display name, e.g. "Chrome on Windows 10".
    pub name: String,
    pub browser: String,
    #[serde(default = "default_browser_version")]
    pub browser_version: String,
    /// Platform name, e.g. "Windows", "OS X", "Android".
    pub os: String,
    pub os_version: String,
    /// Set for real mobile devices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

fn default_browser_version() -> String {
    "latest".to_string()
}

impl TargetDescriptor {
    pub fn desktop(name: &str, browser: &str, os: &str, os_version: &str) -> Self {
        Self {
            name: name.to_string(),
            browser: browser.to_string(),
            browser_version: default_browser_version(),
            os: os.to_string(),
            os_version: os_version.to_string(),
            device: None,
        }
    }

    pub fn mobile(name: &str, browser: &str, os: &str, os_version: &str, device: &str) -> Self {
        Self {
            device: Some(device.to_string()),
            ..Self::desktop(name, browser, os, os_version)
        }
    }

    /// Descriptor used for the local browser in single-session mode.
    pub fn local(headless: bool) -> Self {
        let name = if headless {
            "local Chromium (headless)"
        } else {
            "local Chromium"
        };
        Self::desktop(name, "Chromium", std::env::consts::OS, "")
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The five browser/platform combinations run in distributed mode by default.
pub fn default_targets() -> Vec<TargetDescriptor> {
    vec![
        TargetDescriptor::desktop("Chrome on Windows 10", "Chrome", "Windows", "10"),
        TargetDescriptor::desktop("Firefox on Windows 10", "Firefox", "Windows", "10"),
        TargetDescriptor::desktop("Safari on macOS", "Safari", "OS X", "Monterey"),
        TargetDescriptor::mobile(
            "Chrome on Android",
            "Chrome",
            "Android",
            "11.0",
            "Samsung Galaxy S21",
        ),
        TargetDescriptor::mobile("Safari on iOS", "Safari", "iOS", "15", "iPhone 13"),
    ]
}

#[derive(Debug, Deserialize)]
struct TargetsFile {
    targets: Vec<TargetDescriptor>,
}

/// Read target descriptors from a YAML file with a top-level `targets:` list.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_targets(path: &Path) -> Result<Vec<TargetDescriptor>, PipelineError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::Config(format!("cannot read {}: {e}", path.display())))?;
    let targets = parse_targets(&raw)?;
    info!(count = targets.len(), "Loaded target descriptors");
    Ok(targets)
}

pub fn parse_targets(raw: &str) -> Result<Vec<TargetDescriptor>, PipelineError> {
    let file: TargetsFile = serde_yaml::from_str(raw)?;
    if file.targets.is_empty() {
        return Err(PipelineError::Config("targets list is empty".into()));
    }
    Ok(file.targets)
}

/// Settings for one invocation. Immutable once built.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub max_articles: usize,
    pub headless: bool,
    /// Bound on each individual page or element wait.
    pub timeout: Duration,
    /// Bound on one distributed target's whole run.
    pub target_timeout: Duration,
    pub targets: Vec<TargetDescriptor>,
    pub section_url: String,
    pub translation_endpoint: String,
    /// Where cover images are stored; `None` disables downloads.
    pub image_dir: Option<PathBuf>,
    pub count_mode: CountMode,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            max_articles: DEFAULT_MAX_ARTICLES,
            headless: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            target_timeout: Duration::from_secs(DEFAULT_TARGET_TIMEOUT_SECS),
            targets: default_targets(),
            section_url: DEFAULT_SECTION_URL.to_string(),
            translation_endpoint: DEFAULT_TRANSLATION_ENDPOINT.to_string(),
            image_dir: Some(PathBuf::from("./downloaded_images")),
            count_mode: CountMode::AllOccurrences,
        }
    }
}

impl RunConfiguration {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.timeout.is_zero() {
            return Err(PipelineError::Config("timeout must be greater than zero".into()));
        }
        if self.target_timeout.is_zero() {
            return Err(PipelineError::Config(
                "target timeout must be greater than zero".into(),
            ));
        }
        url::Url::parse(&self.section_url)
            .map_err(|e| PipelineError::Config(format!("invalid section URL: {e}")))?;
        url::Url::parse(&self.translation_endpoint)
            .map_err(|e| PipelineError::Config(format!("invalid translation endpoint: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targets() {
        let targets = default_targets();
        assert_eq!(targets.len(), 5);
        assert_eq!(targets[0].name, "Chrome on Windows 10");
        assert_eq!(targets[3].device.as_deref(), Some("Samsung Galaxy S21"));
        assert!(targets.iter().all(|t| t.browser_version == "latest"));
    }

    #[test]
    fn test_parse_targets_yaml() {
        let raw = r#"
targets:
  - name: Edge on Windows 11
    browser: Edge
    os: Windows
    os_version: "11"
  - name: Chrome on Pixel
    browser: Chrome
    browser_version: "120"
    os: Android
    os_version: "14.0"
    device: Google Pixel 8
"#;
        let targets = parse_targets(raw).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].browser_version, "latest");
        assert_eq!(targets[0].device, None);
        assert_eq!(targets[1].browser_version, "120");
        assert_eq!(targets[1].device.as_deref(), Some("Google Pixel 8"));
    }

    #[test]
    fn test_parse_targets_rejects_empty_list() {
        let err = parse_targets("targets: []").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_load_targets_missing_file() {
        let err = load_targets(Path::new("/nonexistent/targets.yaml")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn test_validate() {
        let config = RunConfiguration::default();
        assert!(config.validate().is_ok());

        let config = RunConfiguration {
            timeout: Duration::ZERO,
            ..RunConfiguration::default()
        };
        assert!(config.validate().is_err());

        let config = RunConfiguration {
            section_url: "not a url".into(),
            ..RunConfiguration::default()
        };
        assert!(config.validate().is_err());
    }
}
