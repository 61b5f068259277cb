//! Configuration types.
//!
//! Loads settings from config.json at startup. Every field has a default, so
//! a partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::ocr::engine::DEFAULT_WHITELIST;
use crate::ocr::rotation::DEFAULT_ROTATION_ANGLES;
use crate::solver::session::Selector;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Image pipeline tuning.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Pixels with brightness strictly below this are ink (0-255)
    #[serde(default = "default_ink_threshold")]
    pub ink_threshold: u8,
    /// Narrower ink runs are discarded as noise
    #[serde(default = "default_min_segment_width")]
    pub min_segment_width: u32,
    /// Counter-rotations tried per segment, in degrees, in order
    #[serde(default = "default_rotation_angles")]
    pub rotation_angles: Vec<f32>,
    /// Symbols the recognizer may output
    #[serde(default = "default_whitelist")]
    pub whitelist: String,
}

fn default_ink_threshold() -> u8 {
    32
}

fn default_min_segment_width() -> u32 {
    5
}

fn default_rotation_angles() -> Vec<f32> {
    DEFAULT_ROTATION_ANGLES.to_vec()
}

fn default_whitelist() -> String {
    DEFAULT_WHITELIST.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ink_threshold: default_ink_threshold(),
            min_segment_width: default_min_segment_width(),
            rotation_angles: default_rotation_angles(),
            whitelist: default_whitelist(),
        }
    }
}

/// Where and how to run Tesseract.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TesseractConfig {
    /// Explicit executable; searched for when absent
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Explicit tessdata directory
    #[serde(default)]
    pub tessdata_dir: Option<PathBuf>,
    #[serde(default = "default_language")]
    pub language: String,
    /// `--oem` value; 3 = best available engine
    #[serde(default = "default_engine_mode")]
    pub engine_mode: u8,
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_engine_mode() -> u8 {
    3
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            executable: None,
            tessdata_dir: None,
            language: default_language(),
            engine_mode: default_engine_mode(),
        }
    }
}

/// Locators for the parts of the challenge widget.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChallengeSelectors {
    pub image: Selector,
    pub refresh: Selector,
    pub input: Selector,
    pub submit: Selector,
}

impl Default for ChallengeSelectors {
    fn default() -> Self {
        Self {
            image: Selector::Css("div.a-row.a-text-center > img".to_string()),
            refresh: Selector::Css("a.a-declarative > i.a-icon.a-icon-refresh".to_string()),
            input: Selector::Id("captchacharacters".to_string()),
            submit: Selector::XPath(
                r#"//button[contains(@class, "a-button-text") and contains(text(), "Continue shopping")]"#
                    .to_string(),
            ),
        }
    }
}

/// Retry loop settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SolverConfig {
    /// Full detect-recognize-submit-verify cycles before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// How long to wait for the challenge image to appear (milliseconds)
    #[serde(default = "default_detect_wait_ms")]
    pub detect_wait_ms: u64,
    /// Poll interval for element and page-ready waits (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay after clicking refresh before re-detecting (milliseconds)
    #[serde(default = "default_refresh_settle_ms")]
    pub refresh_settle_ms: u64,
    /// Delay after submitting before verifying (milliseconds)
    #[serde(default = "default_submit_settle_ms")]
    pub submit_settle_ms: u64,
    /// Page-ready wait before the first attempt; 0 disables it (milliseconds)
    #[serde(default = "default_page_ready_timeout_ms")]
    pub page_ready_timeout_ms: u64,
    /// When set, every captured challenge image is saved here
    #[serde(default)]
    pub capture_dir: Option<PathBuf>,
    #[serde(default)]
    pub selectors: ChallengeSelectors,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_detect_wait_ms() -> u64 {
    15000
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_refresh_settle_ms() -> u64 {
    2000
}

fn default_submit_settle_ms() -> u64 {
    3000
}

fn default_page_ready_timeout_ms() -> u64 {
    15000
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            detect_wait_ms: default_detect_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            refresh_settle_ms: default_refresh_settle_ms(),
            submit_settle_ms: default_submit_settle_ms(),
            page_ready_timeout_ms: default_page_ready_timeout_ms(),
            capture_dir: None,
            selectors: ChallengeSelectors::default(),
        }
    }
}

impl SolverConfig {
    pub fn detect_wait(&self) -> Duration {
        Duration::from_millis(self.detect_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn refresh_settle(&self) -> Duration {
        Duration::from_millis(self.refresh_settle_ms)
    }

    pub fn submit_settle(&self) -> Duration {
        Duration::from_millis(self.submit_settle_ms)
    }

    pub fn page_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.page_ready_timeout_ms)
    }
}

/// Complete configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub tesseract: TesseractConfig,
    #[serde(default)]
    pub solver: SolverConfig,
}

/// Loads configuration from `path`, falling back to defaults.
///
/// A missing, unreadable or malformed file is logged and never fatal.
pub fn load_config_from(path: &Path) -> AppConfig {
    tracing::debug!(path = %path.display(), "looking for config");

    if !path.exists() {
        tracing::info!(path = %path.display(), "config not found, using defaults");
        return AppConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "config loaded");
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
                AppConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config, using defaults");
            AppConfig::default()
        }
    }
}

/// Loads config.json from the executable's directory.
pub fn load_config() -> AppConfig {
    load_config_from(&crate::paths::get_config_path())
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() {
    let _ = CONFIG.set(load_config());
}

/// Returns the global configuration, or defaults if `init_config` was never called.
pub fn get_config() -> &'static AppConfig {
    CONFIG.get_or_init(AppConfig::default)
}
