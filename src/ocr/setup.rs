use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::TesseractConfig;

use super::tesseract::TesseractCli;

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "tesseract.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "tesseract";

/// Typical install locations outside of PATH.
const COMMON_PATHS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
];

pub struct TesseractPaths {
    pub executable: PathBuf,
    pub tessdata: Option<PathBuf>,
}

/// Returns the per-user directory for a bundled Tesseract copy.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("captcha-solver")
        .join("tesseract")
}

/// Locates the Tesseract executable and tessdata directory.
///
/// Order: explicit config, the per-user bundle directory, `PATH`, then common
/// install paths.
pub fn find_tesseract(config: &TesseractConfig) -> Result<TesseractPaths> {
    let bundle_dir = get_tesseract_dir();
    let executable = find_tesseract_executable(config.executable.as_deref(), &bundle_dir)?;

    let tessdata = match &config.tessdata_dir {
        Some(dir) => Some(dir.clone()),
        None => {
            let bundled = bundle_dir.join("tessdata");
            bundled.is_dir().then_some(bundled)
        }
    };

    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

fn find_tesseract_executable(explicit: Option<&Path>, bundle_dir: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "configured Tesseract executable does not exist");
    }

    let bundled = bundle_dir.join(EXECUTABLE_NAME);
    if bundled.exists() {
        return Ok(bundled);
    }

    if responds_to_version(Path::new(EXECUTABLE_NAME)) {
        tracing::debug!("using Tesseract from PATH");
        return Ok(PathBuf::from(EXECUTABLE_NAME));
    }

    for path in COMMON_PATHS {
        let path = PathBuf::from(path);
        if path.exists() {
            tracing::debug!(path = %path.display(), "found Tesseract at common install path");
            return Ok(path);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install it, add it to PATH, or set tesseract.executable in config.json (looked in {})",
        bundle_dir.display()
    ))
}

fn responds_to_version(executable: &Path) -> bool {
    Command::new(executable)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Builds a ready-to-use recognizer from config.
pub fn build_recognizer(config: &TesseractConfig) -> Result<TesseractCli> {
    let paths = find_tesseract(config)?;
    let mut cli = TesseractCli::new(paths.executable)
        .with_language(config.language.clone())
        .with_engine_mode(config.engine_mode);
    if let Some(dir) = paths.tessdata {
        cli = cli.with_tessdata_dir(dir);
    }
    Ok(cli)
}

/// Reads the version number from `tesseract --version`.
pub fn tesseract_version(executable: &Path) -> Result<String> {
    let output = Command::new(executable)
        .arg("--version")
        .output()
        .with_context(|| format!("failed to run {}", executable.display()))?;

    // Older builds print the banner on stderr
    let mut banner = String::from_utf8_lossy(&output.stdout).to_string();
    banner.push_str(&String::from_utf8_lossy(&output.stderr));

    parse_version_banner(&banner).ok_or_else(|| anyhow!("unrecognized Tesseract version output"))
}

fn parse_version_banner(banner: &str) -> Option<String> {
    let re = Regex::new(r"(?m)^tesseract\s+v?(\d+\.\d+(?:\.\d+)?)").ok()?;
    re.captures(banner).map(|caps| caps[1].to_string())
}
