//! Captcha Solver
//!
//! Reads a single captcha image from disk and prints the recovered text.
//! Useful for checking a Tesseract install and tuning `config.json` against
//! saved captures.

use anyhow::{anyhow, Context, Result};

use captcha_solver::config;
use captcha_solver::ocr::{self, ImageTextExtractor};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        tracing::error!(%location, "panic: {}", panic_info);
    }));

    let image_path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: captcha-solver <image-path>"))?;

    config::init_config();
    let config = config::get_config();

    let recognizer =
        ocr::build_recognizer(&config.tesseract).context("Tesseract is not available")?;
    match ocr::tesseract_version(&recognizer.executable) {
        Ok(version) => tracing::info!(%version, executable = %recognizer.executable.display(), "using tesseract"),
        Err(e) => tracing::warn!(error = %e, "could not determine tesseract version"),
    }

    let extractor = ImageTextExtractor::new(recognizer, config.pipeline.clone())?;
    let text = extractor.extract_text(&image_path);

    if text.is_empty() {
        tracing::warn!(path = %image_path, "no text recovered");
    }
    println!("{}", text);

    Ok(())
}
