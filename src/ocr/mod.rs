//! Captcha text recovery.
//!
//! image → trim → segment → (per segment) rotate + recognize → assemble
//!
//! Nothing in this pipeline returns an error for a bad or unreadable image:
//! every failure collapses to an empty string, which callers treat as
//! "no text recoverable".

pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod rotation;
pub mod segment;
pub mod setup;
pub mod tesseract;

pub use engine::{
    PageSegMode, RawCandidate, RecognitionCandidate, Recognizer, Whitelist, WhitelistError,
};
pub use extract::{assemble, keep_alphanumeric};
pub use preprocess::{find_content_bounds, trim_whitespace, BoundingBox};
pub use rotation::{recognize_with_rotations, rotate_expand};
pub use segment::{segment_letters, Segment};
pub use setup::{build_recognizer, find_tesseract, tesseract_version};
pub use tesseract::TesseractCli;

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::path::Path;

use crate::config::PipelineConfig;

/// Recovers captcha text with an injected recognizer.
pub struct ImageTextExtractor<R> {
    recognizer: R,
    whitelist: Whitelist,
    config: PipelineConfig,
}

impl<R: Recognizer> ImageTextExtractor<R> {
    /// Builds an extractor, validating the pipeline settings.
    ///
    /// Fails only for invalid configuration: a bad whitelist, no rotation
    /// angles, or a zero segment width.
    pub fn new(recognizer: R, config: PipelineConfig) -> Result<Self> {
        let whitelist = Whitelist::new(&config.whitelist)?;
        if config.rotation_angles.is_empty() {
            return Err(anyhow!("at least one rotation angle is required"));
        }
        if config.min_segment_width == 0 {
            return Err(anyhow!("min_segment_width must be at least 1"));
        }
        Ok(Self {
            recognizer,
            whitelist,
            config,
        })
    }

    /// Reads an image file and recovers its text.
    ///
    /// A missing or undecodable file is logged and yields an empty string.
    pub fn extract_text(&self, image_path: impl AsRef<Path>) -> String {
        let image_path = image_path.as_ref();
        if !image_path.exists() {
            tracing::warn!(path = %image_path.display(), "image file not found");
            return String::new();
        }

        let image = match image::open(image_path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::warn!(path = %image_path.display(), error = %e, "failed to open image");
                return String::new();
            }
        };

        self.extract_image(&image)
    }

    /// Recovers text from an in-memory image.
    pub fn extract_image(&self, image: &RgbImage) -> String {
        let trimmed = trim_whitespace(image);
        let parts = segment_letters(
            &trimmed,
            self.config.ink_threshold,
            self.config.min_segment_width,
        );

        let characters: Vec<String> = parts
            .iter()
            .enumerate()
            .map(|(idx, part)| {
                let ch = recognize_with_rotations(
                    &self.recognizer,
                    &part.image,
                    &self.whitelist,
                    &self.config.rotation_angles,
                );
                tracing::debug!(part = idx + 1, x = part.x_start, text = %ch, "processed part");
                ch
            })
            .collect();

        let text = assemble(&characters);
        tracing::info!(segments = parts.len(), text = %text, "extracted captcha text");
        text
    }
}
