//! Character segmentation by vertical projection.
//!
//! The trimmed captcha is binarized, ink pixels are counted per column, and
//! each run of non-empty columns becomes one candidate glyph.

use image::RgbImage;

use super::preprocess::{ink_mask, INK};

/// One candidate character cut out of the parent image.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Full-height crop of the original (not binarized) image.
    pub image: RgbImage,
    /// First column of the run in the parent image.
    pub x_start: u32,
    /// One past the last column of the run.
    pub x_end: u32,
}

impl Segment {
    /// Horizontal midpoint in parent coordinates.
    pub fn midpoint(&self) -> f32 {
        (self.x_start + self.x_end) as f32 / 2.0
    }
}

/// Counts ink pixels in every column.
pub fn vertical_projection(img: &RgbImage, ink_threshold: u8) -> Vec<u32> {
    let mask = ink_mask(img, ink_threshold);
    let mut counts = vec![0u32; mask.width() as usize];

    for (x, _, pixel) in mask.enumerate_pixels() {
        if pixel[0] == INK {
            counts[x as usize] += 1;
        }
    }

    counts
}

/// Finds `[start, end)` column runs with ink, dropping runs narrower than
/// `min_width`.
///
/// A run still open at the right edge is closed there.
pub fn find_runs(projection: &[u32], min_width: u32) -> Vec<(u32, u32)> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;

    for (x, &count) in projection.iter().enumerate() {
        match (count > 0, start) {
            (true, None) => start = Some(x),
            (false, Some(s)) => {
                if x - s >= min_width as usize {
                    runs.push((s as u32, x as u32));
                }
                start = None;
            }
            _ => {}
        }
    }

    if let Some(s) = start {
        let end = projection.len();
        if end - s >= min_width as usize {
            runs.push((s as u32, end as u32));
        }
    }

    runs
}

/// Splits a trimmed captcha into left-to-right character segments.
///
/// Zero segments is a valid result.
pub fn segment_letters(img: &RgbImage, ink_threshold: u8, min_width: u32) -> Vec<Segment> {
    let projection = vertical_projection(img, ink_threshold);
    let segments: Vec<Segment> = find_runs(&projection, min_width)
        .into_iter()
        .map(|(x_start, x_end)| Segment {
            image: image::imageops::crop_imm(img, x_start, 0, x_end - x_start, img.height())
                .to_image(),
            x_start,
            x_end,
        })
        .collect();

    tracing::debug!(count = segments.len(), "segmented captcha into letter parts");
    segments
}
