//! Rotation-search recognition of a single glyph.
//!
//! Captcha letters are drawn tilted. Instead of estimating the tilt, each
//! segment is counter-rotated through a fixed list of angles and the reading
//! with the highest confidence wins.

use image::{imageops, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

use super::engine::{PageSegMode, RawCandidate, RecognitionCandidate, Recognizer, Whitelist};

/// Angles tried for every segment, in degrees, in search order.
pub const DEFAULT_ROTATION_ANGLES: [f32; 4] = [-30.0, -15.0, 15.0, 30.0];

/// Starting best confidence; any real detection beats it.
const NO_CONFIDENCE: f32 = -1.0;

const FILL: Rgb<u8> = Rgb([255, 255, 255]);

/// Rotates counter-clockwise by `degrees`, growing the canvas to fit.
///
/// Uncovered area is filled with white. A dark fill would read as ink on the
/// next recognition pass.
pub fn rotate_expand(img: &RgbImage, degrees: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let out_w = (w as f32 * cos + h as f32 * sin).round().max(1.0) as u32;
    let out_h = (w as f32 * sin + h as f32 * cos).round().max(1.0) as u32;

    // Centre the glyph on a canvas big enough for both the source and the result
    let canvas_w = out_w.max(w);
    let canvas_h = out_h.max(h);
    let mut canvas = RgbImage::from_pixel(canvas_w, canvas_h, FILL);
    imageops::replace(
        &mut canvas,
        img,
        ((canvas_w - w) / 2) as i64,
        ((canvas_h - h) / 2) as i64,
    );

    // imageproc rotates clockwise for positive theta
    let rotated = rotate_about_center(&canvas, -theta, Interpolation::Nearest, FILL);

    imageops::crop_imm(
        &rotated,
        (canvas_w - out_w) / 2,
        (canvas_h - out_h) / 2,
        out_w,
        out_h,
    )
    .to_image()
}

/// Picks the first usable candidate from one recognition call.
///
/// Blank text and unparseable confidences are skipped; scanning stops at the
/// first candidate that survives.
fn first_usable(candidates: &[RawCandidate]) -> Option<RecognitionCandidate> {
    candidates.iter().find_map(|raw| raw.parse())
}

/// Recognizes one segment by trying every angle and keeping the best reading.
///
/// Returns an empty string when no angle produced a usable candidate. On equal
/// confidence the earlier angle keeps the win. Engine faults at one angle are
/// logged and the search moves on.
pub fn recognize_with_rotations<R: Recognizer + ?Sized>(
    recognizer: &R,
    segment: &RgbImage,
    whitelist: &Whitelist,
    angles: &[f32],
) -> String {
    let mut best_char = String::new();
    let mut best_conf = NO_CONFIDENCE;

    for &angle in angles {
        let rotated = rotate_expand(segment, angle);

        let candidates =
            match recognizer.recognize(&rotated, whitelist, PageSegMode::SingleCharacter) {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(angle, error = %e, "recognition failed at angle");
                    continue;
                }
            };

        let Some(candidate) = first_usable(&candidates) else {
            tracing::debug!(angle, "no usable candidate");
            continue;
        };

        tracing::debug!(
            angle,
            text = %candidate.text,
            confidence = candidate.confidence,
            "candidate"
        );

        if candidate.confidence > best_conf {
            best_conf = candidate.confidence;
            best_char = candidate.text;
        }
    }

    best_char
}
