//! Pixel-level preprocessing: background trimming and ink masks.

use image::{ImageBuffer, Luma, Rgb, RgbImage};

/// Pure white, the only colour treated as background margin when trimming.
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Mask value for an ink pixel.
pub const INK: u8 = 0;
/// Mask value for a background pixel.
pub const BACKGROUND: u8 = 255;

/// Pixel rectangle in image coordinates, right and bottom exclusive.
///
/// Always non-empty: `left < right` and `top < bottom`. The "no foreground"
/// case is expressed as `None` by [`find_content_bounds`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Finds the smallest box containing every pixel that is not pure white.
///
/// Returns `None` when the image has no such pixel (including 0x0 images).
pub fn find_content_bounds(img: &RgbImage) -> Option<BoundingBox> {
    let mut bounds: Option<BoundingBox> = None;

    for (x, y, pixel) in img.enumerate_pixels() {
        if *pixel == WHITE {
            continue;
        }
        bounds = Some(match bounds {
            None => BoundingBox {
                left: x,
                top: y,
                right: x + 1,
                bottom: y + 1,
            },
            Some(b) => BoundingBox {
                left: b.left.min(x),
                top: b.top.min(y),
                right: b.right.max(x + 1),
                bottom: b.bottom.max(y + 1),
            },
        });
    }

    bounds
}

/// Crops away uniform white margins.
///
/// An all-white image comes back unchanged; that is a normal outcome, not an
/// error.
pub fn trim_whitespace(img: &RgbImage) -> RgbImage {
    match find_content_bounds(img) {
        Some(b) => image::imageops::crop_imm(img, b.left, b.top, b.width(), b.height()).to_image(),
        None => img.clone(),
    }
}

/// Perceived brightness of a pixel on a 0-255 scale.
///
/// ITU-R BT.601 luma (Y = 0.299*R + 0.587*G + 0.114*B) in 16.16 fixed point,
/// rounded half up. Matches the usual RGB to greyscale conversion bit for bit,
/// and a grey pixel maps exactly to its channel value.
pub fn brightness(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    let y = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
    y as u8
}

/// Converts an image to a binary ink mask.
///
/// Pixels whose brightness is strictly below `threshold` become [`INK`],
/// everything else becomes [`BACKGROUND`].
pub fn ink_mask(img: &RgbImage, threshold: u8) -> ImageBuffer<Luma<u8>, Vec<u8>> {
    let (width, height) = img.dimensions();
    let mut output = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if brightness(pixel) < threshold {
            INK
        } else {
            BACKGROUND
        };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}
