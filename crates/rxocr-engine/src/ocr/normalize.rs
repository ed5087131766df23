//! Word and character normalization.
//!
//! Normalized images are binary with ink at 255 on a 0 background, which is
//! what segmentation and the character classifier expect.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::{equalize_histogram, otsu_level};
use tracing::trace;

/// Word normalization options.
#[derive(Debug, Clone, Copy)]
pub struct WordNorm {
    /// Output height in pixels.
    pub height: u32,
    /// Surround the word with a uniform black margin.
    pub border: bool,
    /// Correct the handwriting slant.
    pub tilt: bool,
    /// Equalize the histogram before binarization.
    pub hyst_norm: bool,
}

/// A character crop ready for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedChar {
    /// Row-major `size * size` pixels in `[0, 1]`, ink = 1.
    pub pixels: Vec<f32>,
    /// Width and height of the ink before scaling.
    pub dim: (u32, u32),
}

/// Normalize a word crop to a fixed height.
pub fn image_norm(word: &RgbImage, params: &WordNorm) -> GrayImage {
    let mut gray = imageops::grayscale(word);
    if params.hyst_norm {
        gray = equalize_histogram(&gray);
    }

    let mut binary = binarize_inverted(&gray);
    if params.tilt {
        binary = correct_slant(&binary);
    }

    let binary = match ink_bounds(&binary) {
        Some((x, y, w, h)) => imageops::crop_imm(&binary, x, y, w, h).to_image(),
        None => binary,
    };

    if params.border {
        let margin = (params.height / 10).max(1);
        let inner = params.height.saturating_sub(2 * margin).max(1);
        let scaled = resize_to_height(&binary, inner);
        let mut out = GrayImage::new(scaled.width() + 2 * margin, params.height);
        imageops::replace(&mut out, &scaled, margin as i64, margin as i64);
        out
    } else {
        resize_to_height(&binary, params.height)
    }
}

/// Add black columns on both sides of an image.
pub fn pad_horizontal(image: &GrayImage, columns: u32) -> GrayImage {
    let mut out = GrayImage::new(image.width() + 2 * columns, image.height());
    imageops::replace(&mut out, image, columns as i64, 0);
    out
}

/// Normalize a character crop into a `size x size` square.
///
/// With `is_thresh` the crop is taken to be binary already (ink > 127).
/// Returns `None` when the crop contains no ink or `size` is zero.
pub fn letter_norm(crop: &GrayImage, size: u32, is_thresh: bool) -> Option<NormalizedChar> {
    if size == 0 {
        return None;
    }

    let binary = if is_thresh {
        rebinarize(crop)
    } else {
        binarize_inverted(crop)
    };

    let (x, y, w, h) = ink_bounds(&binary)?;
    let ink = imageops::crop_imm(&binary, x, y, w, h).to_image();

    let scale = size as f32 / w.max(h) as f32;
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);
    let scaled = imageops::resize(&ink, new_w, new_h, FilterType::Triangle);

    let mut canvas = GrayImage::new(size, size);
    imageops::replace(
        &mut canvas,
        &scaled,
        ((size - new_w) / 2) as i64,
        ((size - new_h) / 2) as i64,
    );

    let pixels = canvas.pixels().map(|p| p[0] as f32 / 255.0).collect();
    Some(NormalizedChar { pixels, dim: (w, h) })
}

/// Otsu binarization with dark ink mapped to 255.
pub(crate) fn binarize_inverted(gray: &GrayImage) -> GrayImage {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if min >= max {
        return GrayImage::new(gray.width(), gray.height());
    }

    let level = otsu_level(gray).max(min + 1);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] < level {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

fn rebinarize(image: &GrayImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] > 127 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Bounding box `(x, y, w, h)` of all ink pixels.
pub(crate) fn ink_bounds(image: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in image.enumerate_pixels() {
        if p[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

fn resize_to_height(image: &GrayImage, height: u32) -> GrayImage {
    let width = ((image.width() as f32 * height as f32 / image.height().max(1) as f32).round()
        as u32)
        .max(1);
    let resized = imageops::resize(image, width, height, FilterType::Triangle);
    rebinarize(&resized)
}

/// Shear the word so that its strokes become vertical.
///
/// Tries slants between -45 and 45 degrees and keeps the one whose column
/// profile has the highest energy (sharpest vertical strokes).
fn correct_slant(binary: &GrayImage) -> GrayImage {
    const STEPS: i32 = 9;

    let mut best_shear = 0.0f32;
    let mut best_score = column_energy(binary);

    for step in -STEPS..=STEPS {
        if step == 0 {
            continue;
        }
        let shear = (step as f32 * 5.0).to_radians().tan();
        let score = column_energy(&shear_image(binary, shear));
        if score > best_score {
            best_score = score;
            best_shear = shear;
        }
    }

    trace!("Slant correction shear factor {:.3}", best_shear);
    if best_shear == 0.0 {
        binary.clone()
    } else {
        shear_image(binary, best_shear)
    }
}

fn column_energy(binary: &GrayImage) -> u64 {
    let mut columns = vec![0u64; binary.width() as usize];
    for (x, _, p) in binary.enumerate_pixels() {
        if p[0] > 0 {
            columns[x as usize] += 1;
        }
    }
    columns.iter().map(|c| c * c).sum()
}

/// Horizontal shear: `x' = x + shear * (h - 1 - y)`, widened to fit.
fn shear_image(binary: &GrayImage, shear: f32) -> GrayImage {
    let (w, h) = binary.dimensions();
    let extra = (shear.abs() * h.saturating_sub(1) as f32).ceil() as u32;
    let offset = if shear < 0.0 { extra as f32 } else { 0.0 };

    let mut out = GrayImage::new(w + extra, h);
    for (x, y, p) in binary.enumerate_pixels() {
        if p[0] == 0 {
            continue;
        }
        let nx = (x as f32 + shear * (h - 1 - y) as f32 + offset).round() as i64;
        if nx >= 0 && (nx as u32) < out.width() {
            out.put_pixel(nx as u32, y, Luma([255]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn white_rgb(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
    }

    fn fill_rgb(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
    }

    #[test]
    fn test_image_norm_height() {
        let mut word = white_rgb(200, 50);
        fill_rgb(&mut word, 20, 10, 40, 40);
        fill_rgb(&mut word, 60, 10, 80, 40);

        let params = WordNorm { height: 60, border: false, tilt: true, hyst_norm: true };
        let norm = image_norm(&word, &params);
        assert_eq!(norm.height(), 60);
        assert!(ink_bounds(&norm).is_some());
    }

    #[test]
    fn test_image_norm_with_border() {
        let mut word = white_rgb(100, 40);
        fill_rgb(&mut word, 10, 5, 90, 35);

        let params = WordNorm { height: 60, border: true, tilt: false, hyst_norm: false };
        let norm = image_norm(&word, &params);
        assert_eq!(norm.height(), 60);
        // Top rows belong to the margin.
        assert!((0..norm.width()).all(|x| norm.get_pixel(x, 0)[0] == 0));
    }

    #[test]
    fn test_blank_word_does_not_panic() {
        let params = WordNorm { height: 60, border: false, tilt: true, hyst_norm: true };
        let norm = image_norm(&white_rgb(30, 30), &params);
        assert_eq!(norm.height(), 60);
        assert!(ink_bounds(&norm).is_none());
    }

    #[test]
    fn test_pad_horizontal() {
        let img = GrayImage::from_pixel(10, 6, Luma([255]));
        let padded = pad_horizontal(&img, 30);
        assert_eq!(padded.dimensions(), (70, 6));
        assert_eq!(padded.get_pixel(0, 0)[0], 0);
        assert_eq!(padded.get_pixel(30, 0)[0], 255);
        assert_eq!(padded.get_pixel(39, 5)[0], 255);
        assert_eq!(padded.get_pixel(40, 5)[0], 0);
    }

    #[test]
    fn test_letter_norm_blank_is_none() {
        let blank = GrayImage::new(20, 60);
        assert!(letter_norm(&blank, 64, true).is_none());
    }

    #[test]
    fn test_letter_norm_zero_size_is_none() {
        let mut crop = GrayImage::new(10, 10);
        crop.put_pixel(5, 5, Luma([255]));
        assert!(letter_norm(&crop, 0, true).is_none());
    }

    #[test]
    fn test_letter_norm_dims_and_size() {
        let mut crop = GrayImage::new(30, 60);
        for y in 10..50 {
            for x in 5..15 {
                crop.put_pixel(x, y, Luma([255]));
            }
        }
        let ch = letter_norm(&crop, 64, true).unwrap();
        assert_eq!(ch.dim, (10, 40));
        assert_eq!(ch.pixels.len(), 64 * 64);
        assert!(ch.pixels.iter().all(|p| (0.0..=1.0).contains(p)));
        // Tall glyph is centered horizontally and spans the full height.
        assert!(ch.pixels[32 * 64 + 32] > 0.5);
        assert_eq!(ch.pixels[32 * 64], 0.0);
    }

    #[test]
    fn test_letter_norm_thresholds_gray_input() {
        let mut crop = GrayImage::from_pixel(20, 20, Luma([230]));
        for y in 4..16 {
            for x in 4..16 {
                crop.put_pixel(x, y, Luma([30]));
            }
        }
        let ch = letter_norm(&crop, 32, false).unwrap();
        assert_eq!(ch.dim, (12, 12));
    }

    #[test]
    fn test_slant_correction_straightens_italic_bar() {
        // A bar slanted by 45 degrees.
        let mut img = GrayImage::new(80, 40);
        for y in 0..40u32 {
            for dx in 0..4u32 {
                img.put_pixel(10 + (39 - y) + dx, y, Luma([255]));
            }
        }
        let fixed = correct_slant(&img);
        let (_, _, w, _) = ink_bounds(&fixed).unwrap();
        assert!(w < 10, "expected an upright bar, got width {}", w);
    }
}
