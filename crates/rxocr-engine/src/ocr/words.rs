//! Word detection on the page crop.

use std::path::Path;

use anyhow::{Context, Result};
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::sobel_gradients;
use imageproc::morphology;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use rten_imageproc::BoundingRect;
use rxocr_protocol::BoundingBox;
use tracing::{debug, trace};

/// Finds word regions on a page, returned in reading order.
pub trait WordDetector: Send + Sync {
    fn detect(&self, page: &RgbImage) -> Result<Vec<BoundingBox>>;
}

/// Contour word detector options.
#[derive(Debug, Clone, Copy)]
pub struct WordParams {
    /// Gaussian blur applied before the gradient.
    pub blur_sigma: f32,
    /// Closing radius merging letters into word blobs.
    pub close_radius: u8,
    /// Smallest word area in pixels.
    pub min_area: u64,
    /// Largest word area as a fraction of the page area.
    pub max_area_ratio: f64,
}

impl Default for WordParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.5,
            close_radius: 5,
            min_area: 100,
            max_area_ratio: 0.9,
        }
    }
}

/// Classical word detector: gradient edge map, closing, outer contours.
#[derive(Debug, Clone, Default)]
pub struct ContourWordDetector {
    params: WordParams,
}

impl WordDetector for ContourWordDetector {
    fn detect(&self, page: &RgbImage) -> Result<Vec<BoundingBox>> {
        let (width, height) = page.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let gray = image::imageops::grayscale(page);
        let blurred = gaussian_blur_f32(&gray, self.params.blur_sigma);
        let gradients = sobel_gradients(&blurred);
        let magnitude = GrayImage::from_fn(width, height, |x, y| {
            Luma([gradients.get_pixel(x, y)[0].min(255) as u8])
        });

        if magnitude.pixels().all(|p| p[0] == 0) {
            debug!("Page has no edges, no words detected");
            return Ok(Vec::new());
        }

        let level = otsu_level(&magnitude);
        let edges = GrayImage::from_fn(width, height, |x, y| {
            if magnitude.get_pixel(x, y)[0] > level {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        let blobs = morphology::close(&edges, Norm::LInf, self.params.close_radius);

        let max_area = (width as f64 * height as f64 * self.params.max_area_ratio) as u64;
        let mut boxes: Vec<BoundingBox> = find_contours::<u32>(&blobs)
            .into_iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer) && !c.points.is_empty())
            .map(|c| {
                let (mut x1, mut y1, mut x2, mut y2) = (u32::MAX, u32::MAX, 0, 0);
                for p in &c.points {
                    x1 = x1.min(p.x);
                    y1 = y1.min(p.y);
                    x2 = x2.max(p.x + 1);
                    y2 = y2.max(p.y + 1);
                }
                BoundingBox::new(x1, y1, x2, y2).clamp(width, height)
            })
            .filter(|b| !b.is_empty() && b.area() >= self.params.min_area && b.area() <= max_area)
            .collect();

        remove_nested(&mut boxes);
        trace!("Contour detector found {} word regions", boxes.len());
        Ok(sort_words(boxes))
    }
}

/// Word detector backed by the ocrs text detection model.
pub struct ModelWordDetector {
    engine: OcrEngine,
}

impl ModelWordDetector {
    /// Load the detection model from `text-detection.rten`.
    pub fn new(model_path: &Path) -> Result<Self> {
        debug!("Loading word detection model from {:?}", model_path);
        let detection_model = Model::load_file(model_path)
            .with_context(|| format!("Failed to load detection model from {:?}", model_path))?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            ..Default::default()
        })
        .context("Failed to create word detection engine")?;

        Ok(Self { engine })
    }
}

impl WordDetector for ModelWordDetector {
    fn detect(&self, page: &RgbImage) -> Result<Vec<BoundingBox>> {
        let (width, height) = page.dimensions();
        let source = ImageSource::from_bytes(page.as_raw(), (width, height))
            .context("Failed to create image source")?;
        let input = self
            .engine
            .prepare_input(source)
            .context("Failed to prepare detection input")?;
        let word_rects = self
            .engine
            .detect_words(&input)
            .context("Failed to detect words")?;

        trace!("Detection model found {} word regions", word_rects.len());

        let boxes = word_rects
            .iter()
            .map(|word| {
                let rect = word.bounding_rect();
                let x1 = rect.left().max(0.0) as u32;
                let y1 = rect.top().max(0.0) as u32;
                let x2 = (rect.left() + rect.width()).max(0.0).ceil() as u32;
                let y2 = (rect.top() + rect.height()).max(0.0).ceil() as u32;
                BoundingBox::new(x1, y1, x2, y2).clamp(width, height)
            })
            .filter(|b| !b.is_empty())
            .collect();

        Ok(sort_words(boxes))
    }
}

/// Put word boxes into reading order.
///
/// Boxes are taken top to bottom; a new line starts when a box's top edge is
/// more than the mean box height below the top of the current line. Each
/// line is then ordered left to right.
pub fn sort_words(mut boxes: Vec<BoundingBox>) -> Vec<BoundingBox> {
    if boxes.is_empty() {
        return boxes;
    }

    let mean_height =
        boxes.iter().map(|b| b.height() as f64).sum::<f64>() / boxes.len() as f64;
    boxes.sort_by_key(|b| (b.y1, b.x1));

    let mut lines: Vec<Vec<BoundingBox>> = Vec::new();
    let mut line: Vec<BoundingBox> = Vec::new();
    let mut line_top = boxes[0].y1 as f64;

    for b in boxes {
        if b.y1 as f64 > line_top + mean_height {
            lines.push(std::mem::take(&mut line));
            line_top = b.y1 as f64;
        }
        line.push(b);
    }
    lines.push(line);

    lines
        .into_iter()
        .flat_map(|mut line| {
            line.sort_by_key(|b| b.x1);
            line
        })
        .collect()
}

/// Drop boxes that lie entirely inside another box.
fn remove_nested(boxes: &mut Vec<BoundingBox>) {
    // Identical boxes would otherwise shield each other
    boxes.sort_by_key(|b| (b.y1, b.x1, b.y2, b.x2));
    boxes.dedup();

    let snapshot = boxes.clone();
    boxes.retain(|b| {
        !snapshot.iter().any(|o| {
            o != b && o.x1 <= b.x1 && o.y1 <= b.y1 && o.x2 >= b.x2 && o.y2 >= b.y2
        })
    });
}
