//! Page detection.
//!
//! Finds the outline of the prescription sheet on a photo and rectifies it.
//! When no plausible outline exists the whole image is used as the page.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology;
use imageproc::point::Point;
use rxocr_protocol::PageInfo;
use tracing::debug;

/// Page detection options.
#[derive(Debug, Clone, Copy)]
pub struct PageParams {
    /// Images taller than this are downscaled before edge detection.
    pub detection_height: u32,
    /// Smallest accepted page, as a fraction of the image area.
    pub min_area_ratio: f64,
    /// The page must leave at least this margin (pixels) to the image border.
    pub margin: u32,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            detection_height: 800,
            min_area_ratio: 0.5,
            margin: 10,
        }
    }
}

/// Page region cut from the input image.
#[derive(Debug, Clone)]
pub struct PageCrop {
    /// Rectified page.
    pub image: RgbImage,
    /// Corners in input coordinates (tl, tr, br, bl), if an outline was found.
    pub corners: Option<[(f32, f32); 4]>,
}

impl PageCrop {
    /// Use the whole image as the page.
    pub fn full(image: &RgbImage) -> Self {
        Self {
            image: image.clone(),
            corners: None,
        }
    }

    pub fn info(&self) -> PageInfo {
        PageInfo {
            width: self.image.width(),
            height: self.image.height(),
            detected: self.corners.is_some(),
        }
    }
}

/// Detect and rectify the page.
pub fn detection(image: &RgbImage, params: &PageParams) -> PageCrop {
    let Some(corners) = find_page_corners(image, params) else {
        debug!("No page outline found, using the whole image");
        return PageCrop::full(image);
    };

    match rectify(image, &corners) {
        Some(page) => {
            debug!(
                "Page detected at {:?}, rectified to {}x{}",
                corners,
                page.width(),
                page.height()
            );
            PageCrop {
                image: page,
                corners: Some(corners),
            }
        }
        None => PageCrop::full(image),
    }
}

fn find_page_corners(image: &RgbImage, params: &PageParams) -> Option<[(f32, f32); 4]> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let scale = if height > params.detection_height {
        params.detection_height as f32 / height as f32
    } else {
        1.0
    };
    let small = if scale < 1.0 {
        let w = ((width as f32 * scale).round() as u32).max(1);
        imageops::resize(image, w, params.detection_height, FilterType::Triangle)
    } else {
        image.clone()
    };

    let gray = imageops::grayscale(&small);
    let blurred = gaussian_blur_f32(&gray, 2.0);
    let edges = canny(&blurred, 30.0, 90.0);
    let closed = morphology::close(&edges, Norm::LInf, 3);

    let (sw, sh) = closed.dimensions();
    let min_area = sw as f64 * sh as f64 * params.min_area_ratio;
    let max_area = sw.saturating_sub(params.margin) as f64 * sh.saturating_sub(params.margin) as f64;

    let mut best: Option<(f64, Vec<Point<u32>>)> = None;
    for contour in find_contours::<u32>(&closed) {
        if !matches!(contour.border_type, BorderType::Outer) || contour.points.len() < 4 {
            continue;
        }

        let perimeter = arc_length(&contour.points, true);
        let epsilon = 0.03 * perimeter;
        let mut quad = approximate_polygon_dp(&contour.points, epsilon, true);
        quad.dedup();
        if quad.len() > 1 && quad.first() == quad.last() {
            quad.pop();
        }
        drop_collinear(&mut quad, epsilon);
        if quad.len() != 4 || !is_convex(&quad) {
            continue;
        }

        let area = polygon_area(&quad);
        if area < min_area || area > max_area {
            continue;
        }
        if best.as_ref().map_or(true, |(a, _)| area > *a) {
            best = Some((area, quad));
        }
    }

    let (_, quad) = best?;
    let points: Vec<(f32, f32)> = quad
        .iter()
        .map(|p| (p.x as f32 / scale, p.y as f32 / scale))
        .collect();
    Some(order_corners(&points))
}

/// Order four points as top-left, top-right, bottom-right, bottom-left.
fn order_corners(points: &[(f32, f32)]) -> [(f32, f32); 4] {
    let by = |key: fn(&(f32, f32)) -> f32, max: bool| {
        let it = points.iter().copied();
        let picked = if max {
            it.max_by(|a, b| key(a).total_cmp(&key(b)))
        } else {
            it.min_by(|a, b| key(a).total_cmp(&key(b)))
        };
        picked.unwrap_or((0.0, 0.0))
    };
    fn sum(p: &(f32, f32)) -> f32 {
        p.0 + p.1
    }
    fn diff(p: &(f32, f32)) -> f32 {
        p.0 - p.1
    }

    [by(sum, false), by(diff, true), by(sum, true), by(diff, false)]
}

fn rectify(image: &RgbImage, corners: &[(f32, f32); 4]) -> Option<RgbImage> {
    let [tl, tr, br, bl] = *corners;
    let dist = |a: (f32, f32), b: (f32, f32)| ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();

    let width = dist(tl, tr).max(dist(bl, br)).round() as u32;
    let height = dist(tl, bl).max(dist(tr, br)).round() as u32;
    if width < 2 || height < 2 {
        return None;
    }

    let (w, h) = ((width - 1) as f32, (height - 1) as f32);
    let projection = Projection::from_control_points(*corners, [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)])?;

    let mut out = RgbImage::new(width, height);
    warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
    Some(out)
}

/// Remove vertices lying within `epsilon` of the line through their
/// neighbours. The contour start point often survives the approximation
/// in the middle of an edge.
fn drop_collinear(points: &mut Vec<Point<u32>>, epsilon: f64) {
    loop {
        let n = points.len();
        if n <= 3 {
            return;
        }
        let redundant = (0..n).find(|&i| {
            let (a, b, c) = (points[(i + n - 1) % n], points[i], points[(i + 1) % n]);
            let (ax, ay) = (a.x as f64, a.y as f64);
            let (dx, dy) = (c.x as f64 - ax, c.y as f64 - ay);
            let len = (dx * dx + dy * dy).sqrt();
            if len == 0.0 {
                return true;
            }
            ((b.x as f64 - ax) * dy - (b.y as f64 - ay) * dx).abs() / len < epsilon
        });
        match redundant {
            Some(i) => {
                points.remove(i);
            }
            None => return,
        }
    }
}

fn polygon_area(points: &[Point<u32>]) -> f64 {
    let n = points.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64
        })
        .sum();
    twice.abs() / 2.0
}

fn is_convex(points: &[Point<u32>]) -> bool {
    let n = points.len();
    let mut sign = 0.0f64;
    for i in 0..n {
        let (a, b, c) = (points[i], points[(i + 1) % n], points[(i + 2) % n]);
        let cross = (b.x as f64 - a.x as f64) * (c.y as f64 - b.y as f64)
            - (b.y as f64 - a.y as f64) * (c.x as f64 - b.x as f64);
        if cross == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}
