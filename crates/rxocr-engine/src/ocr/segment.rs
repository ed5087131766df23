//! Character segmentation of normalized words.
//!
//! Works on the column ink profile: every run of empty columns is a gap, and
//! blobs that are too wide to be a single letter are split at their thinnest
//! column.

use image::GrayImage;

/// Segmentation options.
#[derive(Debug, Clone, Copy)]
pub struct SegmentParams {
    /// Widest ink blob accepted as one character, relative to word height.
    pub max_char_ratio: f32,
    /// Narrowest piece produced when splitting a wide blob, relative to word height.
    pub min_char_ratio: f32,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            max_char_ratio: 1.2,
            min_char_ratio: 0.25,
        }
    }
}

/// Column positions separating characters.
///
/// The result is strictly increasing, starts at 0 and ends at the image
/// width; character `i` spans columns `gaps[i]..gaps[i + 1]`.
pub fn segmentation(word: &GrayImage, params: &SegmentParams) -> Vec<u32> {
    let width = word.width();
    if width == 0 {
        return vec![0];
    }

    let profile = column_profile(word);
    let mut gaps = vec![0];

    let mut x = 0;
    while x < width {
        if profile[x as usize] > 0 {
            x += 1;
            continue;
        }
        let start = x;
        while x < width && profile[x as usize] == 0 {
            x += 1;
        }
        gaps.push(start + (x - start) / 2);
    }
    gaps.push(width);
    gaps.dedup();

    let max_width = (word.height() as f32 * params.max_char_ratio).max(1.0) as u32;
    let min_width = (word.height() as f32 * params.min_char_ratio).max(1.0) as u32;

    let mut out = Vec::with_capacity(gaps.len());
    for pair in gaps.windows(2) {
        out.push(pair[0]);
        split_wide(&profile, pair[0], pair[1], max_width, min_width, &mut out);
    }
    out.push(width);
    out.dedup();
    out
}

fn column_profile(word: &GrayImage) -> Vec<u32> {
    let mut profile = vec![0u32; word.width() as usize];
    for (x, _, p) in word.enumerate_pixels() {
        if p[0] > 0 {
            profile[x as usize] += 1;
        }
    }
    profile
}

/// Push cut positions strictly inside `start..end` for an over-wide blob.
fn split_wide(
    profile: &[u32],
    start: u32,
    end: u32,
    max_width: u32,
    min_width: u32,
    out: &mut Vec<u32>,
) {
    let Some((ink_start, ink_end)) = ink_span(profile, start, end) else {
        return;
    };
    if ink_end - ink_start <= max_width {
        return;
    }

    let lo = ink_start + min_width;
    let hi = ink_end.saturating_sub(min_width);
    if lo >= hi {
        return;
    }

    // Thinnest column, preferring the one closest to the middle on ties.
    let mid = (ink_start + ink_end) / 2;
    let cut = (lo..hi)
        .min_by_key(|&c| (profile[c as usize], c.abs_diff(mid)))
        .unwrap_or(mid);

    split_wide(profile, start, cut, max_width, min_width, out);
    out.push(cut);
    split_wide(profile, cut, end, max_width, min_width, out);
}

fn ink_span(profile: &[u32], start: u32, end: u32) -> Option<(u32, u32)> {
    let first = (start..end).find(|&c| profile[c as usize] > 0)?;
    let last = (start..end).rev().find(|&c| profile[c as usize] > 0)?;
    Some((first, last + 1))
}
